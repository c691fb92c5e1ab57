//! In-memory session store, useful for testing and ephemeral deployments.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use supportline_core::decision::EscalationReason;
use supportline_core::error::StoreError;
use supportline_core::session::{
    EscalationStatus, Resolution, Session, SessionId, SessionOverview, Speaker, Summary, Ticket,
    TicketId, TicketStatus, Turn,
};
use supportline_core::store::{Escalation, SessionStore};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Default)]
struct State {
    sessions: HashMap<SessionId, Session>,
    tickets: HashMap<TicketId, Ticket>,
}

/// A session store that keeps everything in process memory.
///
/// Sessions and tickets live behind one lock so escalation stays atomic.
pub struct InMemorySessionStore {
    state: RwLock<State>,
    next_ticket: AtomicU64,
    max_sessions: Option<usize>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            next_ticket: AtomicU64::new(1),
            max_sessions: None,
        }
    }

    /// Cap the number of live sessions. When full, creating a session evicts
    /// the one that has been idle the longest.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = Some(max.max(1));
        self
    }

    fn evict_if_full(&self, state: &mut State) {
        let Some(max) = self.max_sessions else {
            return;
        };
        while state.sessions.len() >= max {
            let oldest = state
                .sessions
                .values()
                .min_by_key(|s| s.updated_at)
                .map(|s| s.id.clone());
            match oldest {
                Some(id) => {
                    state.sessions.remove(&id);
                    state.tickets.retain(|_, t| t.session_id != id);
                    info!(session_id = %id, "Evicted idle session");
                }
                None => break,
            }
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create(&self) -> Result<Session, StoreError> {
        let mut state = self.state.write().await;
        self.evict_if_full(&mut state);

        let mut session = Session::new();
        while state.sessions.contains_key(&session.id) {
            session.id = SessionId::new();
        }
        state.sessions.insert(session.id.clone(), session.clone());
        debug!(session_id = %session.id, "Session created");
        Ok(session)
    }

    async fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.state
            .read()
            .await
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn append_turn(
        &self,
        id: &SessionId,
        speaker: Speaker,
        text: &str,
        resolution: Option<Resolution>,
    ) -> Result<Turn, StoreError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let turn = Turn {
            seq: session.next_seq(),
            speaker,
            text: text.to_string(),
            timestamp: Utc::now(),
            resolution,
        };
        session.updated_at = turn.timestamp;
        session.turns.push(turn.clone());
        Ok(turn)
    }

    async fn set_escalation(
        &self,
        id: &SessionId,
        reason: EscalationReason,
        summary: Option<String>,
    ) -> Result<Escalation, StoreError> {
        let mut state = self.state.write().await;
        let State { sessions, tickets } = &mut *state;

        let session = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(existing) = session
            .ticket_id
            .and_then(|tid| tickets.get(&tid))
            .filter(|t| t.status.is_unresolved())
        {
            return Ok(Escalation {
                ticket: existing.clone(),
                created: false,
            });
        }

        let ticket = Ticket {
            id: TicketId(self.next_ticket.fetch_add(1, Ordering::SeqCst)),
            session_id: id.clone(),
            status: TicketStatus::Open,
            reason,
            summary,
            created_at: Utc::now(),
        };
        session.escalation = EscalationStatus::Escalated;
        session.ticket_id = Some(ticket.id);
        session.updated_at = ticket.created_at;
        tickets.insert(ticket.id, ticket.clone());

        Ok(Escalation {
            ticket,
            created: true,
        })
    }

    async fn set_summary(&self, id: &SessionId, summary: &Summary) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        session.summary = Some(summary.clone());
        Ok(())
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Ticket, StoreError> {
        self.state
            .read()
            .await
            .tickets
            .get(&id)
            .cloned()
            .ok_or(StoreError::TicketNotFound(id.0))
    }

    async fn update_ticket_status(
        &self,
        id: TicketId,
        status: TicketStatus,
    ) -> Result<Ticket, StoreError> {
        let mut state = self.state.write().await;
        let ticket = state
            .tickets
            .get_mut(&id)
            .ok_or(StoreError::TicketNotFound(id.0))?;
        ticket.status = status;
        Ok(ticket.clone())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionOverview>, StoreError> {
        let state = self.state.read().await;
        let mut overviews: Vec<SessionOverview> =
            state.sessions.values().map(Session::overview).collect();
        overviews.sort_by_key(|o| o.created_at);
        Ok(overviews)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.state.read().await.sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn create_and_get() {
        let store = InMemorySessionStore::new();
        let session = store.create().await.unwrap();
        let fetched = store.get(&session.id).await.unwrap();
        assert_eq!(fetched.id, session.id);
        assert!(fetched.is_empty());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let store = InMemorySessionStore::new();
        let missing = SessionId::from("nope");
        assert!(matches!(
            store.get(&missing).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.append_turn(&missing, Speaker::User, "hi", None).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn turns_get_increasing_sequence_numbers() {
        let store = InMemorySessionStore::new();
        let session = store.create().await.unwrap();

        let t1 = store
            .append_turn(&session.id, Speaker::User, "hello", None)
            .await
            .unwrap();
        let t2 = store
            .append_turn(&session.id, Speaker::Assistant, "hi!", Some(Resolution::Faq))
            .await
            .unwrap();
        assert_eq!((t1.seq, t2.seq), (1, 2));

        let fetched = store.get(&session.id).await.unwrap();
        assert_eq!(fetched.turns.len(), 2);
        assert_eq!(fetched.turns[1].resolution, Some(Resolution::Faq));
    }

    #[tokio::test]
    async fn concurrent_appends_keep_sequence_unique() {
        let store = Arc::new(InMemorySessionStore::new());
        let session = store.create().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let id = session.id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_turn(&id, Speaker::User, &format!("msg {i}"), None)
                    .await
                    .unwrap()
                    .seq
            }));
        }

        let mut seqs = Vec::new();
        for h in handles {
            seqs.push(h.await.unwrap());
        }
        seqs.sort_unstable();
        assert_eq!(seqs, (1..=20).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn escalation_is_idempotent() {
        let store = InMemorySessionStore::new();
        let session = store.create().await.unwrap();

        let first = store
            .set_escalation(&session.id, EscalationReason::ExplicitRequest, None)
            .await
            .unwrap();
        let second = store
            .set_escalation(&session.id, EscalationReason::LowConfidence, Some("x".into()))
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.ticket.id, second.ticket.id);
        assert_eq!(second.ticket.reason, EscalationReason::ExplicitRequest);
        assert_eq!(first.ticket.id, TicketId(1));

        let fetched = store.get(&session.id).await.unwrap();
        assert!(fetched.is_escalated());
        assert_eq!(fetched.ticket_id, Some(first.ticket.id));
    }

    #[tokio::test]
    async fn resolved_ticket_allows_a_new_one() {
        let store = InMemorySessionStore::new();
        let session = store.create().await.unwrap();

        let first = store
            .set_escalation(&session.id, EscalationReason::NoFaqMatch, None)
            .await
            .unwrap();
        let resolved = store
            .update_ticket_status(first.ticket.id, TicketStatus::Resolved)
            .await
            .unwrap();
        assert_eq!(resolved.status, TicketStatus::Resolved);

        let second = store
            .set_escalation(&session.id, EscalationReason::ExplicitRequest, None)
            .await
            .unwrap();
        assert!(second.created);
        assert!(second.ticket.id > first.ticket.id);
    }

    #[tokio::test]
    async fn ticket_lookup() {
        let store = InMemorySessionStore::new();
        let session = store.create().await.unwrap();
        let esc = store
            .set_escalation(&session.id, EscalationReason::ExplicitRequest, Some("s".into()))
            .await
            .unwrap();

        let ticket = store.get_ticket(esc.ticket.id).await.unwrap();
        assert_eq!(ticket.summary.as_deref(), Some("s"));
        assert!(matches!(
            store.get_ticket(TicketId(99)).await,
            Err(StoreError::TicketNotFound(99))
        ));
    }

    #[tokio::test]
    async fn summary_is_remembered() {
        let store = InMemorySessionStore::new();
        let session = store.create().await.unwrap();
        let summary = Summary {
            summary: "Asked about hours.".into(),
            next_actions: vec!["None".into()],
        };
        store.set_summary(&session.id, &summary).await.unwrap();
        assert_eq!(store.get(&session.id).await.unwrap().summary, Some(summary));
    }

    #[tokio::test]
    async fn max_sessions_evicts_idle_session() {
        let store = InMemorySessionStore::new().with_max_sessions(2);
        let a = store.create().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let b = store.create().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        store
            .append_turn(&a.id, Speaker::User, "still here", None)
            .await
            .unwrap();

        let c = store.create().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
        assert!(store.get(&a.id).await.is_ok());
        assert!(store.get(&b.id).await.is_err());
        assert!(store.get(&c.id).await.is_ok());
    }

    #[tokio::test]
    async fn eviction_drops_the_sessions_tickets() {
        let store = InMemorySessionStore::new().with_max_sessions(1);
        let a = store.create().await.unwrap();
        let esc = store
            .set_escalation(&a.id, EscalationReason::ExplicitRequest, None)
            .await
            .unwrap();

        let b = store.create().await.unwrap();
        let kept = store
            .set_escalation(&b.id, EscalationReason::ExplicitRequest, None)
            .await
            .unwrap();

        assert!(store.get(&a.id).await.is_err());
        assert!(matches!(
            store.get_ticket(esc.ticket.id).await,
            Err(StoreError::TicketNotFound(_))
        ));
        assert_eq!(store.get_ticket(kept.ticket.id).await.unwrap().session_id, b.id);
        assert_eq!(store.state.read().await.tickets.len(), 1);
    }

    #[tokio::test]
    async fn get_or_create_never_adopts_unknown_ids() {
        let store = InMemorySessionStore::new();
        let bogus = SessionId::from("client-made-this-up");
        let (session, created) = store.get_or_create(Some(&bogus)).await.unwrap();
        assert!(created);
        assert_ne!(session.id, bogus);

        let (again, created) = store.get_or_create(Some(&session.id)).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, session.id);
    }

    #[tokio::test]
    async fn list_sessions_oldest_first() {
        let store = InMemorySessionStore::new();
        let a = store.create().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let b = store.create().await.unwrap();
        store
            .append_turn(&b.id, Speaker::User, "hi", None)
            .await
            .unwrap();

        let list = store.list_sessions().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, a.id);
        assert_eq!(list[1].turn_count, 1);
    }
}
