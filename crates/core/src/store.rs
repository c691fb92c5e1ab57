//! Session store trait, the single source of truth for conversation state.
//!
//! The store exclusively owns session and ticket lifetimes. Backends must
//! keep each transcript append-only and keep ids unique under concurrent
//! access; the orchestrator additionally serializes turns per session.

use crate::decision::EscalationReason;
use crate::error::StoreError;
use crate::session::{
    Resolution, Session, SessionId, SessionOverview, Speaker, Summary, Ticket, TicketId,
    TicketStatus, Turn,
};
use async_trait::async_trait;
use tracing::debug;

/// Result of [`SessionStore::set_escalation`].
#[derive(Debug, Clone, PartialEq)]
pub struct Escalation {
    pub ticket: Ticket,
    /// `false` when an unresolved ticket already existed and was returned.
    pub created: bool,
}

/// The session store trait.
///
/// Implementations: in-memory map, SQLite.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Create a fresh empty session with a unique id.
    async fn create(&self) -> Result<Session, StoreError>;

    /// Fetch a session with its full transcript.
    async fn get(&self, id: &SessionId) -> Result<Session, StoreError>;

    /// Append a turn. Fails with `NotFound` for an unknown session.
    async fn append_turn(
        &self,
        id: &SessionId,
        speaker: Speaker,
        text: &str,
        resolution: Option<Resolution>,
    ) -> Result<Turn, StoreError>;

    /// Mark the session escalated and attach a ticket.
    ///
    /// Atomic and idempotent: if the session already has an open or pending
    /// ticket, that ticket is returned with `created == false`.
    async fn set_escalation(
        &self,
        id: &SessionId,
        reason: EscalationReason,
        summary: Option<String>,
    ) -> Result<Escalation, StoreError>;

    /// Remember the last computed summary.
    async fn set_summary(&self, id: &SessionId, summary: &Summary) -> Result<(), StoreError>;

    /// Fetch a ticket by id.
    async fn get_ticket(&self, id: TicketId) -> Result<Ticket, StoreError>;

    /// Move a ticket through its workflow (used by human agents).
    async fn update_ticket_status(
        &self,
        id: TicketId,
        status: TicketStatus,
    ) -> Result<Ticket, StoreError>;

    /// All sessions, oldest first.
    async fn list_sessions(&self) -> Result<Vec<SessionOverview>, StoreError>;

    /// Number of stored sessions.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Resolve a client-supplied id, creating a new session when it is absent
    /// or unknown. The unknown id is never adopted; the caller always gets a
    /// server-generated one back.
    async fn get_or_create(&self, id: Option<&SessionId>) -> Result<(Session, bool), StoreError> {
        if let Some(id) = id {
            match self.get(id).await {
                Ok(session) => return Ok((session, false)),
                Err(StoreError::NotFound(_)) => {
                    debug!(session_id = %id, "Unknown session id, starting a new session");
                }
                Err(e) => return Err(e),
            }
        }
        Ok((self.create().await?, true))
    }
}
