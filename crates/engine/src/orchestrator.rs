//! The support session orchestrator.
//!
//! A chat turn walks a fixed sequence of states:
//!
//! `Received → EscalationChecked → FaqAttempted → (Generated | Skipped) →
//! Recorded → Responded`
//!
//! Every message produces exactly one [`ChatReply`] or one error. Provider
//! failures never surface as errors; they degrade to a fixed apology.

use crate::context::ContextWindow;
use crate::escalation::{EscalationPolicy, HeuristicEscalationPolicy};
use crate::faq::{DEFAULT_THRESHOLD, FaqMatcher, FuzzyFaqMatcher};
use crate::locks::SessionLocks;
use crate::postprocess::postprocess_reply;
use crate::prompt::{DEGRADED_REPLY, ESCALATION_REPLY, chat_messages};
use crate::sanitize::escape_markup;
use crate::summarizer::Summarizer;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use supportline_config::AppConfig;
use supportline_core::decision::{EscalationDecision, EscalationReason};
use supportline_core::error::{Error, ProviderError, Result};
use supportline_core::event::{DomainEvent, EventBus};
use supportline_core::provider::{Provider, ProviderRequest, ProviderResponse};
use supportline_core::session::{
    Resolution, Session, SessionId, SessionOverview, Speaker, Summary, Ticket, Turn,
};
use supportline_core::store::SessionStore;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Tunables for a chat turn.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub assistant_name: String,
    pub context_turns: usize,
    pub max_message_chars: usize,
    pub provider_timeout: Duration,
    pub summary_window_turns: usize,
}

impl ChatSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let conversation = &config.conversation;
        Self {
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: config.default_max_tokens,
            assistant_name: conversation.assistant_name.clone(),
            context_turns: conversation.context_turns,
            max_message_chars: conversation.max_message_chars,
            provider_timeout: Duration::from_secs(conversation.provider_timeout_secs),
            summary_window_turns: conversation.summary_window_turns,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// The outcome of one chat message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub session_id: SessionId,
    pub reply: String,
    /// How the reply was produced.
    pub source: Resolution,
    pub decision: EscalationDecision,
    /// Set when this turn escalated the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Ticket>,
}

/// Sequences escalation checks, FAQ lookup, the generative fallback and
/// transcript updates for every support session.
pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn Provider>,
    matcher: Arc<dyn FaqMatcher>,
    policy: Arc<dyn EscalationPolicy>,
    summarizer: Summarizer,
    event_bus: Arc<EventBus>,
    locks: SessionLocks,
    settings: ChatSettings,
}

impl Orchestrator {
    /// Create an orchestrator with an empty FAQ table and the default
    /// escalation policy.
    pub fn new(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn Provider>,
        settings: ChatSettings,
    ) -> Self {
        let summarizer = Self::build_summarizer(provider.clone(), &settings);
        Self {
            store,
            provider,
            matcher: Arc::new(FuzzyFaqMatcher::new(Vec::new(), DEFAULT_THRESHOLD)),
            policy: Arc::new(HeuristicEscalationPolicy::default()),
            summarizer,
            event_bus: Arc::new(EventBus::default()),
            locks: SessionLocks::new(),
            settings,
        }
    }

    /// Wire everything from configuration.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn Provider>,
        matcher: Arc<dyn FaqMatcher>,
    ) -> Self {
        Self::new(store, provider, ChatSettings::from_config(config))
            .with_matcher(matcher)
            .with_policy(Arc::new(HeuristicEscalationPolicy::from_config(
                &config.escalation,
            )))
    }

    fn build_summarizer(provider: Arc<dyn Provider>, settings: &ChatSettings) -> Summarizer {
        Summarizer::new(provider, settings.model.clone())
            .with_assistant_name(settings.assistant_name.clone())
            .with_window(settings.summary_window_turns)
            .with_timeout(settings.provider_timeout)
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn FaqMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn EscalationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Override the overall bound on a provider call.
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.settings.provider_timeout = timeout;
        self.summarizer = Self::build_summarizer(self.provider.clone(), &self.settings);
        self
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn matcher(&self) -> &Arc<dyn FaqMatcher> {
        &self.matcher
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Subscribe to domain events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.event_bus.subscribe()
    }

    /// Handle one customer message.
    ///
    /// An absent or unknown `session_id` starts a new session; the reply
    /// always carries the id the customer should use next.
    pub async fn chat(&self, message: &str, session_id: Option<&SessionId>) -> Result<ChatReply> {
        let text = message.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("message must not be empty".into()));
        }
        if text.chars().count() > self.settings.max_message_chars {
            return Err(Error::InvalidInput(format!(
                "message exceeds {} characters",
                self.settings.max_message_chars
            )));
        }

        let (session, created) = self.store.get_or_create(session_id).await?;
        let id = session.id.clone();
        if created {
            self.event_bus.publish(DomainEvent::SessionCreated {
                session_id: id.to_string(),
                timestamp: Utc::now(),
            });
        }

        let _guard = self.locks.acquire(&id).await;
        // Re-read under the lock so the history includes any turn that
        // finished while we waited
        let session = if created { session } else { self.store.get(&id).await? };
        debug!(session_id = %id, state = "received", turns = session.turns.len());

        self.record(&id, Speaker::User, text, None).await?;

        let decision = self.policy.should_escalate(text, &session.turns);
        debug!(session_id = %id, state = "escalation_checked", escalate = decision.escalate, reason = %decision.reason);
        if decision.escalate {
            return self.escalate_turn(&id, decision).await;
        }

        if let Some(faq) = self.matcher.find_match(text) {
            debug!(session_id = %id, state = "faq_attempted", matched = true, score = faq.score);
            self.event_bus.publish(DomainEvent::FaqAnswered {
                session_id: id.to_string(),
                entry_index: faq.entry_index,
                score: faq.score,
                timestamp: Utc::now(),
            });
            debug!(session_id = %id, state = "skipped");
            return self
                .respond(&id, faq.answer, Resolution::Faq, EscalationDecision::proceed(), None)
                .await;
        }
        debug!(session_id = %id, state = "faq_attempted", matched = false);

        let window = ContextWindow::from_turns(&session.turns, self.settings.context_turns);
        match self.generate(&window, text).await {
            Ok(response) => {
                debug!(session_id = %id, state = "generated", model = %response.model);
                let raw = response.message.content;
                let assessment = self.policy.assess_reply(&raw, response.confidence);
                if assessment.escalate {
                    return self.escalate_turn(&id, assessment).await;
                }
                let reply = escape_markup(&postprocess_reply(&raw));
                self.respond(&id, reply, Resolution::Generated, assessment, None)
                    .await
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "Provider unavailable, sending degraded reply");
                self.event_bus.publish(DomainEvent::ProviderDegraded {
                    session_id: id.to_string(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                self.respond(
                    &id,
                    DEGRADED_REPLY.to_string(),
                    Resolution::Degraded,
                    EscalationDecision::noted(EscalationReason::ProviderError),
                    None,
                )
                .await
            }
        }
    }

    /// Call the provider with the overall timeout. Empty answers count as
    /// failures.
    async fn generate(
        &self,
        window: &ContextWindow,
        text: &str,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let request = ProviderRequest::new(
            self.settings.model.clone(),
            chat_messages(&self.settings.assistant_name, window, text),
        )
        .with_temperature(self.settings.temperature)
        .with_max_tokens(self.settings.max_tokens);

        let response = tokio::time::timeout(
            self.settings.provider_timeout,
            self.provider.complete(request),
        )
        .await
        .map_err(|_| {
            ProviderError::Timeout(format!(
                "no reply within {}s",
                self.settings.provider_timeout.as_secs_f32()
            ))
        })??;

        if response.message.content.trim().is_empty() {
            return Err(ProviderError::MalformedResponse(
                "provider returned an empty reply".into(),
            ));
        }
        Ok(response)
    }

    async fn escalate_turn(&self, id: &SessionId, decision: EscalationDecision) -> Result<ChatReply> {
        let escalation = self.store.set_escalation(id, decision.reason, None).await?;
        self.publish_escalation(id, &escalation.ticket, escalation.created);
        info!(
            session_id = %id,
            ticket_id = %escalation.ticket.id,
            reason = %decision.reason,
            created = escalation.created,
            "Session escalated"
        );
        self.respond(
            id,
            ESCALATION_REPLY.to_string(),
            Resolution::Escalated,
            decision,
            Some(escalation.ticket),
        )
        .await
    }

    async fn respond(
        &self,
        id: &SessionId,
        reply: String,
        source: Resolution,
        decision: EscalationDecision,
        ticket: Option<Ticket>,
    ) -> Result<ChatReply> {
        self.record(id, Speaker::Assistant, &reply, Some(source)).await?;
        debug!(session_id = %id, state = "recorded", source = source.as_str());
        debug!(session_id = %id, state = "responded");
        Ok(ChatReply {
            session_id: id.clone(),
            reply,
            source,
            decision,
            ticket,
        })
    }

    async fn record(
        &self,
        id: &SessionId,
        speaker: Speaker,
        text: &str,
        resolution: Option<Resolution>,
    ) -> Result<Turn> {
        let turn = self.store.append_turn(id, speaker, text, resolution).await?;
        self.event_bus.publish(DomainEvent::TurnRecorded {
            session_id: id.to_string(),
            seq: turn.seq,
            speaker: speaker.as_str().to_string(),
            timestamp: turn.timestamp,
        });
        Ok(turn)
    }

    fn publish_escalation(&self, id: &SessionId, ticket: &Ticket, created: bool) {
        self.event_bus.publish(DomainEvent::SessionEscalated {
            session_id: id.to_string(),
            ticket_id: ticket.id.0,
            reason: ticket.reason,
            created,
            timestamp: Utc::now(),
        });
    }

    /// Summarize a session and remember the result.
    pub async fn summarize(&self, id: &SessionId) -> Result<Summary> {
        let session = self.store.get(id).await.map_err(Error::from_lookup)?;
        if session.is_empty() {
            return Err(Error::EmptySession(id.to_string()));
        }
        self.summarize_session(&session).await
    }

    async fn summarize_session(&self, session: &Session) -> Result<Summary> {
        let ticket = match session.ticket_id {
            Some(id) => Some(self.store.get_ticket(id).await?),
            None => None,
        };
        let outcome = self.summarizer.summarize(session, ticket.as_ref()).await;
        self.store.set_summary(&session.id, &outcome.summary).await?;
        self.event_bus.publish(DomainEvent::SummaryGenerated {
            session_id: session.id.to_string(),
            degraded: outcome.degraded,
            next_actions: outcome.summary.next_actions.len(),
            timestamp: Utc::now(),
        });
        Ok(outcome.summary)
    }

    /// Hand a session to a human on request.
    ///
    /// Idempotent: while the session has an unresolved ticket, that ticket is
    /// returned unchanged. Otherwise the given summary (or an automatic one)
    /// is attached to a new `open` ticket.
    pub async fn escalate(&self, id: &SessionId, summary: Option<String>) -> Result<Ticket> {
        let session = self.store.get(id).await.map_err(Error::from_lookup)?;

        if let Some(ticket_id) = session.ticket_id {
            let existing = self.store.get_ticket(ticket_id).await?;
            if existing.status.is_unresolved() {
                debug!(session_id = %id, ticket_id = %existing.id, "Session already escalated");
                return Ok(existing);
            }
        }

        let summary = match summary.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(given) => Some(escape_markup(given)),
            None if !session.is_empty() => Some(self.summarize_session(&session).await?.summary),
            None => None,
        };

        let escalation = self
            .store
            .set_escalation(id, EscalationReason::ExplicitRequest, summary)
            .await?;
        self.publish_escalation(id, &escalation.ticket, escalation.created);
        info!(
            session_id = %id,
            ticket_id = %escalation.ticket.id,
            created = escalation.created,
            "Escalation requested"
        );
        Ok(escalation.ticket)
    }

    /// Full transcript with escalation state.
    pub async fn transcript(&self, id: &SessionId) -> Result<Session> {
        self.store.get(id).await.map_err(Error::from_lookup)
    }

    /// Every session, oldest first.
    pub async fn sessions(&self) -> Result<Vec<SessionOverview>> {
        Ok(self.store.list_sessions().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use supportline_core::faq::FaqEntry;
    use supportline_core::session::TicketStatus;
    use supportline_store::InMemorySessionStore;

    /// Answers with fixed text and counts calls.
    struct StubProvider {
        text: String,
        confidence: Option<f32>,
        call_count: Mutex<usize>,
    }

    impl StubProvider {
        fn new(text: &str) -> Self {
            Self {
                text: text.into(),
                confidence: None,
                call_count: Mutex::new(0),
            }
        }

        fn with_confidence(mut self, confidence: f32) -> Self {
            self.confidence = Some(confidence);
            self
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            let mut response = ProviderResponse::text("stub-model", self.text.clone());
            response.confidence = self.confidence;
            Ok(response)
        }
    }

    /// Never answers.
    struct HangingProvider;

    #[async_trait]
    impl Provider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::Timeout("unreachable".into()))
        }
    }

    /// Always fails.
    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            Err(ProviderError::ApiError {
                status_code: 503,
                message: "unavailable".into(),
            })
        }
    }

    fn faqs() -> Arc<dyn FaqMatcher> {
        Arc::new(FuzzyFaqMatcher::new(
            vec![
                FaqEntry::new("store hours", "We are open 9-5 Mon-Fri"),
                FaqEntry::new("What is your refund policy?", "Refunds within 30 days."),
            ],
            DEFAULT_THRESHOLD,
        ))
    }

    fn orchestrator(provider: Arc<dyn Provider>) -> Orchestrator {
        Orchestrator::new(
            Arc::new(InMemorySessionStore::new()),
            provider,
            ChatSettings::default(),
        )
        .with_matcher(faqs())
    }

    #[tokio::test]
    async fn faq_hit_never_calls_provider() {
        let provider = Arc::new(StubProvider::new("unused"));
        let orch = orchestrator(provider.clone());

        let reply = orch.chat("What are your hours?", None).await.unwrap();
        assert_eq!(reply.reply, "We are open 9-5 Mon-Fri");
        assert_eq!(reply.source, Resolution::Faq);
        assert!(!reply.decision.escalate);
        assert!(reply.ticket.is_none());
        assert_eq!(provider.calls(), 0);

        let session = orch.transcript(&reply.session_id).await.unwrap();
        assert!(!session.is_escalated());
    }

    #[tokio::test]
    async fn explicit_request_opens_ticket() {
        let provider = Arc::new(StubProvider::new("unused"));
        let orch = orchestrator(provider.clone());

        let reply = orch.chat("I want to speak to a human", None).await.unwrap();
        assert_eq!(reply.reply, ESCALATION_REPLY);
        assert_eq!(reply.decision.reason, EscalationReason::ExplicitRequest);
        let ticket = reply.ticket.unwrap();
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(provider.calls(), 0);

        let session = orch.transcript(&reply.session_id).await.unwrap();
        assert!(session.is_escalated());
        assert_eq!(session.ticket_id, Some(ticket.id));
    }

    #[tokio::test]
    async fn provider_timeout_degrades_without_escalating() {
        let orch = orchestrator(Arc::new(HangingProvider))
            .with_provider_timeout(Duration::from_millis(50));

        let reply = orch.chat("Why is my invoice wrong?", None).await.unwrap();
        assert_eq!(reply.reply, DEGRADED_REPLY);
        assert_eq!(reply.source, Resolution::Degraded);
        assert_eq!(reply.decision.reason, EscalationReason::ProviderError);
        assert!(!reply.decision.escalate);

        let session = orch.transcript(&reply.session_id).await.unwrap();
        assert!(!session.is_escalated());
        assert_eq!(session.turns.len(), 2);
    }

    #[tokio::test]
    async fn provider_error_degrades() {
        let orch = orchestrator(Arc::new(FailingProvider));
        let reply = orch.chat("Why is my invoice wrong?", None).await.unwrap();
        assert_eq!(reply.source, Resolution::Degraded);
    }

    #[tokio::test]
    async fn generated_reply_is_postprocessed_and_escaped() {
        let provider = Arc::new(StubProvider::new(
            "Great! Invoices are emailed monthly <b>on the 1st</b>.",
        ));
        let orch = orchestrator(provider.clone());

        let reply = orch.chat("When do invoices arrive?", None).await.unwrap();
        assert_eq!(reply.source, Resolution::Generated);
        assert!(reply.reply.starts_with("Invoices are emailed monthly &lt;b&gt;"));
        assert!(reply.reply.ends_with("should I escalate this?"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn low_confidence_reply_escalates() {
        let provider =
            Arc::new(StubProvider::new("Invoices are emailed monthly.").with_confidence(0.1));
        let orch = orchestrator(provider);

        let reply = orch.chat("When do invoices arrive?", None).await.unwrap();
        assert_eq!(reply.reply, ESCALATION_REPLY);
        assert_eq!(reply.decision.reason, EscalationReason::LowConfidence);
        assert_eq!(reply.source, Resolution::Escalated);
        assert!(reply.ticket.is_some());
    }

    #[tokio::test]
    async fn invalid_input_mutates_nothing() {
        let store = Arc::new(InMemorySessionStore::new());
        let orch = Orchestrator::new(
            store.clone(),
            Arc::new(StubProvider::new("x")),
            ChatSettings::default(),
        );

        assert!(matches!(orch.chat("   ", None).await, Err(Error::InvalidInput(_))));
        let long = "a".repeat(2001);
        assert!(matches!(orch.chat(&long, None).await, Err(Error::InvalidInput(_))));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_session_id_gets_fresh_id() {
        let orch = orchestrator(Arc::new(StubProvider::new("Sure thing, here you go.")));
        let bogus = SessionId::from("not-a-real-session");

        let first = orch.chat("store hours", Some(&bogus)).await.unwrap();
        assert_ne!(first.session_id, bogus);

        let second = orch.chat("store hours", None).await.unwrap();
        assert_ne!(second.session_id, first.session_id);

        let third = orch.chat("store hours", Some(&first.session_id)).await.unwrap();
        assert_eq!(third.session_id, first.session_id);
    }

    #[tokio::test]
    async fn each_message_adds_two_turns() {
        let orch = orchestrator(Arc::new(StubProvider::new("We ship worldwide in 5 days.")));

        let mut id = None;
        for (i, message) in ["store hours", "Do you ship abroad?", "refund policy"]
            .iter()
            .enumerate()
        {
            let reply = orch.chat(message, id.as_ref()).await.unwrap();
            id = Some(reply.session_id.clone());
            let session = orch.transcript(&reply.session_id).await.unwrap();
            assert_eq!(session.turns.len(), (i + 1) * 2);
        }
    }

    #[tokio::test]
    async fn unresolved_streak_escalates() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let orch = Orchestrator::new(
            store,
            Arc::new(FailingProvider),
            ChatSettings::default(),
        )
        .with_policy(Arc::new(HeuristicEscalationPolicy::new(&[], 0.5, 2)));

        let first = orch.chat("Why?", None).await.unwrap();
        let id = first.session_id.clone();
        orch.chat("Why though?", Some(&id)).await.unwrap();
        let third = orch.chat("Still why?", Some(&id)).await.unwrap();
        assert_eq!(third.decision.reason, EscalationReason::NoFaqMatch);
        assert!(third.ticket.is_some());
    }

    #[tokio::test]
    async fn escalate_twice_returns_same_ticket() {
        let orch = orchestrator(Arc::new(StubProvider::new("unused")));
        let reply = orch.chat("store hours", None).await.unwrap();

        let first = orch.escalate(&reply.session_id, None).await.unwrap();
        let second = orch
            .escalate(&reply.session_id, Some("ignored".into()))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.status, TicketStatus::Open);
        assert_eq!(first.reason, EscalationReason::ExplicitRequest);
        assert!(first.summary.is_some());
    }

    #[tokio::test]
    async fn escalate_uses_given_summary() {
        let orch = orchestrator(Arc::new(StubProvider::new("unused")));
        let reply = orch.chat("store hours", None).await.unwrap();

        let ticket = orch
            .escalate(&reply.session_id, Some("  Customer needs <help>  ".into()))
            .await
            .unwrap();
        assert_eq!(ticket.summary.as_deref(), Some("Customer needs &lt;help&gt;"));
    }

    #[tokio::test]
    async fn escalate_and_summarize_unknown_session() {
        let orch = orchestrator(Arc::new(StubProvider::new("unused")));
        let missing = SessionId::from("missing");
        assert!(matches!(
            orch.escalate(&missing, None).await,
            Err(Error::UnknownSession(_))
        ));
        assert!(matches!(
            orch.summarize(&missing).await,
            Err(Error::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn summarize_empty_session_fails() {
        let store = Arc::new(InMemorySessionStore::new());
        let session = store.create().await.unwrap();
        let orch = Orchestrator::new(
            store,
            Arc::new(StubProvider::new("unused")),
            ChatSettings::default(),
        );
        assert!(matches!(
            orch.summarize(&session.id).await,
            Err(Error::EmptySession(_))
        ));
    }

    #[tokio::test]
    async fn summarize_stores_result() {
        let provider = Arc::new(StubProvider::new(
            "SUMMARY:\n- Asked about hours\nNEXT_ACTIONS:\n- None",
        ));
        let orch = orchestrator(provider);
        let reply = orch.chat("store hours", None).await.unwrap();

        let summary = orch.summarize(&reply.session_id).await.unwrap();
        assert_eq!(summary.summary, "Asked about hours");
        let session = orch.transcript(&reply.session_id).await.unwrap();
        assert_eq!(session.summary, Some(summary));
    }

    #[tokio::test]
    async fn summary_drops_follow_up_once_ticket_resolved() {
        let orch = orchestrator(Arc::new(FailingProvider));
        let reply = orch.chat("I want to speak to a human", None).await.unwrap();
        let ticket = reply.ticket.unwrap();

        let open = orch.summarize(&reply.session_id).await.unwrap();
        let follow_up = format!("Follow up on ticket #{} with a human agent", ticket.id);
        assert!(open.next_actions.contains(&follow_up));

        orch.store()
            .update_ticket_status(ticket.id, TicketStatus::Resolved)
            .await
            .unwrap();
        let resolved = orch.summarize(&reply.session_id).await.unwrap();
        assert!(!resolved.next_actions.contains(&follow_up));
    }

    #[tokio::test]
    async fn escalation_events_are_published() {
        let orch = orchestrator(Arc::new(StubProvider::new("unused")));
        let mut events = orch.subscribe();

        orch.chat("Get me a real person", None).await.unwrap();

        let mut saw_escalation = false;
        while let Ok(event) = events.try_recv() {
            if let DomainEvent::SessionEscalated { created, reason, .. } = event.as_ref() {
                assert!(*created);
                assert_eq!(*reason, EscalationReason::ExplicitRequest);
                saw_escalation = true;
            }
        }
        assert!(saw_escalation);
    }

    #[tokio::test]
    async fn concurrent_messages_in_one_session_do_not_interleave() {
        let orch = Arc::new(orchestrator(Arc::new(StubProvider::new(
            "We ship worldwide in 5 days.",
        ))));
        let first = orch.chat("store hours", None).await.unwrap();
        let id = first.session_id.clone();

        let mut handles = Vec::new();
        for i in 0..8 {
            let orch = orch.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                orch.chat(&format!("question {i} about shipping"), Some(&id))
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let session = orch.transcript(&id).await.unwrap();
        assert_eq!(session.turns.len(), 18);
        for pair in session.turns.chunks(2) {
            assert_eq!(pair[0].speaker, Speaker::User);
            assert_eq!(pair[1].speaker, Speaker::Assistant);
        }
    }
}
