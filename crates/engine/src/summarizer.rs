//! Session summaries with suggested next actions.
//!
//! The provider is asked for a `SUMMARY:` / `NEXT_ACTIONS:` block. Heuristic
//! actions derived from session state are always merged in, and a summary
//! built from counts alone stands in when the provider is unavailable.

use crate::prompt::summary_messages;
use crate::sanitize::escape_markup;
use std::sync::Arc;
use std::time::Duration;
use supportline_core::error::ProviderError;
use supportline_core::provider::{Provider, ProviderRequest};
use supportline_core::session::{Resolution, Session, Speaker, Summary, Ticket, Turn};
use tracing::{debug, warn};

const MAX_GENERATED_ACTIONS: usize = 3;
const SUMMARY_TEMPERATURE: f32 = 0.1;
const SUMMARY_MAX_TOKENS: u32 = 220;

pub const ACTION_NO_FOLLOW_UP: &str = "No follow-up needed; confirm the issue is resolved";
pub const ACTION_RETRY: &str =
    "Retry the customer's last question once the assistant service is reachable";
pub const ACTION_CONFIRM_ANSWER: &str = "Confirm the customer's last question was fully answered";

/// Result of a summary run.
#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    pub summary: Summary,
    /// `true` when the provider could not be used and the heuristic summary
    /// was returned instead.
    pub degraded: bool,
}

/// Produces summaries through a provider, falling back to heuristics.
pub struct Summarizer {
    provider: Arc<dyn Provider>,
    model: String,
    assistant_name: String,
    window_turns: usize,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            assistant_name: "Clara".into(),
            window_turns: 200,
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_assistant_name(mut self, name: impl Into<String>) -> Self {
        self.assistant_name = name.into();
        self
    }

    /// Only the last `turns` turns are sent to the provider.
    pub fn with_window(mut self, turns: usize) -> Self {
        self.window_turns = turns.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Summarize a session. Never fails: provider problems yield the
    /// heuristic summary.
    ///
    /// `ticket` is the session's current escalation ticket, if any.
    pub async fn summarize(&self, session: &Session, ticket: Option<&Ticket>) -> SummaryOutcome {
        let heuristic = heuristic_actions(session, ticket);

        match self.generate(session).await {
            Ok((summary, actions)) if !summary.is_empty() => {
                let generated: Vec<String> = actions.iter().map(|a| escape_markup(a)).collect();
                SummaryOutcome {
                    summary: Summary {
                        summary: escape_markup(&summary),
                        next_actions: merge_actions(generated, heuristic),
                    },
                    degraded: false,
                }
            }
            Ok(_) => {
                debug!(session_id = %session.id, "Provider summary was empty, using heuristic summary");
                self.fallback(session, heuristic)
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Summary generation failed, using heuristic summary");
                self.fallback(session, heuristic)
            }
        }
    }

    fn fallback(&self, session: &Session, heuristic: Vec<String>) -> SummaryOutcome {
        SummaryOutcome {
            summary: Summary {
                summary: heuristic_summary(session),
                next_actions: heuristic,
            },
            degraded: true,
        }
    }

    async fn generate(&self, session: &Session) -> Result<(String, Vec<String>), ProviderError> {
        let turns = session.recent_turns(self.window_turns);
        let request = ProviderRequest::new(
            self.model.clone(),
            summary_messages(&self.assistant_name, turns),
        )
        .with_temperature(SUMMARY_TEMPERATURE)
        .with_max_tokens(SUMMARY_MAX_TOKENS);

        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!(
                    "summary not ready after {}s",
                    self.timeout.as_secs()
                ))
            })??;

        Ok(parse_summary(&response.message.content))
    }
}

/// Parse `SUMMARY:` / `NEXT_ACTIONS:` output into a summary line and at most
/// three actions. Headers are matched case-insensitively.
pub fn parse_summary(raw: &str) -> (String, Vec<String>) {
    let text = raw.trim();
    let lower = text.to_ascii_lowercase();

    let (summary_part, actions_part): (String, String) = match lower.find("summary:") {
        Some(idx) => {
            let after = text[idx + "summary:".len()..].trim();
            match after.to_ascii_lowercase().find("next_actions:") {
                Some(split) => (
                    after[..split].trim().to_string(),
                    after[split + "next_actions:".len()..].trim().to_string(),
                ),
                None => first_line_and_rest(after),
            }
        }
        None => first_line_and_rest(text),
    };

    let summary = strip_bullet(&summary_part).to_string();
    let actions = actions_part
        .lines()
        .map(strip_bullet)
        .filter(|l| !l.is_empty())
        .take(MAX_GENERATED_ACTIONS)
        .map(String::from)
        .collect();

    (summary, actions)
}

fn first_line_and_rest(text: &str) -> (String, String) {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or_default().to_string();
    let rest = lines.take(MAX_GENERATED_ACTIONS).collect::<Vec<_>>().join("\n");
    (first, rest)
}

fn strip_bullet(line: &str) -> &str {
    line.trim().trim_start_matches(['-', '*']).trim()
}

/// Follow-ups derived from session state alone. Only a ticket that is
/// still unresolved asks for a human follow-up.
pub fn heuristic_actions(session: &Session, ticket: Option<&Ticket>) -> Vec<String> {
    let mut actions = Vec::new();

    if let Some(ticket) = ticket.filter(|t| t.status.is_unresolved()) {
        actions.push(format!("Follow up on ticket #{} with a human agent", ticket.id));
    }

    let last_assistant = session
        .turns
        .iter()
        .rev()
        .find(|t| t.speaker == Speaker::Assistant);
    if last_assistant.and_then(|t| t.resolution) == Some(Resolution::Degraded) {
        actions.push(ACTION_RETRY.to_string());
    }

    if last_question_unanswered_by_faq(&session.turns) {
        actions.push(ACTION_CONFIRM_ANSWER.to_string());
    }

    if actions.is_empty() {
        actions.push(ACTION_NO_FOLLOW_UP.to_string());
    }
    actions
}

fn last_question_unanswered_by_faq(turns: &[Turn]) -> bool {
    let Some(pos) = turns.iter().rposition(Turn::is_user) else {
        return false;
    };
    if !turns[pos].text.contains('?') {
        return false;
    }
    let answer = turns[pos + 1..]
        .iter()
        .find(|t| t.speaker == Speaker::Assistant)
        .and_then(|t| t.resolution);
    answer != Some(Resolution::Faq)
}

/// Summary composed from counts and state, never from customer text.
pub fn heuristic_summary(session: &Session) -> String {
    let customer = session.user_turn_count();
    let count = |r: Resolution| {
        session
            .turns
            .iter()
            .filter(|t| t.resolution == Some(r))
            .count()
    };
    let faq = count(Resolution::Faq);
    let generated = count(Resolution::Generated);
    let degraded = count(Resolution::Degraded);

    let mut summary = format!(
        "Conversation with {customer} customer {}; {faq} answered from the FAQ, {generated} by the assistant.",
        if customer == 1 { "message" } else { "messages" }
    );
    if degraded > 0 {
        summary.push_str(&format!(
            " {degraded} {} could not be answered because the assistant service was unavailable.",
            if degraded == 1 { "message" } else { "messages" }
        ));
    }
    if let Some(ticket) = session.ticket_id {
        summary.push_str(&format!(" Escalated to ticket #{ticket}."));
    }
    summary
}

/// Generated actions first, then heuristic ones, without case-insensitive
/// duplicates.
pub fn merge_actions(generated: Vec<String>, heuristic: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    generated
        .into_iter()
        .chain(heuristic)
        .filter(|a| seen.insert(a.to_lowercase()))
        .collect()
}
