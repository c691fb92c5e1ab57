//! Session, Turn, Ticket and Summary domain types.
//!
//! A session is the unit of conversation: an ordered, append-only list of
//! turns plus its escalation state. Sessions and tickets are owned by a
//! [`SessionStore`](crate::store::SessionStore); everything here is a plain
//! value that the store hands out by copy.

use crate::decision::EscalationReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Opaque, server-generated session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Assistant => "assistant",
        }
    }
}

impl FromStr for Speaker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Speaker::User),
            "assistant" => Ok(Speaker::Assistant),
            other => Err(format!("unknown speaker '{other}'")),
        }
    }
}

/// How an assistant turn was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Canonical FAQ answer
    Faq,
    /// Generative fallback answer
    Generated,
    /// Fixed apology after a provider failure
    Degraded,
    /// Escalation acknowledgement
    Escalated,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Faq => "faq",
            Resolution::Generated => "generated",
            Resolution::Degraded => "degraded",
            Resolution::Escalated => "escalated",
        }
    }

    /// Whether the customer's question went without an authoritative answer.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Resolution::Generated | Resolution::Degraded)
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "faq" => Ok(Resolution::Faq),
            "generated" => Ok(Resolution::Generated),
            "degraded" => Ok(Resolution::Degraded),
            "escalated" => Ok(Resolution::Escalated),
            other => Err(format!("unknown resolution '{other}'")),
        }
    }
}

/// One immutable entry in a session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Position in the session, starting at 1. Strictly increasing.
    pub seq: u64,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Only set on assistant turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

impl Turn {
    pub fn is_user(&self) -> bool {
        self.speaker == Speaker::User
    }
}

/// Whether a session has been handed to a human.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationStatus {
    #[default]
    None,
    Escalated,
}

impl EscalationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationStatus::None => "none",
            EscalationStatus::Escalated => "escalated",
        }
    }
}

impl FromStr for EscalationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(EscalationStatus::None),
            "escalated" => Ok(EscalationStatus::Escalated),
            other => Err(format!("unknown escalation status '{other}'")),
        }
    }
}

/// Ticket identifier, assigned monotonically by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub u64);

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Pending,
    Resolved,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Pending => "pending",
            TicketStatus::Resolved => "resolved",
        }
    }

    /// Open and pending tickets both block a new ticket for the same session.
    pub fn is_unresolved(&self) -> bool {
        !matches!(self, TicketStatus::Resolved)
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TicketStatus::Open),
            "pending" => Ok(TicketStatus::Pending),
            "resolved" => Ok(TicketStatus::Resolved),
            other => Err(format!("unknown ticket status '{other}'")),
        }
    }
}

/// A hand-off of a session to a human agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub session_id: SessionId,
    pub status: TicketStatus,
    pub reason: EscalationReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Condensed view of a session with suggested follow-ups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    pub next_actions: Vec<String>,
}

/// A single support conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub turns: Vec<Turn>,
    pub escalation: EscalationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<TicketId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session with a fresh id.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            turns: Vec::new(),
            escalation: EscalationStatus::None,
            ticket_id: None,
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_escalated(&self) -> bool {
        self.escalation == EscalationStatus::Escalated
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The sequence number the next appended turn will receive.
    pub fn next_seq(&self) -> u64 {
        self.turns.last().map(|t| t.seq + 1).unwrap_or(1)
    }

    /// The last `n` turns, oldest first.
    pub fn recent_turns(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn user_turn_count(&self) -> usize {
        self.turns.iter().filter(|t| t.is_user()).count()
    }

    pub fn overview(&self) -> SessionOverview {
        SessionOverview {
            id: self.id.clone(),
            turn_count: self.turns.len(),
            escalation: self.escalation,
            ticket_id: self.ticket_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Lightweight listing row for admin export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOverview {
    pub id: SessionId,
    pub turn_count: usize,
    pub escalation: EscalationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<TicketId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
