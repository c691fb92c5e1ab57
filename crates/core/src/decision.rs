//! Escalation decisions and their reason codes.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Why an escalation check came out the way it did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// Generated answer fell below the confidence threshold.
    LowConfidence,
    /// Too many consecutive turns without an FAQ answer.
    NoFaqMatch,
    /// The customer asked for a human.
    ExplicitRequest,
    /// The provider failed. Recorded, never escalates on its own.
    ProviderError,
    #[default]
    None,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::LowConfidence => "low_confidence",
            EscalationReason::NoFaqMatch => "no_faq_match",
            EscalationReason::ExplicitRequest => "explicit_request",
            EscalationReason::ProviderError => "provider_error",
            EscalationReason::None => "none",
        }
    }
}

impl FromStr for EscalationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low_confidence" => Ok(EscalationReason::LowConfidence),
            "no_faq_match" => Ok(EscalationReason::NoFaqMatch),
            "explicit_request" => Ok(EscalationReason::ExplicitRequest),
            "provider_error" => Ok(EscalationReason::ProviderError),
            "none" => Ok(EscalationReason::None),
            other => Err(format!("unknown escalation reason '{other}'")),
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an escalation checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationDecision {
    pub escalate: bool,
    pub reason: EscalationReason,
}

impl EscalationDecision {
    /// Hand the session to a human for `reason`.
    pub fn escalate(reason: EscalationReason) -> Self {
        Self {
            escalate: true,
            reason,
        }
    }

    /// Keep answering automatically.
    pub fn proceed() -> Self {
        Self {
            escalate: false,
            reason: EscalationReason::None,
        }
    }

    /// Keep answering, but record why the turn was not a clean answer.
    pub fn noted(reason: EscalationReason) -> Self {
        Self {
            escalate: false,
            reason,
        }
    }
}

impl Default for EscalationDecision {
    fn default() -> Self {
        Self::proceed()
    }
}
