//! Escalation heuristic: decides when a human should take over.
//!
//! Two checkpoints:
//! - `should_escalate` runs before any answer is attempted (explicit request,
//!   streak of unanswered turns).
//! - `assess_reply` runs on a generated reply (confidence).

use crate::faq::normalize;
use supportline_config::EscalationConfig;
use supportline_core::decision::{EscalationDecision, EscalationReason};
use supportline_core::session::{Speaker, Turn};

/// Confidence assigned to a reply that hedges or is too short.
const HEDGED_CONFIDENCE: f32 = 0.2;
/// Confidence assigned to a reply with no warning signs.
const PLAIN_CONFIDENCE: f32 = 0.9;
const MIN_REPLY_CHARS: usize = 10;

const HEDGE_PHRASES: &[&str] = &[
    "i don't know",
    "i'm not sure",
    "i am not sure",
    "i cannot help with",
    "can't help",
    "i might be wrong",
    "please contact support",
    "escalate",
];

/// Decides whether a session should be handed to a human.
///
/// Both checkpoints must be pure.
pub trait EscalationPolicy: Send + Sync {
    /// Pre-generation checkpoint over the incoming message and prior turns.
    fn should_escalate(&self, message: &str, recent_turns: &[Turn]) -> EscalationDecision;

    /// Post-generation checkpoint over a generated reply.
    fn assess_reply(&self, reply: &str, confidence: Option<f32>) -> EscalationDecision;
}

/// Keyword and streak based policy.
#[derive(Debug, Clone)]
pub struct HeuristicEscalationPolicy {
    /// Normalized single-word markers, matched against whole tokens.
    words: Vec<String>,
    /// Normalized multi-word markers, matched as substrings.
    phrases: Vec<String>,
    confidence_threshold: f32,
    provider_confidence_threshold: f32,
    max_unresolved_turns: usize,
}

impl HeuristicEscalationPolicy {
    pub fn new(markers: &[String], confidence_threshold: f32, max_unresolved_turns: usize) -> Self {
        let mut words = Vec::new();
        let mut phrases = Vec::new();
        for marker in markers {
            let normalized = normalize(marker);
            if normalized.is_empty() {
                continue;
            }
            if normalized.contains(' ') {
                phrases.push(normalized);
            } else {
                words.push(normalized);
            }
        }

        Self {
            words,
            phrases,
            confidence_threshold,
            provider_confidence_threshold: confidence_threshold,
            max_unresolved_turns,
        }
    }

    /// Use a separate threshold when the provider reports its own confidence.
    pub fn with_provider_confidence_threshold(mut self, threshold: f32) -> Self {
        self.provider_confidence_threshold = threshold;
        self
    }

    pub fn from_config(config: &EscalationConfig) -> Self {
        Self::new(
            &config.markers,
            config.confidence_threshold,
            config.max_unresolved_turns,
        )
        .with_provider_confidence_threshold(config.provider_confidence_threshold)
    }

    fn asks_for_human(&self, message: &str) -> bool {
        let normalized = normalize(message);
        if self
            .phrases
            .iter()
            .any(|p| normalized.contains(p.as_str()))
        {
            return true;
        }
        normalized
            .split(' ')
            .any(|token| self.words.iter().any(|w| w == token))
    }

    /// Consecutive trailing assistant turns that did not resolve the question.
    fn unresolved_streak(recent_turns: &[Turn]) -> usize {
        recent_turns
            .iter()
            .rev()
            .filter(|t| t.speaker == Speaker::Assistant)
            .take_while(|t| t.resolution.is_some_and(|r| r.is_unresolved()))
            .count()
    }
}

impl Default for HeuristicEscalationPolicy {
    fn default() -> Self {
        Self::from_config(&EscalationConfig::default())
    }
}

impl EscalationPolicy for HeuristicEscalationPolicy {
    fn should_escalate(&self, message: &str, recent_turns: &[Turn]) -> EscalationDecision {
        if self.asks_for_human(message) {
            return EscalationDecision::escalate(EscalationReason::ExplicitRequest);
        }

        if self.max_unresolved_turns > 0
            && Self::unresolved_streak(recent_turns) >= self.max_unresolved_turns
        {
            return EscalationDecision::escalate(EscalationReason::NoFaqMatch);
        }

        EscalationDecision::proceed()
    }

    fn assess_reply(&self, reply: &str, confidence: Option<f32>) -> EscalationDecision {
        let (confidence, threshold) = match confidence {
            Some(reported) => (reported, self.provider_confidence_threshold),
            None => (estimate_confidence(reply), self.confidence_threshold),
        };
        if confidence < threshold {
            EscalationDecision::escalate(EscalationReason::LowConfidence)
        } else {
            EscalationDecision::proceed()
        }
    }
}

/// Text-only confidence estimate for providers that report none.
pub fn estimate_confidence(reply: &str) -> f32 {
    let trimmed = reply.trim();
    let lowered = trimmed.to_lowercase().replace('\u{2019}', "'");
    if trimmed.chars().count() < MIN_REPLY_CHARS
        || HEDGE_PHRASES.iter().any(|p| lowered.contains(p))
    {
        HEDGED_CONFIDENCE
    } else {
        PLAIN_CONFIDENCE
    }
}
