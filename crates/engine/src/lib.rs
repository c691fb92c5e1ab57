//! Support session orchestration for Supportline.
//!
//! Every customer message passes an escalation check, then the FAQ table,
//! and only then the generative provider. Replies from the provider are
//! cleaned up and escaped before they are recorded.

pub mod context;
pub mod escalation;
pub mod faq;
pub mod locks;
pub mod orchestrator;
pub mod postprocess;
pub mod prompt;
pub mod sanitize;
pub mod summarizer;

pub use context::ContextWindow;
pub use escalation::{EscalationPolicy, HeuristicEscalationPolicy};
pub use faq::{FaqMatch, FaqMatcher, FuzzyFaqMatcher, load_faqs};
pub use orchestrator::{ChatReply, ChatSettings, Orchestrator};
pub use summarizer::{SummaryOutcome, Summarizer};
