//! # SupportLine Core
//!
//! Domain types, traits, and error definitions for the SupportLine support
//! session orchestrator. This crate has **no transport or storage
//! dependencies**: it defines the domain model that every other crate
//! implements against.
//!
//! ## Layout
//!
//! - [`session`]: sessions, turns, tickets and summaries
//! - [`decision`]: escalation decisions and reason codes
//! - [`faq`]: static FAQ entries
//! - [`provider`]: the generative fallback boundary
//! - [`store`]: the session store boundary
//! - [`event`]: domain events broadcast by the orchestrator

pub mod decision;
pub mod error;
pub mod event;
pub mod faq;
pub mod message;
pub mod provider;
pub mod session;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use decision::{EscalationDecision, EscalationReason};
pub use error::{Error, ProviderError, Result, StoreError};
pub use event::{DomainEvent, EventBus};
pub use faq::FaqEntry;
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use session::{
    EscalationStatus, Resolution, Session, SessionId, SessionOverview, Speaker, Summary, Ticket,
    TicketId, TicketStatus, Turn,
};
pub use store::SessionStore;
