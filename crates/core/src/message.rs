//! Prompt messages sent across the provider boundary.
//!
//! These are distinct from transcript [`Turn`](crate::session::Turn)s: a
//! prompt may carry system instructions and is rebuilt on every call, while
//! turns are the durable conversation record.

use serde::{Deserialize, Serialize};

/// The role of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The customer
    User,
    /// The support assistant
    Assistant,
    /// System instructions (persona, formatting rules)
    System,
}

/// A single message in a provider prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}
