//! Completion provider implementations for Supportline.
//!
//! All providers implement the `supportline_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod fallback;
pub mod gemini;
pub mod openai_compat;
pub mod router;

pub use fallback::FallbackProvider;
pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
