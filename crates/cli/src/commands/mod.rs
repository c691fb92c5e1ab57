//! One module per CLI subcommand. Each exposes `pub async fn run`.

pub mod chat;
pub mod faq;
pub mod onboard;
pub mod providers;
pub mod runtime;
pub mod serve;
pub mod sessions;
pub mod ticket;
