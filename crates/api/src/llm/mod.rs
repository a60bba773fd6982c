//! Chat-completions client for the generation engine.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint. Only the
//! non-streaming API is used: each generation is one request and one reply
//! with token usage.

mod client;
mod error;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use types::{ChatMessage, Completion, Role, Usage};
