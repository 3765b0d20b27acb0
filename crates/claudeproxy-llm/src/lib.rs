//! Translation and routing engine for the proxy
//!
//! Bridges the client's Anthropic-style messages protocol and the
//! OpenAI-style chat-completion backends: wire types for both schemas,
//! bidirectional message translation (final and streamed), content-based
//! model selection, the backend HTTP clients, and one adapter per backend.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod backend;
pub mod error;
pub mod protocol;
pub mod select;
pub mod transform;

pub use backend::{Adapter, ClientEventStream, groq::GroqAdapter, xai::XaiAdapter};
pub use error::ProxyError;
pub use select::{GROQ_PROFILE, ModelSelector, XAI_PROFILE};
pub use transform::StreamRewriter;
