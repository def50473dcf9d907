//! Inference service clients for Zema.
//!
//! All providers implement the `zema_core::Provider` trait. Only the local
//! Ollama server is supported; nothing here talks to the internet.

pub mod ndjson;
pub mod ollama;

pub use ollama::OllamaProvider;
