//! # Zema Core
//!
//! Domain types, traits, and error definitions for the Zema offline assistant.
//! This crate does no I/O. It defines the conversation model that the
//! provider, agent, and CLI crates implement against.
//!
//! ## Design Philosophy
//!
//! The inference service is reached through the [`Provider`] trait. The HTTP
//! implementation lives in `zema-providers`; tests swap in scripted fakes.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result};
pub use message::{ConversationTurn, Message, Role, TurnContext};
pub use provider::{ChunkStream, Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use tool::{Intent, ToolCallDirective};
