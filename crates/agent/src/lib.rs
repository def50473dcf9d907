//! The conversation pipeline: the heart of Zema.
//!
//! One turn flows through four parts:
//!
//! 1. **History**: the [`ConversationStore`] keeps the last N exchanges
//! 2. **Context**: the [`ContextAssembler`] turns a window of history, the
//!    new input and any vision/tool context into chat messages
//! 3. **Inference**: the [`InferenceClient`] checks the service is up, sends
//!    the request (complete or streamed) and records the finished turn
//! 4. **Parsing**: the [`ResponseParser`] pulls tool-call directives out of
//!    the answer for the tool layer to execute

pub mod client;
pub mod context;
pub mod history;
pub mod parser;
pub mod prompts;

#[cfg(test)]
mod test_helpers;

pub use client::{ClientState, InferenceClient, TextStream};
pub use context::{ContextAssembler, ContextBundle};
pub use history::{ConversationStore, DEFAULT_RETENTION_CAP};
pub use parser::{ResponseParser, parse_parameters};
pub use prompts::PromptPreset;
