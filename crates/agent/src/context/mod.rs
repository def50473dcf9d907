//! Context assembly: from conversation window and auxiliary input to the
//! ordered message list sent to the model.
//!
//! # Message order
//!
//! | Position | Role | Source |
//! |----------|------|--------|
//! | 1 | system | Configured system prompt (omitted when empty) |
//! | 2 | system | `Vision context: …` (only with a vision description) |
//! | 3 | system | `Tool results: …` (only with tool results) |
//! | 4.. | user / assistant | Window of prior turns, oldest first |
//! | last | user | Current input |

pub mod assembler;

pub use assembler::{ContextAssembler, ContextBundle};
