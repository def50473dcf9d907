//! Conversation store: bounded, append-only memory of completed turns.

use std::collections::BTreeMap;
use tracing::debug;
use zema_core::message::ConversationTurn;

/// Default number of turns kept before the oldest are dropped.
pub const DEFAULT_RETENTION_CAP: usize = 100;

/// An ordered log of turns, oldest first, never longer than its cap.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    turns: Vec<ConversationTurn>,
    cap: usize,
}

impl ConversationStore {
    /// A store holding at most `cap` turns (at least one).
    pub fn new(cap: usize) -> Self {
        Self {
            turns: Vec::new(),
            cap: cap.max(1),
        }
    }

    /// Record a completed exchange stamped with the current time.
    pub fn append(
        &mut self,
        user_input: impl Into<String>,
        assistant_response: impl Into<String>,
        context: BTreeMap<String, serde_json::Value>,
    ) -> &ConversationTurn {
        let turn = ConversationTurn::new(user_input, assistant_response, context);
        debug!(user_input_len = turn.user_input.len(), "Recording conversation turn");
        self.turns.push(turn);
        self.trim_to_max();
        &self.turns[self.turns.len() - 1]
    }

    /// Drop the oldest turns until the log fits the cap.
    pub fn trim_to_max(&mut self) {
        if self.turns.len() > self.cap {
            let excess = self.turns.len() - self.cap;
            self.turns.drain(..excess);
        }
    }

    /// The last `limit` turns in chronological order.
    pub fn recent(&self, limit: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }

    /// Forget everything. Irreversible.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_CAP)
    }
}
