//! Message and conversation-turn domain types.
//!
//! These are the value objects that flow through the whole pipeline:
//! user text → assembled messages → inference service → recorded turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The role of a message sender in a chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (prompt, auxiliary context)
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
}

/// A single role-tagged entry in a chat request.
///
/// Messages carry no ids or timestamps so that assembling the same inputs
/// twice yields equal values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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

/// Auxiliary input supplied alongside a user message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnContext {
    /// Description of the camera scene, if the vision pipeline produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_description: Option<String>,

    /// Results of tools executed for this turn, keyed by tool name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<BTreeMap<String, serde_json::Value>>,
}

impl TurnContext {
    pub fn with_vision(description: impl Into<String>) -> Self {
        Self {
            vision_description: Some(description.into()),
            tool_results: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vision_description.is_none() && self.tool_results.is_none()
    }

    /// Flatten into the opaque key/value form stored on a [`ConversationTurn`].
    pub fn to_map(&self) -> BTreeMap<String, serde_json::Value> {
        let mut map = BTreeMap::new();
        if let Some(vision) = &self.vision_description {
            map.insert(
                "vision_description".to_string(),
                serde_json::Value::String(vision.clone()),
            );
        }
        if let Some(results) = &self.tool_results {
            let object: serde_json::Map<String, serde_json::Value> = results
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            map.insert("tool_results".to_string(), serde_json::Value::Object(object));
        }
        map
    }
}

/// One completed user-input / assistant-response exchange.
///
/// Created once when an exchange completes and never edited afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Unique turn ID
    pub id: String,

    /// What the user said
    pub user_input: String,

    /// The full text the assistant returned
    pub assistant_response: String,

    /// When the exchange was recorded
    pub timestamp: DateTime<Utc>,

    /// Auxiliary data attached to the turn (vision, tool output)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl ConversationTurn {
    /// Record a turn stamped with the current time.
    pub fn new(
        user_input: impl Into<String>,
        assistant_response: impl Into<String>,
        context: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_input: user_input.into(),
            assistant_response: assistant_response.into(),
            timestamp: Utc::now(),
            context,
        }
    }

    /// The turn as the alternating user/assistant pair sent to the model.
    pub fn to_messages(&self) -> [Message; 2] {
        [
            Message::user(&self.user_input),
            Message::assistant(&self.assistant_response),
        ]
    }
}
