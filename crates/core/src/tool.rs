//! Tool-call directives: structured commands embedded in assistant text.
//!
//! The model asks for tools by writing tagged spans into its answer. The
//! response parser turns those spans into [`ToolCallDirective`] values; the
//! tool execution layer (outside this workspace) acts on them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A request to run one action on one tool.
///
/// Produced transiently from a completed response; never persisted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDirective {
    /// Name of the tool to invoke (e.g., "task_manager")
    pub tool: String,

    /// Action requested on that tool (e.g., "create_reminder")
    pub action: String,

    /// Parameters parsed from the directive body
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// The coarse intent of an assistant response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Intent label (`general`, `tool_call`)
    #[serde(rename = "type")]
    pub kind: String,

    /// Confidence in `[0.0, 1.0]`
    pub confidence: f32,
}

impl Intent {
    pub const GENERAL: &'static str = "general";
    pub const TOOL_CALL: &'static str = "tool_call";

    /// The fallback intent: a plain conversational answer.
    pub fn general() -> Self {
        Self {
            kind: Self::GENERAL.to_string(),
            confidence: 1.0,
        }
    }
}

impl Default for Intent {
    fn default() -> Self {
        Self::general()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_serializes_kind_as_type() {
        let json = serde_json::to_value(Intent::general()).unwrap();
        assert_eq!(json["type"], "general");
        assert_eq!(json["confidence"], 1.0);
    }

    #[test]
    fn directive_parameters_default_to_empty() {
        let directive: ToolCallDirective =
            serde_json::from_str(r#"{"tool":"notes","action":"list"}"#).unwrap();
        assert_eq!(directive.tool, "notes");
        assert!(directive.parameters.is_empty());
    }
}
