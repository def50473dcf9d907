//! Context assembly pipeline.
//!
//! [`ContextAssembler::build_context`] gathers a turn window, the current
//! input and optional auxiliary context into a [`ContextBundle`];
//! [`ContextAssembler::assemble`] flattens a bundle into chat messages.
//!
//! # Determinism
//!
//! Assembly is a pure function of its inputs: identical inputs always produce
//! identical outputs. Tool results are rendered from a sorted map, and no
//! random or time-dependent logic is used.

use serde::Serialize;
use std::collections::BTreeMap;
use zema_core::message::{ConversationTurn, Message, TurnContext};

// ── Types ─────────────────────────────────────────────────────────────────

/// Everything the model should see for one request, borrowed from the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBundle<'a> {
    /// Prior turns, already cut to the caller's window, oldest first.
    pub conversation_history: &'a [ConversationTurn],
    /// The text the user just submitted.
    pub current_input: &'a str,
    /// Scene description from the vision pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision_description: Option<&'a str>,
    /// Output of tools run for this turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<&'a BTreeMap<String, serde_json::Value>>,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context assembler. Holds only the system prompt; create one and reuse it.
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    system_prompt: Option<String>,
}

impl ContextAssembler {
    /// Create an assembler that leads every request with `system_prompt`.
    /// An empty prompt means no system entry.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let prompt = system_prompt.into();
        Self {
            system_prompt: (!prompt.trim().is_empty()).then_some(prompt),
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Gather the inputs for one request.
    ///
    /// The window is used as given: choosing its size is the caller's job.
    /// Empty vision descriptions and empty tool maps count as absent.
    pub fn build_context<'a>(
        &self,
        conversation_window: &'a [ConversationTurn],
        current_input: &'a str,
        vision_context: Option<&'a str>,
        tool_context: Option<&'a BTreeMap<String, serde_json::Value>>,
    ) -> ContextBundle<'a> {
        ContextBundle {
            conversation_history: conversation_window,
            current_input,
            vision_description: vision_context.filter(|v| !v.trim().is_empty()),
            tool_results: tool_context.filter(|t| !t.is_empty()),
        }
    }

    /// Flatten a bundle into the ordered message list.
    pub fn assemble(&self, bundle: &ContextBundle<'_>) -> Vec<Message> {
        let mut messages = Vec::with_capacity(bundle.conversation_history.len() * 2 + 4);

        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt));
        }

        if let Some(vision) = bundle.vision_description {
            messages.push(Message::system(format!("Vision context: {vision}")));
        }

        if let Some(results) = bundle.tool_results {
            let rendered = serde_json::to_string(results).unwrap_or_default();
            messages.push(Message::system(format!("Tool results: {rendered}")));
        }

        for turn in bundle.conversation_history {
            messages.extend(turn.to_messages());
        }

        messages.push(Message::user(bundle.current_input));
        messages
    }

    /// `build_context` followed by `assemble`, taking auxiliary input as a
    /// [`TurnContext`].
    pub fn build_messages(
        &self,
        conversation_window: &[ConversationTurn],
        current_input: &str,
        context: Option<&TurnContext>,
    ) -> Vec<Message> {
        let bundle = self.build_context(
            conversation_window,
            current_input,
            context.and_then(|c| c.vision_description.as_deref()),
            context.and_then(|c| c.tool_results.as_ref()),
        );
        self.assemble(&bundle)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use zema_core::message::Role;

    fn turns(n: usize) -> Vec<ConversationTurn> {
        (0..n)
            .map(|i| ConversationTurn::new(format!("q{i}"), format!("a{i}"), BTreeMap::new()))
            .collect()
    }

    #[test]
    fn system_prompt_then_current_input() {
        let asm = ContextAssembler::new("You are X");
        let bundle = asm.build_context(&[], "ping", None, None);
        let messages = asm.assemble(&bundle);

        assert_eq!(messages, vec![Message::system("You are X"), Message::user("ping")]);
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let asm = ContextAssembler::new("   ");
        assert!(asm.system_prompt().is_none());
        let messages = asm.build_messages(&[], "ping", None);
        assert_eq!(messages, vec![Message::user("ping")]);
    }

    #[test]
    fn bundle_keeps_window_and_optional_fields() {
        let asm = ContextAssembler::default();
        let window = turns(3);
        let mut tools = BTreeMap::new();
        tools.insert("tasks".to_string(), serde_json::json!(["buy injera"]));

        let bundle = asm.build_context(&window, "what next?", Some("a kitchen"), Some(&tools));
        assert_eq!(bundle.conversation_history, window.as_slice());
        assert_eq!(bundle.current_input, "what next?");
        assert_eq!(bundle.vision_description, Some("a kitchen"));
        assert_eq!(bundle.tool_results, Some(&tools));

        let bare = asm.build_context(&window, "hi", None, None);
        let json = serde_json::to_value(&bare).unwrap();
        assert!(json.get("vision_description").is_none());
        assert!(json.get("tool_results").is_none());
    }

    #[test]
    fn empty_auxiliary_context_counts_as_absent() {
        let asm = ContextAssembler::default();
        let empty = BTreeMap::new();
        let bundle = asm.build_context(&[], "hi", Some(""), Some(&empty));
        assert!(bundle.vision_description.is_none());
        assert!(bundle.tool_results.is_none());
    }

    #[test]
    fn full_ordering() {
        let asm = ContextAssembler::new("sys");
        let window = turns(2);
        let mut tools = BTreeMap::new();
        tools.insert("weather".to_string(), serde_json::json!({"temp_c": 21}));
        let ctx = TurnContext {
            vision_description: Some("a cup".into()),
            tool_results: Some(tools),
        };

        let messages = asm.build_messages(&window, "now?", Some(&ctx));
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::System,
                Role::System,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User,
            ]
        );
        assert_eq!(messages[1].content, "Vision context: a cup");
        assert_eq!(messages[2].content, r#"Tool results: {"weather":{"temp_c":21}}"#);
        assert_eq!(messages[3].content, "q0");
        assert_eq!(messages[6].content, "a1");
        assert_eq!(messages[7].content, "now?");
    }

    #[test]
    fn assembly_is_deterministic() {
        let asm = ContextAssembler::new("sys");
        let window = turns(4);
        let mut tools = BTreeMap::new();
        tools.insert("zeta".to_string(), serde_json::json!({"b": 2, "a": 1}));
        tools.insert("alpha".to_string(), serde_json::json!(true));

        let first = asm.build_context(&window, "again", Some("desk"), Some(&tools));
        let second = asm.build_context(&window, "again", Some("desk"), Some(&tools));
        assert_eq!(first, second);
        assert_eq!(asm.assemble(&first), asm.assemble(&second));

        let rendered = &asm.assemble(&first)[2].content;
        assert_eq!(rendered, r#"Tool results: {"alpha":true,"zeta":{"a":1,"b":2}}"#);
    }
}
