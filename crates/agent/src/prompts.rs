//! Built-in system prompt presets.
//!
//! The configured `llm.system_prompt` is the default; a preset replaces it
//! for one session (`zema chat --preset tools`).

/// General-purpose assistant persona.
pub const MAIN_SYSTEM_PROMPT: &str = "\
You are Zema, a helpful privacy-first AI assistant running entirely offline on a mini PC.

Key characteristics:
- Privacy-focused: All data stays local, no cloud dependencies
- Offline-first: All core features work without internet
- Helpful and friendly: Provide clear, concise answers
- Multi-modal: You can see (vision) and hear (voice)
- Multi-language: Support English and Amharic

When responding:
- Be concise but helpful
- If you don't know something, say so honestly
- Use tools when appropriate
- Consider vision context when available
- Respect user privacy preferences";

/// Persona for turns that carry a camera description.
pub const VISION_SYSTEM_PROMPT: &str = "\
You can see the world through a camera. When vision context is provided:
- Describe what you see clearly
- Identify objects, people, and scenes
- Provide measurements if requested
- Answer questions about the visual scene";

/// Persona that may request local tools. The trailing example is the exact
/// syntax [`crate::parser::ResponseParser`] accepts.
pub const TOOL_SYSTEM_PROMPT: &str = "\
You have access to tools:
- Task management (reminders, calendar)
- Note-taking
- Knowledge base
- Web search (if privacy mode allows)
- System configuration

Use tools when appropriate to help the user.

To use a tool, write a directive in your answer:
<tool_call name=\"TOOL\" action=\"ACTION\">
key = value
</tool_call>

The body may also be a JSON object. Results come back in a \"Tool results:\" message.";

/// Ethiopian culture and language support.
pub const ETHIOPIAN_CONTEXT_PROMPT: &str = "\
You support Ethiopian culture and language:
- Answer questions about Orthodox Church, fasting periods, feast days
- Provide Ethiopian calendar conversions
- Help with Ethiopian recipes
- Support code-switching between English and Amharic";

/// A named system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPreset {
    Main,
    Vision,
    Tools,
    Ethiopian,
}

impl PromptPreset {
    pub const ALL: [PromptPreset; 4] = [Self::Main, Self::Vision, Self::Tools, Self::Ethiopian];

    /// Look up a preset by name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "main" => Some(Self::Main),
            "vision" => Some(Self::Vision),
            "tools" | "tool" => Some(Self::Tools),
            "ethiopian" => Some(Self::Ethiopian),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Vision => "vision",
            Self::Tools => "tools",
            Self::Ethiopian => "ethiopian",
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            Self::Main => MAIN_SYSTEM_PROMPT,
            Self::Vision => VISION_SYSTEM_PROMPT,
            Self::Tools => TOOL_SYSTEM_PROMPT,
            Self::Ethiopian => ETHIOPIAN_CONTEXT_PROMPT,
        }
    }
}
