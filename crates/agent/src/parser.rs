//! Response parser: pulls tool-call directives out of free-form model output.
//!
//! The model requests tools by embedding spans such as:
//!
//! ```text
//! <tool_call name="task_manager" action="create_reminder">
//! text = "call mum"
//! when = 18:00
//! </tool_call>
//! ```
//!
//! Grammar (informal):
//! ```text
//! span   = "<tool_call" attrs ">" body "</tool_call>"
//! attrs  = (IDENT "=" '"' TEXT '"')*        ; needs name and action, any order
//! body   = JSON_OBJECT | entry ((NEWLINE | ";") entry)*
//! entry  = KEY ("=" | ":") VALUE             ; surrounding quotes stripped
//! ```
//!
//! Model output is untrusted. A span without `name`/`action`, or one that
//! hits another opener or the end of the text before its closing tag, is
//! skipped. Parsing never fails.

use regex_lite::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;
use zema_core::tool::{Intent, ToolCallDirective};

const CLOSE_TAG: &str = "</tool_call>";

static OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<tool_call(\s[^<>]*)?>").expect("tool_call opener pattern is valid")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*"([^"]*)""#).expect("attribute pattern is valid")
});

/// Stateless parser for assistant responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn new() -> Self {
        Self
    }

    /// Every well-formed directive in `response`, in order of appearance.
    pub fn parse_tool_calls(&self, response: &str) -> Vec<ToolCallDirective> {
        let openers: Vec<(usize, usize, &str)> = OPENER
            .captures_iter(response)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let attrs = caps.get(1).map_or("", |m| m.as_str());
                Some((whole.start(), whole.end(), attrs))
            })
            .collect();

        let mut directives = Vec::new();
        for (i, &(start, body_start, attrs)) in openers.iter().enumerate() {
            let region_end = openers.get(i + 1).map_or(response.len(), |next| next.0);
            let region = &response[body_start..region_end];

            let Some(close) = region.find(CLOSE_TAG) else {
                debug!(offset = start, "Skipping unterminated tool_call span");
                continue;
            };

            let attributes = parse_attributes(attrs);
            let (Some(tool), Some(action)) = (attributes.get("name"), attributes.get("action")) else {
                debug!(offset = start, "Skipping tool_call span without name/action");
                continue;
            };

            directives.push(ToolCallDirective {
                tool: tool.clone(),
                action: action.clone(),
                parameters: parse_parameters(&region[..close]),
            });
        }

        directives
    }

    /// Classify a response. Anything without directives is `general`.
    pub fn extract_intent(&self, response: &str) -> Intent {
        if self.parse_tool_calls(response).is_empty() {
            Intent::general()
        } else {
            Intent {
                kind: Intent::TOOL_CALL.to_string(),
                confidence: 1.0,
            }
        }
    }
}

/// Attribute values by name; blank values are dropped, first occurrence wins.
fn parse_attributes(attrs: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for caps in ATTRIBUTE.captures_iter(attrs) {
        let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let value = value.as_str().trim();
        if !value.is_empty() {
            out.entry(key.as_str().to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    out
}

/// Parse a directive body into parameters.
///
/// A JSON object body yields its entries; a body that starts like JSON but
/// does not parse yields nothing. Otherwise each `key=value` / `key: value`
/// entry becomes a string parameter.
pub fn parse_parameters(body: &str) -> BTreeMap<String, serde_json::Value> {
    let body = body.trim();

    if body.starts_with('{') {
        return match serde_json::from_str::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };
    }

    body.split(['\n', ';'])
        .filter_map(|entry| {
            let entry = entry.trim();
            let split = entry.find(['=', ':'])?;
            let key = entry[..split].trim();
            if key.is_empty() {
                return None;
            }
            let value = unquote(entry[split + 1..].trim());
            Some((key.to_string(), serde_json::Value::String(value.to_string())))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
