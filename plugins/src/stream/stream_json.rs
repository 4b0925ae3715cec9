use std::collections::HashMap;

use serde_json::Value;
use weaver_core::runner::AgentEvent;

/// Best-effort parser for "stream-json" lines from coding-agent CLIs.
///
/// Understands three shapes:
/// - weaver's own events, `{"event":"action-start",...}`
/// - Claude: `assistant` messages with `tool_use`/`text` items and `user`
///   messages with `tool_result` items
/// - Gemini: top-level `tool_use`/`tool_result` objects
///
/// Anything else, including non-JSON lines, yields no events.
#[derive(Default)]
pub struct StreamJsonParser {
    // tool results do not repeat the tool name
    pending: HashMap<String, String>,
}

impl StreamJsonParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_line(&mut self, line: &str) -> Vec<AgentEvent> {
        let s = line.trim();
        if !(s.starts_with('{') && s.ends_with('}')) {
            return Vec::new();
        }
        let Ok(v) = serde_json::from_str::<Value>(s) else {
            return Vec::new();
        };
        if v.get("event").is_some() {
            return serde_json::from_value::<AgentEvent>(v).into_iter().collect();
        }
        self.parse_value(&v)
    }

    fn parse_value(&mut self, v: &Value) -> Vec<AgentEvent> {
        let items = || {
            v.get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_array())
                .into_iter()
                .flatten()
        };

        match str_field(v, "type") {
            Some("assistant") => items()
                .filter_map(|item| match str_field(item, "type") {
                    Some("tool_use") => {
                        let name = str_field(item, "name").unwrap_or("unknown").to_string();
                        if let Some(id) = str_field(item, "id") {
                            self.pending.insert(id.to_string(), name.clone());
                        }
                        let args = item.get("input").cloned().unwrap_or(Value::Null);
                        Some(AgentEvent::action(name, args))
                    }
                    Some("text") | Some("output_text") => str_field(item, "text")
                        .filter(|t| !t.is_empty())
                        .map(|t| AgentEvent::Output {
                            text: t.to_string(),
                        }),
                    _ => None,
                })
                .collect(),
            Some("user") => items()
                .filter(|item| str_field(item, "type") == Some("tool_result"))
                .map(|item| {
                    if let Some(id) = str_field(item, "tool_use_id") {
                        self.pending.remove(id);
                    }
                    let is_error = item
                        .get("is_error")
                        .or_else(|| v.get("tool_use_result").and_then(|r| r.get("isError")))
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    AgentEvent::action_end(is_error)
                })
                .collect(),
            Some("tool_use") => {
                let name = str_field(v, "tool_name").unwrap_or("unknown").to_string();
                if let Some(id) = str_field(v, "tool_id") {
                    self.pending.insert(id.to_string(), name.clone());
                }
                let args = v.get("parameters").cloned().unwrap_or(Value::Null);
                vec![AgentEvent::action(name, args)]
            }
            Some("tool_result") => {
                if let Some(id) = str_field(v, "tool_id") {
                    self.pending.remove(id);
                }
                vec![AgentEvent::action_end(
                    str_field(v, "status") == Some("error"),
                )]
            }
            _ => Vec::new(),
        }
    }

    /// Tools started but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str)
}
