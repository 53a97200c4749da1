//! Per-vendor translation of agent output into canonical [`AgentEvent`]s.
//!
//! Each agent CLI emits differently shaped JSON. A [`Translator`] holds the
//! little state a dialect needs (open tool uses keyed by id) and maps one
//! stdout line at a time into zero or more canonical events:
//!
//! | Input                                  | Canonical event        |
//! |----------------------------------------|------------------------|
//! | line that is not JSON                  | `Stream` (raw line)    |
//! | assistant / agent text                 | `Stream`               |
//! | tool use started                       | `ActivityStart`        |
//! | tool use finished                      | `ActivityEnd`          |
//! | final result record                    | `Message`              |
//! | error record                           | `Error`                |
//! | anything else                          | `Debug` (+ `Stream`)   |
//!
//! Unknown records never fail: they become `Debug`, and if they carry a
//! recognizable text field that text is also streamed.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::debug;

use super::{AgentEvent, Dialect};

/// Fields probed, in order, when looking for text in an unknown record.
const TEXT_FIELDS: &[&str] = &["text", "content", "delta", "message", "output"];

/// Fields probed, in order, when looking for the reply in a one-shot record.
const RESULT_FIELDS: &[&str] = &["result", "response", "output", "text", "content", "message"];

const CLAUDE_TOOLS: &[(&str, &str)] = &[
    ("Bash", "Running command"),
    ("Read", "Reading file"),
    ("Write", "Writing file"),
    ("Edit", "Editing file"),
    ("MultiEdit", "Editing file"),
    ("NotebookEdit", "Editing notebook"),
    ("Glob", "Finding files"),
    ("Grep", "Searching code"),
    ("LS", "Listing directory"),
    ("WebFetch", "Fetching web page"),
    ("WebSearch", "Searching the web"),
    ("Task", "Running subagent"),
    ("TodoWrite", "Updating todo list"),
];

const CODEX_TOOLS: &[(&str, &str)] = &[
    ("command_execution", "Running command"),
    ("file_change", "Editing files"),
    ("mcp_tool_call", "Calling tool"),
    ("web_search", "Searching the web"),
    ("todo_list", "Updating todo list"),
];

const GEMINI_TOOLS: &[(&str, &str)] = &[
    ("read_file", "Reading file"),
    ("read_many_files", "Reading files"),
    ("write_file", "Writing file"),
    ("replace", "Editing file"),
    ("run_shell_command", "Running command"),
    ("search_file_content", "Searching code"),
    ("glob", "Finding files"),
    ("list_directory", "Listing directory"),
    ("web_fetch", "Fetching web page"),
    ("google_web_search", "Searching the web"),
];

/// Human description for a tool name in the given dialect.
#[must_use]
pub fn describe_tool(dialect: Dialect, tool: &str) -> String {
    let table = match dialect {
        Dialect::Claude => CLAUDE_TOOLS,
        Dialect::Codex => CODEX_TOOLS,
        Dialect::Gemini => GEMINI_TOOLS,
        Dialect::Plain => &[],
    };
    table
        .iter()
        .find(|(name, _)| *name == tool)
        .map_or_else(|| format!("Using {tool}"), |(_, desc)| (*desc).to_owned())
}

/// Encode a prompt as the single stdin line an interactive agent expects.
///
/// The returned string carries no trailing newline.
#[must_use]
pub fn encode_prompt(dialect: Dialect, prompt: &str) -> String {
    match dialect {
        Dialect::Claude => json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{ "type": "text", "text": prompt }],
            },
        })
        .to_string(),
        // Line-oriented agents take one line per prompt.
        Dialect::Codex | Dialect::Gemini | Dialect::Plain => {
            prompt.replace("\r\n", " ").replace(['\n', '\r'], " ")
        }
    }
}

/// Extract the reply-like field of a parsed record, if any.
///
/// Used by one-shot sessions: the last record that yields a value becomes
/// the reply.
#[must_use]
pub fn result_field(value: &Value) -> Option<String> {
    if let Some(item) = value.get("item") {
        if item.get("type").and_then(Value::as_str) == Some("agent_message") {
            return item.get("text").and_then(Value::as_str).map(str::to_owned);
        }
        return None;
    }
    RESULT_FIELDS
        .iter()
        .find_map(|field| value.get(*field).and_then(Value::as_str))
        .map(str::to_owned)
}

/// Stateful per-session translator for one dialect.
#[derive(Debug)]
pub struct Translator {
    dialect: Dialect,
    open_tools: HashMap<String, String>,
}

impl Translator {
    /// Create a translator for `dialect`.
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            open_tools: HashMap::new(),
        }
    }

    /// Dialect this translator speaks.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Translate one stdout line.
    ///
    /// Blank lines yield nothing; lines that are not JSON objects are
    /// forwarded as raw `Stream` chunks with their newline restored.
    pub fn translate_line(&mut self, line: &str) -> Vec<AgentEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) if value.is_object() => self.translate(&value),
            _ => vec![AgentEvent::Stream {
                text: format!("{}\n", line.trim_end_matches(['\r', '\n'])),
            }],
        }
    }

    /// Translate one parsed JSON record.
    pub fn translate(&mut self, value: &Value) -> Vec<AgentEvent> {
        match self.dialect {
            Dialect::Claude => self.translate_claude(value),
            Dialect::Codex => self.translate_codex(value),
            Dialect::Gemini => translate_gemini(value),
            Dialect::Plain => translate_plain(value),
        }
    }

    fn translate_claude(&mut self, value: &Value) -> Vec<AgentEvent> {
        let blocks = || {
            value
                .pointer("/message/content")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };

        match record_type(value) {
            Some("assistant") => {
                let mut events = Vec::new();
                for block in blocks() {
                    match record_type(&block) {
                        Some("text") => {
                            if let Some(text) = block.get("text").and_then(Value::as_str) {
                                events.push(AgentEvent::Stream {
                                    text: text.to_owned(),
                                });
                            }
                        }
                        Some("tool_use") => {
                            let tool = block
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or("tool")
                                .to_owned();
                            if let Some(id) = block.get("id").and_then(Value::as_str) {
                                self.open_tools.insert(id.to_owned(), tool.clone());
                            }
                            events.push(AgentEvent::ActivityStart {
                                description: describe_tool(Dialect::Claude, &tool),
                                tool,
                            });
                        }
                        _ => {}
                    }
                }
                events
            }
            Some("user") => blocks()
                .iter()
                .filter(|block| record_type(block) == Some("tool_result"))
                .map(|block| {
                    let tool = block
                        .get("tool_use_id")
                        .and_then(Value::as_str)
                        .and_then(|id| self.open_tools.remove(id))
                        .unwrap_or_else(|| "tool".to_owned());
                    AgentEvent::ActivityEnd {
                        description: describe_tool(Dialect::Claude, &tool),
                        tool,
                    }
                })
                .collect(),
            Some("result") => {
                let text = value
                    .get("result")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                let failed = value.get("is_error").and_then(Value::as_bool) == Some(true)
                    || value
                        .get("subtype")
                        .and_then(Value::as_str)
                        .is_some_and(|s| s.starts_with("error"));
                if failed {
                    let message = if text.is_empty() {
                        value
                            .get("subtype")
                            .and_then(Value::as_str)
                            .unwrap_or("agent reported an error")
                            .to_owned()
                    } else {
                        text
                    };
                    vec![AgentEvent::Error { message }]
                } else {
                    vec![AgentEvent::Message { text }]
                }
            }
            Some("system") => vec![AgentEvent::Debug {
                raw: value.to_string(),
            }],
            _ => unknown(value),
        }
    }

    fn translate_codex(&mut self, value: &Value) -> Vec<AgentEvent> {
        let item = value.get("item");
        let item_type = item.and_then(record_type);

        match record_type(value) {
            Some("item.started") => match item_type {
                Some("agent_message" | "reasoning") | None => Vec::new(),
                Some(tool) => {
                    if let Some(id) = item.and_then(|i| i.get("id")).and_then(Value::as_str) {
                        self.open_tools.insert(id.to_owned(), tool.to_owned());
                    }
                    vec![AgentEvent::ActivityStart {
                        tool: tool.to_owned(),
                        description: describe_tool(Dialect::Codex, tool),
                    }]
                }
            },
            Some("item.completed") => match item_type {
                Some("agent_message") => item
                    .and_then(|i| i.get("text"))
                    .and_then(Value::as_str)
                    .map(|text| AgentEvent::Stream {
                        text: text.to_owned(),
                    })
                    .into_iter()
                    .collect(),
                Some("reasoning") | None => vec![AgentEvent::Debug {
                    raw: value.to_string(),
                }],
                Some("error") => vec![AgentEvent::Error {
                    message: item
                        .and_then(|i| i.get("message"))
                        .and_then(Value::as_str)
                        .unwrap_or("agent reported an error")
                        .to_owned(),
                }],
                Some(tool) => {
                    if let Some(id) = item.and_then(|i| i.get("id")).and_then(Value::as_str) {
                        self.open_tools.remove(id);
                    }
                    vec![AgentEvent::ActivityEnd {
                        tool: tool.to_owned(),
                        description: describe_tool(Dialect::Codex, tool),
                    }]
                }
            },
            Some("error") => vec![AgentEvent::Error {
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("agent reported an error")
                    .to_owned(),
            }],
            Some("turn.failed") => vec![AgentEvent::Error {
                message: value
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("turn failed")
                    .to_owned(),
            }],
            Some("thread.started" | "turn.started" | "turn.completed") => {
                vec![AgentEvent::Debug {
                    raw: value.to_string(),
                }]
            }
            _ => unknown(value),
        }
    }
}

fn translate_gemini(value: &Value) -> Vec<AgentEvent> {
    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .unwrap_or("agent reported an error")
            .to_owned();
        return vec![AgentEvent::Error { message }];
    }
    if let Some(response) = value.get("response").and_then(Value::as_str) {
        return vec![AgentEvent::Stream {
            text: response.to_owned(),
        }];
    }
    if let Some(tool) = value.get("tool").and_then(Value::as_str) {
        return vec![AgentEvent::ActivityStart {
            tool: tool.to_owned(),
            description: describe_tool(Dialect::Gemini, tool),
        }];
    }
    unknown(value)
}

fn translate_plain(value: &Value) -> Vec<AgentEvent> {
    match record_type(value) {
        Some("error") => {
            return vec![AgentEvent::Error {
                message: value
                    .get("message")
                    .or_else(|| value.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("agent reported an error")
                    .to_owned(),
            }]
        }
        Some("result") => {
            return vec![AgentEvent::Message {
                text: value
                    .get("result")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
            }]
        }
        _ => {}
    }
    if let Some(result) = value.get("result").and_then(Value::as_str) {
        return vec![AgentEvent::Message {
            text: result.to_owned(),
        }];
    }
    unknown(value)
}

fn record_type(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

/// Generic handling for records no translator recognizes.
fn unknown(value: &Value) -> Vec<AgentEvent> {
    debug!(record = %value, "unrecognized agent record");
    let mut events = vec![AgentEvent::Debug {
        raw: value.to_string(),
    }];
    if let Some(text) = TEXT_FIELDS
        .iter()
        .find_map(|field| value.get(*field).and_then(Value::as_str))
    {
        events.push(AgentEvent::Stream {
            text: text.to_owned(),
        });
    }
    events
}
