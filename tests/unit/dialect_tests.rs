//! Per-dialect translation into canonical agent events.

use agent_rooms::agent::dialect::{describe_tool, encode_prompt, result_field, Translator};
use agent_rooms::agent::{AgentEvent, Dialect};
use serde_json::json;

fn stream(text: &str) -> AgentEvent {
    AgentEvent::Stream { text: text.into() }
}

// ── Shared behavior ──────────────────────────────────────────

#[test]
fn non_json_line_is_streamed_raw() {
    let mut t = Translator::new(Dialect::Claude);
    assert_eq!(t.translate_line("compiling crate...\r\n"), vec![stream("compiling crate...\n")]);
}

#[test]
fn blank_line_yields_nothing() {
    let mut t = Translator::new(Dialect::Codex);
    assert!(t.translate_line("   ").is_empty());
}

#[test]
fn json_scalar_is_streamed_raw() {
    let mut t = Translator::new(Dialect::Plain);
    assert_eq!(t.translate_line("42"), vec![stream("42\n")]);
}

#[test]
fn unknown_record_becomes_debug_plus_text() {
    let mut t = Translator::new(Dialect::Gemini);
    let events = t.translate(&json!({"type": "mystery", "delta": "partial"}));
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], AgentEvent::Debug { .. }));
    assert_eq!(events[1], stream("partial"));
}

#[test]
fn unknown_record_without_text_is_debug_only() {
    let mut t = Translator::new(Dialect::Claude);
    let events = t.translate(&json!({"type": "rate_limit", "retry": 3}));
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], AgentEvent::Debug { .. }));
}

#[test]
fn tool_descriptions_fall_back_to_generic() {
    assert_eq!(describe_tool(Dialect::Claude, "Bash"), "Running command");
    assert_eq!(describe_tool(Dialect::Codex, "file_change"), "Editing files");
    assert_eq!(describe_tool(Dialect::Gemini, "read_file"), "Reading file");
    assert_eq!(describe_tool(Dialect::Claude, "Frobnicate"), "Using Frobnicate");
    assert_eq!(describe_tool(Dialect::Plain, "Bash"), "Using Bash");
}

// ── Claude ───────────────────────────────────────────────────

#[test]
fn claude_assistant_text_and_tool_use() {
    let mut t = Translator::new(Dialect::Claude);
    let events = t.translate(&json!({
        "type": "assistant",
        "message": {"content": [
            {"type": "text", "text": "Looking at it."},
            {"type": "tool_use", "id": "tu_1", "name": "Read", "input": {}}
        ]}
    }));
    assert_eq!(
        events,
        vec![
            stream("Looking at it."),
            AgentEvent::ActivityStart {
                tool: "Read".into(),
                description: "Reading file".into()
            }
        ]
    );

    let ended = t.translate(&json!({
        "type": "user",
        "message": {"content": [{"type": "tool_result", "tool_use_id": "tu_1", "content": "..."}]}
    }));
    assert_eq!(
        ended,
        vec![AgentEvent::ActivityEnd {
            tool: "Read".into(),
            description: "Reading file".into()
        }]
    );
}

#[test]
fn claude_result_success_is_message() {
    let mut t = Translator::new(Dialect::Claude);
    let events = t.translate(&json!({"type": "result", "subtype": "success", "result": "All done"}));
    assert_eq!(events, vec![AgentEvent::Message { text: "All done".into() }]);
}

#[test]
fn claude_result_error_is_error() {
    let mut t = Translator::new(Dialect::Claude);
    let flagged = t.translate(&json!({"type": "result", "is_error": true, "result": "quota"}));
    assert_eq!(flagged, vec![AgentEvent::Error { message: "quota".into() }]);

    let by_subtype = t.translate(&json!({"type": "result", "subtype": "error_max_turns"}));
    assert_eq!(
        by_subtype,
        vec![AgentEvent::Error {
            message: "error_max_turns".into()
        }]
    );
}

#[test]
fn claude_system_record_is_debug() {
    let mut t = Translator::new(Dialect::Claude);
    let events = t.translate(&json!({"type": "system", "subtype": "init"}));
    assert!(matches!(events.as_slice(), [AgentEvent::Debug { .. }]));
}

// ── Codex ────────────────────────────────────────────────────

#[test]
fn codex_command_item_round_trip() {
    let mut t = Translator::new(Dialect::Codex);
    let started = t.translate(&json!({
        "type": "item.started",
        "item": {"id": "i1", "type": "command_execution", "command": "ls"}
    }));
    assert_eq!(
        started,
        vec![AgentEvent::ActivityStart {
            tool: "command_execution".into(),
            description: "Running command".into()
        }]
    );
    let completed = t.translate(&json!({
        "type": "item.completed",
        "item": {"id": "i1", "type": "command_execution", "exit_code": 0}
    }));
    assert!(matches!(completed.as_slice(), [AgentEvent::ActivityEnd { tool, .. }] if tool == "command_execution"));
}

#[test]
fn codex_agent_message_streams() {
    let mut t = Translator::new(Dialect::Codex);
    assert!(t
        .translate(&json!({"type": "item.started", "item": {"type": "agent_message"}}))
        .is_empty());
    let events = t.translate(&json!({
        "type": "item.completed",
        "item": {"id": "i2", "type": "agent_message", "text": "Fixed it."}
    }));
    assert_eq!(events, vec![stream("Fixed it.")]);
}

#[test]
fn codex_failures_are_errors() {
    let mut t = Translator::new(Dialect::Codex);
    assert_eq!(
        t.translate(&json!({"type": "error", "message": "stream disconnected"})),
        vec![AgentEvent::Error {
            message: "stream disconnected".into()
        }]
    );
    assert_eq!(
        t.translate(&json!({"type": "turn.failed", "error": {"message": "rate limited"}})),
        vec![AgentEvent::Error {
            message: "rate limited".into()
        }]
    );
}

#[test]
fn codex_turn_markers_are_debug() {
    let mut t = Translator::new(Dialect::Codex);
    for kind in ["thread.started", "turn.started", "turn.completed"] {
        let events = t.translate(&json!({"type": kind}));
        assert!(matches!(events.as_slice(), [AgentEvent::Debug { .. }]), "{kind}");
    }
}

// ── Gemini / Plain ───────────────────────────────────────────

#[test]
fn gemini_response_and_error() {
    let mut t = Translator::new(Dialect::Gemini);
    assert_eq!(t.translate(&json!({"response": "Hello"})), vec![stream("Hello")]);
    assert_eq!(
        t.translate(&json!({"error": {"message": "bad key"}})),
        vec![AgentEvent::Error {
            message: "bad key".into()
        }]
    );
}

#[test]
fn plain_result_and_error_records() {
    let mut t = Translator::new(Dialect::Plain);
    assert_eq!(
        t.translate_line(r#"{"type":"result","result":"ok"}"#),
        vec![AgentEvent::Message { text: "ok".into() }]
    );
    assert_eq!(
        t.translate_line(r#"{"type":"error","message":"boom"}"#),
        vec![AgentEvent::Error {
            message: "boom".into()
        }]
    );
}

// ── Prompt encoding and reply extraction ─────────────────────

#[test]
fn claude_prompt_is_stream_json_user_message() {
    let line = encode_prompt(Dialect::Claude, "fix it\nplease");
    assert!(!line.contains('\n'));
    let value: serde_json::Value = serde_json::from_str(&line).expect("json");
    assert_eq!(value["type"], "user");
    assert_eq!(value["message"]["content"][0]["text"], "fix it\nplease");
}

#[test]
fn line_dialects_flatten_newlines() {
    assert_eq!(encode_prompt(Dialect::Plain, "a\nb\r\nc"), "a b c");
}

#[test]
fn result_field_prefers_known_fields() {
    assert_eq!(result_field(&json!({"result": "r", "text": "t"})).as_deref(), Some("r"));
    assert_eq!(result_field(&json!({"response": "g"})).as_deref(), Some("g"));
    assert_eq!(
        result_field(&json!({"type": "item.completed", "item": {"type": "agent_message", "text": "c"}}))
            .as_deref(),
        Some("c")
    );
    assert_eq!(
        result_field(&json!({"type": "item.completed", "item": {"type": "reasoning", "text": "x"}})),
        None
    );
    assert_eq!(result_field(&json!({"type": "turn.started"})), None);
}
