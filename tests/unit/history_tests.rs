use agent_rooms::room::history::History;
use agent_rooms::room::message::{Message, Role};

fn filled(capacity: usize, count: usize) -> History {
    let mut history = History::new(capacity);
    for i in 0..count {
        history.push(Message::user(format!("m{i}"), None));
    }
    history
}

#[test]
fn evicts_oldest_beyond_capacity() {
    let history = filled(3, 5);
    assert_eq!(history.len(), 3);
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["m2", "m3", "m4"]);
}

#[test]
fn recent_returns_tail_oldest_first() {
    let history = filled(10, 6);
    let recent: Vec<String> = history.recent(2).into_iter().map(|m| m.content).collect();
    assert_eq!(recent, ["m4", "m5"]);
}

#[test]
fn recent_larger_than_len_returns_everything() {
    let history = filled(10, 2);
    assert_eq!(history.recent(100).len(), 2);
}

#[test]
fn zero_capacity_is_clamped_to_one() {
    let history = filled(0, 3);
    assert_eq!(history.capacity(), 1);
    assert_eq!(history.len(), 1);
}

#[test]
fn message_constructors_set_role() {
    assert_eq!(Message::user("a", Some("c1".into())).role, Role::User);
    assert_eq!(Message::agent("a").role, Role::Agent);
    assert_eq!(Message::system("a").role, Role::System);
    assert_ne!(Message::system("a").id, Message::system("a").id);
}

#[test]
fn message_serializes_camel_case_without_empty_origin() {
    let json = serde_json::to_value(Message::agent("done")).expect("serialize");
    assert_eq!(json["role"], "agent");
    assert_eq!(json["content"], "done");
    assert!(json.get("timestamp").is_some());
    assert!(json.get("origin").is_none());
}
