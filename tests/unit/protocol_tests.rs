//! Wire format of client and server messages.

use agent_rooms::gateway::protocol::{ClientMessage, ServerMessage};
use agent_rooms::room::message::Message;
use agent_rooms::room::{RoomEvent, RoomEventKind, RoomStatus};
use serde_json::json;

#[test]
fn parses_create_room_with_options() {
    let msg: ClientMessage = serde_json::from_value(json!({
        "type": "create_room",
        "agentType": "claude",
        "directory": "/srv/repo",
        "branch": "feature/x",
        "agentOptions": {"model": "opus"}
    }))
    .expect("parse");

    match msg {
        ClientMessage::CreateRoom {
            agent_type,
            directory,
            branch,
            agent_options,
        } => {
            assert_eq!(agent_type, "claude");
            assert_eq!(directory, "/srv/repo");
            assert_eq!(branch.as_deref(), Some("feature/x"));
            assert_eq!(agent_options, Some(json!({"model": "opus"})));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn optional_fields_may_be_omitted() {
    let msg: ClientMessage = serde_json::from_str(
        r#"{"type":"create_room","agentType":"codex","directory":"/tmp/x"}"#,
    )
    .expect("parse");
    assert!(matches!(
        msg,
        ClientMessage::CreateRoom {
            branch: None,
            agent_options: None,
            ..
        }
    ));

    let join: ClientMessage = serde_json::from_str(r#"{"type":"join_room","roomName":"login"}"#).expect("parse");
    assert_eq!(
        join,
        ClientMessage::JoinRoom {
            room_id: None,
            room_name: Some("login".into())
        }
    );
}

#[test]
fn unit_variants_parse() {
    assert_eq!(
        serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).expect("parse"),
        ClientMessage::Ping
    );
    assert_eq!(
        serde_json::from_str::<ClientMessage>(r#"{"type":"list_rooms"}"#).expect("parse"),
        ClientMessage::ListRooms
    );
}

#[test]
fn unknown_type_is_rejected() {
    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"self_destruct"}"#).is_err());
    assert!(serde_json::from_str::<ClientMessage>(r#"{"roomId":"x"}"#).is_err());
}

#[test]
fn server_messages_serialize_tagged_camel_case() {
    let status = serde_json::to_value(ServerMessage::Status {
        room_id: "r1".into(),
        status: RoomStatus::Busy,
    })
    .expect("serialize");
    assert_eq!(status, json!({"type": "status", "roomId": "r1", "status": "busy"}));

    let cancel = serde_json::to_value(ServerMessage::CancelResult {
        room_id: "r1".into(),
        cancelled: true,
    })
    .expect("serialize");
    assert_eq!(cancel["type"], "cancel_result");
    assert_eq!(cancel["cancelled"], true);

    let err = serde_json::to_value(ServerMessage::Error {
        error: "boom".into(),
        room_id: None,
    })
    .expect("serialize");
    assert_eq!(err, json!({"type": "error", "error": "boom"}));
}

#[test]
fn room_events_map_to_server_messages() {
    let message = Message::agent("done");
    let mapped = ServerMessage::from(RoomEvent {
        room_id: "r9".into(),
        kind: RoomEventKind::Message(message.clone()),
    });
    assert_eq!(
        mapped,
        ServerMessage::Message {
            room_id: "r9".into(),
            message
        }
    );

    let closed = ServerMessage::from(RoomEvent {
        room_id: "r9".into(),
        kind: RoomEventKind::Closed,
    });
    assert_eq!(closed, ServerMessage::RoomClosed { room_id: "r9".into() });

    let stream = serde_json::to_value(ServerMessage::from(RoomEvent {
        room_id: "r9".into(),
        kind: RoomEventKind::Stream("chunk".into()),
    }))
    .expect("serialize");
    assert_eq!(stream, json!({"type": "stream", "roomId": "r9", "chunk": "chunk"}));
}
