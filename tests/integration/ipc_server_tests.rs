//! Integration tests for the IPC transport.
//!
//! Each test listens on a unique socket name so tests never collide with a
//! running server or each other.

use std::time::Duration;

use interprocess::local_socket::tokio::{prelude::*, Stream};
use interprocess::local_socket::{GenericNamespaced, ToNsName};
use serde_json::{json, Value};
use serial_test::serial;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use agent_rooms::gateway::ipc::spawn_ipc_server;

use super::test_helpers::{fake_manager, settings, FakeFactory, FAKE_KIND};

const WAIT: Duration = Duration::from_secs(5);

fn unique_name() -> String {
    format!("agent-rooms-test-{}", uuid::Uuid::new_v4().simple())
}

/// Read lines until one has `"type": kind`.
async fn read_until<R>(lines: &mut tokio::io::Lines<BufReader<R>>, kind: &str) -> Value
where
    R: tokio::io::AsyncRead + Unpin,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let line = lines.next_line().await.expect("read").expect("line");
            let value: Value = serde_json::from_str(&line).expect("json line");
            if value["type"] == kind {
                return value;
            }
        }
    })
    .await
    .expect("reply in time")
}

#[tokio::test]
#[serial]
async fn ipc_round_trip_over_local_socket() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = fake_manager(FakeFactory::echo(), temp.path(), settings(false, WAIT));
    let ct = CancellationToken::new();
    let name = unique_name();
    let server = spawn_ipc_server(&name, manager.clone(), ct.clone()).expect("listener");

    let stream = Stream::connect(name.as_str().to_ns_name::<GenericNamespaced>().expect("name"))
        .await
        .expect("connect");
    let (reader, mut writer) = stream.split();
    let mut lines = BufReader::new(reader).lines();

    let welcome = read_until(&mut lines, "welcome").await;
    assert!(welcome["clientId"].is_string());

    let create = json!({
        "type": "create_room",
        "agentType": FAKE_KIND,
        "directory": temp.path().to_string_lossy(),
    });
    writer
        .write_all(format!("{create}\n{}\n", json!({"type": "list_rooms"})).as_bytes())
        .await
        .expect("write");

    let joined = read_until(&mut lines, "room_joined").await;
    assert_eq!(joined["agentType"], FAKE_KIND);
    assert_eq!(joined["status"], "ready");
    let list = read_until(&mut lines, "room_list").await;
    assert_eq!(list["rooms"].as_array().map(Vec::len), Some(1));

    let room_id = joined["roomId"].as_str().expect("room id").to_owned();
    let send = json!({"type": "send_message", "roomId": room_id, "content": "add logging"});
    writer.write_all(format!("{send}\n").as_bytes()).await.expect("write");
    loop {
        let message = read_until(&mut lines, "message").await;
        if message["message"]["role"] == "agent" {
            assert_eq!(message["message"]["content"], "echo: add logging");
            break;
        }
    }

    drop(writer);
    drop(lines);
    ct.cancel();
    tokio::time::timeout(WAIT, server).await.expect("server stops").expect("join");

    // The disconnect detached the observer.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.stats().observers, 0);
}

#[tokio::test]
#[serial]
async fn ipc_reports_malformed_lines() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = fake_manager(FakeFactory::echo(), temp.path(), settings(false, WAIT));
    let ct = CancellationToken::new();
    let name = unique_name();
    let _server = spawn_ipc_server(&name, manager, ct.clone()).expect("listener");

    let stream = Stream::connect(name.as_str().to_ns_name::<GenericNamespaced>().expect("name"))
        .await
        .expect("connect");
    let (reader, mut writer) = stream.split();
    let mut lines = BufReader::new(reader).lines();

    writer.write_all(b"this is not json\n{\"type\":\"ping\"}\n").await.expect("write");
    let error = read_until(&mut lines, "error").await;
    assert!(error["error"].as_str().is_some_and(|e| e.contains("invalid json")));
    read_until(&mut lines, "pong").await;

    ct.cancel();
}
