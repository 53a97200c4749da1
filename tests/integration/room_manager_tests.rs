//! Integration tests for the room registry.

use std::time::Duration;

use agent_rooms::agent::AgentOptions;
use agent_rooms::orchestrator::{CreateRoomRequest, RoomManager};
use agent_rooms::room::RoomStatus;
use agent_rooms::AppError;

use super::test_helpers::{fake_manager, settings, FakeFactory, Script, FAKE_KIND};

fn request(directory: &std::path::Path) -> CreateRoomRequest {
    CreateRoomRequest {
        agent_type: FAKE_KIND.into(),
        directory: directory.to_path_buf(),
        branch: None,
        options: AgentOptions::default(),
    }
}

fn manager(temp: &tempfile::TempDir, script: Script) -> std::sync::Arc<RoomManager> {
    fake_manager(
        FakeFactory::new(script),
        &temp.path().join("worktrees"),
        settings(true, Duration::from_secs(5)),
    )
}

#[tokio::test]
async fn non_git_directory_is_used_as_is() {
    let temp = tempfile::tempdir().expect("tempdir");
    let project = temp.path().join("project");
    std::fs::create_dir_all(&project).expect("mkdir");
    let manager = manager(&temp, Script::Echo { delay: Duration::ZERO });

    let room = manager.create_room(request(&project)).await.expect("room");

    assert_eq!(room.status(), RoomStatus::Ready);
    assert_eq!(room.directory(), std::fs::canonicalize(&project).expect("canon"));
    assert!(!room.has_worktree());
    assert_eq!(room.branch(), None);
    assert!(room.name().starts_with("fake-"));
    assert!(manager.worktrees().is_empty());
}

#[tokio::test]
async fn branch_on_non_git_directory_is_dropped() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = manager(&temp, Script::Echo { delay: Duration::ZERO });
    let mut req = request(temp.path());
    req.branch = Some("feature/x".into());

    let room = manager.create_room(req).await.expect("room");
    assert_eq!(room.branch(), None);
    assert_eq!(room.status(), RoomStatus::Ready);
}

#[tokio::test]
async fn unknown_agent_type_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = manager(&temp, Script::Echo { delay: Duration::ZERO });
    let mut req = request(temp.path());
    req.agent_type = "cobol-bot".into();

    let err = manager.create_room(req).await.expect_err("unknown kind");
    assert!(matches!(err, AppError::NotFound(ref msg) if msg.contains("cobol-bot") && msg.contains(FAKE_KIND)));
    assert!(manager.is_empty());
}

#[tokio::test]
async fn missing_directory_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = manager(&temp, Script::Echo { delay: Duration::ZERO });

    let err = manager
        .create_room(request(&temp.path().join("does-not-exist")))
        .await
        .expect_err("missing dir");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn start_failure_still_registers_room_in_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = manager(&temp, Script::FailStart);

    let room = manager.create_room(request(temp.path())).await.expect("room");
    assert_eq!(room.status(), RoomStatus::Error);
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.stats().error, 1);
}

#[tokio::test]
async fn lookup_by_id_and_name() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = manager(&temp, Script::Echo { delay: Duration::ZERO });
    let room = manager.create_room(request(temp.path())).await.expect("room");
    room.rename("Login Fix").expect("rename");

    assert!(manager.get(room.id()).is_some());
    assert_eq!(manager.resolve(room.id()).expect("by id").id(), room.id());
    assert_eq!(manager.resolve("Login Fix").expect("by name").id(), room.id());
    assert_eq!(manager.resolve("login fix").expect("case-insensitive").id(), room.id());
    assert!(matches!(manager.resolve("nope"), Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn list_and_stats_reflect_rooms() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = manager(&temp, Script::Echo { delay: Duration::ZERO });
    let first = manager.create_room(request(temp.path())).await.expect("room");
    let second = manager.create_room(request(temp.path())).await.expect("room");
    first.send_to_agent("add tests", None).await.expect("reply");

    let list = manager.list();
    assert_eq!(list.len(), 2);
    assert!(list.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    let busy_one = list.iter().find(|s| s.id == first.id()).expect("first listed");
    let idle_one = list.iter().find(|s| s.id == second.id()).expect("second listed");
    assert_eq!(busy_one.message_count, 2);
    assert_eq!(idle_one.message_count, 0);

    let stats = manager.stats();
    assert_eq!(stats.total_rooms, 2);
    assert_eq!(stats.ready, 2);
    assert_eq!(stats.messages, 2);
    assert_eq!(stats.active_worktrees, 0);
    assert_eq!(manager.agent_kinds(), [FAKE_KIND]);
}

#[tokio::test]
async fn destroy_room_closes_and_deregisters() {
    let temp = tempfile::tempdir().expect("tempdir");
    let factory = FakeFactory::echo();
    let manager = fake_manager(
        factory.clone(),
        &temp.path().join("worktrees"),
        settings(false, Duration::from_secs(5)),
    );
    let room = manager.create_room(request(temp.path())).await.expect("room");

    manager.destroy_room(room.id()).await.expect("destroy");
    assert!(manager.get(room.id()).is_none());
    assert_eq!(room.status(), RoomStatus::Stopped);
    assert_eq!(factory.stop_count(), 1);

    assert!(matches!(
        manager.destroy_room(room.id()).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn destroy_all_empties_registry() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = manager(&temp, Script::Hang);
    for _ in 0..3 {
        manager.create_room(request(temp.path())).await.expect("room");
    }
    assert_eq!(manager.len(), 3);

    manager.destroy_all().await;
    assert!(manager.is_empty());
    assert_eq!(manager.stats().total_rooms, 0);
}

#[tokio::test]
async fn detach_observer_everywhere_counts_rooms() {
    use agent_rooms::room::observers::Observer;

    let temp = tempfile::tempdir().expect("tempdir");
    let manager = manager(&temp, Script::Echo { delay: Duration::ZERO });
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    for _ in 0..2 {
        let room = manager.create_room(request(temp.path())).await.expect("room");
        room.join(Observer::new("conn-1", "alice", tx.clone()));
    }

    assert_eq!(manager.detach_observer_everywhere("conn-1"), 2);
    assert_eq!(manager.detach_observer_everywhere("conn-1"), 0);
    assert_eq!(manager.stats().observers, 0);
}
