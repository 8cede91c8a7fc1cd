//! Mutation action layer: synchronous rejections, optimistic apply, and
//! local-first behavior when the remote fails.

mod common;

use std::rc::Rc;

use boardsync_core::remote::RemoteOp;
use boardsync_core::{
    ActionError, Board, Column, ErrorCode, LocalBus, MemoryRemote, ProjectDraft, ProjectPatch,
    TaskDraft, TaskPatch,
};
use chrono::NaiveDate;
use common::{board_for, column_of, ident, shared_project};
use tokio::task::LocalSet;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Board for `actor` with the server's view of its projects loaded.
async fn loaded_board(remote: &Rc<MemoryRemote>, actor: &str) -> Board {
    let board = board_for(remote, &LocalBus::default(), actor);
    board.load_projects().expect("signed in").settled().await;
    board
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn actions_without_actor_are_rejected() {
    LocalSet::new()
        .run_until(async {
            let remote = Rc::new(MemoryRemote::new());
            let board = Board::new(remote.clone(), LocalBus::default());

            let err = board
                .create_project(ProjectDraft::named("Alpha"))
                .expect_err("no actor");
            assert_eq!(err, ActionError::NoActor);
            assert_eq!(err.code(), ErrorCode::NotSignedIn);
            assert!(board.visible_projects().is_empty());
            assert_eq!(board.store().borrow().revision(), 0);
            assert!(remote.calls().is_empty());
        })
        .await;
}

#[tokio::test]
async fn signing_out_hides_the_board() {
    LocalSet::new()
        .run_until(async {
            let remote = Rc::new(MemoryRemote::new());
            remote.seed_project(shared_project("p1", "a@x.com", &[], &["t1"]));
            let board = loaded_board(&remote, "a@x.com").await;
            assert_eq!(board.visible_projects().len(), 1);

            board.sign_out();
            assert_eq!(board.actor(), None);
            assert!(board.visible_projects().is_empty());
            let err = board
                .move_task("p1", "t1", Column::Done)
                .expect_err("signed out");
            assert_eq!(err, ActionError::NoActor);
            assert!(board.project("p1").is_some());
        })
        .await;
}

#[tokio::test]
async fn non_members_cannot_mutate() {
    LocalSet::new()
        .run_until(async {
            let remote = Rc::new(MemoryRemote::new());
            let board = board_for(&remote, &LocalBus::default(), "c@x.com");
            board
                .store()
                .borrow_mut()
                .insert(ident("a@x.com"), shared_project("p1", "a@x.com", &[], &["t1"]));
            let revision = board.store().borrow().revision();

            let err = board
                .move_task("p1", "t1", Column::Done)
                .expect_err("not a member");
            assert!(matches!(err, ActionError::Forbidden { .. }));
            assert_eq!(err.code(), ErrorCode::AccessDenied);
            assert_eq!(board.store().borrow().revision(), revision);
            assert!(board.visible_projects().is_empty());

            let missing = board.delete_project("p404").expect_err("absent");
            assert_eq!(missing.code(), ErrorCode::ProjectNotFound);
            assert!(remote.calls().is_empty());
        })
        .await;
}

#[tokio::test]
async fn task_deadline_past_project_deadline_changes_nothing() {
    LocalSet::new()
        .run_until(async {
            let remote = Rc::new(MemoryRemote::new());
            let mut seeded = shared_project("p1", "a@x.com", &[], &["s1"]);
            seeded.deadline = Some(date(2026, 3, 1));
            remote.seed_project(seeded);
            let board = loaded_board(&remote, "a@x.com").await;
            let before = board.project("p1").expect("loaded");
            let revision = board.store().borrow().revision();
            let calls = remote.calls().len();

            let late = TaskDraft {
                title: "Ship".into(),
                deadline: Some(date(2026, 4, 1)),
                ..TaskDraft::default()
            };
            let err = board
                .create_task("p1", Column::Todo, late)
                .expect_err("deadline guard");
            assert_eq!(
                err,
                ActionError::DeadlineExceedsProject {
                    task: date(2026, 4, 1),
                    project: date(2026, 3, 1),
                }
            );

            let err = board
                .update_task(
                    "p1",
                    "s1",
                    TaskPatch {
                        deadline: Some(Some(date(2026, 3, 2))),
                        ..TaskPatch::default()
                    },
                )
                .expect_err("deadline guard");
            assert_eq!(err.code(), ErrorCode::DeadlineExceedsProject);

            assert_eq!(board.store().borrow().revision(), revision);
            assert_eq!(*board.project("p1").expect("present"), *before);
            assert_eq!(remote.calls().len(), calls);
            assert_eq!(remote.call_count(RemoteOp::CreateTask), 0);
            assert_eq!(remote.call_count(RemoteOp::UpdateTask), 0);

            board
                .create_task(
                    "p1",
                    Column::Todo,
                    TaskDraft {
                        title: "On time".into(),
                        deadline: Some(date(2026, 3, 1)),
                        ..TaskDraft::default()
                    },
                )
                .expect("deadline equal to project's is allowed")
                .settled()
                .await;
            assert_eq!(board.project("p1").expect("present").tasks.todo.len(), 2);
        })
        .await;
}

#[tokio::test]
async fn project_deadline_cannot_precede_task_deadlines() {
    LocalSet::new()
        .run_until(async {
            let remote = Rc::new(MemoryRemote::new());
            let board = board_for(&remote, &LocalBus::default(), "a@x.com");
            let id = board
                .create_project(ProjectDraft::named("Alpha"))
                .expect("accepted")
                .settled()
                .await;
            board
                .create_task(
                    &id,
                    Column::Todo,
                    TaskDraft {
                        title: "Review".into(),
                        deadline: Some(date(2026, 2, 20)),
                        ..TaskDraft::default()
                    },
                )
                .expect("accepted")
                .settled()
                .await;

            let err = board
                .update_project(
                    &id,
                    ProjectPatch {
                        deadline: Some(Some(date(2026, 2, 1))),
                        ..ProjectPatch::default()
                    },
                )
                .expect_err("earlier than a task");
            assert_eq!(err.code(), ErrorCode::DeadlineBeforeTasks);
            assert_eq!(board.project(&id).expect("present").deadline, None);
        })
        .await;
}

#[tokio::test]
async fn blank_names_are_invalid() {
    LocalSet::new()
        .run_until(async {
            let remote = Rc::new(MemoryRemote::new());
            let board = board_for(&remote, &LocalBus::default(), "a@x.com");
            let err = board
                .create_project(ProjectDraft::named("   "))
                .expect_err("blank");
            assert_eq!(err.code(), ErrorCode::InvalidInput);

            let err = board
                .add_collaborator("p1", "not an identity")
                .expect_err("missing project");
            assert_eq!(err.code(), ErrorCode::ProjectNotFound);
            assert_eq!(board.store().borrow().project_count(), 0);
        })
        .await;
}

// ---------------------------------------------------------------------------
// Optimistic apply
// ---------------------------------------------------------------------------

#[tokio::test]
async fn collaborator_add_is_idempotent() {
    LocalSet::new()
        .run_until(async {
            let remote = Rc::new(MemoryRemote::new());
            remote.seed_project(shared_project("p1", "a@x.com", &[], &[]));
            let board = loaded_board(&remote, "a@x.com").await;

            let first = board.add_collaborator("p1", "b@x.com").expect("accepted");
            assert!(first.dispatched());
            first.settled().await;
            let size = board.project("p1").expect("present").members.len();

            let second = board.add_collaborator("p1", "  B@x.COM").expect("accepted");
            assert!(!second.dispatched());
            assert_eq!(board.project("p1").expect("present").members.len(), size);
            assert_eq!(remote.call_count(RemoteOp::AddMember), 1);
        })
        .await;
}

#[tokio::test]
async fn failed_collaborator_add_keeps_local_member() {
    LocalSet::new()
        .run_until(async {
            let remote = Rc::new(MemoryRemote::new());
            remote.seed_project(shared_project("p1", "a@x.com", &[], &[]));
            let board = loaded_board(&remote, "a@x.com").await;
            remote.set_offline(true);

            board
                .add_collaborator("p1", "b@x.com")
                .expect("accepted")
                .settled()
                .await;

            assert!(
                board
                    .project("p1")
                    .expect("present")
                    .members
                    .contains(&ident("b@x.com"))
            );
            assert!(
                !remote
                    .project("p1")
                    .expect("server")
                    .members
                    .contains(&ident("b@x.com"))
            );
        })
        .await;
}

#[tokio::test]
async fn provisional_deletes_never_reach_the_remote() {
    LocalSet::new()
        .run_until(async {
            let remote = Rc::new(MemoryRemote::new());
            remote.set_offline(true);
            let board = board_for(&remote, &LocalBus::default(), "a@x.com");
            let id = board
                .create_project(ProjectDraft::named("Offline"))
                .expect("accepted")
                .settled()
                .await;
            let task = board
                .create_task(&id, Column::Todo, TaskDraft::titled("local"))
                .expect("accepted");
            assert!(!task.dispatched());

            assert!(!board.delete_task(&id, &task.value).expect("accepted").dispatched());
            assert!(!board.delete_project(&id).expect("accepted").dispatched());
            assert!(board.project(&id).is_none());
            assert_eq!(remote.call_count(RemoteOp::DeleteTask), 0);
            assert_eq!(remote.call_count(RemoteOp::DeleteProject), 0);
        })
        .await;
}

#[tokio::test]
async fn move_to_same_column_is_a_no_op() {
    LocalSet::new()
        .run_until(async {
            let remote = Rc::new(MemoryRemote::new());
            remote.seed_project(shared_project("p1", "a@x.com", &[], &["t1"]));
            let board = loaded_board(&remote, "a@x.com").await;
            let revision = board.store().borrow().revision();

            let moved = board.move_task("p1", "t1", Column::Todo).expect("accepted");
            assert!(!moved.dispatched());
            assert_eq!(board.store().borrow().revision(), revision);

            let missing = board
                .move_task("p1", "t404", Column::Done)
                .expect_err("absent task");
            assert_eq!(missing.code(), ErrorCode::TaskNotFound);
        })
        .await;
}

#[tokio::test]
async fn task_update_adopts_confirmed_fields() {
    LocalSet::new()
        .run_until(async {
            let remote = Rc::new(MemoryRemote::new());
            remote.seed_project(shared_project("p1", "a@x.com", &[], &["t1"]));
            let board = loaded_board(&remote, "a@x.com").await;

            board
                .update_task(
                    "p1",
                    "t1",
                    TaskPatch {
                        title: Some("  Polished  ".into()),
                        labels: Some(vec!["docs".into(), " docs".into()]),
                        ..TaskPatch::default()
                    },
                )
                .expect("accepted")
                .settled()
                .await;

            let local = board.project("p1").expect("present");
            let task = local.tasks.task("t1").expect("present");
            assert_eq!(task.title, "Polished");
            assert_eq!(task.labels, vec!["docs".to_string()]);
            let server = remote.project("p1").expect("server");
            assert_eq!(server.tasks.task("t1").expect("present").title, "Polished");
        })
        .await;
}

// ---------------------------------------------------------------------------
// Local-first under remote failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offline_move_survives_later_successful_sync() {
    LocalSet::new()
        .run_until(async {
            let remote = Rc::new(MemoryRemote::new());
            remote.seed_project(shared_project("p1", "a@x.com", &["b@x.com"], &["t1", "t2"]));
            let board = loaded_board(&remote, "b@x.com").await;

            remote.set_offline(true);
            board
                .move_task("p1", "t1", Column::Done)
                .expect("accepted")
                .settled()
                .await;
            let local = board.project("p1").expect("present");
            assert_eq!(column_of(&local, "t1"), Some(Column::Done));

            remote.set_offline(false);
            let unrelated = board
                .move_task("p1", "t2", Column::InProgress)
                .expect("accepted");
            assert!(unrelated.dispatched());
            unrelated.settled().await;

            let server = remote.project("p1").expect("server");
            assert_eq!(column_of(&server, "t1"), Some(Column::Todo));

            board.load_projects().expect("signed in").settled().await;

            let local = board.project("p1").expect("present");
            assert_eq!(column_of(&local, "t1"), Some(Column::Done));
            assert_eq!(column_of(&local, "t2"), Some(Column::InProgress));
            assert_eq!(local.tasks.len(), 2);
        })
        .await;
}

#[tokio::test]
async fn move_snapshot_contributes_members_only() {
    LocalSet::new()
        .run_until(async {
            let remote = Rc::new(MemoryRemote::new());
            remote.seed_project(shared_project("p1", "a@x.com", &["b@x.com"], &["t1"]));
            let board = loaded_board(&remote, "b@x.com").await;

            // Changes made on the server by another client.
            let mut other = remote.project("p1").expect("server");
            other.members.insert(ident("c@x.com"));
            other.name = "Renamed elsewhere".into();
            remote.seed_project(other);

            board
                .move_task("p1", "t1", Column::InProgress)
                .expect("accepted")
                .settled()
                .await;

            let local = board.project("p1").expect("present");
            assert!(local.members.contains(&ident("c@x.com")));
            assert_eq!(local.name, "p1");
        })
        .await;
}

#[tokio::test]
async fn load_skips_known_and_locally_deleted_projects() {
    LocalSet::new()
        .run_until(async {
            let remote = Rc::new(MemoryRemote::new());
            remote.seed_project(shared_project("p1", "a@x.com", &[], &[]));
            remote.seed_project(shared_project("p2", "a@x.com", &[], &[]));
            remote.seed_project(shared_project("p3", "z@x.com", &[], &[]));
            let board = loaded_board(&remote, "a@x.com").await;
            assert_eq!(board.visible_projects().len(), 2);

            board
                .update_project(
                    "p1",
                    ProjectPatch {
                        name: Some("Local name".into()),
                        ..ProjectPatch::default()
                    },
                )
                .expect("accepted");
            remote.set_offline(true);
            board.delete_project("p2").expect("accepted").settled().await;
            remote.set_offline(false);

            board.load_projects().expect("signed in").settled().await;

            let visible = board.visible_projects();
            assert_eq!(visible.len(), 1);
            assert_eq!(visible[0].name, "Local name");
            assert!(remote.project("p2").is_some());
        })
        .await;
}
