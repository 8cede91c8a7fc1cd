//! Shared helpers for the boardsync-core integration tests.
#![allow(dead_code)]

use std::rc::Rc;

use boardsync_core::ids::IdGenerator;
use boardsync_core::{
    Board, BoardStore, Column, Identity, LocalBus, MemoryRemote, Project, ProjectDraft, Task,
    TaskDraft,
};

pub fn ident(raw: &str) -> Identity {
    Identity::parse(raw).expect("valid identity")
}

/// A signed-in board over `remote` and `bus` with a seeded id generator.
pub fn board_for(remote: &Rc<MemoryRemote>, bus: &LocalBus, actor: &str) -> Board {
    let board = Board::new(remote.clone(), bus.clone()).with_ids(IdGenerator::seeded(7));
    board.sign_in(ident(actor));
    board
}

/// Server-side project `id` owned by `owner`, shared with `members`, holding
/// `todo` tasks by id.
pub fn shared_project(id: &str, owner: &str, members: &[&str], todo: &[&str]) -> Project {
    let mut project = Project::from_draft(id, &ProjectDraft::named(id), ident(owner));
    for member in members {
        project.members.insert(ident(member));
    }
    for task_id in todo {
        project
            .tasks
            .get_mut(Column::Todo)
            .push(Task::from_draft(*task_id, &TaskDraft::titled(*task_id)));
    }
    project
}

/// Every project or task id in the store that is still provisional.
pub fn provisional_ids(store: &BoardStore) -> Vec<String> {
    let mut out = Vec::new();
    for (_, project) in store.projects() {
        if project.id.starts_with("temp-") {
            out.push(project.id.clone());
        }
        for (_, task) in project.tasks.iter() {
            if task.id.starts_with("temp-") {
                out.push(task.id.clone());
            }
        }
    }
    out
}

pub fn column_of(project: &Project, task_id: &str) -> Option<Column> {
    project.tasks.position(task_id).map(|(column, _)| column)
}
