use std::collections::{BTreeMap, BTreeSet};

use boardsync_core::Column;
use serde::{Deserialize, Serialize};

use crate::tab::{ActionOutcome, TabId, TabState};
use crate::{TraceEvent, TraceEventKind};

// ── Core result types ─────────────────────────────────────────────────────────

/// Outcome of one or more invariant checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

/// Diagnostic information for a single failed invariant check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvariantViolation {
    /// A task id is held by zero or several column slots.
    ColumnExclusivity {
        tab: TabId,
        project: String,
        task: String,
        columns: Vec<Column>,
    },

    /// A move changed how many tasks its project holds.
    Conservation {
        tab: TabId,
        round: u64,
        project: String,
        before: usize,
        after: usize,
    },

    /// A provisional id is still stored after its confirmed id was recorded.
    StaleProvisional { tab: TabId, id: String },

    /// The same project id sits in more than one partition.
    DuplicateProject { tab: TabId, project: String },

    /// A project's creator is missing from its members.
    CreatorMembership { tab: TabId, project: String },

    /// A thread holds the same message twice.
    ChatDuplicate {
        tab: TabId,
        thread: String,
        message: String,
    },

    /// Two tabs with the same thread open hold different messages.
    ChatConvergence {
        tab_a: TabId,
        tab_b: TabId,
        thread: String,
        only_in_a: Vec<String>,
        only_in_b: Vec<String>,
    },
}

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Checks board and chat invariants over the drained state of every tab.
///
/// # Invariants checked
///
/// 1. **Column exclusivity**: every task sits in exactly one column.
/// 2. **Conservation**: no move changed its project's task count.
/// 3. **Provisional closure**: no provisional id outlives its confirmation.
/// 4. **Single placement**: a project id lives in one partition.
/// 5. **Creator membership**: creators are members of their projects.
/// 6. **Chat dedupe**: a message appears once per thread.
/// 7. **Chat convergence**: tabs sharing a thread hold the same messages.
pub struct SyncOracle;

impl SyncOracle {
    /// Run every check.
    #[must_use]
    pub fn check_all(states: &[TabState], trace: &[TraceEvent]) -> OracleResult {
        Self::check_columns(states)
            .merge(Self::check_conservation(trace))
            .merge(Self::check_provisional_closure(states))
            .merge(Self::check_project_placement(states))
            .merge(Self::check_chat_dedupe(states))
            .merge(Self::check_chat_convergence(states))
    }

    #[must_use]
    pub fn check_columns(states: &[TabState]) -> OracleResult {
        let mut violations = Vec::new();
        for state in states {
            for project in &state.projects {
                let mut holders: BTreeMap<&str, Vec<Column>> = BTreeMap::new();
                for (column, task) in project.tasks.iter() {
                    holders.entry(task.id.as_str()).or_default().push(column);
                }
                violations.extend(holders.into_iter().filter(|(_, cols)| cols.len() != 1).map(
                    |(task, columns)| InvariantViolation::ColumnExclusivity {
                        tab: state.tab,
                        project: project.id.clone(),
                        task: task.to_string(),
                        columns,
                    },
                ));
            }
        }
        OracleResult::from_violations(violations)
    }

    /// Conservation is observed at action time; read the breaches back from
    /// the trace.
    #[must_use]
    pub fn check_conservation(trace: &[TraceEvent]) -> OracleResult {
        let violations = trace
            .iter()
            .filter_map(|event| match (&event.kind, event.tab) {
                (
                    TraceEventKind::Action {
                        outcome:
                            ActionOutcome::ConservationBreach {
                                project,
                                before,
                                after,
                            },
                        ..
                    },
                    Some(tab),
                ) => Some(InvariantViolation::Conservation {
                    tab,
                    round: event.round,
                    project: project.clone(),
                    before: *before,
                    after: *after,
                }),
                _ => None,
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_provisional_closure(states: &[TabState]) -> OracleResult {
        let violations = states
            .iter()
            .flat_map(|state| {
                state
                    .stale_provisional
                    .iter()
                    .map(|id| InvariantViolation::StaleProvisional {
                        tab: state.tab,
                        id: id.clone(),
                    })
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    /// Single placement and creator membership.
    #[must_use]
    pub fn check_project_placement(states: &[TabState]) -> OracleResult {
        let mut violations = Vec::new();
        for state in states {
            let mut seen = BTreeSet::new();
            for project in &state.projects {
                if !seen.insert(project.id.as_str()) {
                    violations.push(InvariantViolation::DuplicateProject {
                        tab: state.tab,
                        project: project.id.clone(),
                    });
                }
                if !project.members.contains(&project.created_by) {
                    violations.push(InvariantViolation::CreatorMembership {
                        tab: state.tab,
                        project: project.id.clone(),
                    });
                }
            }
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_chat_dedupe(states: &[TabState]) -> OracleResult {
        let mut violations = Vec::new();
        for state in states {
            for (thread, messages) in &state.threads {
                let mut seen = BTreeSet::new();
                for message in messages {
                    if !seen.insert(message) {
                        violations.push(InvariantViolation::ChatDuplicate {
                            tab: state.tab,
                            thread: thread.clone(),
                            message: message.clone(),
                        });
                    }
                }
            }
        }
        OracleResult::from_violations(violations)
    }

    /// Compares message sets, not order: a sender sees its own message
    /// before tabs that receive it over the bus.
    #[must_use]
    pub fn check_chat_convergence(states: &[TabState]) -> OracleResult {
        if states.len() < 2 {
            return OracleResult::pass();
        }
        let mut violations = Vec::new();
        for (i, a) in states.iter().enumerate() {
            for b in &states[i + 1..] {
                for (thread, a_messages) in &a.threads {
                    let Some(b_messages) = b.threads.get(thread) else {
                        continue;
                    };
                    let a_set: BTreeSet<&String> = a_messages.iter().collect();
                    let b_set: BTreeSet<&String> = b_messages.iter().collect();
                    if a_set == b_set {
                        continue;
                    }
                    violations.push(InvariantViolation::ChatConvergence {
                        tab_a: a.tab,
                        tab_b: b.tab,
                        thread: thread.clone(),
                        only_in_a: a_set.difference(&b_set).map(|s| (*s).clone()).collect(),
                        only_in_b: b_set.difference(&a_set).map(|s| (*s).clone()).collect(),
                    });
                }
            }
        }
        OracleResult::from_violations(violations)
    }
}
