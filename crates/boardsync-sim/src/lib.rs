//! boardsync-sim library.
//!
//! Deterministic multi-tab simulation of the boardsync engine. Several
//! signed-in boards share one in-memory remote and one local chat bus; a
//! seeded random stream picks their actions and injects remote faults, and
//! [`oracle::SyncOracle`] checks the drained state.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).

pub mod campaign;
pub mod clock;
pub mod faults;
pub mod oracle;
pub mod rng;
pub mod tab;

use std::rc::Rc;

use anyhow::{Context, Result, bail};
use boardsync_core::config::{ChatConfig, SyncConfig};
use boardsync_core::{Column, Identity, MemoryRemote, Project, ProjectDraft, Task, TaskDraft};
use serde::{Deserialize, Serialize};
use tokio::task::LocalSet;
use tracing::{debug, info};

use crate::clock::ClockConfig;
use crate::faults::{FaultConfig, RemoteFaults};
use crate::rng::DeterministicRng;
use crate::tab::{ActionOutcome, SHARED_PROJECT, SimulatedTab, TabAction, TabId, TabState};

/// Scheduler turns granted to remote continuations after each round.
const YIELDS_PER_ROUND: usize = 8;

/// Tasks seeded into the shared project before the first round.
const SEEDED_TASKS: [&str; 4] = ["s1", "s2", "s3", "s4"];

/// Parameters for one simulated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub tab_count: usize,
    pub rounds: u64,
    pub fault: FaultConfig,
    pub clock: ClockConfig,
    /// Chat settings every tab's board is built with.
    pub chat: ChatConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            tab_count: 3,
            rounds: 24,
            fault: FaultConfig::default(),
            clock: ClockConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

/// One entry of the simulation trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub round: u64,
    /// `None` for events about the shared remote.
    pub tab: Option<TabId>,
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEventKind {
    Action {
        action: TabAction,
        outcome: ActionOutcome,
    },
    RemoteOffline,
    RemoteHeld,
    RemoteReleased,
    ChatDelivered {
        count: usize,
    },
    Drained {
        remote_calls: usize,
        dropped_calls: usize,
    },
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub trace: Vec<TraceEvent>,
    pub states: Vec<TabState>,
    /// At least one round ran with the remote offline or held, or a call
    /// was dropped.
    pub interesting_state_reached: bool,
}

impl SimulationResult {
    /// Number of tab actions recorded in the trace.
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.trace
            .iter()
            .filter(|event| matches!(event.kind, TraceEventKind::Action { .. }))
            .count()
    }
}

/// Drives a set of tabs through seeded rounds.
#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
}

impl Simulator {
    /// # Errors
    ///
    /// Returns an error if the config has no tabs, no rounds, or a fault
    /// rate above 100 percent.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.tab_count == 0 {
            bail!("tab_count must be > 0");
        }
        if config.rounds == 0 {
            bail!("rounds must be > 0");
        }
        let rates = [
            config.fault.drop_rate_percent,
            config.fault.offline_rate_percent,
            config.fault.hold_rate_percent,
        ];
        if rates.iter().any(|rate| *rate > 100) {
            bail!("fault rates are percentages and must be <= 100");
        }
        Ok(Self { config })
    }

    /// Run the simulation to completion on a fresh single-threaded runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be built or a tab cannot open
    /// its board or join the shared project.
    pub fn run(&mut self) -> Result<SimulationResult> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .context("failed to build simulation runtime")?;
        LocalSet::new().block_on(&runtime, self.drive())
    }

    async fn drive(&self) -> Result<SimulationResult> {
        let SimulationConfig {
            seed,
            tab_count,
            rounds,
            fault,
            clock,
            chat,
        } = self.config;
        let mut world = DeterministicRng::fork(seed, 0);
        let faults = RemoteFaults::new(DeterministicRng::fork(seed, 1), fault.drop_rate_percent);
        let dropped = faults.dropped_counter();
        let armed = faults.arm_switch();
        let remote = Rc::new(MemoryRemote::with_faults(Box::new(faults)));
        let sync = SyncConfig {
            chat,
            ..SyncConfig::default()
        };
        let bus = chat.local_bus();

        let identities = (0..tab_count)
            .map(tab_identity)
            .collect::<Result<Vec<_>>>()?;
        remote.seed_project(shared_project(&identities)?);

        let mut tabs = Vec::with_capacity(tab_count);
        for (index, identity) in identities.iter().enumerate() {
            let mut rng = DeterministicRng::fork(seed, 2 + index as u64);
            let tab_clock = Rc::new(clock.assign(&mut rng));
            let tab = SimulatedTab::new(
                index,
                identity.clone(),
                &sync,
                remote.clone(),
                bus.clone(),
                tab_clock,
                rng,
            )
            .with_context(|| format!("tab {index} failed to open its board"))?;
            tabs.push(tab);
        }
        armed.set(false);
        for tab in &mut tabs {
            tab.join(identities.clone())
                .await
                .with_context(|| format!("tab {} failed to join", tab.id()))?;
        }
        armed.set(true);

        let mut trace = Vec::new();
        let mut interesting = false;
        for round in 0..rounds {
            let offline = world.hit_rate_percent(fault.offline_rate_percent);
            let held = world.hit_rate_percent(fault.hold_rate_percent);
            remote.set_offline(offline);
            if offline {
                trace.push(TraceEvent::remote(round, TraceEventKind::RemoteOffline));
            }
            if held {
                remote.hold();
                trace.push(TraceEvent::remote(round, TraceEventKind::RemoteHeld));
            }
            interesting |= offline || held;

            for tab in &mut tabs {
                let (action, outcome) = tab.step(round);
                trace.push(TraceEvent {
                    round,
                    tab: Some(tab.id()),
                    kind: TraceEventKind::Action { action, outcome },
                });
            }
            yield_to_continuations().await;
            if held {
                remote.release();
                trace.push(TraceEvent::remote(round, TraceEventKind::RemoteReleased));
                yield_to_continuations().await;
            }
            deliver_all(&tabs, round, &mut trace);
        }

        remote.set_offline(false);
        remote.release();
        for tab in &mut tabs {
            tab.settle().await;
        }
        deliver_all(&tabs, rounds, &mut trace);

        let dropped_calls = dropped.get();
        interesting |= dropped_calls > 0;
        let remote_calls = remote.calls().len();
        trace.push(TraceEvent::remote(
            rounds,
            TraceEventKind::Drained {
                remote_calls,
                dropped_calls,
            },
        ));
        info!(seed, tab_count, rounds, remote_calls, dropped_calls, "simulation drained");

        Ok(SimulationResult {
            seed,
            trace,
            states: tabs.iter().map(SimulatedTab::snapshot).collect(),
            interesting_state_reached: interesting,
        })
    }
}

impl TraceEvent {
    const fn remote(round: u64, kind: TraceEventKind) -> Self {
        Self {
            round,
            tab: None,
            kind,
        }
    }
}

async fn yield_to_continuations() {
    for _ in 0..YIELDS_PER_ROUND {
        tokio::task::yield_now().await;
    }
}

fn deliver_all(tabs: &[SimulatedTab], round: u64, trace: &mut Vec<TraceEvent>) {
    for tab in tabs {
        let count = tab.deliver();
        if count > 0 {
            debug!(tab = tab.id(), round, count, "chat delivered");
            trace.push(TraceEvent {
                round,
                tab: Some(tab.id()),
                kind: TraceEventKind::ChatDelivered { count },
            });
        }
    }
}

fn tab_identity(index: usize) -> Result<Identity> {
    let raw = format!("u{index}@sim.test");
    Identity::parse(&raw).with_context(|| format!("invalid simulated identity {raw}"))
}

/// Server-side project every tab is a member of, owned by the first tab.
fn shared_project(identities: &[Identity]) -> Result<Project> {
    let (owner, others) = identities
        .split_first()
        .context("simulation needs at least one tab")?;
    let mut project =
        Project::from_draft(SHARED_PROJECT, &ProjectDraft::named("Shared"), owner.clone());
    project.members.extend(others.iter().cloned());
    for id in SEEDED_TASKS {
        project
            .tasks
            .get_mut(Column::Todo)
            .push(Task::from_draft(id, &TaskDraft::titled(id)));
    }
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::SyncOracle;

    #[test]
    fn zero_tabs_rejected() {
        let config = SimulationConfig {
            tab_count: 0,
            ..SimulationConfig::default()
        };
        assert!(Simulator::new(config).is_err());
    }

    #[test]
    fn fault_rate_above_hundred_rejected() {
        let mut config = SimulationConfig::default();
        config.fault.hold_rate_percent = 101;
        assert!(Simulator::new(config).is_err());
    }

    #[test]
    fn default_run_passes_the_oracle() {
        let mut sim = Simulator::new(SimulationConfig::default()).expect("valid config");
        let result = sim.run().expect("run");
        assert_eq!(result.states.len(), 3);
        assert_eq!(result.action_count(), 3 * 24);
        let oracle = SyncOracle::check_all(&result.states, &result.trace);
        assert!(oracle.passed, "{:?}", oracle.violations);
    }

    #[test]
    fn every_tab_sees_the_shared_project() {
        let config = SimulationConfig {
            seed: 11,
            rounds: 4,
            ..SimulationConfig::default()
        };
        let result = Simulator::new(config).expect("valid").run().expect("run");
        for state in &result.states {
            assert!(
                state.projects.iter().any(|p| p.id == SHARED_PROJECT),
                "tab {} lost the shared project",
                state.tab
            );
            assert!(state.threads.contains_key(SHARED_PROJECT));
        }
    }

    #[test]
    fn same_seed_same_run() {
        let config = SimulationConfig {
            seed: 5,
            tab_count: 4,
            rounds: 12,
            ..SimulationConfig::default()
        };
        let a = Simulator::new(config).expect("valid").run().expect("run a");
        let b = Simulator::new(config).expect("valid").run().expect("run b");
        assert_eq!(a, b);
    }
}
