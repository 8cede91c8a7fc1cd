//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds with the same tab and fault parameters, collecting
//! pass/fail results and the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use boardsync_core::config::ChatConfig;
use serde::{Deserialize, Serialize};

use crate::clock::ClockConfig;
use crate::faults::FaultConfig;
use crate::oracle::{InvariantViolation, OracleResult, SyncOracle};
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Campaign-level configuration: which seeds to run and the simulation
/// parameters shared by every seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    pub tab_count: usize,
    pub rounds: u64,
    /// Remote call drop probability (percent, 0–100).
    pub fault_drop_percent: u8,
    /// Per-round probability that the remote is offline (percent, 0–100).
    pub fault_offline_percent: u8,
    /// Per-round probability that remote calls are held until the round
    /// ends (percent, 0–100).
    pub fault_hold_percent: u8,
    /// Chat settings for every tab, usually from the resolved config.
    pub chat: ChatConfig,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let fault = FaultConfig::default();
        Self {
            seed_range: 0..100,
            tab_count: 3,
            rounds: 24,
            fault_drop_percent: fault.drop_rate_percent,
            fault_offline_percent: fault.offline_rate_percent,
            fault_hold_percent: fault.hold_rate_percent,
            chat: ChatConfig::default(),
        }
    }
}

impl CampaignConfig {
    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            tab_count: self.tab_count,
            rounds: self.rounds,
            fault: FaultConfig {
                drop_rate_percent: self.fault_drop_percent,
                offline_rate_percent: self.fault_offline_percent,
                hold_rate_percent: self.fault_hold_percent,
            },
            clock: ClockConfig::default(),
            chat: self.chat,
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.tab_count == 0 {
            bail!("tab_count must be > 0");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        if self.chat.channel_capacity == 0 {
            bail!("chat.channel_capacity must be > 0");
        }
        Ok(())
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds that ran at least one faulty round.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    /// True if every seed passed.
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Full result of replaying one seed.
#[derive(Debug, Clone)]
pub struct DetailedTrace {
    pub result: SimulationResult,
    pub oracle: OracleResult,
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation encounters
/// an internal error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
    };

    for seed in config.seed_range.clone() {
        let trace = run_seed(seed, config)?;
        report.seeds_run += 1;
        if trace.result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }
        if trace.oracle.passed {
            report.seeds_passed += 1;
            continue;
        }
        tracing::warn!(seed, violations = trace.oracle.violations.len(), "seed failed");
        report.first_failure.get_or_insert(seed);
        report.failures.push(SeedFailure {
            seed,
            violations: trace.oracle.violations.iter().map(format_violation).collect(),
        });
    }

    Ok(report)
}

/// Run a single seed and return `Ok(())` on pass, `Err(violations)` on
/// failure.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the simulation itself fails to run. The
/// inner `Result` distinguishes pass from invariant violations.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let trace = run_seed(seed, config)?;
    if trace.oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(trace.oracle.violations))
    }
}

/// Replay a single seed with full trace details for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;
    run_seed(seed, config)
}

fn run_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;
    let oracle = SyncOracle::check_all(&result.states, &result.trace);
    Ok(DetailedTrace { result, oracle })
}

/// Format an invariant violation into a human-readable string.
#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::ColumnExclusivity {
            tab,
            project,
            task,
            columns,
        } => format!(
            "ColumnExclusivity: tab {tab} holds task {task} of {project} in {columns:?}"
        ),
        InvariantViolation::Conservation {
            tab,
            round,
            project,
            before,
            after,
        } => format!(
            "Conservation: tab {tab} round {round} move changed {project} from {before} to {after} tasks"
        ),
        InvariantViolation::StaleProvisional { tab, id } => {
            format!("StaleProvisional: tab {tab} still stores confirmed id {id}")
        }
        InvariantViolation::DuplicateProject { tab, project } => {
            format!("DuplicateProject: tab {tab} stores {project} in several partitions")
        }
        InvariantViolation::CreatorMembership { tab, project } => {
            format!("CreatorMembership: tab {tab} project {project} lost its creator")
        }
        InvariantViolation::ChatDuplicate {
            tab,
            thread,
            message,
        } => format!("ChatDuplicate: tab {tab} thread {thread} lists {message} twice"),
        InvariantViolation::ChatConvergence {
            tab_a,
            tab_b,
            thread,
            only_in_a,
            only_in_b,
        } => format!(
            "ChatConvergence: tabs {tab_a} and {tab_b} diverge on {thread} \
             (only_in_a={only_in_a:?}, only_in_b={only_in_b:?})"
        ),
    }
}
