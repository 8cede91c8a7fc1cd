#![forbid(unsafe_code)]

use std::env;

use anyhow::{Context, Result, bail};
use boardsync_core::config::resolve_config;
use boardsync_sim::campaign::{CampaignConfig, format_violation, replay_seed, run_campaign};
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Run seeded multi-tab simulations of the boardsync engine.
#[derive(Parser, Debug)]
#[command(
    name = "boardsync-sim",
    version,
    after_help = "EXAMPLES:\n    # Run seeds 0..100 with default faults\n    boardsync-sim\n\n    # Replay one seed and print its trace as JSON\n    boardsync-sim --seed 17 --json"
)]
struct Args {
    /// Replay a single seed instead of running a campaign.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of seeds to run, starting at 0.
    #[arg(long, default_value_t = 100)]
    seeds: u64,

    /// Simulated tabs per seed.
    #[arg(long, default_value_t = 3)]
    tabs: usize,

    /// Rounds per seed.
    #[arg(long, default_value_t = 24)]
    rounds: u64,

    /// Percentage of remote calls dropped.
    #[arg(long, default_value_t = 5)]
    drop: u8,

    /// Per-round percentage chance of holding remote calls.
    #[arg(long, default_value_t = 20)]
    hold: u8,

    /// Emit JSON instead of a summary line.
    #[arg(long)]
    json: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("BOARDSYNC_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "boardsync=debug,info"
        } else {
            "boardsync=info,warn"
        })
    });

    let format = env::var("BOARDSYNC_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false)).init();
        }
        _ => {
            registry.with(fmt::layer().compact()).init();
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cwd = env::current_dir().context("failed to read working directory")?;
    let sync = resolve_config(&cwd)?;
    debug!(
        capacity = sync.chat.channel_capacity,
        hydrate = sync.chat.hydrate_history,
        "resolved chat config"
    );
    if let Some(path) = &sync.store.snapshot_path {
        warn!(path = %path.display(), "snapshot_path ignored; simulated tabs keep their stores in memory");
    }
    let config = CampaignConfig {
        seed_range: 0..args.seeds,
        tab_count: args.tabs,
        rounds: args.rounds,
        fault_drop_percent: args.drop,
        fault_hold_percent: args.hold,
        chat: sync.chat,
        ..CampaignConfig::default()
    };

    if let Some(seed) = args.seed {
        let replay = replay_seed(seed, &CampaignConfig {
            seed_range: seed..seed.saturating_add(1),
            ..config
        })?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&replay.result)?);
        } else {
            println!(
                "seed {seed}: actions={} interesting={} passed={}",
                replay.result.action_count(),
                replay.result.interesting_state_reached,
                replay.oracle.passed
            );
        }
        for violation in &replay.oracle.violations {
            eprintln!("  {}", format_violation(violation));
        }
        if !replay.oracle.passed {
            bail!("seed {seed} violated {} invariant(s)", replay.oracle.violations.len());
        }
        return Ok(());
    }

    let report = run_campaign(&config)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "campaign complete: seeds={} passed={} interesting={}",
            report.seeds_run, report.seeds_passed, report.interesting_states_reached
        );
    }
    if let Some(seed) = report.first_failure {
        bail!(
            "{} seed(s) failed; replay the first with --seed {seed}",
            report.failures.len()
        );
    }
    Ok(())
}
