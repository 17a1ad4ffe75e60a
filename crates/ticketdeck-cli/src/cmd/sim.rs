//! `td sim`: deterministic simulation of a browsing session.
//!
//! `td sim run` executes a campaign across many seeds.
//! `td sim replay` replays a single seed with its full trace.

use std::io::{self, Write};
use std::process;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use ticketdeck_sim::campaign::{self, CampaignConfig, DetailedTrace};

use super::CommandContext;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct SimArgs {
    #[command(subcommand)]
    pub command: SimCommand,
}

#[derive(Subcommand, Debug)]
pub enum SimCommand {
    #[command(
        about = "Run a simulation campaign across multiple seeds",
        long_about = "Drive the engine through generated sessions of typing, paging, status\n\
                      changes and push traffic over a faulty simulated network. Reports\n\
                      pass/fail per seed and the first failure for replay.",
        after_help = "EXAMPLES:\n    # Run 100 seeds with defaults\n    td sim run --seeds 100\n\n\
                      # Harsher network\n    td sim run --seeds 200 --faults 0.4 --max-latency 1500\n\n\
                      # Machine-readable output\n    td sim run --seeds 100 --format json"
    )]
    Run(SimRunArgs),

    #[command(
        about = "Replay a single seed with detailed trace output",
        long_about = "Replay one seed to get its execution trace, engine counters and\n\
                      oracle verdict. Use after a campaign failure to debug.",
        after_help = "EXAMPLES:\n    # Replay seed 42\n    td sim replay --seed 42\n\n\
                      # Include every trace event\n    td sim replay --seed 42 --trace\n\n\
                      # Machine-readable output\n    td sim replay --seed 42 --format json"
    )]
    Replay(SimReplayArgs),
}

/// Session parameters shared by `run` and `replay`.
#[derive(Args, Debug, Clone)]
pub struct SimParams {
    /// User steps per session.
    #[arg(long, default_value = "40")]
    pub steps: usize,

    /// Tickets seeded on the simulated server.
    #[arg(long, default_value = "60")]
    pub tickets: usize,

    /// Overall fault probability between 0.0 and 1.0 (scales errors,
    /// duplicates, reordering and refused push handshakes).
    #[arg(long, default_value = "0.1")]
    pub faults: f64,

    #[arg(long, default_value = "20")]
    pub min_latency: u64,

    /// Maximum response latency in milliseconds.
    #[arg(long, default_value = "600")]
    pub max_latency: u64,

    /// Run without the push channel.
    #[arg(long)]
    pub no_realtime: bool,

    /// Run without status changes.
    #[arg(long)]
    pub no_mutations: bool,
}

#[derive(Args, Debug)]
pub struct SimRunArgs {
    /// Number of seeds to run.
    #[arg(long, default_value = "100")]
    pub seeds: u64,

    #[arg(long, default_value = "0")]
    pub seed_start: u64,

    #[command(flatten)]
    pub params: SimParams,
}

#[derive(Args, Debug)]
pub struct SimReplayArgs {
    /// Seed to replay.
    #[arg(long)]
    pub seed: u64,

    /// Print every trace event.
    #[arg(long)]
    pub trace: bool,

    #[command(flatten)]
    pub params: SimParams,
}

const FAILURE_SAMPLES: usize = 5;

#[derive(Debug, Serialize)]
struct RunOutput {
    seeds_run: usize,
    seeds_passed: usize,
    seeds_failed: usize,
    first_failure: Option<u64>,
    interesting_states_reached: usize,
    all_passed: bool,
    failures: Vec<campaign::SeedFailure>,
    #[serde(skip)]
    steps: usize,
    #[serde(skip)]
    tickets: usize,
    #[serde(skip)]
    faults: f64,
}

impl RunOutput {
    fn new(report: campaign::CampaignReport, params: &SimParams) -> Self {
        Self {
            seeds_run: report.seeds_run,
            seeds_passed: report.seeds_passed,
            seeds_failed: report.failures.len(),
            first_failure: report.first_failure,
            interesting_states_reached: report.interesting_states_reached,
            all_passed: report.all_passed(),
            failures: report.failures,
            steps: params.steps,
            tickets: params.tickets,
            faults: params.faults,
        }
    }

    fn replay_command(&self, seed: u64) -> String {
        format!(
            "td sim replay --seed {seed} --steps {} --faults {}",
            self.steps, self.faults
        )
    }

    const fn unshown_failures(&self) -> usize {
        self.failures.len().saturating_sub(FAILURE_SAMPLES)
    }
}

fn campaign_config(seed_start: u64, seeds: u64, params: &SimParams) -> CampaignConfig {
    CampaignConfig {
        seed_range: seed_start..seed_start.saturating_add(seeds),
        steps: params.steps,
        ticket_count: params.tickets,
        min_latency_ms: params.min_latency,
        max_latency_ms: params.max_latency,
        fault_error_percent: scale_fault(params.faults, 50),
        fault_duplicate_percent: scale_fault(params.faults, 30),
        fault_reorder_percent: scale_fault(params.faults, 100),
        fault_channel_percent: scale_fault(params.faults, 100),
        realtime: !params.no_realtime,
        mutations: !params.no_mutations,
    }
}

/// `--faults` is a 0..=1 rate; each fault kind gets `rate * weight` percent.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_fault(rate: f64, weight: u8) -> u8 {
    (rate * f64::from(weight)).clamp(0.0, 100.0).round() as u8
}

fn write_run_text(out: &RunOutput, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "campaign seeds_run={} steps={} tickets={} faults_pct={:.0}",
        out.seeds_run,
        out.steps,
        out.tickets,
        out.faults * 100.0
    )?;
    writeln!(
        w,
        "results passed={} failed={} interesting_states={} all_passed={}",
        out.seeds_passed, out.seeds_failed, out.interesting_states_reached, out.all_passed
    )?;
    for failure in out.failures.iter().take(FAILURE_SAMPLES) {
        writeln!(w, "failure seed={} violations={}", failure.seed, failure.violations.len())?;
    }
    if out.unshown_failures() > 0 {
        writeln!(w, "failures_truncated count={}", out.unshown_failures())?;
    }
    if let Some(seed) = out.first_failure {
        writeln!(w, "hint replay={:?}", out.replay_command(seed))?;
    }
    Ok(())
}

fn write_run_pretty(out: &RunOutput, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Simulation Campaign")?;
    pretty_kv(w, "Seeds", out.seeds_run.to_string())?;
    pretty_kv(w, "Steps", out.steps.to_string())?;
    pretty_kv(w, "Tickets", out.tickets.to_string())?;
    pretty_kv(w, "Fault rate", format!("{:.0}%", out.faults * 100.0))?;
    pretty_kv(
        w,
        "Results",
        format!(
            "{} ok, {} failed, {} reached an interesting state",
            out.seeds_passed, out.seeds_failed, out.interesting_states_reached
        ),
    )?;
    let Some(first) = out.first_failure else {
        return pretty_kv(w, "Status", "all seeds passed");
    };
    pretty_kv(w, "Status", format!("first failing seed is {first}"))?;
    writeln!(w)?;
    pretty_section(w, "Failing Seeds")?;
    for failure in out.failures.iter().take(FAILURE_SAMPLES) {
        writeln!(w, "seed {}", failure.seed)?;
        for violation in &failure.violations {
            writeln!(w, "    {violation}")?;
        }
    }
    if out.unshown_failures() > 0 {
        writeln!(w, "({} more not shown)", out.unshown_failures())?;
    }
    writeln!(w)?;
    pretty_kv(w, "Replay", out.replay_command(first))
}

/// Execute `td sim run`. Exits 1 when any seed fails.
pub fn run_sim_run(args: &SimRunArgs, output: OutputMode) -> Result<()> {
    let config = campaign_config(args.seed_start, args.seeds, &args.params);
    let report = campaign::run_campaign(&config)?;
    let out = RunOutput::new(report, &args.params);
    render_mode(output, &out, write_run_text, write_run_pretty)?;
    if !out.all_passed {
        process::exit(1);
    }
    Ok(())
}

#[derive(Serialize)]
struct ReplayOutput<'a> {
    #[serde(flatten)]
    detail: &'a DetailedTrace,
    #[serde(skip)]
    seed: u64,
    #[serde(skip)]
    steps: usize,
    #[serde(skip)]
    trace: bool,
}

fn write_replay_text(out: &ReplayOutput<'_>, w: &mut dyn Write) -> io::Result<()> {
    let run = &out.detail.result;
    let stats = &run.stats;
    writeln!(
        w,
        "replay seed={} steps={} actions={}",
        out.seed,
        out.steps,
        run.scenario.actions.len()
    )?;
    writeln!(
        w,
        "result oracle_passed={} issued={} accepted={} stale={} renders={} errors={} clamp_refetches={} interesting_state_reached={}",
        out.detail.oracle.passed,
        stats.pipeline.issued,
        stats.pipeline.accepted,
        stats.pipeline.stale,
        stats.renders,
        stats.errors,
        stats.clamp_refetches,
        run.interesting_state_reached
    )?;
    for violation in &out.detail.oracle.violations {
        writeln!(w, "violation={violation}")?;
    }
    if out.trace {
        for event in &run.trace {
            writeln!(w, "trace at_ms={} what={:?}", event.at_ms, event.what)?;
        }
    }
    Ok(())
}

fn write_replay_pretty(out: &ReplayOutput<'_>, w: &mut dyn Write) -> io::Result<()> {
    let run = &out.detail.result;
    let stats = &run.stats;
    pretty_section(w, &format!("Seed {} ({} steps)", out.seed, out.steps))?;
    pretty_kv(w, "Actions", run.scenario.actions.len().to_string())?;
    pretty_kv(
        w,
        "Fetches",
        format!(
            "issued {}, accepted {}, dropped as stale {}",
            stats.pipeline.issued, stats.pipeline.accepted, stats.pipeline.stale
        ),
    )?;
    pretty_kv(
        w,
        "Debounce",
        format!(
            "scheduled {}, fired {}, cancelled {}",
            stats.debounce.scheduled, stats.debounce.fired, stats.debounce.cancelled
        ),
    )?;
    pretty_kv(w, "Renders", stats.renders.to_string())?;
    pretty_kv(w, "Errors", stats.errors.to_string())?;
    pretty_kv(w, "Clamps", stats.clamp_refetches.to_string())?;
    pretty_kv(w, "Interesting", run.interesting_state_reached.to_string())?;
    pretty_kv(
        w,
        "Oracle",
        if out.detail.oracle.passed { "pass" } else { "FAIL" },
    )?;
    if !out.detail.oracle.passed {
        writeln!(w)?;
        pretty_section(w, "Violations")?;
        for violation in &out.detail.oracle.violations {
            writeln!(w, "  {violation}")?;
        }
    }
    if out.trace {
        writeln!(w)?;
        pretty_section(w, "Trace")?;
        for event in &run.trace {
            writeln!(w, "{:>8}ms  {}", event.at_ms, event.what)?;
        }
    }
    Ok(())
}

/// Execute `td sim replay`. Exits 1 when the oracle rejects the run.
pub fn run_sim_replay(args: &SimReplayArgs, output: OutputMode) -> Result<()> {
    let config = campaign_config(args.seed, 1, &args.params);
    let detail = campaign::replay_seed(args.seed, &config)?;
    let out = ReplayOutput {
        detail: &detail,
        seed: args.seed,
        steps: args.params.steps,
        trace: args.trace,
    };
    render_mode(output, &out, write_replay_text, write_replay_pretty)?;
    if !detail.oracle.passed {
        process::exit(1);
    }
    Ok(())
}

/// Dispatch `td sim` subcommands.
pub fn run_sim(args: &SimArgs, ctx: &CommandContext) -> Result<()> {
    match &args.command {
        SimCommand::Run(run_args) => run_sim_run(run_args, ctx.output),
        SimCommand::Replay(replay_args) => run_sim_replay(replay_args, ctx.output),
    }
}
