//! Seed campaigns: one simulated session per seed, judged by the oracle.
//!
//! A failing seed is fully reproducible, so the report keeps the lowest one
//! for `replay_seed`.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::network::FaultConfig;
use crate::oracle::{InvariantViolation, OracleResult, SessionOracle};
use crate::scenario::ScenarioConfig;
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Seeds to run plus the session and network knobs shared by every seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Half-open, e.g. `0..100`.
    pub seed_range: Range<u64>,
    /// Top-level user steps per session.
    pub steps: usize,
    /// Tickets seeded on the server.
    pub ticket_count: usize,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    /// Percentage of fetches and status changes that fail in transit.
    pub fault_error_percent: u8,
    pub fault_duplicate_percent: u8,
    pub fault_reorder_percent: u8,
    /// Percentage of push handshakes refused.
    pub fault_channel_percent: u8,
    pub realtime: bool,
    pub mutations: bool,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let scenario = ScenarioConfig::default();
        let fault = FaultConfig::default();
        Self {
            seed_range: 0..100,
            steps: scenario.steps,
            ticket_count: scenario.ticket_count,
            min_latency_ms: fault.min_latency_ms,
            max_latency_ms: fault.max_latency_ms,
            fault_error_percent: fault.error_rate_percent,
            fault_duplicate_percent: fault.duplicate_rate_percent,
            fault_reorder_percent: fault.reorder_rate_percent,
            fault_channel_percent: fault.channel_failure_percent,
            realtime: true,
            mutations: true,
        }
    }
}

impl CampaignConfig {
    /// Per-seed simulator settings; debounce stays in step with the engine.
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        let base = SimulationConfig::default();
        SimulationConfig {
            seed,
            scenario: ScenarioConfig {
                steps: self.steps,
                ticket_count: self.ticket_count,
                ..base.scenario
            },
            fault: FaultConfig {
                min_latency_ms: self.min_latency_ms,
                max_latency_ms: self.max_latency_ms,
                error_rate_percent: self.fault_error_percent,
                duplicate_rate_percent: self.fault_duplicate_percent,
                reorder_rate_percent: self.fault_reorder_percent,
                channel_failure_percent: self.fault_channel_percent,
            },
            realtime: self.realtime,
            mutations: self.mutations,
            ..base
        }
    }

    /// # Errors
    ///
    /// Fails on an empty seed range, zero steps, inverted latency bounds or a
    /// percentage above 100.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range {:?} contains no seeds", self.seed_range);
        }
        if self.steps == 0 {
            bail!("steps must be > 0");
        }
        if self.min_latency_ms > self.max_latency_ms {
            bail!("min_latency_ms must be <= max_latency_ms");
        }
        for (name, value) in [
            ("fault_error_percent", self.fault_error_percent),
            ("fault_duplicate_percent", self.fault_duplicate_percent),
            ("fault_reorder_percent", self.fault_reorder_percent),
            ("fault_channel_percent", self.fault_channel_percent),
        ] {
            if value > 100 {
                bail!("{name} must be within 0..=100, got {value}");
            }
        }
        Ok(())
    }
}

/// One seed the oracle rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    /// Rendered violations, in oracle order.
    pub violations: Vec<String>,
}

/// Outcome of [`run_campaign`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// Lowest failing seed.
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds that hit a clamp, a stale response and a reconnect.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A replayed seed: the whole run plus the oracle's verdict.
#[derive(Debug, Clone, Serialize)]
pub struct DetailedTrace {
    pub result: SimulationResult,
    pub oracle: OracleResult,
}

/// Simulate every seed in `config.seed_range`.
///
/// # Errors
///
/// Fails on an invalid config or when a session never settles. Oracle
/// failures are reported, not returned as errors.
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
        report.seeds_run += 1;
        let (run, oracle) = simulate(seed, config)?;
        report.interesting_states_reached += usize::from(run.interesting_state_reached);
        if oracle.passed {
            report.seeds_passed += 1;
            continue;
        }
        warn!(seed, violations = oracle.violations.len(), "seed failed");
        report.first_failure.get_or_insert(seed);
        report.failures.push(SeedFailure {
            seed,
            violations: oracle.violations.iter().map(ToString::to_string).collect(),
        });
    }

    info!(
        seeds_run = report.seeds_run,
        seeds_passed = report.seeds_passed,
        interesting = report.interesting_states_reached,
        "campaign finished"
    );
    Ok(report)
}

/// Verdict for one seed: the inner `Err` carries the violations.
///
/// # Errors
///
/// The outer error means the simulation could not run at all.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let (_, oracle) = simulate(seed, config)?;
    if oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(oracle.violations))
    }
}

/// Re-run `seed` and keep everything it produced.
///
/// # Errors
///
/// Same conditions as [`run_campaign`].
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;
    let (result, oracle) = simulate(seed, config)?;
    Ok(DetailedTrace { result, oracle })
}

fn simulate(seed: u64, config: &CampaignConfig) -> Result<(SimulationResult, OracleResult)> {
    let run = Simulator::new(config.sim_config_for_seed(seed))?.run()?;
    let oracle = SessionOracle::check_all(&run.observations);
    Ok((run, oracle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(CampaignConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_seed_range_is_rejected() {
        let config = CampaignConfig {
            seed_range: 5..5,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_latency_is_rejected() {
        let config = CampaignConfig {
            min_latency_ms: 900,
            max_latency_ms: 100,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn percentages_above_hundred_are_named() {
        let config = CampaignConfig {
            fault_reorder_percent: 140,
            ..CampaignConfig::default()
        };
        let err = config.validate().expect_err("out of range");
        assert!(err.to_string().contains("fault_reorder_percent"));
    }

    #[test]
    fn per_seed_config_carries_knobs() {
        let config = CampaignConfig {
            steps: 12,
            fault_error_percent: 0,
            ..CampaignConfig::default()
        };
        let sim = config.sim_config_for_seed(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.scenario.steps, 12);
        assert_eq!(sim.fault.error_rate_percent, 0);
        assert_eq!(sim.scenario.debounce_ms, sim.engine.debounce_ms);
    }

    #[test]
    fn seed_zero_passes() {
        let config = CampaignConfig {
            seed_range: 0..1,
            steps: 20,
            ..CampaignConfig::default()
        };
        let verdict = run_single_seed(0, &config).expect("simulate");
        assert_eq!(verdict, Ok(()));
    }

    #[test]
    fn ten_seeds_pass_with_default_faults() {
        let config = CampaignConfig {
            seed_range: 0..10,
            steps: 24,
            ..CampaignConfig::default()
        };
        let report = run_campaign(&config).expect("campaign");
        assert_eq!((report.seeds_run, report.seeds_passed), (10, 10), "{:?}", report.failures);
        assert!(report.all_passed() && report.first_failure.is_none());
    }

    #[test]
    fn replaying_a_seed_twice_matches() {
        let config = CampaignConfig::default();
        let first = replay_seed(7, &config).expect("replay 1");
        let second = replay_seed(7, &config).expect("replay 2");
        assert!(!first.result.trace.is_empty());
        assert_eq!(first.result.trace, second.result.trace);
        assert_eq!(first.result.observations, second.result.observations);
        assert_eq!(first.oracle, second.oracle);
    }

    #[test]
    fn report_json_names_first_failure() {
        let report = CampaignReport {
            seeds_run: 10,
            seeds_passed: 9,
            first_failure: Some(7),
            failures: vec![SeedFailure {
                seed: 7,
                violations: vec!["StaleRender: rendered #3 while #4 was the latest request".into()],
            }],
            interesting_states_reached: 2,
        };
        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(value["first_failure"], 7);
        assert_eq!(value["failures"][0]["seed"], 7);
    }
}
