use proptest::prelude::*;
use ticketdeck_sim::campaign::{CampaignConfig, replay_seed, run_campaign, run_single_seed};
use ticketdeck_sim::oracle::SessionOracle;
use ticketdeck_sim::{SimulationConfig, Simulator};

fn short_sessions() -> CampaignConfig {
    CampaignConfig {
        steps: 16,
        ticket_count: 35,
        ..CampaignConfig::default()
    }
}

#[test]
fn fifty_seeds_pass_with_default_faults() {
    let config = CampaignConfig {
        seed_range: 100..150,
        ..short_sessions()
    };
    let report = run_campaign(&config).expect("campaign runs");
    assert!(
        report.all_passed(),
        "first failure at seed {:?}: {:?}",
        report.first_failure,
        report.failures.first()
    );
}

#[test]
fn harsh_network_still_converges() {
    let config = CampaignConfig {
        seed_range: 0..20,
        max_latency_ms: 2_500,
        fault_error_percent: 25,
        fault_duplicate_percent: 15,
        fault_reorder_percent: 40,
        fault_channel_percent: 40,
        ..short_sessions()
    };
    let report = run_campaign(&config).expect("campaign runs");
    assert!(report.all_passed(), "{:?}", report.failures);
}

#[test]
fn without_collaborators_sessions_still_settle() {
    let config = CampaignConfig {
        seed_range: 0..10,
        realtime: false,
        mutations: false,
        ..short_sessions()
    };
    let report = run_campaign(&config).expect("campaign runs");
    assert!(report.all_passed(), "{:?}", report.failures);
    assert_eq!(report.interesting_states_reached, 0);
}

#[test]
fn slow_network_produces_stale_responses() {
    // latency well above the keystroke gap guarantees overlapping requests
    let config = CampaignConfig {
        seed_range: 0..1,
        steps: 60,
        min_latency_ms: 400,
        max_latency_ms: 3_000,
        ..CampaignConfig::default()
    };
    let trace = replay_seed(3, &config).expect("replay");
    assert!(trace.oracle.passed, "{:?}", trace.oracle.violations);
    assert!(trace.result.stats.pipeline.issued > trace.result.stats.pipeline.accepted);
}

#[test]
fn replay_matches_campaign_verdict() {
    let config = short_sessions();
    let verdict = run_single_seed(11, &config).expect("runs");
    let trace = replay_seed(11, &config).expect("replays");
    assert_eq!(verdict.is_ok(), trace.oracle.passed);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn any_seed_satisfies_the_oracle(seed in any::<u64>()) {
        let config = SimulationConfig {
            seed,
            ..SimulationConfig::default()
        };
        let mut simulator = Simulator::new(config).expect("valid config");
        let result = simulator.run().expect("settles");
        let oracle = SessionOracle::check_all(&result.observations);
        prop_assert!(oracle.passed, "seed {}: {:?}", seed, oracle.violations);
    }

    #[test]
    fn same_seed_same_trace(seed in 0_u64..10_000) {
        let config = SimulationConfig { seed, ..SimulationConfig::default() };
        let a = Simulator::new(config.clone()).expect("valid").run().expect("settles");
        let b = Simulator::new(config).expect("valid").run().expect("settles");
        prop_assert_eq!(a.trace, b.trace);
    }
}
