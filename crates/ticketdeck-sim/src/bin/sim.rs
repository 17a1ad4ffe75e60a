#![forbid(unsafe_code)]

use anyhow::Result;
use ticketdeck_sim::oracle::SessionOracle;
use ticketdeck_sim::{SimulationConfig, Simulator};

fn main() -> Result<()> {
    let mut simulator = Simulator::new(SimulationConfig::default())?;
    let result = simulator.run()?;
    let oracle = SessionOracle::check_all(&result.observations);

    println!(
        "simulation complete: trace_events={} fetches={} stale={} passed={} interesting={}",
        result.trace.len(),
        result.stats.pipeline.issued,
        result.stats.pipeline.stale,
        oracle.passed,
        result.interesting_state_reached
    );
    for violation in &oracle.violations {
        println!("  {violation}");
    }

    Ok(())
}
