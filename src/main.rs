use std::cell::RefCell;

use cronsim::{CalendarTime, RunOutcome, SimResult, Simulator, SimulationBuilder, Window};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Household state carried through the simulation.
struct Household {
    rubbish_level: u32,
    log: Vec<(i64, u32)>,
    rng: RefCell<StdRng>,
}

fn log_data(sim: &mut Simulator<Household>) -> cronsim::CallbackResult {
    let now = sim.now().seconds();
    let level = sim.context().rubbish_level;
    sim.context_mut().log.push((now, level));
    Ok(())
}

fn empty_rubbish(sim: &mut Simulator<Household>) -> cronsim::CallbackResult {
    sim.context_mut().rubbish_level = 0;
    Ok(())
}

fn take_out_trash(sim: &mut Simulator<Household>) -> cronsim::CallbackResult {
    let added = sim.context().rng.borrow_mut().random_range(0..=10);
    sim.context_mut().rubbish_level += added;
    Ok(())
}

fn main() -> SimResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let household = Household {
        rubbish_level: 0,
        log: Vec::new(),
        rng: RefCell::new(StdRng::seed_from_u64(42)),
    };

    let (mut sim, calendar) = SimulationBuilder::new(household)
        .timezone("Australia/Brisbane")
        .starting(CalendarTime::date(2016, 12, 1).in_zone("Australia/Sydney"))
        .ending(CalendarTime::new(2017, 5, 31, 23, 59, 59).in_zone("America/New_York"))
        .cron(("*/30 * * * *", "Australia/Brisbane"), 2, log_data)
        .cron("0 8 * * 1", 1, empty_rubbish)
        .cron_within(
            "0 20 * * *",
            Window::between(
                CalendarTime::date(2017, 1, 1),
                CalendarTime::new(2017, 4, 30, 23, 59, 59),
            ),
            1,
            take_out_trash,
        )
        .build()?;

    info!(pending = sim.pending_count(), "scenario loaded");
    let outcome = sim.run()?;
    info!(
        ?outcome,
        processed = sim.events_processed(),
        "simulation finished"
    );

    let household = sim.context();
    let peak = household.log.iter().map(|(_, level)| *level).max().unwrap_or(0);
    println!("samples logged: {}", household.log.len());
    println!("peak rubbish level: {}", peak);
    if let Some((time, level)) = household.log.last() {
        let local = calendar.to_local(cronsim::SimTime::new(*time), None)?;
        println!("last sample: {} -> {}", local.format("%Y-%m-%d %H:%M %Z"), level);
    }
    if outcome == RunOutcome::HorizonReached {
        println!("{} events left beyond the horizon", sim.live_count());
    }
    Ok(())
}
