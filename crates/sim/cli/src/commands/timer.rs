//! Logical timeouts run down on the emulated counters

use std::sync::Arc;

use colored::Colorize;
use nexum_sim_core::EmulatedSim;
use nexum_sim_driver::{Notifications, TimerKind};
use tracing::debug;

use super::{EmulatedDriver, module, pump};

/// Arm a timeout of `ticks` and expire the counter until it elapses
pub(crate) fn timer_command(
    driver: &EmulatedDriver,
    sims: &[Arc<EmulatedSim>],
    index: usize,
    kind: TimerKind,
    ticks: u32,
) -> eyre::Result<()> {
    let sim = module(sims, index)?;
    let elapsed = match kind {
        TimerKind::Cwt => Notifications::CWT_ELAPSED,
        TimerKind::Gpcnt => Notifications::GPCNT_ELAPSED,
    };

    let session = driver.open()?;
    session.attach_interrupts(index)?;
    session.set_timeout(index, kind, ticks)?;

    // one expiry per hardware load, plus slack for the final one
    let bound = ticks / driver.config().limits.counter_max.max(1) + 2;
    let mut expiries = 0;
    while !session.take_notifications().contains(elapsed) {
        if expiries > bound {
            eyre::bail!("{kind:?} timeout never elapsed");
        }
        debug!(remaining = session.timeout_remaining(index, kind)?, "counter expired");
        sim.expire(kind);
        pump(driver, sim, index)?;
        expiries += 1;
    }

    let loads = sim.loads(kind);
    println!("{} {kind:?} {ticks} ticks", "timeout:".bold());
    for (i, load) in loads.iter().enumerate() {
        println!("  load {i}: {load}");
    }
    println!(
        "{} after {} load(s), {} rollover(s)",
        "elapsed".green(),
        loads.len(),
        session.stats(index)?.rollovers
    );
    Ok(())
}
