//! Common test utilities

#![allow(dead_code, unreachable_pub)]

use std::sync::Arc;

use nexum_sim_core::EmulatedSim;
use nexum_sim_driver::{Notifications, NullPlatform, Session, SimConfig, SimDriver};

/// Driver over emulated register blocks
pub type EmulatedDriver = SimDriver<Arc<EmulatedSim>, NullPlatform>;

/// Build a driver over emulated blocks
pub fn driver(config: SimConfig) -> (EmulatedDriver, Vec<Arc<EmulatedSim>>) {
    SimDriver::emulated(config).expect("emulated driver")
}

/// Build a single-module driver with default limits and a fast presence poll
pub fn single() -> (EmulatedDriver, Arc<EmulatedSim>) {
    let (driver, mut sims) = driver(SimConfig::default().with_poll_interval_ms(2));
    let sim = sims.remove(0);
    (driver, sim)
}

/// Run both interrupt handlers of `index` for as long as the emulated block
/// reports an unmasked source; returns the number of handled rounds
pub fn pump(driver: &EmulatedDriver, sim: &EmulatedSim, index: usize) -> usize {
    let mut rounds = 0;
    for _ in 0..10_000 {
        let mut handled = false;
        if sim.data_irq_pending() {
            handled |= driver.handle_data_irq(index).unwrap().is_handled();
        }
        if sim.general_irq_pending() {
            handled |= driver.handle_general_irq(index).unwrap().is_handled();
        }
        if !handled {
            break;
        }
        rounds += 1;
    }
    rounds
}

/// Play the card side of a transmission until the driver reports completion
///
/// Returns every notification collected on the way.
pub fn transmit(
    driver: &EmulatedDriver,
    session: &Session<'_, Arc<EmulatedSim>, NullPlatform>,
    sim: &EmulatedSim,
    index: usize,
) -> Notifications {
    let mut seen = Notifications::empty();
    for _ in 0..1_000 {
        pump(driver, sim, index);
        seen |= session.take_notifications();
        if seen.contains(Notifications::TX_COMPLETE) {
            break;
        }
        sim.shift_out(usize::MAX);
    }
    seen
}
