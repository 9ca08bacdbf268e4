//! Presence debouncing, offline and through the driver's presence thread

use std::sync::Arc;

use colored::Colorize;
use nexum_sim_core::{EmulatedSim, PresenceEvent, PresenceState, PresenceTracker};
use nexum_sim_driver::Notifications;
use tracing::info;

use super::{EmulatedDriver, WAIT, module, pump};

/// Run a sample string through a [`PresenceTracker`] and print every event
pub(crate) fn debounce_command(samples: &str, initially_present: bool, threshold: u32) -> eyre::Result<()> {
    let levels = parse_samples(samples)?;
    for (i, event) in debounce(&levels, initially_present, threshold) {
        println!("sample {i}: {}", describe(event));
    }
    Ok(())
}

/// Insert a card, then remove it, reporting what the driver debounced
pub(crate) fn presence_command(
    driver: &EmulatedDriver,
    sims: &[Arc<EmulatedSim>],
    index: usize,
) -> eyre::Result<()> {
    let sim = module(sims, index)?;
    let session = driver.open()?;
    session.attach_interrupts(index)?;

    for present in [true, false] {
        sim.set_presence(present);
        pump(driver, sim, index)?;
        let notes = session.wait_for(Notifications::PRESENCE, Some(WAIT))?;
        info!(?notes, present, "presence cycle finished");
        match session.take_presence_event(index)? {
            Some(event) => println!("reader {index}: {}", describe(event)),
            None => eyre::bail!("reader {index} raised {notes:?} without an event"),
        }
    }
    Ok(())
}

fn parse_samples(samples: &str) -> eyre::Result<Vec<bool>> {
    samples
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .map(|c| match c {
            '1' => Ok(true),
            '0' => Ok(false),
            other => Err(eyre::eyre!("invalid pin sample {other:?}, expected 0 or 1")),
        })
        .collect()
}

/// Debounce `levels` the way a presence thread does: a sample differing from
/// the accepted level outside a cycle counts as the edge that starts one
fn debounce(levels: &[bool], initially_present: bool, threshold: u32) -> Vec<(usize, PresenceEvent)> {
    let mut tracker = PresenceTracker::new(PresenceState::from_pin(initially_present), threshold);
    let mut events = Vec::new();
    for (i, &level) in levels.iter().enumerate() {
        if !tracker.in_cycle() && PresenceState::from_pin(level) != tracker.accepted() {
            tracker.begin_cycle();
        }
        if let Some(event) = tracker.feed(level) {
            events.push((i, event));
        }
    }
    events
}

fn describe(event: PresenceEvent) -> colored::ColoredString {
    match event {
        PresenceEvent::Inserted => "card inserted".green(),
        PresenceEvent::Removed => "card removed".yellow(),
        PresenceEvent::Bounce => "bounce".red(),
    }
}
