//! Answer-to-reset capture and command/response exchanges

use std::sync::Arc;

use colored::Colorize;
use nexum_sim_core::EmulatedSim;
use nexum_sim_driver::{Mode, Notifications, Session};
use tracing::{debug, info, warn};

use super::{EmulatedDriver, WAIT, module, parse_hex, pump};

/// Loop bound for playing the card side of a transmission
const MAX_SHIFTS: usize = 1_000;

/// Capture an ATR sent by the emulated card
pub(crate) fn atr_command(
    driver: &EmulatedDriver,
    sims: &[Arc<EmulatedSim>],
    index: usize,
    atr: &str,
    parity_errors: &[usize],
) -> eyre::Result<()> {
    let atr = parse_hex("ATR", atr)?;
    if atr.is_empty() {
        eyre::bail!("ATR must not be empty");
    }
    let sim = module(sims, index)?;

    let session = driver.open()?;
    session.attach_interrupts(index)?;
    session.stage_receive(index, Mode::ResetDetect, atr.len())?;

    for (i, &byte) in atr.iter().enumerate() {
        if parity_errors.contains(&i) {
            debug!(i, byte, "sending with parity error");
            sim.card_send_with_parity_error(byte);
        } else {
            sim.card_send(&[byte]);
        }
    }
    pump(driver, sim, index)?;

    let notes = session.wait_for(Notifications::DATA_READY | Notifications::FATAL_ERROR, Some(WAIT))?;
    info!(?notes, "answer to reset received");

    let meta = session.meta(index)?;
    let captured = session.read_buffer(index, 0, meta.write_cursor)?;
    println!("{} {}", "ATR:".bold(), hex::encode_upper(&captured).green());
    if captured.as_ref() != atr.as_slice() {
        warn!("captured ATR differs from what the card sent");
    }
    Ok(())
}

/// Send `command`, let the card answer with `response`, and print both
pub(crate) fn transmit_command(
    driver: &EmulatedDriver,
    sims: &[Arc<EmulatedSim>],
    index: usize,
    command: &str,
    response: &str,
) -> eyre::Result<()> {
    let command = parse_hex("command", command)?;
    let response = parse_hex("response", response)?;
    let sim = module(sims, index)?;

    let session = driver.open()?;
    session.attach_interrupts(index)?;
    session.stage_transmit(index, &command, response.len())?;

    let seen = play_transmission(driver, &session, sim, index)?;
    debug!(?seen, "transmission finished");
    let shifted = sim.take_shifted();
    println!("{} {}", ">>".bold(), hex::encode_upper(&shifted).cyan());

    if response.is_empty() {
        return Ok(());
    }

    sim.card_send(&response);
    pump(driver, sim, index)?;
    let notes = session.wait_for(Notifications::DATA_READY | Notifications::FATAL_ERROR, Some(WAIT))?;
    if notes.contains(Notifications::FATAL_ERROR) {
        let meta = session.meta(index)?;
        warn!(error = ?meta.error, "transaction failed");
    }

    let meta = session.meta(index)?;
    let received = session.read_buffer(index, 0, meta.write_cursor)?;
    println!("{} {}", "<<".bold(), hex::encode_upper(&received).green());

    let stats = session.stats(index)?;
    println!(
        "{} refills={} parity_dropped={} truncated={} overruns={}",
        "stats:".bold(),
        stats.refills,
        stats.parity_dropped,
        stats.truncated,
        stats.overruns
    );
    Ok(())
}

/// Shift bytes out of the transmit FIFO until the driver reports completion
fn play_transmission(
    driver: &EmulatedDriver,
    session: &Session<'_, Arc<EmulatedSim>, nexum_sim_driver::NullPlatform>,
    sim: &EmulatedSim,
    index: usize,
) -> eyre::Result<Notifications> {
    let mut seen = Notifications::empty();
    for _ in 0..MAX_SHIFTS {
        pump(driver, sim, index)?;
        seen |= session.take_notifications();
        if seen.contains(Notifications::TX_COMPLETE) {
            return Ok(seen);
        }
        if seen.contains(Notifications::FATAL_ERROR) {
            eyre::bail!("transmission aborted: {:?}", session.meta(index)?.error);
        }
        sim.shift_out(usize::MAX);
    }
    eyre::bail!("transmission did not complete")
}
