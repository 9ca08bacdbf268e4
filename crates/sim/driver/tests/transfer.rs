//! Transmit, receive and answer-to-reset flows driven through the interrupt
//! entry points

mod common;

use std::time::Duration;

use nexum_sim_core::registers::{GPCNT_CLK_SEL, GpcntClock, RDT, Register};
use nexum_sim_driver::{
    Error, Mode, ModuleLimits, Notifications, ParityPolicy, ReaderError, SimConfig, SimDriver,
};

const WAIT: Option<Duration> = Some(Duration::from_secs(2));

#[test]
fn test_command_then_response() {
    let (driver, sim) = common::single();
    let session = driver.open().unwrap();
    session.attach_interrupts(0).unwrap();

    let command: Vec<u8> = (0..20).map(|i| 0x80 + i).collect();
    session.stage_transmit(0, &command, 2).unwrap();
    assert_eq!(session.mode(0).unwrap(), Mode::Transmit);

    let seen = common::transmit(&driver, &session, &sim, 0);
    assert!(seen.contains(Notifications::BUFFER_INDEX_CHANGED));
    assert!(seen.contains(Notifications::TX_COMPLETE));
    assert_eq!(sim.take_shifted(), command);
    assert_eq!(session.mode(0).unwrap(), Mode::Receive);
    assert!(session.all_sent(0).unwrap());
    assert!(session.clear_all_sent(0).unwrap());
    assert!(!session.all_sent(0).unwrap());

    let cntl = session.read_register(0, Register::Cntl.offset()).unwrap();
    assert_eq!(GPCNT_CLK_SEL.get(cntl), GpcntClock::Etu as u32);

    sim.card_send(&[0x90, 0x00]);
    common::pump(&driver, &sim, 0);
    let notes = session.wait_for(Notifications::DATA_READY, WAIT).unwrap();
    assert_eq!(notes, Notifications::DATA_READY);

    let meta = session.meta(0).unwrap();
    assert_eq!(meta.write_cursor, 2);
    assert_eq!(meta.expected_length, 2);
    assert_eq!(meta.error, None);
    assert_eq!(session.read_buffer(0, 0, 2).unwrap().as_ref(), &[0x90, 0x00]);
}

#[test]
fn test_empty_command_turns_around_at_once() {
    let (driver, sim) = common::single();
    let session = driver.open().unwrap();
    session.attach_interrupts(0).unwrap();

    session.stage_transmit(0, &[], 2).unwrap();
    let seen = common::transmit(&driver, &session, &sim, 0);
    assert!(seen.contains(Notifications::TX_COMPLETE));
    assert_eq!(session.mode(0).unwrap(), Mode::Receive);
    assert!(session.all_sent(0).unwrap());
    assert!(sim.take_shifted().is_empty());

    sim.card_send(&[0x6D, 0x00]);
    common::pump(&driver, &sim, 0);
    assert_eq!(
        session.wait_for(Notifications::DATA_READY, WAIT).unwrap(),
        Notifications::DATA_READY
    );
    assert_eq!(session.read_buffer(0, 0, 2).unwrap().as_ref(), &[0x6D, 0x00]);
}

#[test]
fn test_fifo_deeper_than_threshold_field_rejected() {
    let limits = ModuleLimits::new()
        .with_rx_fifo_depth(512)
        .with_buffer_capacity(1024);
    let err = SimDriver::emulated(SimConfig::default().with_limits(limits)).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_long_reception_keeps_threshold_programmed() {
    let limits = ModuleLimits::new()
        .with_rx_fifo_depth(511)
        .with_buffer_capacity(1024);
    let (driver, _sims) = common::driver(SimConfig::default().with_limits(limits));
    let session = driver.open().unwrap();
    session.stage_receive(0, Mode::Receive, 600).unwrap();

    let threshold = session.read_register(0, Register::RcvThreshold.offset()).unwrap();
    assert_eq!(RDT.get(threshold), 511);
}

#[test]
fn test_refills_follow_free_capacity() {
    let limits = ModuleLimits::new()
        .with_tx_fifo_depth(15)
        .with_tx_threshold(6);
    let (driver, sims) = common::driver(SimConfig::default().with_limits(limits));
    let sim = &sims[0];
    let session = driver.open().unwrap();
    session.attach_interrupts(0).unwrap();

    let command: Vec<u8> = (0..20).collect();
    session.stage_transmit(0, &command, 0).unwrap();

    common::transmit(&driver, &session, sim, 0);
    assert_eq!(session.stats(0).unwrap().refills, 3);
    assert_eq!(sim.take_shifted(), command);
}

#[test]
fn test_receive_drops_parity_errors() {
    let (driver, sim) = common::single();
    let session = driver.open().unwrap();
    session.attach_interrupts(0).unwrap();
    session.stage_receive(0, Mode::Receive, 3).unwrap();

    sim.card_send(&[0x61]);
    sim.card_send_with_parity_error(0x6C);
    sim.card_send(&[0x10, 0x20]);
    common::pump(&driver, &sim, 0);

    assert_eq!(session.read_buffer(0, 0, 3).unwrap().as_ref(), &[0x61, 0x10, 0x20]);
    assert_eq!(session.stats(0).unwrap().parity_dropped, 1);
    assert!(!session.take_notifications().contains(Notifications::PARITY_ERROR));
}

#[test]
fn test_receive_keeps_parity_errors_for_block_protocol() {
    let (driver, sim) = common::single();
    let session = driver.open().unwrap();
    session.attach_interrupts(0).unwrap();
    session.set_parity_policy(0, ParityPolicy::Preserve).unwrap();
    session.stage_receive(0, Mode::Receive, 2).unwrap();

    sim.card_send(&[0x00]);
    sim.card_send_with_parity_error(0x42);
    common::pump(&driver, &sim, 0);

    let notes = session.take_notifications();
    assert!(notes.contains(Notifications::DATA_READY | Notifications::PARITY_ERROR));
    assert_eq!(session.read_buffer(0, 0, 2).unwrap().as_ref(), &[0x00, 0x42]);
}

#[test]
fn test_answer_to_reset_kept_whole() {
    let (driver, sim) = common::single();
    let session = driver.open().unwrap();
    session.attach_interrupts(0).unwrap();
    session.stage_receive(0, Mode::ResetDetect, 4).unwrap();

    sim.card_send(&[0x3B, 0x9F]);
    sim.card_send_with_parity_error(0x95);
    sim.card_send(&[0x81]);
    common::pump(&driver, &sim, 0);

    assert_eq!(
        session.read_buffer(0, 0, 4).unwrap().as_ref(),
        &[0x3B, 0x9F, 0x95, 0x81]
    );
    assert_eq!(session.stats(0).unwrap().parity_dropped, 0);
}

#[test]
fn test_nack_threshold_is_fatal() {
    let (driver, sim) = common::single();
    let session = driver.open().unwrap();
    session.attach_interrupts(0).unwrap();
    session.stage_transmit(0, &[0xA0; 30], 2).unwrap();
    common::pump(&driver, &sim, 0);

    sim.nack_threshold_exceeded();
    common::pump(&driver, &sim, 0);

    let notes = session.wait_for(Notifications::FATAL_ERROR, WAIT).unwrap();
    assert_eq!(notes, Notifications::FATAL_ERROR);
    assert_eq!(session.meta(0).unwrap().error, Some(ReaderError::NackThreshold));

    // no retry: the transmitter stays idle
    sim.shift_out(usize::MAX);
    common::pump(&driver, &sim, 0);
    assert!(!session.all_sent(0).unwrap());
    assert_eq!(session.mode(0).unwrap(), Mode::Transmit);
}

#[test]
fn test_overrun_counted_not_surfaced() {
    let limits = ModuleLimits::new().with_rx_fifo_depth(4);
    let (driver, sims) = common::driver(SimConfig::default().with_limits(limits));
    let sim = &sims[0];
    let session = driver.open().unwrap();
    session.attach_interrupts(0).unwrap();
    session.stage_receive(0, Mode::Receive, 10).unwrap();

    sim.card_send(&[1, 2, 3, 4, 5, 6]);
    common::pump(&driver, sim, 0);

    assert_eq!(session.stats(0).unwrap().overruns, 1);
    assert_eq!(session.meta(0).unwrap().write_cursor, 4);
    let notes = session.take_notifications();
    assert_eq!(notes, Notifications::DATA_READY);
}

#[test]
fn test_oversized_response_truncated() {
    let limits = ModuleLimits::new().with_buffer_capacity(8);
    let (driver, sims) = common::driver(SimConfig::default().with_limits(limits));
    let sim = &sims[0];
    let session = driver.open().unwrap();
    session.attach_interrupts(0).unwrap();
    session.stage_receive(0, Mode::Receive, 8).unwrap();

    sim.card_send(&[0x55; 11]);
    common::pump(&driver, sim, 0);

    let notes = session.take_notifications();
    assert!(notes.contains(Notifications::FATAL_ERROR));
    let meta = session.meta(0).unwrap();
    assert_eq!(meta.write_cursor, 8);
    assert_eq!(meta.error, Some(ReaderError::BufferOverflow));
    assert_eq!(session.stats(0).unwrap().truncated, 3);
}
