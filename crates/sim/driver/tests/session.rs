//! Control surface behaviour over the emulated block

mod common;

use std::time::Duration;

use nexum_sim_core::registers::{Register, RegisterBank};
use nexum_sim_driver::{
    Error, IrqReturn, Mode, Notifications, SimConfig, TimerKind, TransactionMeta, VoltageLevel,
};

#[test]
fn test_second_open_is_rejected() {
    let (driver, _sim) = common::single();
    let first = driver.open().unwrap();
    assert_eq!(driver.open().unwrap_err(), Error::SessionBusy);

    // the rejected open changed nothing
    assert_eq!(first.meta(0).unwrap(), TransactionMeta::default());

    first.close();
    let again = driver.open().unwrap();
    drop(again);
    assert!(driver.open().is_ok());
}

#[test]
fn test_handlers_untouched_before_attach() {
    let (driver, sim) = common::single();
    let session = driver.open().unwrap();
    session.stage_receive(0, Mode::Receive, 2).unwrap();

    sim.card_send(&[0x90, 0x00]);
    assert_eq!(driver.handle_data_irq(0).unwrap(), IrqReturn::NotAttached);
    assert_eq!(driver.handle_general_irq(0).unwrap(), IrqReturn::NotAttached);
    assert_eq!(sim.read(Register::RcvFifoCnt), 2);

    session.attach_interrupts(0).unwrap();
    assert_eq!(driver.handle_data_irq(0).unwrap(), IrqReturn::Handled);
    assert_eq!(session.read_buffer(0, 0, 2).unwrap().as_ref(), &[0x90, 0x00]);
    assert_eq!(driver.handle_data_irq(0).unwrap(), IrqReturn::None);
}

#[test]
fn test_misuse_fails_single_request() {
    let (driver, _sims) = common::driver(SimConfig::default().with_modules(2));
    let session = driver.open().unwrap();

    assert_eq!(session.meta(2).unwrap_err(), Error::InvalidReader(2));
    assert_eq!(
        session.read_register(0, 0x14).unwrap_err(),
        Error::InvalidRegister(0x14)
    );
    assert_eq!(
        session.write_register(1, 0x7C, 0).unwrap_err(),
        Error::InvalidRegister(0x7C)
    );
    assert!(driver.handle_data_irq(7).is_err());
    assert_eq!(session.set_voltage(0, 9).unwrap_err(), Error::InvalidVoltage(9));
    assert!(matches!(
        session.read_buffer(0, 399, 2).unwrap_err(),
        Error::BufferOutOfRange { .. }
    ));

    // the other module is unaffected
    session.replace_buffer(1, &[1, 2, 3]).unwrap();
    assert_eq!(session.meta(1).unwrap().tx_length, 3);
}

#[test]
fn test_transmit_register_write_advances_cursor() {
    let (driver, sim) = common::driver(
        SimConfig::default()
            .with_limits(nexum_sim_driver::ModuleLimits::new().with_buffer_capacity(2)),
    );
    let session = driver.open().unwrap();
    let xmt_buf = Register::XmtBuf.offset();

    session.write_register(0, xmt_buf, 0xA0).unwrap();
    assert_eq!(session.meta(0).unwrap().write_cursor, 1);
    session.write_register_masked(0, xmt_buf, 0xFF, 0xA4).unwrap();
    assert_eq!(session.meta(0).unwrap().write_cursor, 2);
    session.write_register(0, xmt_buf, 0x00).unwrap();
    assert_eq!(session.meta(0).unwrap().write_cursor, 2);

    assert_eq!(sim[0].shift_out(8), vec![0xA0, 0xA4, 0x00]);

    // other registers leave the cursor alone
    session
        .write_register(0, Register::Divisor.offset(), 372)
        .unwrap();
    assert_eq!(session.read_register(0, Register::Divisor.offset()).unwrap(), 372);
    assert_eq!(session.meta(0).unwrap().write_cursor, 2);
}

#[test]
fn test_masked_register_access() {
    let (driver, _sim) = common::single();
    let session = driver.open().unwrap();
    let divisor = Register::Divisor.offset();

    session.write_register(0, divisor, 0x1234).unwrap();
    session.write_register_masked(0, divisor, 0x00F0, 0xFFFF).unwrap();
    assert_eq!(session.read_register(0, divisor).unwrap(), 0x12F4);
    assert_eq!(session.read_register_masked(0, divisor, 0x0F00).unwrap(), 0x0200);
}

#[test]
fn test_meta_snapshot_and_replace() {
    let (driver, _sim) = common::single();
    let session = driver.open().unwrap();

    let meta = TransactionMeta {
        write_cursor: 3,
        expected_length: 10,
        tx_length: 5,
        error: None,
    };
    session.set_meta(0, meta).unwrap();
    assert_eq!(session.meta(0).unwrap(), meta);

    let oversized = TransactionMeta {
        expected_length: 401,
        ..meta
    };
    assert_eq!(
        session.set_meta(0, oversized).unwrap_err(),
        Error::LengthExceedsCapacity {
            len: 401,
            capacity: 400
        }
    );
    assert_eq!(session.meta(0).unwrap(), meta);
}

#[test]
fn test_platform_delegation() {
    let (driver, _sim) = common::single();
    let session = driver.open().unwrap();

    session.set_voltage(0, 1).unwrap();
    assert_eq!(driver.platform().voltage(0), Some(VoltageLevel::V1_8));
    assert_eq!(session.peripheral_clock_hz(0).unwrap(), 66_000_000);
    session.configure_pins(0).unwrap();
}

#[test]
fn test_wait_with_unbounded_timeout() {
    let (driver, _sim) = common::single();
    let session = driver.open().unwrap();

    session.set_timeout(0, TimerKind::Gpcnt, 0).unwrap();
    assert_eq!(
        session.wait(Some(Duration::MAX)).unwrap(),
        Notifications::GPCNT_ELAPSED
    );
}

#[test]
fn test_out_of_range_error_displays() {
    let (driver, _sim) = common::single();
    let session = driver.open().unwrap();

    let err = session.read_buffer(0, usize::MAX, 2).unwrap_err();
    assert!(matches!(err, Error::BufferOutOfRange { .. }));
    assert!(err.to_string().contains("outside capacity 400"));
}

#[test]
fn test_shutdown_detaches_everything() {
    let (driver, sim) = common::single();
    {
        let session = driver.open().unwrap();
        session.attach_interrupts(0).unwrap();
    }
    driver.shutdown();
    driver.shutdown();

    sim.set_presence(true);
    assert_eq!(driver.handle_general_irq(0).unwrap(), IrqReturn::NotAttached);
    assert_eq!(driver.open().unwrap_err(), Error::Shutdown);
    assert!(driver.is_shut_down());
}
