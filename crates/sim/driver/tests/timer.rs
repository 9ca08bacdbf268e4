//! Logical timeouts through the control surface and the general interrupt

mod common;

use std::time::Duration;

use nexum_sim_driver::{Notifications, TimerKind};

const WAIT: Option<Duration> = Some(Duration::from_secs(2));

#[test]
fn test_gpcnt_seventy_thousand_ticks() {
    let (driver, sim) = common::single();
    let session = driver.open().unwrap();
    session.attach_interrupts(0).unwrap();

    session.set_timeout(0, TimerKind::Gpcnt, 70_000).unwrap();
    assert_eq!(sim.loads(TimerKind::Gpcnt), vec![65_535]);
    assert_eq!(session.timeout_remaining(0, TimerKind::Gpcnt).unwrap(), 4_465);

    sim.expire(TimerKind::Gpcnt);
    common::pump(&driver, &sim, 0);
    assert_eq!(sim.loads(TimerKind::Gpcnt), vec![65_535, 4_465]);
    assert_eq!(session.timeout_remaining(0, TimerKind::Gpcnt).unwrap(), 0);
    assert!(session.take_notifications().is_empty());

    sim.expire(TimerKind::Gpcnt);
    common::pump(&driver, &sim, 0);
    let notes = session.wait_for(Notifications::TIMERS, WAIT).unwrap();
    assert_eq!(notes, Notifications::GPCNT_ELAPSED);
    assert_eq!(sim.loads(TimerKind::Gpcnt).len(), 2);
    assert_eq!(session.stats(0).unwrap().rollovers, 1);
}

#[test]
fn test_cwt_long_timeout() {
    let (driver, sim) = common::single();
    let session = driver.open().unwrap();
    session.attach_interrupts(0).unwrap();

    let ticks = 300_000;
    session.set_timeout(0, TimerKind::Cwt, ticks).unwrap();
    let mut expiries = 0;
    loop {
        sim.expire(TimerKind::Cwt);
        common::pump(&driver, &sim, 0);
        expiries += 1;
        if session.take_notifications().contains(Notifications::CWT_ELAPSED) {
            break;
        }
        assert!(expiries < 100);
    }

    let loads = sim.loads(TimerKind::Cwt);
    assert_eq!(loads.len(), 5);
    assert_eq!(loads.iter().sum::<u32>(), ticks);
    assert_eq!(expiries, loads.len());
}

#[test]
fn test_zero_timeout_elapses_at_once() {
    let (driver, sim) = common::single();
    let session = driver.open().unwrap();

    session.set_timeout(0, TimerKind::Cwt, 0).unwrap();
    let notes = session.wait_for(Notifications::CWT_ELAPSED, WAIT).unwrap();
    assert_eq!(notes, Notifications::CWT_ELAPSED);
    assert!(sim.loads(TimerKind::Cwt).is_empty());
}

#[test]
fn test_cancelled_timeout_never_reports() {
    let (driver, sim) = common::single();
    let session = driver.open().unwrap();
    session.attach_interrupts(0).unwrap();

    session.set_timeout(0, TimerKind::Gpcnt, 100).unwrap();
    session.cancel_timeout(0, TimerKind::Gpcnt).unwrap();
    sim.expire(TimerKind::Gpcnt);
    assert_eq!(common::pump(&driver, &sim, 0), 0);
    assert_eq!(
        session
            .wait_for(Notifications::TIMERS, Some(Duration::from_millis(20)))
            .unwrap_err(),
        nexum_sim_driver::Error::Timeout
    );
}
