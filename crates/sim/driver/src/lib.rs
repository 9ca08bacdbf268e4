//! SIM smart-card reader driver
//!
//! Wires the engines of [`nexum_sim_core`] to interrupt entry points, a
//! presence-detect thread per module and a single-session control surface.
//!
//! ```no_run
//! # fn main() -> nexum_sim_core::Result<()> {
//! use std::time::Duration;
//! use nexum_sim_driver::{Notifications, SimConfig, SimDriver};
//!
//! let (driver, _sims) = SimDriver::emulated(SimConfig::default())?;
//! let session = driver.open()?;
//! session.attach_interrupts(0)?;
//! session.stage_transmit(0, &[0x00, 0xA4, 0x04, 0x00, 0x00], 2)?;
//! let notes = session.wait_for(Notifications::TX_COMPLETE, Some(Duration::from_secs(1)))?;
//! # let _ = notes;
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod platform;

mod dispatch;
mod driver;
mod presence;
mod reader;
mod session;

pub use config::{DebounceConfig, SimConfig};
pub use dispatch::IrqReturn;
pub use driver::SimDriver;
pub use platform::{NullPlatform, Platform, VoltageLevel};
pub use presence::PresenceSignal;
pub use session::Session;

pub use nexum_sim_core::{
    Error, Mode, ModuleLimits, Notifications, ParityPolicy, PresenceEvent, ReaderError,
    ReaderStats, Result, TimerKind, TransactionMeta,
};
