//! Register model and transfer engines for SIM smart-card reader modules
//!
//! This crate holds the hardware-facing half of the SIM reader driver: the
//! register map of the SIM block, the per-reader transaction state, and the
//! engines the interrupt handlers run against them.
//!
//! ## Overview
//!
//! - [`registers`]: register offsets, bit definitions and a lock-protected
//!   [`RegisterView`] over any [`RegisterBank`]
//! - [`engine`]: receive, transmit and answer-to-reset engines driven by the
//!   data interrupt
//! - [`timer`]: extends the 16-bit CWT and GPCNT counters to 32-bit logical
//!   timeouts
//! - [`debounce`]: consecutive-sample acceptance for the presence switch
//! - [`notify`]: the notification mask every producer reports through
//! - `emulator`: a software register block for host testing (feature
//!   `emulator`)
//!
//! The driver crate owns readers built from these parts and wires them to
//! interrupts, the presence thread and the control surface.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub use bytes::Bytes;

pub mod context;
pub mod debounce;
#[cfg(feature = "emulator")]
pub mod emulator;
pub mod engine;
pub mod limits;
pub mod notify;
pub mod registers;
pub mod timer;

mod error;
pub use error::{Error, Result};

pub use context::{Mode, ReaderContext, ReaderError, ReaderStats, TimerKind, TransactionMeta};
pub use debounce::{Debouncer, PresenceEvent, PresenceState, PresenceTracker};
#[cfg(feature = "emulator")]
pub use emulator::EmulatedSim;
pub use engine::rx::ParityPolicy;
pub use limits::ModuleLimits;
pub use notify::{Notifications, Notifier};
pub use registers::{Register, RegisterBank, RegisterView};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, Error, Mode, ModuleLimits, Notifications, ParityPolicy, PresenceEvent, Register,
        RegisterBank, RegisterView, Result, TimerKind, TransactionMeta,
    };
}
