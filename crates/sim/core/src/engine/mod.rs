//! Transfer engines driven by the data interrupt
//!
//! Each engine works on a locked [`ReaderContext`] and the reader's
//! [`RegisterView`], and returns the notification bits it wants raised. The
//! caller decides which engine runs from [`ReaderContext::mode`].

pub mod reset;
pub mod rx;
pub mod tx;

use tracing::debug;

use crate::context::{Mode, ReaderContext};
use crate::registers::{Enable, IntMask, RegisterBank, RegisterView};

/// Switch the reader to `mode` and program the hardware for it
///
/// Data interrupt sources of the previous mode are masked before the new
/// mode's sources are unmasked.
pub fn enter_mode<B: RegisterBank>(ctx: &mut ReaderContext, regs: &RegisterView<B>, mode: Mode) {
    regs.mask_irq(IntMask::RIM | IntMask::ETCIM | IntMask::TDTFM);
    debug!(reader = ctx.index(), from = ?ctx.mode, to = ?mode, "mode switch");
    ctx.mode = mode;
    match mode {
        Mode::Receive => rx::setup(ctx, regs),
        Mode::Transmit => {
            regs.set_enable(Enable::RCV_EN, false);
            tx::setup(ctx, regs);
        }
        Mode::ResetDetect => reset::setup(ctx, regs),
    }
}
