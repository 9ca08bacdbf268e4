//! Receive engine

use tracing::{trace, warn};

use crate::context::{ReaderContext, ReaderError};
use crate::notify::Notifications;
use crate::registers::{Enable, IntMask, RDT, RegisterBank, RegisterView};

/// What the receive engine does with a character flagged with a parity error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ParityPolicy {
    /// Drop the character silently (T=0: the card repeats it after the NACK)
    #[default]
    Discard,
    /// Store the character and raise [`Notifications::PARITY_ERROR`] (T=1:
    /// the block checksum decides)
    Preserve,
}

/// Receive threshold for the next interrupt
///
/// The remaining byte count capped at the FIFO depth while more bytes are
/// expected, otherwise 1. Never 0, and never wider than the RDT field.
pub fn next_threshold(expected: usize, cursor: usize, fifo_depth: u16) -> u16 {
    if expected > cursor {
        let remaining = (expected - cursor)
            .min(usize::from(fifo_depth))
            .min(RDT.max() as usize);
        (remaining as u16).max(1)
    } else {
        1
    }
}

/// Program the threshold for the current expectation and arm the receiver
pub fn setup<B: RegisterBank>(ctx: &mut ReaderContext, regs: &RegisterView<B>) {
    regs.mask_irq(IntMask::RIM);
    regs.set_rx_threshold(next_threshold(
        ctx.expected_length,
        ctx.write_cursor,
        ctx.limits().rx_fifo_depth,
    ));
    regs.set_enable(Enable::RCV_EN, true);
    regs.unmask_irq(IntMask::RIM);
}

/// Service a receive-FIFO-ready interrupt
pub fn service<B: RegisterBank>(ctx: &mut ReaderContext, regs: &RegisterView<B>) -> Notifications {
    drain(ctx, regs, true)
}

/// Drain the receive FIFO into the card buffer
///
/// With `inspect_parity` unset every character is stored, whatever its
/// parity flag says.
pub(crate) fn drain<B: RegisterBank>(
    ctx: &mut ReaderContext,
    regs: &RegisterView<B>,
    inspect_parity: bool,
) -> Notifications {
    regs.mask_irq(IntMask::RIM);

    let mut notes = Notifications::DATA_READY;
    let start = ctx.write_cursor;
    let mut truncated = 0u64;

    while regs.rx_fifo_count() > 0 {
        let byte = regs.pop_rx();
        if inspect_parity && byte.parity_error {
            match ctx.parity_policy() {
                ParityPolicy::Discard => {
                    trace!(reader = ctx.index(), data = byte.data, "parity error, dropped");
                    ctx.stats.parity_dropped += 1;
                    continue;
                }
                ParityPolicy::Preserve => notes |= Notifications::PARITY_ERROR,
            }
        }
        if !ctx.push(byte.data) {
            truncated += 1;
        }
    }

    if truncated > 0 {
        warn!(
            reader = ctx.index(),
            dropped = truncated,
            capacity = ctx.capacity(),
            "card buffer full, received bytes dropped"
        );
        ctx.stats.truncated += truncated;
        ctx.error = Some(ReaderError::BufferOverflow);
        notes |= Notifications::FATAL_ERROR;
    }

    trace!(
        reader = ctx.index(),
        received = %hex::encode(ctx.read_buffer(start, ctx.write_cursor - start).unwrap_or_default()),
        cursor = ctx.write_cursor,
        "rx drain"
    );

    regs.set_rx_threshold(next_threshold(
        ctx.expected_length,
        ctx.write_cursor,
        ctx.limits().rx_fifo_depth,
    ));
    regs.unmask_irq(IntMask::RIM);
    notes
}
