//! Interrupt dispatch
//!
//! Each module raises two interrupt lines. The data line carries the FIFO
//! conditions and is routed to the engine of the reader's current mode. The
//! general line carries presence changes, NACK threshold, receive overrun
//! and the two timer expiries.

use nexum_sim_core::engine::{reset, rx, tx};
use nexum_sim_core::registers::{Enable, IntMask, PortDetect, RcvStatus, XmtStatus};
use nexum_sim_core::{Mode, Notifications, Notifier, ReaderError, RegisterBank, TimerKind, timer};
use tracing::{debug, warn};

use crate::presence::{PresenceLine, PresenceSignal};
use crate::reader::Reader;

/// Outcome of an interrupt handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// A pending condition was serviced
    Handled,
    /// Nothing pending and unmasked for this handler
    None,
    /// Interrupts of this module are not attached; nothing was touched
    NotAttached,
}

impl IrqReturn {
    /// Whether the handler serviced something
    pub const fn is_handled(self) -> bool {
        matches!(self, Self::Handled)
    }
}

/// Service the data interrupt of `reader`
pub(crate) fn data<B: RegisterBank>(reader: &Reader<B>, notifier: &Notifier) -> IrqReturn {
    let mut ctx = reader.lock();
    let regs = reader.regs();

    let mask = regs.int_mask();
    let rcv = regs.rcv_status();
    let xmt = regs.xmt_status();
    let rdrf = rcv.contains(RcvStatus::RDRF) && !mask.contains(IntMask::RIM);
    let etc = xmt.contains(XmtStatus::ETC) && !mask.contains(IntMask::ETCIM);
    let tdtf = xmt.contains(XmtStatus::TDTF) && !mask.contains(IntMask::TDTFM);

    let notes = match ctx.mode() {
        Mode::Receive if rdrf => rx::service(&mut ctx, regs),
        Mode::ResetDetect if rdrf => reset::service(&mut ctx, regs),
        Mode::Transmit if etc || tdtf => tx::service(&mut ctx, regs),
        _ => return IrqReturn::None,
    };
    notifier.raise(notes);
    IrqReturn::Handled
}

/// Service the general interrupt of `reader`
pub(crate) fn general<B: RegisterBank>(
    reader: &Reader<B>,
    line: &PresenceLine,
    notifier: &Notifier,
) -> IrqReturn {
    let mut ctx = reader.lock();
    let regs = reader.regs();
    let mut handled = false;
    let mut notes = Notifications::empty();

    let detect = regs.port_detect();
    if detect.contains(PortDetect::SDI) && !detect.contains(PortDetect::SDIM) {
        regs.set_presence_masked(true);
        regs.clear_presence_pending();
        if !line.send(PresenceSignal::Edge) {
            warn!(reader = reader.index(), "presence task gone, edge dropped");
        }
        handled = true;
    }

    let mask = regs.int_mask();
    let xmt = regs.xmt_status();
    let rcv = regs.rcv_status();

    if xmt.contains(XmtStatus::XTE) && !mask.contains(IntMask::XTM) {
        regs.clear_xmt_status(XmtStatus::XTE);
        regs.mask_irq(IntMask::TDTFM | IntMask::ETCIM);
        regs.set_enable(Enable::XMT_EN, false);
        ctx.set_error(ReaderError::NackThreshold);
        warn!(
            reader = reader.index(),
            cursor = ctx.write_cursor(),
            "card NACK threshold exceeded, transfer aborted"
        );
        notes |= Notifications::FATAL_ERROR;
        handled = true;
    }

    if rcv.contains(RcvStatus::OEF) && !mask.contains(IntMask::OIM) {
        regs.clear_rcv_status(RcvStatus::OEF);
        ctx.record_overrun();
        debug!(reader = reader.index(), "receive overrun");
        handled = true;
    }

    if rcv.contains(RcvStatus::CWT) && !mask.contains(IntMask::CWTM) {
        notes |= timer::expire(&mut ctx, regs, TimerKind::Cwt);
        handled = true;
    }

    if xmt.contains(XmtStatus::GPCNT) && !mask.contains(IntMask::GPCNTM) {
        notes |= timer::expire(&mut ctx, regs, TimerKind::Gpcnt);
        handled = true;
    }

    notifier.raise(notes);
    if handled { IrqReturn::Handled } else { IrqReturn::None }
}
