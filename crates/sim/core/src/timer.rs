//! Timer rollover engine
//!
//! CHAR_WAIT and GPCNT are 16 bits wide while protocol waiting times are not.
//! A logical timeout is kept as a software residual and fed to the hardware
//! one load at a time: every expiry either reloads the counter with the next
//! chunk or, once the residual is exhausted, reports the timeout.

use tracing::debug;

use crate::context::{ReaderContext, TimerKind};
use crate::notify::Notifications;
use crate::registers::{
    Control, GpcntClock, IntMask, RcvStatus, Register, RegisterBank, RegisterView, XmtStatus,
};

/// Notification raised when a timer's logical timeout is over
pub const fn elapsed(kind: TimerKind) -> Notifications {
    match kind {
        TimerKind::Cwt => Notifications::CWT_ELAPSED,
        TimerKind::Gpcnt => Notifications::GPCNT_ELAPSED,
    }
}

/// Start a logical timeout of `ticks`
///
/// Any previous arming of the same counter is abandoned. A zero timeout
/// stops the counter and elapses immediately without loading it.
pub fn arm<B: RegisterBank>(
    ctx: &mut ReaderContext,
    regs: &RegisterView<B>,
    kind: TimerKind,
    ticks: u32,
) -> Notifications {
    regs.mask_irq(interrupt(kind));
    acknowledge(regs, kind);
    *ctx.remaining_mut(kind) = ticks;
    if ticks == 0 {
        stop(regs, kind);
        debug!(reader = ctx.index(), ?kind, "zero timeout, elapsed immediately");
        return elapsed(kind);
    }
    let load = reload(ctx, regs, kind);
    debug!(
        reader = ctx.index(),
        ?kind,
        ticks,
        load,
        residual = ctx.remaining(kind),
        "timer armed"
    );
    Notifications::empty()
}

/// Handle a hardware expiry of `kind`
pub fn expire<B: RegisterBank>(
    ctx: &mut ReaderContext,
    regs: &RegisterView<B>,
    kind: TimerKind,
) -> Notifications {
    acknowledge(regs, kind);
    if ctx.remaining(kind) > 0 {
        let load = reload(ctx, regs, kind);
        ctx.stats.rollovers += 1;
        debug!(
            reader = ctx.index(),
            ?kind,
            load,
            residual = ctx.remaining(kind),
            "timer rollover"
        );
        Notifications::empty()
    } else {
        stop(regs, kind);
        debug!(reader = ctx.index(), ?kind, "timer elapsed");
        elapsed(kind)
    }
}

/// Load the next chunk of the residual, returning the loaded value
fn reload<B: RegisterBank>(ctx: &mut ReaderContext, regs: &RegisterView<B>, kind: TimerKind) -> u32 {
    let max = ctx.limits().counter_max.max(1);
    let residual = ctx.remaining_mut(kind);
    let load = (*residual).min(max);
    *residual -= load;
    load_counter(regs, kind, load);
    load
}

fn load_counter<B: RegisterBank>(regs: &RegisterView<B>, kind: TimerKind, value: u32) {
    match kind {
        TimerKind::Cwt => {
            regs.set_control(Control::CWTEN, false);
            regs.write(Register::CharWait, value);
            regs.set_control(Control::CWTEN, true);
            regs.unmask_irq(interrupt(kind));
        }
        TimerKind::Gpcnt => {
            // the load only takes effect across a disabled clock; a counter
            // with no clock selected starts when one is (e.g. ETU at the end
            // of a transmission)
            let clock = regs.gpcnt_clock();
            regs.set_gpcnt_clock(GpcntClock::Disabled);
            regs.write(Register::Gpcnt, value);
            regs.set_gpcnt_clock(clock);
            regs.unmask_irq(interrupt(kind));
        }
    }
}

const fn interrupt(kind: TimerKind) -> IntMask {
    match kind {
        TimerKind::Cwt => IntMask::CWTM,
        TimerKind::Gpcnt => IntMask::GPCNTM,
    }
}

fn acknowledge<B: RegisterBank>(regs: &RegisterView<B>, kind: TimerKind) {
    match kind {
        TimerKind::Cwt => regs.clear_rcv_status(RcvStatus::CWT),
        TimerKind::Gpcnt => regs.clear_xmt_status(XmtStatus::GPCNT),
    }
}

/// Abandon the running timeout of `kind` without reporting it
pub fn cancel<B: RegisterBank>(ctx: &mut ReaderContext, regs: &RegisterView<B>, kind: TimerKind) {
    stop(regs, kind);
    acknowledge(regs, kind);
    *ctx.remaining_mut(kind) = 0;
    debug!(reader = ctx.index(), ?kind, "timer cancelled");
}

/// Mask the counter's interrupt and stop it
pub fn stop<B: RegisterBank>(regs: &RegisterView<B>, kind: TimerKind) {
    regs.mask_irq(interrupt(kind));
    match kind {
        TimerKind::Cwt => regs.set_control(Control::CWTEN, false),
        TimerKind::Gpcnt => regs.set_gpcnt_clock(GpcntClock::Disabled),
    }
}
