//! Transmit engine
//!
//! The transmit FIFO is shallower than most commands, so the engine refills
//! it each time the fill level drops to the TDT threshold. Completion is taken
//! from the early-transmit-complete flag rather than from the byte count: the
//! shifter may still hold the last character after the FIFO ran empty.

use tracing::{debug, trace};

use crate::context::{Mode, ReaderContext};
use crate::engine::rx;
use crate::notify::Notifications;
use crate::registers::{Enable, GpcntClock, IntMask, RegisterBank, RegisterView, XmtStatus};

/// Arm the transmitter; the first threshold interrupt performs the first fill
pub fn setup<B: RegisterBank>(ctx: &mut ReaderContext, regs: &RegisterView<B>) {
    regs.mask_irq(IntMask::ETCIM | IntMask::TDTFM);
    regs.clear_xmt_status(XmtStatus::ETC | XmtStatus::TC);
    ctx.all_sent = false;
    regs.set_tx_threshold(ctx.limits().tx_threshold);
    regs.set_enable(Enable::XMT_EN, true);
    regs.unmask_irq(IntMask::TDTFM);
}

/// Service the transmit conditions of a data interrupt
///
/// Early-transmit-complete is handled before the threshold condition when
/// both are active.
pub fn service<B: RegisterBank>(ctx: &mut ReaderContext, regs: &RegisterView<B>) -> Notifications {
    let status = regs.xmt_status();
    let mask = regs.int_mask();
    let mut notes = Notifications::empty();

    if status.contains(XmtStatus::ETC) && !mask.contains(IntMask::ETCIM) {
        notes |= complete(ctx, regs);
    }
    if ctx.mode == Mode::Transmit
        && status.contains(XmtStatus::TDTF)
        && !mask.contains(IntMask::TDTFM)
    {
        notes |= refill(ctx, regs);
    }
    notes
}

/// Hand over to the receive engine once the last character left the FIFO
fn complete<B: RegisterBank>(ctx: &mut ReaderContext, regs: &RegisterView<B>) -> Notifications {
    // the card's answer is timed in ETUs from here on
    regs.set_gpcnt_clock(GpcntClock::Etu);
    regs.clear_xmt_status(XmtStatus::ETC);
    regs.mask_irq(IntMask::ETCIM);

    debug!(reader = ctx.index(), sent = ctx.tx_length, "transmit complete");
    ctx.write_cursor = 0;
    ctx.mode = Mode::Receive;
    rx::setup(ctx, regs);
    ctx.all_sent = true;
    Notifications::TX_COMPLETE
}

/// Push the next slice of the card buffer into the transmit FIFO
fn refill<B: RegisterBank>(ctx: &mut ReaderContext, regs: &RegisterView<B>) -> Notifications {
    let remaining = ctx.tx_length.saturating_sub(ctx.write_cursor);
    regs.mask_irq(IntMask::TDTFM);

    if remaining == 0 && regs.tx_fifo_count() == 0 {
        // nothing will reach the shifter, so ETC never latches
        return complete(ctx, regs);
    }

    let free = ctx.limits().tx_free_capacity(regs.tx_threshold());
    let last = remaining <= free;
    let count = remaining.min(free);

    let start = ctx.write_cursor;
    for _ in 0..count {
        let Some(byte) = ctx.byte_at(ctx.write_cursor) else {
            break;
        };
        regs.push_tx(byte);
        ctx.write_cursor += 1;
    }
    ctx.stats.refills += 1;

    trace!(
        reader = ctx.index(),
        sent = %hex::encode(ctx.read_buffer(start, ctx.write_cursor - start).unwrap_or_default()),
        cursor = ctx.write_cursor,
        last,
        "tx refill"
    );

    if last {
        regs.set_tx_threshold(0);
        // an ETC latched while an earlier slice drained is stale now
        regs.clear_xmt_status(XmtStatus::ETC);
        regs.unmask_irq(IntMask::ETCIM);
    } else {
        regs.unmask_irq(IntMask::TDTFM);
    }
    Notifications::BUFFER_INDEX_CHANGED
}

#[cfg(all(test, feature = "emulator"))]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::TransactionMeta;
    use crate::emulator::EmulatedSim;
    use crate::engine::enter_mode;
    use crate::engine::rx::ParityPolicy;
    use crate::limits::ModuleLimits;

    fn transmitter(
        limits: ModuleLimits,
        data: &[u8],
    ) -> (ReaderContext, RegisterView<Arc<EmulatedSim>>, Arc<EmulatedSim>) {
        let sim = Arc::new(EmulatedSim::new(limits));
        let regs = RegisterView::new(Arc::clone(&sim));
        let mut ctx = ReaderContext::new(0, limits, ParityPolicy::Discard);
        ctx.replace_buffer(data).unwrap();
        enter_mode(&mut ctx, &regs, Mode::Transmit);
        (ctx, regs, sim)
    }

    #[test]
    fn test_twenty_bytes_through_fifteen_byte_fifo() {
        let limits = ModuleLimits::new()
            .with_tx_fifo_depth(15)
            .with_tx_threshold(6);
        let data: Vec<u8> = (0x40..0x54).collect();
        let (mut ctx, regs, sim) = transmitter(limits, &data);

        let mut refills = Vec::new();
        loop {
            let before = ctx.write_cursor();
            let notes = service(&mut ctx, &regs);
            if notes.contains(Notifications::TX_COMPLETE) {
                break;
            }
            assert_eq!(notes, Notifications::BUFFER_INDEX_CHANGED);
            refills.push(ctx.write_cursor() - before);
            // the card clocks everything out before the next interrupt
            sim.shift_out(usize::MAX);
        }

        assert_eq!(refills, vec![9, 9, 2]);
        assert_eq!(sim.take_shifted(), data);
        assert_eq!(ctx.mode(), Mode::Receive);
        assert_eq!(ctx.write_cursor(), 0);
        assert!(ctx.all_sent());
        assert_eq!(regs.gpcnt_clock(), GpcntClock::Etu);
        assert!(regs.int_mask().contains(IntMask::ETCIM));
        assert!(!regs.int_mask().contains(IntMask::RIM));
    }

    #[test]
    fn test_refill_count_matches_free_capacity() {
        let limits = ModuleLimits::new()
            .with_tx_fifo_depth(16)
            .with_tx_threshold(4);
        for len in [1usize, 11, 12, 13, 36, 100] {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let (mut ctx, regs, sim) = transmitter(limits, &data);

            let mut refills = 0;
            while !service(&mut ctx, &regs).contains(Notifications::TX_COMPLETE) {
                refills += 1;
                sim.shift_out(usize::MAX);
            }
            assert_eq!(refills, len.div_ceil(12), "length {len}");
            assert_eq!(sim.take_shifted(), data, "length {len}");
        }
    }

    #[test]
    fn test_final_refill_clears_threshold_and_unmasks_etc() {
        let limits = ModuleLimits::new()
            .with_tx_fifo_depth(16)
            .with_tx_threshold(4);
        let (mut ctx, regs, _sim) = transmitter(limits, &[0x00, 0xC0, 0x00, 0x00, 0x0A]);

        service(&mut ctx, &regs);
        assert_eq!(regs.tx_threshold(), 0);
        let mask = regs.int_mask();
        assert!(mask.contains(IntMask::TDTFM));
        assert!(!mask.contains(IntMask::ETCIM));
        assert_eq!(ctx.meta(), TransactionMeta {
            write_cursor: 5,
            expected_length: 0,
            tx_length: 5,
            error: None,
        });
    }

    #[test]
    fn test_empty_transmit_completes_at_once() {
        let (mut ctx, regs, sim) = transmitter(ModuleLimits::new(), &[]);

        assert_eq!(service(&mut ctx, &regs), Notifications::TX_COMPLETE);
        assert_eq!(ctx.mode(), Mode::Receive);
        assert!(ctx.all_sent());
        assert!(sim.take_shifted().is_empty());
        assert!(regs.int_mask().contains(IntMask::TDTFM));
    }

    #[test]
    fn test_no_completion_while_shifter_busy() {
        let limits = ModuleLimits::new();
        let (mut ctx, regs, sim) = transmitter(limits, &[1, 2, 3]);

        service(&mut ctx, &regs);
        sim.shift_out(2);
        assert!(service(&mut ctx, &regs).is_empty());
        assert_eq!(ctx.mode(), Mode::Transmit);

        sim.shift_out(1);
        assert_eq!(service(&mut ctx, &regs), Notifications::TX_COMPLETE);
    }
}
