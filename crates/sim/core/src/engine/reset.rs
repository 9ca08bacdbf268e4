//! Answer-to-reset capture
//!
//! Right after a card reset the only traffic is the ATR. Every character is
//! stored, parity flag or not; the protocol layer judges the stream.

use crate::context::ReaderContext;
use crate::engine::rx;
use crate::notify::Notifications;
use crate::registers::{RegisterBank, RegisterView};

/// Arm the receiver for the answer to reset
pub fn setup<B: RegisterBank>(ctx: &mut ReaderContext, regs: &RegisterView<B>) {
    rx::setup(ctx, regs);
}

/// Service a receive-FIFO-ready interrupt while waiting for the ATR
pub fn service<B: RegisterBank>(ctx: &mut ReaderContext, regs: &RegisterView<B>) -> Notifications {
    rx::drain(ctx, regs, false)
}

#[cfg(all(test, feature = "emulator"))]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::{Mode, TransactionMeta};
    use crate::emulator::EmulatedSim;
    use crate::engine::enter_mode;
    use crate::engine::rx::ParityPolicy;
    use crate::limits::ModuleLimits;

    #[test]
    fn test_atr_kept_despite_parity_errors() {
        let limits = ModuleLimits::new();
        let sim = Arc::new(EmulatedSim::new(limits));
        let regs = RegisterView::new(Arc::clone(&sim));
        let mut ctx = ReaderContext::new(1, limits, ParityPolicy::Discard);
        ctx.set_meta(TransactionMeta {
            expected_length: 4,
            ..Default::default()
        })
        .unwrap();
        enter_mode(&mut ctx, &regs, Mode::ResetDetect);

        sim.card_send(&[0x3B, 0x02]);
        sim.card_send_with_parity_error(0x14);
        sim.card_send(&[0x50]);

        let notes = service(&mut ctx, &regs);
        assert_eq!(notes, Notifications::DATA_READY);
        assert_eq!(ctx.read_buffer(0, 4).unwrap().as_ref(), &[0x3B, 0x02, 0x14, 0x50]);
        assert_eq!(ctx.stats().parity_dropped, 0);
        assert_eq!(regs.rx_threshold(), 1);
    }
}
