//! One reader module: register view plus transaction state

use std::sync::atomic::{AtomicBool, Ordering};

use nexum_sim_core::{ModuleLimits, ParityPolicy, ReaderContext, RegisterBank, RegisterView};
use parking_lot::{Mutex, MutexGuard};

/// A reader module owned by the driver
///
/// Lock order is context first, then the register view. Paths that only
/// touch registers (the presence thread, raw reads) take the view lock alone.
#[derive(Debug)]
pub(crate) struct Reader<B> {
    index: usize,
    regs: RegisterView<B>,
    ctx: Mutex<ReaderContext>,
    attached: AtomicBool,
}

impl<B: RegisterBank> Reader<B> {
    pub(crate) fn new(index: usize, bank: B, limits: ModuleLimits, parity: ParityPolicy) -> Self {
        Self {
            index,
            regs: RegisterView::new(bank),
            ctx: Mutex::new(ReaderContext::new(index, limits, parity)),
            attached: AtomicBool::new(false),
        }
    }

    pub(crate) const fn index(&self) -> usize {
        self.index
    }

    pub(crate) const fn regs(&self) -> &RegisterView<B> {
        &self.regs
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ReaderContext> {
        self.ctx.lock()
    }

    pub(crate) fn attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Returns the previous state
    pub(crate) fn set_attached(&self, attached: bool) -> bool {
        self.attached.swap(attached, Ordering::AcqRel)
    }
}
