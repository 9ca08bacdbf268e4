//! Pending-condition mask shared by every interrupt producer
//!
//! Producers accumulate bits with [`Notifier::raise`]; consumers drain them
//! with [`Notifier::take`] or block in [`Notifier::wait`]. Accumulate and
//! read-and-clear happen under the same lock as the condition variable, so a
//! bit raised between a consumer's check and its sleep is never lost.

use std::time::{Duration, Instant};

use bitflags::bitflags;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

bitflags! {
    /// Conditions reported to the control surface
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Notifications: u32 {
        /// Receive engine stored new bytes
        const DATA_READY = 1 << 0;
        /// Transmit engine refilled the FIFO and moved the cursor
        const BUFFER_INDEX_CHANGED = 1 << 1;
        /// A byte with a parity error was kept
        const PARITY_ERROR = 1 << 2;
        /// Presence change turned out to be a bounce
        const PD_BOUNCE = 1 << 3;
        /// Card inserted
        const PD_INSERT = 1 << 4;
        /// Card removed
        const PD_REMOVE = 1 << 5;
        /// Transaction failed; see the reader's error flag
        const FATAL_ERROR = 1 << 6;
        /// Character wait time elapsed
        const CWT_ELAPSED = 1 << 7;
        /// General purpose counter elapsed
        const GPCNT_ELAPSED = 1 << 8;
        /// Every queued byte left the transmitter
        const TX_COMPLETE = 1 << 9;
    }
}

impl Notifications {
    /// Presence-detect related bits
    pub const PRESENCE: Self = Self::PD_BOUNCE.union(Self::PD_INSERT).union(Self::PD_REMOVE);

    /// Timer related bits
    pub const TIMERS: Self = Self::CWT_ELAPSED.union(Self::GPCNT_ELAPSED);
}

/// Multi-producer notification mask with a blocking wait
#[derive(Debug, Default)]
pub struct Notifier {
    pending: Mutex<Notifications>,
    cond: Condvar,
}

impl Notifier {
    /// Create an empty notifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate bits and wake every waiter
    pub fn raise(&self, bits: Notifications) {
        if bits.is_empty() {
            return;
        }
        let mut pending = self.pending.lock();
        *pending |= bits;
        trace!(raised = ?bits, pending = ?*pending, "notify");
        self.cond.notify_all();
    }

    /// Read and clear every pending bit
    pub fn take(&self) -> Notifications {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Block until any bit is pending, then read and clear all of them
    ///
    /// Returns an empty set if `timeout` elapses first.
    pub fn wait(&self, timeout: Option<Duration>) -> Notifications {
        self.wait_for(Notifications::all(), timeout)
    }

    /// Block until a bit in `interest` is pending, then read and clear those bits
    ///
    /// Bits outside `interest` stay pending for other consumers. Returns an
    /// empty set if `timeout` elapses first.
    pub fn wait_for(&self, interest: Notifications, timeout: Option<Duration>) -> Notifications {
        // a deadline past what `Instant` can represent is no deadline
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut pending = self.pending.lock();
        loop {
            let hit = *pending & interest;
            if !hit.is_empty() {
                pending.remove(hit);
                return hit;
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut pending, deadline).timed_out() {
                        let hit = *pending & interest;
                        pending.remove(hit);
                        return hit;
                    }
                }
                None => self.cond.wait(&mut pending),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_accumulate_and_clear() {
        let notifier = Notifier::new();
        notifier.raise(Notifications::DATA_READY);
        notifier.raise(Notifications::PD_INSERT);
        assert_eq!(
            notifier.take(),
            Notifications::DATA_READY | Notifications::PD_INSERT
        );
        assert!(notifier.take().is_empty());
    }

    #[test]
    fn test_wait_for_leaves_other_bits() {
        let notifier = Notifier::new();
        notifier.raise(Notifications::DATA_READY | Notifications::GPCNT_ELAPSED);
        assert_eq!(
            notifier.wait_for(Notifications::TIMERS, None),
            Notifications::GPCNT_ELAPSED
        );
        assert_eq!(notifier.take(), Notifications::DATA_READY);
    }

    #[test]
    fn test_wait_times_out_empty() {
        let notifier = Notifier::new();
        let got = notifier.wait(Some(Duration::from_millis(10)));
        assert!(got.is_empty());
    }

    #[test]
    fn test_wait_wakes_on_raise_from_other_thread() {
        let notifier = Arc::new(Notifier::new());
        let producer = Arc::clone(&notifier);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.raise(Notifications::FATAL_ERROR);
        });

        let got = notifier.wait(Some(Duration::from_secs(5)));
        assert_eq!(got, Notifications::FATAL_ERROR);
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_for_ignores_uninteresting_bits() {
        let notifier = Notifier::new();
        notifier.raise(Notifications::DATA_READY);
        let got = notifier.wait_for(Notifications::TX_COMPLETE, Some(Duration::from_millis(10)));
        assert!(got.is_empty());
        assert_eq!(notifier.take(), Notifications::DATA_READY);
    }

    #[test]
    fn test_unrepresentable_timeout_waits_untimed() {
        let notifier = Arc::new(Notifier::new());
        let producer = Arc::clone(&notifier);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.raise(Notifications::CWT_ELAPSED);
        });

        let got = notifier.wait(Some(Duration::MAX));
        assert_eq!(got, Notifications::CWT_ELAPSED);
        handle.join().unwrap();
    }
}
