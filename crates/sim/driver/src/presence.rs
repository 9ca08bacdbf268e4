//! Presence-detect background task
//!
//! The general interrupt handler only masks the presence interrupt and sends
//! a [`PresenceSignal::Edge`]. A dedicated thread per line then samples the
//! pin until the debounce accumulator accepts a level, reports the outcome
//! and re-enables the interrupt.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use nexum_sim_core::{Notifier, PresenceEvent, PresenceState, PresenceTracker, RegisterBank};
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::reader::Reader;

/// Message from the interrupt side to a presence thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceSignal {
    /// The presence pin changed level
    Edge,
    /// Stop the thread
    Shutdown,
}

/// Shared half of one presence line
#[derive(Debug)]
pub(crate) struct PresenceLine {
    signal: Sender<PresenceSignal>,
    event: Mutex<Option<PresenceEvent>>,
    subscribers: Mutex<Vec<Sender<PresenceEvent>>>,
}

impl PresenceLine {
    /// Create a line and the receiving end its thread listens on
    pub(crate) fn new() -> (Self, Receiver<PresenceSignal>) {
        let (signal, rx) = unbounded();
        let line = Self {
            signal,
            event: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
        };
        (line, rx)
    }

    /// Wake the thread; false once it is gone
    pub(crate) fn send(&self, signal: PresenceSignal) -> bool {
        self.signal.send(signal).is_ok()
    }

    /// Read and clear the last debounced event
    pub(crate) fn take_event(&self) -> Option<PresenceEvent> {
        self.event.lock().take()
    }

    /// Receive every future debounced event of this line
    pub(crate) fn subscribe(&self) -> Receiver<PresenceEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn publish(&self, event: PresenceEvent, notifier: &Notifier) {
        *self.event.lock() = Some(event);
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event).is_ok());
        notifier.raise(event.notification());
    }
}

/// Body of the presence thread of `reader`, starting from the `initial` level
///
/// Runs until [`PresenceSignal::Shutdown`] arrives or every sender is gone.
pub(crate) fn run<B: RegisterBank>(
    reader: &Reader<B>,
    line: &PresenceLine,
    notifier: &Notifier,
    signals: &Receiver<PresenceSignal>,
    initial: PresenceState,
    samples: u32,
    poll_interval: Duration,
) {
    let index = reader.index();
    let mut tracker = PresenceTracker::new(initial, samples);
    debug!(reader = index, ?initial, "presence task started");

    'idle: loop {
        match signals.recv() {
            Ok(PresenceSignal::Edge) => {}
            Ok(PresenceSignal::Shutdown) | Err(_) => break 'idle,
        }
        tracker.begin_cycle();

        loop {
            let level = reader.regs().presence_pin();
            trace!(reader = index, level, "presence sample");
            if let Some(event) = tracker.feed(level) {
                reader.regs().set_presence_masked(false);
                match event {
                    PresenceEvent::Bounce => debug!(reader = index, "presence bounce"),
                    _ => info!(reader = index, ?event, "card presence changed"),
                }
                line.publish(event, notifier);
                continue 'idle;
            }
            match signals.recv_timeout(poll_interval) {
                // the cycle keeps its starting level
                Ok(PresenceSignal::Edge) => tracker.begin_cycle(),
                Err(RecvTimeoutError::Timeout) => {}
                Ok(PresenceSignal::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    break 'idle;
                }
            }
        }
    }
    debug!(reader = index, "presence task stopped");
}
