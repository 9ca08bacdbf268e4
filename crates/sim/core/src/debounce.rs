//! Presence-detect debounce accumulator
//!
//! The presence switch is mechanical and chatters when a card slides in or
//! out. A level is only accepted after it was sampled a number of times in a
//! row; the accepted level is then compared with the level before the edge
//! to tell a real insertion or removal from a bounce.

/// Consecutive identical samples needed to accept a level
pub const DEFAULT_SAMPLES: u32 = 8;

/// Debounced presence level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PresenceState {
    /// No card in the slot
    #[default]
    Absent,
    /// Card in the slot
    Present,
}

impl PresenceState {
    /// Map a raw pin level
    pub const fn from_pin(level: bool) -> Self {
        if level { Self::Present } else { Self::Absent }
    }
}

/// Outcome of one debounce cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PresenceEvent {
    /// A card was inserted
    Inserted,
    /// The card was removed
    Removed,
    /// The line settled back to where it was
    Bounce,
}

impl PresenceEvent {
    /// Notification bit reporting this event
    pub const fn notification(self) -> crate::notify::Notifications {
        use crate::notify::Notifications;
        match self {
            Self::Inserted => Notifications::PD_INSERT,
            Self::Removed => Notifications::PD_REMOVE,
            Self::Bounce => Notifications::PD_BOUNCE,
        }
    }
}

/// Consecutive-sample counter
#[derive(Debug, Clone)]
pub struct Debouncer {
    threshold: u32,
    last: Option<PresenceState>,
    count: u32,
}

impl Debouncer {
    /// Accept a level after `threshold` identical samples (at least one)
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            last: None,
            count: 0,
        }
    }

    /// Samples needed to accept a level
    pub const fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Length of the current run of identical samples
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Forget the current run
    pub const fn reset(&mut self) {
        self.last = None;
        self.count = 0;
    }

    /// Feed one sample, returning the level once it is accepted
    ///
    /// A differing sample restarts the run at 1. Acceptance resets the
    /// counter for the next cycle.
    pub fn sample(&mut self, level: PresenceState) -> Option<PresenceState> {
        if self.last == Some(level) {
            self.count += 1;
        } else {
            self.last = Some(level);
            self.count = 1;
        }
        if self.count >= self.threshold {
            self.reset();
            Some(level)
        } else {
            None
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLES)
    }
}

/// Debounce state of one presence line
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    accepted: PresenceState,
    cycle_start: Option<PresenceState>,
    debouncer: Debouncer,
}

impl PresenceTracker {
    /// Start tracking from an already settled level
    pub fn new(initial: PresenceState, samples: u32) -> Self {
        Self {
            accepted: initial,
            cycle_start: None,
            debouncer: Debouncer::new(samples),
        }
    }

    /// Last accepted level
    pub const fn accepted(&self) -> PresenceState {
        self.accepted
    }

    /// Whether a cycle is running
    pub const fn in_cycle(&self) -> bool {
        self.cycle_start.is_some()
    }

    /// Start a debounce cycle after an edge
    ///
    /// An edge during a running cycle does not restart it.
    pub fn begin_cycle(&mut self) {
        if self.cycle_start.is_none() {
            self.cycle_start = Some(self.accepted);
            self.debouncer.reset();
        }
    }

    /// Feed one pin sample of the running cycle
    ///
    /// Returns the event once the level is accepted, which ends the cycle.
    /// Samples outside a cycle are ignored.
    pub fn feed(&mut self, level: bool) -> Option<PresenceEvent> {
        let start = self.cycle_start?;
        let settled = self.debouncer.sample(PresenceState::from_pin(level))?;
        self.cycle_start = None;
        if settled == start {
            return Some(PresenceEvent::Bounce);
        }
        self.accepted = settled;
        Some(match settled {
            PresenceState::Present => PresenceEvent::Inserted,
            PresenceState::Absent => PresenceEvent::Removed,
        })
    }
}
