//! Per-reader transaction state

use bytes::Bytes;
use tracing::debug;

use crate::engine::rx::ParityPolicy;
use crate::error::{Error, Result};
use crate::limits::ModuleLimits;

/// Which engine the data interrupt is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Receive engine, parity filtered
    #[default]
    Receive,
    /// Transmit engine
    Transmit,
    /// Answer-to-reset capture, no parity filtering
    ResetDetect,
}

/// Hardware counter backing a logical timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimerKind {
    /// Character wait time counter
    Cwt,
    /// General purpose counter
    Gpcnt,
}

/// Last unrecovered error of a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReaderError {
    /// The card NACKed a character more often than the XTH threshold allows
    NackThreshold,
    /// The card sent more bytes than the card buffer holds
    BufferOverflow,
}

/// Cursor and length snapshot exchanged with the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransactionMeta {
    /// Next position in the card buffer
    pub write_cursor: usize,
    /// Total bytes expected for the current reception
    pub expected_length: usize,
    /// Total bytes queued for the current transmission
    pub tx_length: usize,
    /// Last unrecovered error
    pub error: Option<ReaderError>,
}

/// Event counters kept per reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReaderStats {
    /// Bytes dropped for parity errors
    pub parity_dropped: u64,
    /// Bytes drained after the card buffer filled up
    pub truncated: u64,
    /// Receive overruns acknowledged
    pub overruns: u64,
    /// Hardware counter reloads after an expiry
    pub rollovers: u64,
    /// Transmit FIFO refills
    pub refills: u64,
}

/// Mutable state of one reader module
///
/// Only the engine selected by `mode` mutates the buffer and cursor while
/// interrupts are live; the owner serialises access with a lock.
#[derive(Debug, Clone)]
pub struct ReaderContext {
    index: usize,
    limits: ModuleLimits,
    parity: ParityPolicy,
    buffer: Box<[u8]>,
    pub(crate) write_cursor: usize,
    pub(crate) expected_length: usize,
    pub(crate) tx_length: usize,
    pub(crate) error: Option<ReaderError>,
    pub(crate) remaining_cwt: u32,
    pub(crate) remaining_gpcnt: u32,
    pub(crate) mode: Mode,
    pub(crate) all_sent: bool,
    pub(crate) stats: ReaderStats,
}

impl ReaderContext {
    /// Create the context of reader `index`
    pub fn new(index: usize, limits: ModuleLimits, parity: ParityPolicy) -> Self {
        Self {
            index,
            limits,
            parity,
            buffer: vec![0; limits.buffer_capacity].into_boxed_slice(),
            write_cursor: 0,
            expected_length: 0,
            tx_length: 0,
            error: None,
            remaining_cwt: 0,
            remaining_gpcnt: 0,
            mode: Mode::default(),
            all_sent: false,
            stats: ReaderStats::default(),
        }
    }

    /// Module index
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Hardware limits of the module
    pub const fn limits(&self) -> &ModuleLimits {
        &self.limits
    }

    /// Parity handling of the receive engine
    pub const fn parity_policy(&self) -> ParityPolicy {
        self.parity
    }

    /// Change the parity handling of the receive engine
    pub const fn set_parity_policy(&mut self, parity: ParityPolicy) {
        self.parity = parity;
    }

    /// Card buffer capacity
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Current mode
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Current cursor position
    pub const fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    /// Last unrecovered error
    pub const fn error(&self) -> Option<ReaderError> {
        self.error
    }

    /// Record an unrecovered error detected outside the engines
    pub const fn set_error(&mut self, error: ReaderError) {
        self.error = Some(error);
    }

    /// Count an acknowledged receive overrun
    pub const fn record_overrun(&mut self) {
        self.stats.overruns += 1;
    }

    /// Whether every queued byte has left the transmitter
    pub const fn all_sent(&self) -> bool {
        self.all_sent
    }

    /// Clear the all-sent flag, returning its previous value
    pub const fn clear_all_sent(&mut self) -> bool {
        let was = self.all_sent;
        self.all_sent = false;
        was
    }

    /// Event counters
    pub const fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Residual logical ticks of a timer
    pub const fn remaining(&self, kind: TimerKind) -> u32 {
        match kind {
            TimerKind::Cwt => self.remaining_cwt,
            TimerKind::Gpcnt => self.remaining_gpcnt,
        }
    }

    pub(crate) const fn remaining_mut(&mut self, kind: TimerKind) -> &mut u32 {
        match kind {
            TimerKind::Cwt => &mut self.remaining_cwt,
            TimerKind::Gpcnt => &mut self.remaining_gpcnt,
        }
    }

    /// Append a received byte at the cursor; false once the buffer is full
    pub(crate) fn push(&mut self, byte: u8) -> bool {
        match self.buffer.get_mut(self.write_cursor) {
            Some(slot) => {
                *slot = byte;
                self.write_cursor += 1;
                true
            }
            None => false,
        }
    }

    /// Byte at `index` of the card buffer
    pub(crate) fn byte_at(&self, index: usize) -> Option<u8> {
        self.buffer.get(index).copied()
    }

    /// Move the cursor forward by one, saturating at capacity
    pub fn advance_cursor(&mut self) {
        if self.write_cursor < self.buffer.len() {
            self.write_cursor += 1;
        }
    }

    /// Snapshot of cursors, lengths and error flag
    pub const fn meta(&self) -> TransactionMeta {
        TransactionMeta {
            write_cursor: self.write_cursor,
            expected_length: self.expected_length,
            tx_length: self.tx_length,
            error: self.error,
        }
    }

    /// Expect `len` bytes from the card, keeping the cursor
    pub fn expect(&mut self, len: usize) -> Result<()> {
        let capacity = self.capacity();
        if len > capacity {
            return Err(Error::LengthExceedsCapacity { len, capacity });
        }
        self.expected_length = len;
        Ok(())
    }

    /// Replace cursors, lengths and error flag
    ///
    /// Every position and length must fit in the card buffer.
    pub fn set_meta(&mut self, meta: TransactionMeta) -> Result<()> {
        let capacity = self.capacity();
        for len in [meta.write_cursor, meta.expected_length, meta.tx_length] {
            if len > capacity {
                return Err(Error::LengthExceedsCapacity { len, capacity });
            }
        }
        self.write_cursor = meta.write_cursor;
        self.expected_length = meta.expected_length;
        self.tx_length = meta.tx_length;
        self.error = meta.error;
        debug!(reader = self.index, ?meta, "transaction metadata replaced");
        Ok(())
    }

    /// Copy `len` bytes starting at `offset` out of the card buffer
    pub fn read_buffer(&self, offset: usize, len: usize) -> Result<Bytes> {
        let window = offset
            .checked_add(len)
            .and_then(|end| self.buffer.get(offset..end))
            .ok_or(Error::BufferOutOfRange {
                offset,
                len,
                capacity: self.capacity(),
            })?;
        Ok(Bytes::copy_from_slice(window))
    }

    /// Copy `data` into the start of the card buffer and reset the cursors
    ///
    /// `tx_length` becomes `data.len()`; the cursor and expected length
    /// return to zero.
    pub fn replace_buffer(&mut self, data: &[u8]) -> Result<()> {
        let capacity = self.capacity();
        let slot = self
            .buffer
            .get_mut(..data.len())
            .ok_or(Error::LengthExceedsCapacity {
                len: data.len(),
                capacity,
            })?;
        slot.copy_from_slice(data);
        self.write_cursor = 0;
        self.expected_length = 0;
        self.tx_length = data.len();
        Ok(())
    }

    /// Reset cursors, lengths, error flag and the all-sent flag for a new transaction
    pub fn reset_transaction(&mut self) {
        self.write_cursor = 0;
        self.expected_length = 0;
        self.tx_length = 0;
        self.error = None;
        self.all_sent = false;
    }
}
