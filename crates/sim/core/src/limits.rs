//! Per-module hardware limits

/// Width limit of the CHAR_WAIT and GPCNT counters
pub const COUNTER_MAX: u32 = u16::MAX as u32;

/// Transmit FIFO depth of the SIM block
pub const TX_FIFO_DEPTH: u16 = 16;

/// Receive FIFO depth of the SIM block
pub const RX_FIFO_DEPTH: u16 = 285;

/// Default transmit data threshold used while refilling
pub const TX_THRESHOLD: u8 = 4;

/// Card buffer size: a 256 byte response, the status word, and room for
/// null procedure bytes interleaved by slow cards.
pub const CARD_BUFFER_CAPACITY: usize = 400;

/// Counter and FIFO limits of one reader module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ModuleLimits {
    /// Largest value a single hardware counter load can hold
    pub counter_max: u32,
    /// Transmit FIFO depth in bytes
    pub tx_fifo_depth: u16,
    /// Receive FIFO depth in bytes
    pub rx_fifo_depth: u16,
    /// Transmit data threshold (TDT) programmed while refilling
    pub tx_threshold: u8,
    /// Capacity of the card buffer
    pub buffer_capacity: usize,
}

impl Default for ModuleLimits {
    fn default() -> Self {
        Self {
            counter_max: COUNTER_MAX,
            tx_fifo_depth: TX_FIFO_DEPTH,
            rx_fifo_depth: RX_FIFO_DEPTH,
            tx_threshold: TX_THRESHOLD,
            buffer_capacity: CARD_BUFFER_CAPACITY,
        }
    }
}

impl ModuleLimits {
    /// Create the default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hardware counter limit
    pub const fn with_counter_max(mut self, counter_max: u32) -> Self {
        self.counter_max = counter_max;
        self
    }

    /// Set the transmit FIFO depth
    pub const fn with_tx_fifo_depth(mut self, depth: u16) -> Self {
        self.tx_fifo_depth = depth;
        self
    }

    /// Set the receive FIFO depth
    pub const fn with_rx_fifo_depth(mut self, depth: u16) -> Self {
        self.rx_fifo_depth = depth;
        self
    }

    /// Set the transmit data threshold
    pub const fn with_tx_threshold(mut self, threshold: u8) -> Self {
        self.tx_threshold = threshold;
        self
    }

    /// Set the card buffer capacity
    pub const fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Bytes that fit in the transmit FIFO once the fill level dropped to
    /// `threshold`, at least one so a refill always makes progress
    pub const fn tx_free_capacity(&self, threshold: u8) -> usize {
        let free = self.tx_fifo_depth.saturating_sub(threshold as u16) as usize;
        if free == 0 { 1 } else { free }
    }
}
