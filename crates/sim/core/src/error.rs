//! Core error type for SIM reader operations
//!
//! Hardware-detected conditions (parity errors, NACK threshold, overruns) are
//! never returned through this type: they are reported asynchronously through
//! the notification mask. This error covers synchronous request failures only.

/// Core error type that encompasses all request failures in the crate
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    //
    // Caller misuse
    //
    /// No reader module exists at this index
    #[error("Invalid reader index: {0}")]
    InvalidReader(usize),

    /// Offset does not name a register of the SIM block
    #[error("Invalid register offset: {0:#04x}")]
    InvalidRegister(u32),

    /// Requested window does not fit in the card buffer
    #[error("Buffer range of {len} bytes at offset {offset} outside capacity {capacity}")]
    BufferOutOfRange {
        /// Start of the requested window
        offset: usize,
        /// Length of the requested window
        len: usize,
        /// Capacity of the card buffer
        capacity: usize,
    },

    /// A transfer length larger than the card buffer
    #[error("Length {len} exceeds buffer capacity {capacity}")]
    LengthExceedsCapacity {
        /// Requested length
        len: usize,
        /// Capacity of the card buffer
        capacity: usize,
    },

    /// Driver configuration rejected at construction
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Voltage code outside the supported set
    #[error("Unsupported voltage level code: {0}")]
    InvalidVoltage(u8),

    //
    // Session related errors
    //
    /// Another session currently owns the driver
    #[error("Session already open")]
    SessionBusy,

    //
    // General errors
    //
    /// Blocking wait expired
    #[error("Operation timed out")]
    Timeout,

    /// The driver has been shut down
    #[error("Driver has been shut down")]
    Shutdown,

    /// Error reported by an external platform collaborator
    #[error("Platform error: {0}")]
    Platform(String),
}

impl Error {
    /// Create a new platform error with a dynamic message
    pub fn platform<S: Into<String>>(message: S) -> Self {
        Self::Platform(message.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }
}

/// Result type for SIM reader operations
pub type Result<T, E = Error> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::BufferOutOfRange {
            offset: 390,
            len: 20,
            capacity: 400,
        };
        assert_eq!(
            err.to_string(),
            "Buffer range of 20 bytes at offset 390 outside capacity 400"
        );
        assert_eq!(
            Error::InvalidRegister(0x7c).to_string(),
            "Invalid register offset: 0x7c"
        );
    }

    #[test]
    fn test_display_of_window_past_address_space() {
        let err = Error::BufferOutOfRange {
            offset: usize::MAX,
            len: 2,
            capacity: 400,
        };
        assert_eq!(
            err.to_string(),
            format!("Buffer range of 2 bytes at offset {} outside capacity 400", usize::MAX)
        );
    }
}
