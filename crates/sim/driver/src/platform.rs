//! Platform collaborators of the driver
//!
//! Card slot power, pin multiplexing, clocks and power management live
//! outside the SIM block. The driver reaches them through [`Platform`].

use std::collections::HashMap;
use std::fmt;

use nexum_sim_core::{Error, Result};
use parking_lot::Mutex;

/// Card supply voltage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VoltageLevel {
    /// Supply off
    Off,
    /// Class C, 1.8 V
    V1_8,
    /// Class B, 3 V
    V3_0,
    /// Class A, 5 V
    V5_0,
}

impl VoltageLevel {
    /// Decode the voltage code used by the control surface
    pub const fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Off),
            1 => Ok(Self::V1_8),
            2 => Ok(Self::V3_0),
            3 => Ok(Self::V5_0),
            other => Err(Error::InvalidVoltage(other)),
        }
    }

    /// Supply in millivolts
    pub const fn millivolts(self) -> u32 {
        match self {
            Self::Off => 0,
            Self::V1_8 => 1_800,
            Self::V3_0 => 3_000,
            Self::V5_0 => 5_000,
        }
    }
}

impl fmt::Display for VoltageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mV", self.millivolts())
    }
}

/// Board services the driver delegates to
///
/// Every method takes the reader module index. Hooks without a natural
/// failure mode have no-op defaults.
pub trait Platform: Send + Sync + fmt::Debug {
    /// Called first thing in every interrupt handler, before any register access
    fn io_activity(&self, _index: usize) {}

    /// Change the card supply voltage
    fn set_voltage(&self, index: usize, level: VoltageLevel) -> Result<()>;

    /// Route the SIM signals to the card slot pins
    fn configure_pins(&self, index: usize) -> Result<()>;

    /// Frequency of the clock feeding the SIM block
    fn peripheral_clock_hz(&self, index: usize) -> Result<u32>;

    /// Take ownership of the module's hardware when a session opens
    fn claim(&self, _index: usize) -> Result<()> {
        Ok(())
    }

    /// Give back what [`Platform::claim`] took
    fn release(&self, _index: usize) {}
}

/// Platform without any board behind it
///
/// Remembers the last voltage requested per module and reports a fixed
/// peripheral clock.
#[derive(Debug)]
pub struct NullPlatform {
    clock_hz: u32,
    voltages: Mutex<HashMap<usize, VoltageLevel>>,
}

impl NullPlatform {
    /// Peripheral clock reported by default
    pub const DEFAULT_CLOCK_HZ: u32 = 66_000_000;

    /// Create a platform reporting [`Self::DEFAULT_CLOCK_HZ`]
    pub fn new() -> Self {
        Self::with_clock_hz(Self::DEFAULT_CLOCK_HZ)
    }

    /// Create a platform reporting `clock_hz`
    pub fn with_clock_hz(clock_hz: u32) -> Self {
        Self {
            clock_hz,
            voltages: Mutex::new(HashMap::new()),
        }
    }

    /// Last voltage requested for module `index`
    pub fn voltage(&self, index: usize) -> Option<VoltageLevel> {
        self.voltages.lock().get(&index).copied()
    }
}

impl Default for NullPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for NullPlatform {
    fn set_voltage(&self, index: usize, level: VoltageLevel) -> Result<()> {
        self.voltages.lock().insert(index, level);
        Ok(())
    }

    fn configure_pins(&self, _index: usize) -> Result<()> {
        Ok(())
    }

    fn peripheral_clock_hz(&self, _index: usize) -> Result<u32> {
        Ok(self.clock_hz)
    }
}

impl<T: Platform + ?Sized> Platform for std::sync::Arc<T> {
    fn io_activity(&self, index: usize) {
        (**self).io_activity(index)
    }

    fn set_voltage(&self, index: usize, level: VoltageLevel) -> Result<()> {
        (**self).set_voltage(index, level)
    }

    fn configure_pins(&self, index: usize) -> Result<()> {
        (**self).configure_pins(index)
    }

    fn peripheral_clock_hz(&self, index: usize) -> Result<u32> {
        (**self).peripheral_clock_hz(index)
    }

    fn claim(&self, index: usize) -> Result<()> {
        (**self).claim(index)
    }

    fn release(&self, index: usize) {
        (**self).release(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voltage_codes() {
        assert_eq!(VoltageLevel::from_code(2), Ok(VoltageLevel::V3_0));
        assert_eq!(VoltageLevel::from_code(4), Err(Error::InvalidVoltage(4)));
        assert_eq!(VoltageLevel::V1_8.to_string(), "1800 mV");
    }

    #[test]
    fn test_null_platform_records_voltage() {
        let platform = NullPlatform::new();
        assert_eq!(platform.voltage(0), None);
        platform.set_voltage(0, VoltageLevel::V5_0).unwrap();
        assert_eq!(platform.voltage(0), Some(VoltageLevel::V5_0));
        assert_eq!(platform.peripheral_clock_hz(0), Ok(66_000_000));
    }
}
