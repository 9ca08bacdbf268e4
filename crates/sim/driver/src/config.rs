//! Driver configuration

use std::time::Duration;

use nexum_sim_core::debounce::DEFAULT_SAMPLES;
use nexum_sim_core::registers::{RDT, TDT, XMT_CNT};
use nexum_sim_core::{Error, ModuleLimits, ParityPolicy, Result};

/// Most reader modules one SIM block exposes
pub const MAX_MODULES: usize = 2;

/// Default time between two presence pin samples
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Presence debounce settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DebounceConfig {
    /// Consecutive identical samples needed to accept a level
    pub samples: u32,
    /// Milliseconds between two samples
    pub poll_interval_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl DebounceConfig {
    /// Time between two samples
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Configuration of a [`SimDriver`](crate::SimDriver)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimConfig {
    /// Number of reader modules (1 or 2)
    pub modules: usize,
    /// Counter, FIFO and buffer limits shared by every module
    pub limits: ModuleLimits,
    /// Parity handling of the receive engine
    pub parity_policy: ParityPolicy,
    /// Presence debounce settings
    pub debounce: DebounceConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            modules: 1,
            limits: ModuleLimits::default(),
            parity_policy: ParityPolicy::default(),
            debounce: DebounceConfig::default(),
        }
    }
}

impl SimConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of reader modules
    pub const fn with_modules(mut self, modules: usize) -> Self {
        self.modules = modules;
        self
    }

    /// Set the module limits
    pub const fn with_limits(mut self, limits: ModuleLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the parity handling
    pub const fn with_parity_policy(mut self, policy: ParityPolicy) -> Self {
        self.parity_policy = policy;
        self
    }

    /// Set the debounce sample count
    pub const fn with_debounce_samples(mut self, samples: u32) -> Self {
        self.debounce.samples = samples;
        self
    }

    /// Set the debounce poll interval
    pub const fn with_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.debounce.poll_interval_ms = interval_ms;
        self
    }

    /// Check the configuration before building a driver from it
    pub fn validate(&self) -> Result<()> {
        if self.modules == 0 || self.modules > MAX_MODULES {
            return Err(Error::config(format!(
                "modules must be between 1 and {MAX_MODULES}, got {}",
                self.modules
            )));
        }
        if self.debounce.samples == 0 {
            return Err(Error::config("debounce samples must be at least 1"));
        }
        let limits = &self.limits;
        if limits.counter_max == 0 {
            return Err(Error::config("counter_max must be at least 1"));
        }
        if limits.tx_fifo_depth == 0 || limits.rx_fifo_depth == 0 {
            return Err(Error::config("FIFO depths must be at least 1"));
        }
        // the engines program these into register fields of fixed width
        let widths = [
            ("rx_fifo_depth", u32::from(limits.rx_fifo_depth), RDT.max()),
            ("tx_fifo_depth", u32::from(limits.tx_fifo_depth), XMT_CNT.max()),
            ("tx_threshold", u32::from(limits.tx_threshold), TDT.max()),
        ];
        for (name, value, max) in widths {
            if value > max {
                return Err(Error::config(format!(
                    "{name} {value} does not fit its register field (max {max})"
                )));
            }
        }
        if u16::from(limits.tx_threshold) >= limits.tx_fifo_depth {
            return Err(Error::config(format!(
                "tx_threshold {} must be below the transmit FIFO depth {}",
                limits.tx_threshold, limits.tx_fifo_depth
            )));
        }
        Ok(())
    }
}
