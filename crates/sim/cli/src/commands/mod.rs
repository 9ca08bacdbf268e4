use std::{sync::Arc, time::Duration};

use clap::{Subcommand, ValueEnum};
use nexum_sim_core::EmulatedSim;
use nexum_sim_driver::{NullPlatform, SimDriver, TimerKind};

mod presence;
mod timer;
mod transfer;

pub(crate) use presence::*;
pub(crate) use timer::*;
pub(crate) use transfer::*;

/// Handler rounds after which a still pending source counts as stuck
const MAX_ROUNDS: usize = 10_000;

/// How long a command waits for the driver to report back
const WAIT: Duration = Duration::from_secs(2);

/// Driver over emulated reader blocks
pub(crate) type EmulatedDriver = SimDriver<Arc<EmulatedSim>, NullPlatform>;

/// Define subcommands for the CLI
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Print the effective driver configuration
    Config,

    /// Capture an answer to reset sent by the emulated card
    Atr {
        /// ATR bytes in hex
        #[arg(required = true)]
        atr: String,

        /// Positions of bytes delivered with a parity error
        #[arg(long, value_delimiter = ',')]
        parity_errors: Vec<usize>,

        /// Reader module to use
        #[arg(short, long, default_value_t = 0)]
        reader: usize,
    },

    /// Send a command and capture the card's response
    Transmit {
        /// Command bytes in hex
        #[arg(required = true)]
        command: String,

        /// Response the emulated card sends back, in hex
        #[arg(long, default_value = "9000")]
        response: String,

        /// Reader module to use
        #[arg(short, long, default_value_t = 0)]
        reader: usize,
    },

    /// Arm a logical timeout and let the hardware counter run it down
    Timer {
        /// Counter backing the timeout
        #[arg(value_enum)]
        kind: TimerArg,

        /// Timeout in counter ticks
        ticks: u32,

        /// Reader module to use
        #[arg(short, long, default_value_t = 0)]
        reader: usize,
    },

    /// Feed a sampled presence pin through the debouncer, e.g. `1101111111`
    Debounce {
        /// Pin samples, `1` for present and `0` for absent
        #[arg(required = true)]
        samples: String,

        /// Level accepted before the first sample
        #[arg(long)]
        initially_present: bool,
    },

    /// Insert and remove a card on the emulated presence pin
    Presence {
        /// Reader module to use
        #[arg(short, long, default_value_t = 0)]
        reader: usize,
    },
}

/// Counter selection on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum TimerArg {
    /// Character wait time counter
    Cwt,
    /// General purpose counter
    Gpcnt,
}

impl From<TimerArg> for TimerKind {
    fn from(arg: TimerArg) -> Self {
        match arg {
            TimerArg::Cwt => Self::Cwt,
            TimerArg::Gpcnt => Self::Gpcnt,
        }
    }
}

/// Emulated block of module `index`
fn module(sims: &[Arc<EmulatedSim>], index: usize) -> eyre::Result<&EmulatedSim> {
    sims.get(index)
        .map(|sim| &**sim)
        .ok_or_else(|| eyre::eyre!("reader {index} out of range ({} configured)", sims.len()))
}

/// Run both interrupt handlers of `index` while the block reports an
/// unmasked source, the way the platform's interrupt controller would
fn pump(driver: &EmulatedDriver, sim: &EmulatedSim, index: usize) -> eyre::Result<usize> {
    for rounds in 0..MAX_ROUNDS {
        let mut handled = false;
        if sim.data_irq_pending() {
            handled |= driver.handle_data_irq(index)?.is_handled();
        }
        if sim.general_irq_pending() {
            handled |= driver.handle_general_irq(index)?.is_handled();
        }
        if !handled {
            return Ok(rounds);
        }
    }
    eyre::bail!("reader {index} keeps interrupting after {MAX_ROUNDS} rounds")
}

fn parse_hex(label: &str, value: &str) -> eyre::Result<Vec<u8>> {
    let value = value.trim_start_matches("0x").replace([' ', ':'], "");
    hex::decode(&value).map_err(|e| eyre::eyre!("invalid {label} hex: {e}"))
}
