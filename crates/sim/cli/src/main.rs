//! `simctl`: exercise the SIM reader driver against emulated reader modules

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use nexum_sim_driver::{ParityPolicy, SimDriver};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

mod commands;
mod config;

use commands::*;

#[derive(Parser)]
#[command(version, about = "Drive the SIM reader driver over emulated reader modules")]
struct Cli {
    /// Optional TOML file with driver settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of reader modules (overrides the config file)
    #[arg(long)]
    modules: Option<usize>,

    /// Parity handling of the receive engine (overrides the config file)
    #[arg(long, value_enum)]
    parity: Option<ParityArg>,

    /// Debug level output (`RUST_LOG` directives still apply on top)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ParityArg {
    /// Drop characters received with a parity error
    Discard,
    /// Keep them and report the error
    Preserve,
}

impl From<ParityArg> for ParityPolicy {
    fn from(arg: ParityArg) -> Self {
        match arg {
            ParityArg::Discard => Self::Discard,
            ParityArg::Preserve => Self::Preserve,
        }
    }
}

fn main() -> eyre::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(modules) = cli.modules {
        config = config.with_modules(modules);
    }
    if let Some(parity) = cli.parity {
        config = config.with_parity_policy(parity.into());
    }

    if let Commands::Config = cli.command {
        println!("{config:#?}");
        return Ok(());
    }
    if let Commands::Debounce {
        samples,
        initially_present,
    } = &cli.command
    {
        return debounce_command(samples, *initially_present, config.debounce.samples);
    }

    let (driver, sims) = SimDriver::emulated(config)?;
    info!(modules = driver.modules(), "emulated driver ready");

    let result = match &cli.command {
        Commands::Atr {
            atr,
            parity_errors,
            reader,
        } => atr_command(&driver, &sims, *reader, atr, parity_errors),
        Commands::Transmit {
            command,
            response,
            reader,
        } => transmit_command(&driver, &sims, *reader, command, response),
        Commands::Timer {
            kind,
            ticks,
            reader,
        } => timer_command(&driver, &sims, *reader, (*kind).into(), *ticks),
        Commands::Presence { reader } => presence_command(&driver, &sims, *reader),
        Commands::Config | Commands::Debounce { .. } => Ok(()),
    };

    driver.shutdown();
    result
}

fn setup_logging(verbose: bool) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose, &directives))
        .with_ansi(true)
        .init();
}

/// Filter from `directives`, falling back to the level chosen by `verbose`
fn env_filter(verbose: bool, directives: &str) -> EnvFilter {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(directives)
}
