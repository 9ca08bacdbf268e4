//! Driver settings loaded from an optional TOML file

use std::path::Path;

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use nexum_sim_driver::SimConfig;

/// Load the driver settings, starting from the defaults and merging the
/// file at `path` over them when one is given
pub(crate) fn load_config(path: Option<&Path>) -> eyre::Result<SimConfig> {
    let figment = Figment::from(Serialized::defaults(SimConfig::default()));
    let figment = match path {
        Some(path) => {
            if !path.exists() {
                eyre::bail!("config file {} not found", path.display());
            }
            figment.merge(Toml::file(path))
        }
        None => figment,
    };
    extract(figment)
}

fn extract(figment: Figment) -> eyre::Result<SimConfig> {
    let config: SimConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}
