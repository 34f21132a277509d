//! CLI command handlers.

pub mod demo;
pub mod script;

use anyhow::Result;
use payveil_core::LifecycleConfig;

/// Print the effective configuration as TOML.
pub fn show_config(config: &LifecycleConfig) -> Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
