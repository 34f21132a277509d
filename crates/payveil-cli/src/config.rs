//! Configuration loading for the CLI.

use anyhow::{Context, Result};
use payveil_core::LifecycleConfig;
use std::path::Path;

/// Load `path` if it exists, apply `PAYVEIL_*` overrides, then validate.
pub fn load(path: &Path) -> Result<LifecycleConfig> {
    let mut config = if path.exists() {
        tracing::debug!(path = %path.display(), "loading config file");
        LifecycleConfig::load_from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "config file not found; using defaults");
        LifecycleConfig::default()
    };

    config
        .merge_with_env()
        .context("invalid PAYVEIL_* override")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}
