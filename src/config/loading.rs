//! Configuration loading functionality.
//!
//! Resolves the configuration path, creates a default file on first run,
//! parses TOML and runs validation.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::validation::validate_config;
use super::{Config, create_default_config};

/// Configuration file given with `--config`, set once at startup.
static CONFIG_PATH: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Set the configuration file for the current process.
///
/// Can only be called once. Returns an error if already set.
pub fn set_config_path(path: Option<String>) -> Result<()> {
    CONFIG_PATH
        .set(path.map(PathBuf::from))
        .map_err(|_| anyhow::anyhow!("Configuration path already set"))
}

/// The custom configuration file, if one was set.
pub fn get_custom_config_path() -> Option<PathBuf> {
    CONFIG_PATH.get().and_then(|p| p.clone())
}

/// Path of the configuration file in use.
pub fn get_config_path() -> Result<PathBuf> {
    if let Some(custom) = get_custom_config_path() {
        return Ok(custom);
    }

    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("lumaflow").join("lumaflow.toml"))
}

/// Load the configuration, creating a commented default file if none exists.
pub fn load() -> Result<Config> {
    let config_path = get_config_path()?;

    if !config_path.exists() {
        create_default_config(&config_path)
            .with_context(|| format!("Failed to create {}", config_path.display()))?;
        log_block_start!("Created default configuration");
        log_indented!("{}", config_path.display());
        log_indented!("Add your coordinates and at least one [[group]] before starting");
    }

    load_from_path(&config_path)
}

/// Load and validate a configuration file.
pub fn load_from_path(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!("Configuration file not found: {}", path.display());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    parse_config(&content)
        .with_context(|| format!("Invalid configuration in {}", path.display()))
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse TOML")?;

    validate_config(&config)?;
    warn_unknown_speeds(&config);

    Ok(config)
}

fn warn_unknown_speeds(config: &Config) {
    for group in &config.groups {
        if let Some(speed) = group.transition_speed.as_deref()
            && crate::circadian::TransitionSpeed::parse(speed).is_none()
        {
            log_warning!(
                "Group {}: unknown transition_speed '{}', using moderate",
                group.name,
                speed
            );
        }
    }
}
