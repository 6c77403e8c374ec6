//! Default configuration file generation.
//!
//! The generated file documents every key with an aligned trailing comment and
//! ships with the location and an example group commented out, so it only
//! validates once the user has filled them in.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::constants::*;

/// Write the commented default configuration to `path`.
pub fn create_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    fs::write(path, default_config_content())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub(crate) fn default_config_content() -> String {
    let top = ConfigBuilder::new()
        .add_section("Location")
        .add_commented_setting("latitude", "52.370216", "Geographic latitude (-90 to 90)")
        .add_commented_setting("longitude", "4.895168", "Geographic longitude (-180 to 180)")
        .add_commented_setting(
            "timezone",
            "\"Europe/Amsterdam\"",
            "IANA timezone, detected from the coordinates when absent",
        )
        .add_section("Backend")
        .add_setting(
            "backend",
            "\"hass\"",
            "Light backend: \"hass\" or \"virtual\"",
        )
        .add_setting(
            "hass_url",
            &format!("\"{DEFAULT_HASS_URL}\""),
            "Home Assistant base URL",
        )
        .add_setting(
            "hass_token_env",
            &format!("\"{DEFAULT_HASS_TOKEN_ENV}\""),
            "Environment variable holding a long-lived access token",
        )
        .add_setting(
            "update_interval",
            &DEFAULT_UPDATE_INTERVAL.to_string(),
            &format!(
                "Seconds between scheduled updates ({MINIMUM_UPDATE_INTERVAL}-{MAXIMUM_UPDATE_INTERVAL})"
            ),
        )
        .build();

    let group = ConfigBuilder::new()
        .add_table("group")
        .add_commented_setting("name", "\"living_room\"", "Unique group name")
        .add_commented_setting(
            "lights",
            "[\"light.sofa\", \"light.ceiling\"]",
            "Light entity ids",
        )
        .add_commented_setting(
            "sunset_offset",
            &DEFAULT_SUNSET_OFFSET.to_string(),
            &format!(
                "Minutes added to local sunset ({MINIMUM_SUNSET_OFFSET} to {MAXIMUM_SUNSET_OFFSET})"
            ),
        )
        .add_commented_setting(
            "transition_speed",
            &format!("\"{DEFAULT_TRANSITION_SPEED}\""),
            "Fade speed: \"slow\", \"moderate\" or \"fast\"",
        )
        .add_commented_setting(
            "min_brightness",
            &DEFAULT_MIN_BRIGHTNESS.to_string(),
            &format!("Night brightness ({MINIMUM_BRIGHTNESS}-{MAXIMUM_BRIGHTNESS}%)"),
        )
        .add_commented_setting(
            "max_brightness",
            &DEFAULT_MAX_BRIGHTNESS.to_string(),
            &format!("Day brightness ({MINIMUM_BRIGHTNESS}-{MAXIMUM_BRIGHTNESS}%)"),
        )
        .add_commented_setting(
            "min_color_temp",
            &DEFAULT_MIN_COLOR_TEMP.to_string(),
            &format!("Night color temperature ({MINIMUM_COLOR_TEMP}-{MAXIMUM_COLOR_TEMP}) Kelvin"),
        )
        .add_commented_setting(
            "max_color_temp",
            &DEFAULT_MAX_COLOR_TEMP.to_string(),
            &format!("Day color temperature ({MINIMUM_COLOR_TEMP}-{MAXIMUM_COLOR_TEMP}) Kelvin"),
        )
        .add_commented_setting(
            "enable_override_detection",
            &DEFAULT_ENABLE_OVERRIDE_DETECTION.to_string(),
            "Stop adjusting lights that were changed by hand",
        )
        .add_commented_setting(
            "restore_on_startup",
            &DEFAULT_RESTORE_ON_STARTUP.to_string(),
            "Apply the schedule immediately when the daemon starts",
        )
        .build();

    format!("{top}\n\n{group}\n")
}

struct ConfigBuilder {
    entries: Vec<ConfigEntry>,
}

enum ConfigEntry {
    Section(String),
    Setting { line: String, comment: String },
}

impl ConfigBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn add_section(mut self, title: &str) -> Self {
        self.entries.push(ConfigEntry::Section(format!("#[{title}]")));
        self
    }

    /// Array-of-tables header, commented out like its settings.
    fn add_table(mut self, name: &str) -> Self {
        self.entries.push(ConfigEntry::Section(format!("# [[{name}]]")));
        self
    }

    fn add_setting(mut self, key: &str, value: &str, comment: &str) -> Self {
        self.entries.push(ConfigEntry::Setting {
            line: format!("{key} = {value}"),
            comment: format!("# {comment}"),
        });
        self
    }

    fn add_commented_setting(mut self, key: &str, value: &str, comment: &str) -> Self {
        self.entries.push(ConfigEntry::Setting {
            line: format!("# {key} = {value}"),
            comment: format!("# {comment}"),
        });
        self
    }

    fn build(self) -> String {
        let max_width = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                ConfigEntry::Setting { line, .. } => Some(line.len()),
                ConfigEntry::Section(_) => None,
            })
            .max()
            .unwrap_or(0)
            + 1;

        let mut result = Vec::new();
        let mut first_section = true;

        for entry in self.entries {
            match entry {
                ConfigEntry::Section(title) => {
                    if !first_section {
                        result.push(String::new());
                    }
                    result.push(title);
                    first_section = false;
                }
                ConfigEntry::Setting { line, comment } => {
                    let padding = " ".repeat(max_width - line.len());
                    result.push(format!("{line}{padding}{comment}"));
                }
            }
        }

        result.join("\n")
    }
}
