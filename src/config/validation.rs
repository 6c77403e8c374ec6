//! Configuration validation.
//!
//! Every check runs before any group is created. The first problem found is
//! returned as an error naming the offending key and group.

use anyhow::Result;
use std::collections::{HashMap, HashSet};

use super::{BackendKind, Config, GroupConfig, parse_timezone};
use crate::constants::*;

pub fn validate_config(config: &Config) -> Result<()> {
    validate_location(config)?;

    let interval = config.update_interval();
    if !(MINIMUM_UPDATE_INTERVAL..=MAXIMUM_UPDATE_INTERVAL).contains(&interval) {
        anyhow::bail!(
            "update_interval ({} seconds) must be between {} and {} seconds",
            interval,
            MINIMUM_UPDATE_INTERVAL,
            MAXIMUM_UPDATE_INTERVAL
        );
    }

    if config.backend() == BackendKind::Hass {
        let url = config.hass_url();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("hass_url ({url}) must start with http:// or https://");
        }
        if config.hass_token_env().trim().is_empty() {
            anyhow::bail!("hass_token_env must name an environment variable");
        }
    }

    if config.groups.is_empty() {
        anyhow::bail!("No light groups configured. Add at least one [[group]] table");
    }

    let mut names = HashSet::new();
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for group in &config.groups {
        validate_group(group)?;
        if !names.insert(group.name.as_str()) {
            anyhow::bail!("Duplicate group name '{}'", group.name);
        }
        // Two groups would fight over the light on every tick.
        for light in &group.lights {
            if let Some(owner) = owners.insert(light.as_str(), group.name.as_str()) {
                anyhow::bail!(
                    "Light '{}' is listed in both group '{}' and group '{}'",
                    light,
                    owner,
                    group.name
                );
            }
        }
    }

    Ok(())
}

fn validate_location(config: &Config) -> Result<()> {
    match (config.latitude, config.longitude) {
        (Some(lat), Some(lon)) => {
            if !(-90.0..=90.0).contains(&lat) {
                anyhow::bail!("latitude must be between -90 and 90 degrees (got {})", lat);
            }
            if !(-180.0..=180.0).contains(&lon) {
                anyhow::bail!(
                    "longitude must be between -180 and 180 degrees (got {})",
                    lon
                );
            }
        }
        _ => anyhow::bail!("latitude and longitude must both be configured"),
    }

    if let Some(name) = config.timezone.as_deref() {
        parse_timezone(name)?;
    }

    Ok(())
}

fn validate_group(group: &GroupConfig) -> Result<()> {
    if group.name.trim().is_empty() {
        anyhow::bail!("Every group needs a non-empty name");
    }
    let name = &group.name;

    if group.lights.is_empty() {
        anyhow::bail!("Group '{name}' has no lights");
    }
    let mut seen = HashSet::new();
    for light in &group.lights {
        if light.trim().is_empty() {
            anyhow::bail!("Group '{name}' contains an empty light id");
        }
        if !seen.insert(light.as_str()) {
            anyhow::bail!("Group '{name}' lists light '{light}' more than once");
        }
    }

    if let Some(offset) = group.sunset_offset
        && !(MINIMUM_SUNSET_OFFSET..=MAXIMUM_SUNSET_OFFSET).contains(&offset)
    {
        anyhow::bail!(
            "Group '{name}': sunset_offset ({} minutes) must be between {} and {} minutes",
            offset,
            MINIMUM_SUNSET_OFFSET,
            MAXIMUM_SUNSET_OFFSET
        );
    }

    let bounds = group.bounds();
    for (key, value) in [
        ("min_brightness", bounds.min_brightness),
        ("max_brightness", bounds.max_brightness),
    ] {
        if !(MINIMUM_BRIGHTNESS..=MAXIMUM_BRIGHTNESS).contains(&value) {
            anyhow::bail!(
                "Group '{name}': {key} ({value}%) must be between {}% and {}%",
                MINIMUM_BRIGHTNESS,
                MAXIMUM_BRIGHTNESS
            );
        }
    }
    for (key, value) in [
        ("min_color_temp", bounds.min_color_temp),
        ("max_color_temp", bounds.max_color_temp),
    ] {
        if !(MINIMUM_COLOR_TEMP..=MAXIMUM_COLOR_TEMP).contains(&value) {
            anyhow::bail!(
                "Group '{name}': {key} ({value}) must be between {} and {} Kelvin",
                MINIMUM_COLOR_TEMP,
                MAXIMUM_COLOR_TEMP
            );
        }
    }

    if bounds.min_brightness >= bounds.max_brightness {
        anyhow::bail!(
            "Group '{name}': min_brightness ({}) must be lower than max_brightness ({})",
            bounds.min_brightness,
            bounds.max_brightness
        );
    }
    if bounds.min_color_temp >= bounds.max_color_temp {
        anyhow::bail!(
            "Group '{name}': min_color_temp ({}) must be lower than max_color_temp ({})",
            bounds.min_color_temp,
            bounds.max_color_temp
        );
    }

    Ok(())
}
