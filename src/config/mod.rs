//! Configuration system for lumaflow.
//!
//! Configuration lives in a single TOML file, `$XDG_CONFIG_HOME/lumaflow/lumaflow.toml`
//! by default (or the path given with `--config`). Top-level keys describe the
//! location and the light backend; each `[[group]]` table describes one light group:
//!
//! ```toml
//! #[Location]
//! latitude = 52.370216             # Geographic latitude (-90 to 90)
//! longitude = 4.895168             # Geographic longitude (-180 to 180)
//! timezone = "Europe/Amsterdam"    # Optional, detected from the coordinates when absent
//!
//! #[Backend]
//! backend = "hass"                 # Light backend: "hass" or "virtual"
//! hass_url = "http://homeassistant.local:8123"
//! hass_token_env = "HASS_TOKEN"    # Environment variable holding the access token
//! update_interval = 60             # Seconds between scheduled updates (10-300)
//!
//! [[group]]
//! name = "living_room"
//! lights = ["light.sofa", "light.ceiling"]
//! sunset_offset = 0                # Minutes added to local sunset (-120 to 120)
//! transition_speed = "moderate"    # "slow", "moderate" or "fast"
//! min_brightness = 1               # Percent (1-100)
//! max_brightness = 100
//! min_color_temp = 2700            # Kelvin (2000-6500)
//! max_color_temp = 6500
//! enable_override_detection = true
//! restore_on_startup = true
//! ```
//!
//! Every group key except `name` and `lights` is optional and falls back to the
//! defaults in [`crate::constants`]. Defaults are applied through accessors so the
//! deserialized structure keeps track of what the user actually wrote, which the
//! reload path relies on when comparing two files.

pub mod builder;
pub mod loading;
pub mod validation;
pub mod watcher;

use anyhow::{Result, anyhow};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::circadian::{ScheduleBounds, TransitionSpeed};
use crate::constants::*;
use crate::core::{GroupOptions, GroupSettings};
use crate::geo::{Location, determine_timezone_from_coordinates};

pub use builder::create_default_config;
pub use loading::{get_config_path, get_custom_config_path, load, load_from_path, set_config_path};
pub use watcher::start_config_watcher;

/// Light backend selection.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Home Assistant REST API.
    Hass,
    /// In-memory lights, for dry runs and experimentation.
    Virtual,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Hass => "hass",
            BackendKind::Virtual => "virtual",
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// IANA timezone name used for the daily override reset.
    pub timezone: Option<String>,
    pub backend: Option<BackendKind>,
    pub hass_url: Option<String>,
    pub hass_token_env: Option<String>,
    pub update_interval: Option<u64>, // seconds between scheduled ticks
    #[serde(rename = "group", default)]
    pub groups: Vec<GroupConfig>,
}

/// One `[[group]]` table.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct GroupConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub lights: Vec<String>,
    pub sunset_offset: Option<i32>, // minutes
    pub transition_speed: Option<String>,
    pub min_brightness: Option<u8>,
    pub max_brightness: Option<u8>,
    pub min_color_temp: Option<u32>,
    pub max_color_temp: Option<u32>,
    pub enable_override_detection: Option<bool>,
    pub restore_on_startup: Option<bool>,
}

impl Config {
    pub fn backend(&self) -> BackendKind {
        self.backend.unwrap_or(BackendKind::Hass)
    }

    pub fn hass_url(&self) -> &str {
        self.hass_url.as_deref().unwrap_or(DEFAULT_HASS_URL)
    }

    pub fn hass_token_env(&self) -> &str {
        self.hass_token_env
            .as_deref()
            .unwrap_or(DEFAULT_HASS_TOKEN_ENV)
    }

    pub fn update_interval(&self) -> u64 {
        self.update_interval.unwrap_or(DEFAULT_UPDATE_INTERVAL)
    }

    /// Resolve the configured location.
    ///
    /// An explicit `timezone` wins; otherwise the zone is looked up from the
    /// coordinates.
    pub fn location(&self) -> Result<Location> {
        let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) else {
            anyhow::bail!("latitude and longitude must both be configured");
        };

        let timezone = match self.timezone.as_deref() {
            Some(name) => parse_timezone(name)?,
            None => determine_timezone_from_coordinates(latitude, longitude),
        };

        Ok(Location {
            latitude,
            longitude,
            timezone,
        })
    }

    pub fn group(&self, name: &str) -> Option<&GroupConfig> {
        self.groups.iter().find(|group| group.name == name)
    }

    /// Settings for every configured group, in file order.
    pub fn group_settings(&self) -> Vec<GroupSettings> {
        self.groups.iter().map(GroupConfig::settings).collect()
    }

    /// Print the effective configuration.
    pub fn log_config(&self, location: &Location) {
        log_block_start!("Loaded configuration");
        log_indented!(
            "Location: {:.4}, {:.4} ({})",
            location.latitude,
            location.longitude,
            location.timezone.name()
        );
        match self.backend() {
            BackendKind::Hass => log_indented!("Backend: hass ({})", self.hass_url()),
            BackendKind::Virtual => log_indented!("Backend: virtual"),
        }
        log_indented!("Update interval: {} seconds", self.update_interval());

        for group in &self.groups {
            let bounds = group.bounds();
            let options = group.options();
            log_block_start!("Group {}", group.name);
            log_indented!("Lights: {}", group.lights.join(", "));
            log_indented!(
                "Brightness: {}% - {}%",
                bounds.min_brightness,
                bounds.max_brightness
            );
            log_indented!(
                "Color temperature: {}K - {}K",
                bounds.min_color_temp,
                bounds.max_color_temp
            );
            log_indented!("Sunset offset: {} minutes", options.sunset_offset);
            log_indented!("Transition speed: {}", options.transition_speed);
            log_indented!(
                "Override detection: {}",
                if options.override_detection { "on" } else { "off" }
            );
        }
    }
}

impl GroupConfig {
    pub fn bounds(&self) -> ScheduleBounds {
        ScheduleBounds {
            min_brightness: self.min_brightness.unwrap_or(DEFAULT_MIN_BRIGHTNESS),
            max_brightness: self.max_brightness.unwrap_or(DEFAULT_MAX_BRIGHTNESS),
            min_color_temp: self.min_color_temp.unwrap_or(DEFAULT_MIN_COLOR_TEMP),
            max_color_temp: self.max_color_temp.unwrap_or(DEFAULT_MAX_COLOR_TEMP),
        }
    }

    /// Options that can be changed on a running group.
    pub fn options(&self) -> GroupOptions {
        GroupOptions {
            sunset_offset: self.sunset_offset.unwrap_or(DEFAULT_SUNSET_OFFSET),
            transition_speed: TransitionSpeed::from_name(
                self.transition_speed
                    .as_deref()
                    .unwrap_or(DEFAULT_TRANSITION_SPEED),
            ),
            override_detection: self
                .enable_override_detection
                .unwrap_or(DEFAULT_ENABLE_OVERRIDE_DETECTION),
        }
    }

    pub fn restore_on_startup(&self) -> bool {
        self.restore_on_startup
            .unwrap_or(DEFAULT_RESTORE_ON_STARTUP)
    }

    pub fn settings(&self) -> GroupSettings {
        GroupSettings {
            name: self.name.clone(),
            lights: self.lights.clone(),
            bounds: self.bounds(),
            options: self.options(),
            restore_on_startup: self.restore_on_startup(),
        }
    }
}

pub(crate) fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| anyhow!("Unknown timezone '{name}'"))
}

/// What a reloaded configuration means for the running groups.
#[derive(Debug, Default, PartialEq)]
pub struct ReloadPlan {
    /// Groups whose mutable options changed, with the new options.
    pub option_updates: Vec<(String, GroupOptions)>,
    /// Changes that only take effect after a restart.
    pub restart_required: Vec<String>,
}

impl ReloadPlan {
    pub fn is_empty(&self) -> bool {
        self.option_updates.is_empty() && self.restart_required.is_empty()
    }
}

/// Compare the running configuration with a freshly loaded one.
///
/// Only `sunset_offset`, `transition_speed` and `enable_override_detection` can be
/// applied to a running group. Everything else is reported as needing a restart.
pub fn plan_reload(current: &Config, reloaded: &Config) -> ReloadPlan {
    let mut plan = ReloadPlan::default();

    if current.latitude != reloaded.latitude
        || current.longitude != reloaded.longitude
        || current.timezone != reloaded.timezone
    {
        plan.restart_required.push("location".to_string());
    }
    if current.backend() != reloaded.backend()
        || current.hass_url() != reloaded.hass_url()
        || current.hass_token_env() != reloaded.hass_token_env()
    {
        plan.restart_required.push("backend".to_string());
    }
    if current.update_interval() != reloaded.update_interval() {
        plan.restart_required.push("update_interval".to_string());
    }

    for group in &reloaded.groups {
        let Some(running) = current.group(&group.name) else {
            plan.restart_required
                .push(format!("new group '{}'", group.name));
            continue;
        };
        if running.lights != group.lights {
            plan.restart_required
                .push(format!("lights of group '{}'", group.name));
        }
        if running.bounds() != group.bounds() {
            plan.restart_required
                .push(format!("bounds of group '{}'", group.name));
        }
        if running.options() != group.options() {
            plan.option_updates
                .push((group.name.clone(), group.options()));
        }
    }

    for group in &current.groups {
        if reloaded.group(&group.name).is_none() {
            plan.restart_required
                .push(format!("removed group '{}'", group.name));
        }
    }

    plan
}

#[cfg(test)]
mod tests;
