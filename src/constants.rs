//! Application constants and default values for lumaflow.
//!
//! This module contains all the configuration defaults, validation limits,
//! and operational constants used throughout the application.

// ═══ Application Configuration Defaults ═══
// These values are used when config options are not specified by the user

pub const DEFAULT_SUNSET_OFFSET: i32 = 0; // minutes
pub const DEFAULT_TRANSITION_SPEED: &str = "moderate";
pub const DEFAULT_MIN_BRIGHTNESS: u8 = 1; // percent
pub const DEFAULT_MAX_BRIGHTNESS: u8 = 100; // percent
pub const DEFAULT_MIN_COLOR_TEMP: u32 = 2700; // Kelvin - warm white
pub const DEFAULT_MAX_COLOR_TEMP: u32 = 6500; // Kelvin - cool white
pub const DEFAULT_ENABLE_OVERRIDE_DETECTION: bool = true;
pub const DEFAULT_RESTORE_ON_STARTUP: bool = true;
pub const DEFAULT_UPDATE_INTERVAL: u64 = 60; // seconds between scheduled ticks
pub const DEFAULT_HASS_URL: &str = "http://homeassistant.local:8123";
pub const DEFAULT_HASS_TOKEN_ENV: &str = "HASS_TOKEN";
pub const DEFAULT_HASS_TIMEOUT_SECS: u64 = 10;

// ═══ Transition Speeds ═══
// Seconds handed to the light as its fade duration

pub const TRANSITION_SLOW_SECS: u32 = 300;
pub const TRANSITION_MODERATE_SECS: u32 = 180;
pub const TRANSITION_FAST_SECS: u32 = 60;

// ═══ Validation Limits ═══
// These limits ensure user inputs are within reasonable and safe ranges

pub const MINIMUM_SUNSET_OFFSET: i32 = -120; // minutes
pub const MAXIMUM_SUNSET_OFFSET: i32 = 120; // minutes

pub const MINIMUM_BRIGHTNESS: u8 = 1; // percent
pub const MAXIMUM_BRIGHTNESS: u8 = 100; // percent

pub const MINIMUM_COLOR_TEMP: u32 = 2000; // Kelvin
pub const MAXIMUM_COLOR_TEMP: u32 = 6500; // Kelvin

pub const MINIMUM_UPDATE_INTERVAL: u64 = 10; // seconds
pub const MAXIMUM_UPDATE_INTERVAL: u64 = 300; // seconds

// ═══ Circadian Schedule ═══

/// Hours after the adjusted sunset at which the ramp reaches its floor.
pub const RAMP_DURATION_HOURS: i64 = 4;
/// Length of the "sunset" phase after the adjusted sunset.
pub const SUNSET_PHASE_HOURS: i64 = 1;

// ═══ Override Detection ═══
// Drift beyond these tolerances is treated as a manual adjustment

pub const OVERRIDE_BRIGHTNESS_TOLERANCE: u8 = 5; // percentage points
pub const OVERRIDE_COLOR_TEMP_TOLERANCE: u32 = 150; // Kelvin
pub const FADE_SETTLE_GRACE_SECS: i64 = 60; // a fade may report late by this much

// ═══ Operational Timing Constants ═══

pub const CONFIG_RELOAD_DEBOUNCE_MS: u64 = 500;
pub const CONTROL_POLL_INTERVAL_MS: u64 = 20;
pub const CONTROL_REPLY_TIMEOUT_SECS: u64 = 30;

// ═══ Exit Codes ═══

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
