//! Circadian schedule model.
//!
//! This module holds the value types of the lighting schedule: the phase of the
//! day, the lighting target sent to lights, the fade speed and the brightness /
//! color temperature bounds of a group. The actual calculations live in
//! [`calculations`] and are pure functions of time and configuration.
//!
//! ## Schedule shape
//!
//! - Before the adjusted sunset lights run at the group's maximum brightness and
//!   coolest color temperature.
//! - From the adjusted sunset both values ramp down linearly for four hours.
//! - After four hours they stay at the group's minimum through the night,
//!   across local midnight, until the next sunrise.

pub mod calculations;

pub use calculations::{
    CircadianState, compute, compute_with_previous_day, current_phase, lighting_target,
    next_transition, sunset_adjusted,
};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{TRANSITION_FAST_SECS, TRANSITION_MODERATE_SECS, TRANSITION_SLOW_SECS};

/// Phase of the circadian day.
///
/// `Sunrise` is part of the published vocabulary but the calculator never
/// produces it: mornings fall into `Night` until sunrise and `Day` after.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircadianPhase {
    Day,
    Sunset,
    Evening,
    Night,
    Sunrise,
}

impl CircadianPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Sunset => "sunset",
            Self::Evening => "evening",
            Self::Night => "night",
            Self::Sunrise => "sunrise",
        }
    }
}

impl fmt::Display for CircadianPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fade duration requested from lights when a new target is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionSpeed {
    Slow,
    #[default]
    Moderate,
    Fast,
}

impl TransitionSpeed {
    /// Parse a speed name, falling back to `Moderate` for anything unknown.
    pub fn from_name(name: &str) -> Self {
        Self::parse(name).unwrap_or_default()
    }

    /// Strict parse used by validation to warn about unknown names.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "slow" => Some(Self::Slow),
            "moderate" => Some(Self::Moderate),
            "fast" => Some(Self::Fast),
            _ => None,
        }
    }

    pub fn transition_seconds(&self) -> u32 {
        match self {
            Self::Slow => TRANSITION_SLOW_SECS,
            Self::Moderate => TRANSITION_MODERATE_SECS,
            Self::Fast => TRANSITION_FAST_SECS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slow => "slow",
            Self::Moderate => "moderate",
            Self::Fast => "fast",
        }
    }
}

impl fmt::Display for TransitionSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Brightness and color temperature range of a light group.
///
/// Fixed for the lifetime of a group. `min < max` for both pairs is enforced by
/// configuration validation, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleBounds {
    pub min_brightness: u8,
    pub max_brightness: u8,
    pub min_color_temp: u32,
    pub max_color_temp: u32,
}

/// Values sent to lights for the current moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightingTarget {
    pub brightness_pct: u8,
    pub color_temp_kelvin: u32,
    pub transition_seconds: u32,
}

impl LightingTarget {
    /// Coarse RGB stand-in for the target color temperature.
    pub fn rgb_color(&self) -> [u8; 3] {
        color_temp_to_rgb(self.color_temp_kelvin)
    }
}

/// Map a color temperature onto one of four fixed RGB tones.
///
/// Used for lights that take RGB but have no color temperature mode. This is a
/// bucketed approximation, not a blackbody conversion.
pub fn color_temp_to_rgb(kelvin: u32) -> [u8; 3] {
    match kelvin {
        0..=3000 => [255, 147, 41],
        3001..=4000 => [255, 197, 143],
        4001..=5000 => [255, 214, 170],
        _ => [255, 244, 229],
    }
}
