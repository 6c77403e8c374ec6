//! Light actuation backends.
//!
//! Groups talk to physical lights only through the [`LightSink`] trait. Each
//! call targets one light and may fail on its own; the reconciler decides what
//! a failure means for the rest of the group.
//!
//! ## Supported Backends
//!
//! - **Home Assistant** (`backend = "hass"`): REST API of a Home Assistant
//!   instance, authenticated with a long-lived token read from the environment.
//! - **Virtual** (`backend = "virtual"`): in-memory lights, for trying out a
//!   configuration and for tests.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::config::{BackendKind, Config};

pub mod hass;
pub mod memory;

/// Power state reported by a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightPower {
    On,
    Off,
    Unavailable,
}

impl fmt::Display for LightPower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LightPower::On => write!(f, "on"),
            LightPower::Off => write!(f, "off"),
            LightPower::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Color modes a light can be driven in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    Onoff,
    Brightness,
    ColorTemp,
    Hs,
    Xy,
    Rgb,
    Rgbw,
    Rgbww,
    White,
}

impl ColorMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "onoff" => Some(Self::Onoff),
            "brightness" => Some(Self::Brightness),
            "color_temp" => Some(Self::ColorTemp),
            "hs" => Some(Self::Hs),
            "xy" => Some(Self::Xy),
            "rgb" => Some(Self::Rgb),
            "rgbw" => Some(Self::Rgbw),
            "rgbww" => Some(Self::Rgbww),
            "white" => Some(Self::White),
            _ => None,
        }
    }

    /// Whether this mode accepts an RGB color.
    pub fn is_color(&self) -> bool {
        matches!(
            self,
            Self::Hs | Self::Xy | Self::Rgb | Self::Rgbw | Self::Rgbww
        )
    }
}

/// Snapshot of one light as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightState {
    pub power: LightPower,
    pub supported_color_modes: BTreeSet<ColorMode>,
    pub brightness_pct: Option<u8>,
    pub color_temp_kelvin: Option<u32>,
    pub rgb_color: Option<[u8; 3]>,
}

impl LightState {
    pub fn is_on(&self) -> bool {
        self.power == LightPower::On
    }

    pub fn supports_color_temp(&self) -> bool {
        self.supported_color_modes.contains(&ColorMode::ColorTemp)
    }

    pub fn supports_rgb(&self) -> bool {
        self.supported_color_modes.iter().any(ColorMode::is_color)
    }
}

/// Attributes to set on a light. Absent fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness_pct: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_temp_kelvin: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rgb_color: Option<[u8; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_seconds: Option<u32>,
}

impl LightCommand {
    pub fn is_empty(&self) -> bool {
        self.brightness_pct.is_none()
            && self.color_temp_kelvin.is_none()
            && self.rgb_color.is_none()
    }
}

/// Device command surface shared by all groups.
///
/// Implementations must be safe to call from several group threads at once.
#[cfg_attr(test, mockall::automock)]
pub trait LightSink: Send + Sync {
    /// Current state of `light_id`, or `None` when the backend does not know it.
    ///
    /// Capabilities are part of the answer and are queried fresh on each call.
    fn get_light_state(&self, light_id: &str) -> Result<Option<LightState>>;

    /// Apply `command` to `light_id`, turning it on if it is off.
    fn set_light(&self, light_id: &str, command: &LightCommand) -> Result<()>;

    fn turn_off(&self, light_id: &str) -> Result<()>;

    /// Human-readable backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Create the configured backend.
///
/// The virtual backend is seeded with every light named in the configuration,
/// all powered on and supporting color temperature.
pub fn create_backend(config: &Config) -> Result<Arc<dyn LightSink>> {
    match config.backend() {
        BackendKind::Hass => Ok(Arc::new(hass::HassBackend::new(
            config.hass_url(),
            config.hass_token_env(),
        )?)),
        BackendKind::Virtual => {
            let lights = config
                .groups
                .iter()
                .flat_map(|group| group.lights.iter().cloned());
            Ok(Arc::new(memory::VirtualBackend::with_lights(lights)))
        }
    }
}
