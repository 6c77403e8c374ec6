//! Control socket protocol.
//!
//! Clients send one JSON request per line and get one JSON response per line
//! back. Requests are validated before anything runs; an invalid request is
//! answered with an error and has no effect.
//!
//! ```json
//! {"command": "override_lights", "lights": ["light.sofa"], "brightness": 30}
//! {"ok": true, "message": "Overrode 1 light", "data": [...]}
//! ```

pub mod client;
pub mod server;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::constants::{MAXIMUM_BRIGHTNESS, MAXIMUM_COLOR_TEMP, MINIMUM_BRIGHTNESS, MINIMUM_COLOR_TEMP};
use crate::core::{GroupDirectory, LightOutcome, OverrideValues};

pub use client::ControlClient;
pub use server::ControlServer;

/// Requests understood by the daemon.
///
/// Numeric fields are deserialized wide so that out-of-range values reach
/// validation and get a proper error message instead of a parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlRequest {
    Status,
    Enable {
        #[serde(default)]
        group: Option<String>,
    },
    Disable {
        #[serde(default)]
        group: Option<String>,
    },
    RestoreLights {
        #[serde(default)]
        lights: Option<Vec<String>>,
    },
    OverrideLights {
        lights: Vec<String>,
        #[serde(default)]
        brightness: Option<i64>,
        #[serde(default)]
        color_temp: Option<i64>,
        #[serde(default)]
        rgb_color: Option<Vec<i64>>,
    },
    TurnOn {
        group: String,
    },
    TurnOff {
        group: String,
    },
    SetLightEnabled {
        light: String,
        enabled: bool,
    },
    Reload,
}

impl ControlRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ControlRequest::Status => "status",
            ControlRequest::Enable { .. } => "enable",
            ControlRequest::Disable { .. } => "disable",
            ControlRequest::RestoreLights { .. } => "restore_lights",
            ControlRequest::OverrideLights { .. } => "override_lights",
            ControlRequest::TurnOn { .. } => "turn_on",
            ControlRequest::TurnOff { .. } => "turn_off",
            ControlRequest::SetLightEnabled { .. } => "set_light_enabled",
            ControlRequest::Reload => "reload",
        }
    }

    /// Check argument ranges without executing anything.
    pub fn validate(&self) -> Result<()> {
        match self {
            ControlRequest::OverrideLights {
                lights,
                brightness,
                color_temp,
                rgb_color,
            } => {
                if lights.is_empty() {
                    anyhow::bail!("override_lights needs at least one light");
                }
                override_values(*brightness, *color_temp, rgb_color.as_deref())?;
            }
            ControlRequest::TurnOn { group } | ControlRequest::TurnOff { group } => {
                if group.trim().is_empty() {
                    anyhow::bail!("{} needs a group name", self.name());
                }
            }
            ControlRequest::SetLightEnabled { light, .. } => {
                if light.trim().is_empty() {
                    anyhow::bail!("set_light_enabled needs a light id");
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Validate and narrow the explicit values of an override request.
pub fn override_values(
    brightness: Option<i64>,
    color_temp: Option<i64>,
    rgb_color: Option<&[i64]>,
) -> Result<OverrideValues> {
    let brightness = match brightness {
        Some(value)
            if !(i64::from(MINIMUM_BRIGHTNESS)..=i64::from(MAXIMUM_BRIGHTNESS))
                .contains(&value) =>
        {
            anyhow::bail!(
                "brightness ({value}) must be between {MINIMUM_BRIGHTNESS} and {MAXIMUM_BRIGHTNESS}"
            );
        }
        Some(value) => Some(value as u8),
        None => None,
    };

    let color_temp = match color_temp {
        Some(value)
            if !(i64::from(MINIMUM_COLOR_TEMP)..=i64::from(MAXIMUM_COLOR_TEMP))
                .contains(&value) =>
        {
            anyhow::bail!(
                "color_temp ({value}) must be between {MINIMUM_COLOR_TEMP} and {MAXIMUM_COLOR_TEMP} Kelvin"
            );
        }
        Some(value) => Some(value as u32),
        None => None,
    };

    let rgb_color = match rgb_color {
        Some(&[r, g, b]) => {
            let mut rgb = [0u8; 3];
            for (slot, value) in rgb.iter_mut().zip([r, g, b]) {
                *slot = u8::try_from(value).map_err(|_| {
                    anyhow::anyhow!("rgb_color components must be between 0 and 255 (got {value})")
                })?;
            }
            Some(rgb)
        }
        Some(other) => {
            anyhow::bail!(
                "rgb_color must have exactly 3 components (got {})",
                other.len()
            );
        }
        None => None,
    };

    Ok(OverrideValues {
        brightness,
        color_temp,
        rgb_color,
    })
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ControlResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn with_data<T: Serialize>(message: impl Into<String>, data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                ok: true,
                message: Some(message.into()),
                data: Some(value),
            },
            Err(e) => Self::error(format!("Failed to serialize response: {e}")),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Convert an error response into an `Err` carrying its message.
    pub fn into_result(self) -> Result<Self> {
        if self.ok {
            Ok(self)
        } else {
            Err(anyhow::anyhow!(
                self.message
                    .unwrap_or_else(|| "Request failed".to_string())
            ))
        }
    }
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

/// Run a validated request against the running groups.
///
/// `reload` is answered by the daemon's main loop, which owns the configuration.
pub fn execute(directory: &GroupDirectory, request: &ControlRequest) -> ControlResponse {
    if let Err(e) = request.validate() {
        return ControlResponse::error(e.to_string());
    }

    let result: Result<ControlResponse> = match request {
        ControlRequest::Status => directory
            .status()
            .map(|snapshots| ControlResponse::with_data("status", &snapshots)),
        ControlRequest::Enable { group } => directory.enable(group.as_deref()).map(|names| {
            ControlResponse::success(format!("Enabled {}", names.join(", ")))
        }),
        ControlRequest::Disable { group } => directory.disable(group.as_deref()).map(|names| {
            ControlResponse::success(format!("Disabled {}", names.join(", ")))
        }),
        ControlRequest::RestoreLights { lights } => directory
            .restore_lights(lights.as_deref())
            .map(|restored| {
                ControlResponse::with_data(
                    format!("Restored {}", plural(restored.len(), "light")),
                    &restored,
                )
            }),
        ControlRequest::OverrideLights {
            lights,
            brightness,
            color_temp,
            rgb_color,
        } => override_values(*brightness, *color_temp, rgb_color.as_deref()).and_then(|values| {
            directory.override_lights(lights, values).map(|outcomes| {
                ControlResponse::with_data(
                    format!("Overrode {}", plural(updated_count(&outcomes), "light")),
                    &outcomes,
                )
            })
        }),
        ControlRequest::TurnOn { group } => directory.turn_on(group).map(|outcomes| {
            ControlResponse::with_data(
                format!(
                    "Turned on {} in {group}",
                    plural(updated_count(&outcomes), "light")
                ),
                &outcomes,
            )
        }),
        ControlRequest::TurnOff { group } => directory.turn_off(group).map(|outcomes| {
            ControlResponse::with_data(
                format!(
                    "Turned off {} in {group}",
                    plural(updated_count(&outcomes), "light")
                ),
                &outcomes,
            )
        }),
        ControlRequest::SetLightEnabled { light, enabled } => directory
            .set_light_enabled(light, *enabled)
            .map(|found| {
                if found {
                    let state = if *enabled { "enabled" } else { "disabled" };
                    ControlResponse::success(format!("Light {light} {state}"))
                } else {
                    ControlResponse::error(format!("Light {light} is not part of any group"))
                }
            }),
        ControlRequest::Reload => Ok(ControlResponse::error(
            "reload is handled by the daemon, not by the groups",
        )),
    };

    result.unwrap_or_else(|e| ControlResponse::error(e.to_string()))
}

fn updated_count(outcomes: &[(String, LightOutcome)]) -> usize {
    outcomes
        .iter()
        .filter(|(_, outcome)| *outcome == LightOutcome::Updated)
        .count()
}

/// Path of the control socket.
///
/// `$XDG_RUNTIME_DIR/lumaflow.sock`, falling back to `/run/user/{uid}`.
pub fn socket_path() -> PathBuf {
    crate::io::runtime_dir().join("lumaflow.sock")
}
