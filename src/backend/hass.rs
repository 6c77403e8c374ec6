//! Home Assistant REST backend.
//!
//! Uses the blocking `reqwest` client: each group worker owns its own thread,
//! so a slow Home Assistant only delays the group that is waiting on it.

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use super::{ColorMode, LightCommand, LightPower, LightSink, LightState};
use crate::constants::DEFAULT_HASS_TIMEOUT_SECS;

#[derive(Clone, Debug, Deserialize)]
pub struct HassState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

pub struct HassBackend {
    base_url: Url,
    http: Client,
    token: String,
}

impl HassBackend {
    /// Create a client for `base_url`, reading the access token from `token_env`.
    pub fn new(base_url: &str, token_env: &str) -> Result<Self> {
        let token = std::env::var(token_env)
            .with_context(|| format!("Missing Home Assistant token env var {token_env}"))?;
        if token.trim().is_empty() {
            anyhow::bail!("Empty Home Assistant token in env var {token_env}");
        }
        Self::with_token(base_url, token.trim().to_string())
    }

    pub fn with_token(base_url: &str, token: String) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid Home Assistant URL: {base_url}"))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_HASS_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url,
            http,
            token,
        })
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        let base = if self.base_url.as_str().ends_with('/') {
            self.base_url.clone()
        } else {
            Url::parse(&format!("{}/", self.base_url))?
        };
        Ok(base.join(endpoint.trim_start_matches('/'))?)
    }

    fn check_status(&self, response: Response, action: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().unwrap_or_default();

        if status == StatusCode::UNAUTHORIZED {
            anyhow::bail!("Home Assistant unauthorized during {action}. Verify the access token");
        }
        if body.is_empty() {
            anyhow::bail!("Home Assistant error during {action}: {status}");
        }
        anyhow::bail!("Home Assistant error during {action}: {status}: {body}")
    }

    fn call_light_service(&self, service: &str, data: Map<String, Value>) -> Result<()> {
        let url = self.endpoint_url(&format!("/api/services/light/{service}"))?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&Value::Object(data))
            .send()
            .with_context(|| format!("POST /api/services/light/{service} failed"))?;
        self.check_status(response, &format!("POST /api/services/light/{service}"))?;
        Ok(())
    }
}

impl LightSink for HassBackend {
    fn get_light_state(&self, light_id: &str) -> Result<Option<LightState>> {
        let url = self.endpoint_url(&format!("/api/states/{light_id}"))?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .with_context(|| format!("GET /api/states/{light_id} failed"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = self.check_status(response, &format!("GET /api/states/{light_id}"))?;
        let state: HassState = response
            .json()
            .with_context(|| format!("Invalid state payload for {light_id}"))?;
        Ok(Some(parse_light_state(&state)))
    }

    fn set_light(&self, light_id: &str, command: &LightCommand) -> Result<()> {
        self.call_light_service("turn_on", turn_on_payload(light_id, command))
    }

    fn turn_off(&self, light_id: &str) -> Result<()> {
        let mut data = Map::new();
        data.insert("entity_id".to_string(), Value::String(light_id.to_string()));
        self.call_light_service("turn_off", data)
    }

    fn backend_name(&self) -> &'static str {
        "Home Assistant"
    }
}

/// Body of a `light.turn_on` service call.
pub fn turn_on_payload(light_id: &str, command: &LightCommand) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("entity_id".to_string(), Value::String(light_id.to_string()));
    if let Some(brightness) = command.brightness_pct {
        data.insert("brightness_pct".to_string(), Value::from(brightness));
    }
    if let Some(kelvin) = command.color_temp_kelvin {
        data.insert("color_temp_kelvin".to_string(), Value::from(kelvin));
    }
    if let Some(rgb) = command.rgb_color {
        data.insert(
            "rgb_color".to_string(),
            Value::Array(rgb.iter().map(|c| Value::from(*c)).collect()),
        );
    }
    if let Some(transition) = command.transition_seconds {
        data.insert("transition".to_string(), Value::from(transition));
    }
    data
}

/// Convert a Home Assistant state object into a [`LightState`].
pub fn parse_light_state(state: &HassState) -> LightState {
    let power = match state.state.as_str() {
        "on" => LightPower::On,
        "off" => LightPower::Off,
        _ => LightPower::Unavailable,
    };

    let supported_color_modes = state
        .attributes
        .get("supported_color_modes")
        .and_then(Value::as_array)
        .map(|modes| {
            modes
                .iter()
                .filter_map(Value::as_str)
                .filter_map(ColorMode::from_name)
                .collect()
        })
        .unwrap_or_default();

    // Home Assistant reports brightness on a 0..255 scale.
    let brightness_pct = state
        .attributes
        .get("brightness")
        .and_then(Value::as_f64)
        .map(|raw| ((raw.clamp(0.0, 255.0) * 100.0 / 255.0).round()) as u8);

    let color_temp_kelvin = state
        .attributes
        .get("color_temp_kelvin")
        .and_then(Value::as_f64)
        .map(|k| k as u32);

    let rgb_color = state
        .attributes
        .get("rgb_color")
        .and_then(Value::as_array)
        .and_then(|values| {
            let [r, g, b] = values.as_slice() else {
                return None;
            };
            Some([
                r.as_u64()?.min(255) as u8,
                g.as_u64()?.min(255) as u8,
                b.as_u64()?.min(255) as u8,
            ])
        });

    LightState {
        power,
        supported_color_modes,
        brightness_pct,
        color_temp_kelvin,
        rgb_color,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hass_state(value: Value) -> HassState {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_light_state_on() {
        let state = hass_state(json!({
            "entity_id": "light.sofa",
            "state": "on",
            "attributes": {
                "brightness": 128,
                "color_temp_kelvin": 3200,
                "rgb_color": [255, 180, 107],
                "supported_color_modes": ["color_temp", "xy"]
            }
        }));
        let parsed = parse_light_state(&state);

        assert_eq!(parsed.power, LightPower::On);
        assert_eq!(parsed.brightness_pct, Some(50));
        assert_eq!(parsed.color_temp_kelvin, Some(3200));
        assert_eq!(parsed.rgb_color, Some([255, 180, 107]));
        assert!(parsed.supports_color_temp());
        assert!(parsed.supports_rgb());
    }

    #[test]
    fn test_parse_light_state_off_and_unavailable() {
        let off = hass_state(json!({
            "entity_id": "light.desk",
            "state": "off",
            "attributes": {"supported_color_modes": ["brightness"]}
        }));
        let parsed = parse_light_state(&off);
        assert_eq!(parsed.power, LightPower::Off);
        assert_eq!(parsed.brightness_pct, None);
        assert!(!parsed.supports_color_temp());

        let gone = hass_state(json!({"entity_id": "light.porch", "state": "unavailable"}));
        assert_eq!(parse_light_state(&gone).power, LightPower::Unavailable);
    }

    #[test]
    fn test_turn_on_payload() {
        let command = LightCommand {
            brightness_pct: Some(60),
            color_temp_kelvin: Some(3850),
            rgb_color: None,
            transition_seconds: Some(180),
        };
        let payload = Value::Object(turn_on_payload("light.sofa", &command));
        assert_eq!(
            payload,
            json!({
                "entity_id": "light.sofa",
                "brightness_pct": 60,
                "color_temp_kelvin": 3850,
                "transition": 180
            })
        );
    }

    #[test]
    fn test_endpoint_url_joins_paths() {
        let backend =
            HassBackend::with_token("http://homeassistant.local:8123", "token".into()).unwrap();
        assert_eq!(
            backend.endpoint_url("/api/states/light.sofa").unwrap().as_str(),
            "http://homeassistant.local:8123/api/states/light.sofa"
        );

        let prefixed =
            HassBackend::with_token("http://example.com/ha", "token".into()).unwrap();
        assert_eq!(
            prefixed.endpoint_url("/api/states").unwrap().as_str(),
            "http://example.com/ha/api/states"
        );
    }
}
