//! In-memory virtual lights.

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::{ColorMode, LightCommand, LightPower, LightSink, LightState};

/// Call recorded by the virtual backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Set(String, LightCommand),
    TurnOff(String),
}

#[derive(Debug, Default)]
struct VirtualLights {
    lights: BTreeMap<String, LightState>,
    calls: Vec<RecordedCall>,
}

/// Lights that exist only in memory.
///
/// Commands update the stored state the way a real light would, and every call
/// is recorded so a dry run can show what would have been sent.
#[derive(Debug, Default)]
pub struct VirtualBackend {
    inner: Mutex<VirtualLights>,
}

impl VirtualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with the given lights, powered on at full brightness.
    pub fn with_lights<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let backend = Self::new();
        for id in ids {
            backend.insert(&id, Self::default_state());
        }
        backend
    }

    /// A powered-on light with brightness and color temperature support.
    pub fn default_state() -> LightState {
        LightState {
            power: LightPower::On,
            supported_color_modes: BTreeSet::from([ColorMode::ColorTemp]),
            brightness_pct: Some(100),
            color_temp_kelvin: Some(4000),
            rgb_color: None,
        }
    }

    pub fn insert(&self, light_id: &str, state: LightState) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.lights.insert(light_id.to_string(), state);
    }

    pub fn state(&self, light_id: &str) -> Option<LightState> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.lights.get(light_id).cloned()
    }

    /// All calls received so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.calls.clone()
    }

    /// Commands sent to one light, oldest first.
    pub fn commands_for(&self, light_id: &str) -> Vec<LightCommand> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RecordedCall::Set(id, command) if id == light_id => Some(command),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.calls.clear();
    }
}

impl LightSink for VirtualBackend {
    fn get_light_state(&self, light_id: &str) -> Result<Option<LightState>> {
        Ok(self.state(light_id))
    }

    fn set_light(&self, light_id: &str, command: &LightCommand) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .calls
            .push(RecordedCall::Set(light_id.to_string(), *command));

        let Some(light) = inner.lights.get_mut(light_id) else {
            anyhow::bail!("Unknown virtual light {light_id}");
        };
        if light.power == LightPower::Unavailable {
            anyhow::bail!("Virtual light {light_id} is unavailable");
        }

        light.power = LightPower::On;
        if let Some(brightness) = command.brightness_pct {
            light.brightness_pct = Some(brightness);
        }
        if let Some(kelvin) = command.color_temp_kelvin {
            light.color_temp_kelvin = Some(kelvin);
            light.rgb_color = None;
        }
        if let Some(rgb) = command.rgb_color {
            light.rgb_color = Some(rgb);
            light.color_temp_kelvin = None;
        }
        Ok(())
    }

    fn turn_off(&self, light_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.calls.push(RecordedCall::TurnOff(light_id.to_string()));

        let Some(light) = inner.lights.get_mut(light_id) else {
            anyhow::bail!("Unknown virtual light {light_id}");
        };
        if light.power == LightPower::Unavailable {
            anyhow::bail!("Virtual light {light_id} is unavailable");
        }
        light.power = LightPower::Off;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "Virtual"
    }
}
