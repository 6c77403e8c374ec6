//! Manual override tracking for one light group.
//!
//! A light in the registry is left alone by the reconciliation loop. Entries
//! carry the light's attributes captured when the override started, and the
//! whole registry is cleared when the local calendar day changes so the
//! schedule takes every light back the next day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::backend::LightState;

/// Restorable attributes captured from a light.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedState {
    pub brightness: Option<u8>,
    pub color_temp: Option<u32>,
    pub rgb_color: Option<[u8; 3]>,
}

impl From<&LightState> for CapturedState {
    fn from(state: &LightState) -> Self {
        Self {
            brightness: state.brightness_pct,
            color_temp: state.color_temp_kelvin,
            rgb_color: state.rgb_color,
        }
    }
}

#[derive(Debug, Default)]
pub struct OverrideRegistry {
    entries: BTreeMap<String, CapturedState>,
    last_reset_date: Option<NaiveDate>,
}

impl OverrideRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `light_id`.
    pub fn add_override(&mut self, light_id: &str, captured: CapturedState) {
        self.entries.insert(light_id.to_string(), captured);
    }

    /// Remove the entry for `light_id`, returning what was captured.
    pub fn remove_override(&mut self, light_id: &str) -> Option<CapturedState> {
        self.entries.remove(light_id)
    }

    pub fn is_overridden(&self, light_id: &str) -> bool {
        self.entries.contains_key(light_id)
    }

    /// Clear everything when `today` differs from the last date seen.
    ///
    /// The first call only records the date. Returns the number of entries
    /// cleared.
    pub fn daily_reset(&mut self, today: NaiveDate) -> usize {
        match self.last_reset_date {
            Some(last) if last == today => 0,
            Some(_) => {
                let cleared = self.entries.len();
                self.entries.clear();
                self.last_reset_date = Some(today);
                cleared
            }
            None => {
                self.last_reset_date = Some(today);
                0
            }
        }
    }

    pub fn overridden_ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &CapturedState)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
