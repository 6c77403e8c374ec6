//! Published results of a group: per-tick reports and status snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::circadian::{CircadianPhase, LightingTarget};
use crate::overrides::CapturedState;

/// Why a light was left untouched during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Overridden,
    SwitchedOff,
    NotOn,
    UnknownLight,
    OverrideDetected,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::Overridden => "manually overridden",
            SkipReason::SwitchedOff => "participation switched off",
            SkipReason::NotOn => "not powered on",
            SkipReason::UnknownLight => "unknown light",
            SkipReason::OverrideDetected => "manual change detected",
        };
        f.write_str(text)
    }
}

/// Result of handling one light.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum LightOutcome {
    Updated,
    Skipped(SkipReason),
    Failed(String),
}

/// Tally of light outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    pub fn from_outcomes<'a, I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = &'a LightOutcome>,
    {
        let mut counts = Self::default();
        for outcome in outcomes {
            match outcome {
                LightOutcome::Updated => counts.updated += 1,
                LightOutcome::Skipped(_) => counts.skipped += 1,
                LightOutcome::Failed(_) => counts.failed += 1,
            }
        }
        counts
    }
}

/// Everything one tick produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub phase: Option<CircadianPhase>,
    pub target: Option<LightingTarget>,
    /// Set when sun times could not be obtained; the previous target is kept.
    pub update_error: Option<String>,
    /// True when the group is disabled and no commands were issued.
    pub commands_suppressed: bool,
    pub overrides_cleared: usize,
    pub lights: Vec<(String, LightOutcome)>,
}

impl TickReport {
    pub fn counts(&self) -> OutcomeCounts {
        OutcomeCounts::from_outcomes(self.lights.iter().map(|(_, outcome)| outcome))
    }

    pub fn outcome(&self, light_id: &str) -> Option<&LightOutcome> {
        self.lights
            .iter()
            .find(|(id, _)| id == light_id)
            .map(|(_, outcome)| outcome)
    }
}

/// Overridden light with the attributes captured when the override began.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideInfo {
    pub light: String,
    pub captured: CapturedState,
}

/// Observable state of a group, as shown by `lumaflow status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub name: String,
    pub enabled: bool,
    pub lights: Vec<String>,
    pub phase: Option<CircadianPhase>,
    pub target: Option<LightingTarget>,
    pub rgb_color: Option<[u8; 3]>,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub sunset_adjusted: Option<DateTime<Utc>>,
    pub next_transition: Option<DateTime<Utc>>,
    pub overrides: Vec<OverrideInfo>,
    pub disabled_lights: Vec<String>,
    pub last_tick: Option<DateTime<Utc>>,
    pub last_counts: OutcomeCounts,
    pub last_error: Option<String>,
}
