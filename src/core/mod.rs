//! Light group reconciliation.
//!
//! A [`LightGroup`] owns everything mutable about one group of lights: the
//! enabled flag, per-light participation switches, the override registry, the
//! cached sun times and the history of targets it applied. It is driven by a
//! single [`worker::GroupWorker`] thread, so none of this state needs locking.
//!
//! Each tick:
//!
//! 1. clears overrides when the local date changed,
//! 2. fetches (or reuses) today's sun times, and the previous day's before
//!    sunrise so the night floor holds across local midnight,
//! 3. evaluates the circadian schedule,
//! 4. stops there when the group is disabled,
//! 5. otherwise sends the target to every eligible light, one after another,
//!    isolating per-light failures,
//! 6. records a [`TickReport`] for status queries.

pub mod directory;
pub mod snapshot;
pub mod worker;

pub use directory::GroupDirectory;
pub use snapshot::{GroupSnapshot, LightOutcome, OutcomeCounts, OverrideInfo, SkipReason, TickReport};
pub use worker::{GroupHandle, GroupMessage, GroupWorker};

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::backend::{LightCommand, LightSink, LightState};
use crate::circadian::{self, CircadianState, LightingTarget, ScheduleBounds, TransitionSpeed};
use crate::constants::{
    FADE_SETTLE_GRACE_SECS, OVERRIDE_BRIGHTNESS_TOLERANCE, OVERRIDE_COLOR_TEMP_TOLERANCE,
};
use crate::geo::{Location, SunTimes, SunTimesCache, SunTimesProvider};
use crate::overrides::{CapturedState, OverrideRegistry};

/// Group options that can change while the group runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupOptions {
    pub sunset_offset: i32,
    pub transition_speed: TransitionSpeed,
    pub override_detection: bool,
}

/// Everything needed to build a group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSettings {
    pub name: String,
    pub lights: Vec<String>,
    pub bounds: ScheduleBounds,
    pub options: GroupOptions,
    pub restore_on_startup: bool,
}

/// Explicit values requested by an override command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverrideValues {
    pub brightness: Option<u8>,
    pub color_temp: Option<u32>,
    pub rgb_color: Option<[u8; 3]>,
}

impl OverrideValues {
    fn to_command(self) -> LightCommand {
        LightCommand {
            brightness_pct: self.brightness,
            color_temp_kelvin: self.color_temp,
            rgb_color: self.rgb_color,
            transition_seconds: None,
        }
    }
}

/// Commands recently applied to a light, oldest first.
///
/// A light that is still fading may sit anywhere between the values of these
/// commands. The history keeps every command whose fade may still be running,
/// plus the newest settled one the light faded from.
#[derive(Debug, Clone, Default)]
struct AppliedHistory {
    commands: Vec<(DateTime<Utc>, LightCommand)>,
}

impl AppliedHistory {
    fn push(&mut self, issued_at: DateTime<Utc>, command: LightCommand) {
        self.commands.push((issued_at, command));
        let start = self.settled_index(issued_at);
        self.commands.drain(..start);
    }

    /// Index of the newest command whose fade has finished by `now`.
    ///
    /// Anything older was superseded before the light got there.
    fn settled_index(&self, now: DateTime<Utc>) -> usize {
        self.commands
            .iter()
            .rposition(|(issued_at, command)| {
                let fade = i64::from(command.transition_seconds.unwrap_or(0));
                *issued_at + ChronoDuration::seconds(fade + FADE_SETTLE_GRACE_SECS) <= now
            })
            .unwrap_or(0)
    }

    /// Whether the reported state lies outside what this history explains.
    fn drifted(&self, state: &LightState, now: DateTime<Utc>) -> bool {
        let commands = &self.commands[self.settled_index(now)..];

        let brightness_drift = match (
            state.brightness_pct,
            band(commands.iter().filter_map(|(_, c)| c.brightness_pct)),
        ) {
            (Some(actual), Some((low, high))) => {
                actual < low.saturating_sub(OVERRIDE_BRIGHTNESS_TOLERANCE)
                    || actual > high.saturating_add(OVERRIDE_BRIGHTNESS_TOLERANCE)
            }
            _ => false,
        };
        let color_temp_drift = match (
            state.color_temp_kelvin,
            band(commands.iter().filter_map(|(_, c)| c.color_temp_kelvin)),
        ) {
            (Some(actual), Some((low, high))) => {
                actual < low.saturating_sub(OVERRIDE_COLOR_TEMP_TOLERANCE)
                    || actual > high.saturating_add(OVERRIDE_COLOR_TEMP_TOLERANCE)
            }
            _ => false,
        };
        brightness_drift || color_temp_drift
    }
}

fn band<T: Ord + Copy>(values: impl Iterator<Item = T>) -> Option<(T, T)> {
    values.fold(None, |acc, value| {
        Some(match acc {
            Some((low, high)) => (low.min(value), high.max(value)),
            None => (value, value),
        })
    })
}

/// One group of lights following the circadian schedule.
pub struct LightGroup {
    name: String,
    lights: Vec<String>,
    bounds: ScheduleBounds,
    options: Arc<GroupOptions>,
    restore_on_startup: bool,
    enabled: bool,
    disabled_lights: BTreeSet<String>,
    registry: OverrideRegistry,
    sun_cache: SunTimesCache,
    location: Location,
    provider: Arc<dyn SunTimesProvider>,
    sink: Arc<dyn LightSink>,
    applied: HashMap<String, AppliedHistory>,
    last_state: Option<CircadianState>,
    last_sun_times: Option<SunTimes>,
    last_report: Option<TickReport>,
    debug_enabled: bool,
}

impl LightGroup {
    pub fn new(
        settings: GroupSettings,
        location: Location,
        provider: Arc<dyn SunTimesProvider>,
        sink: Arc<dyn LightSink>,
    ) -> Self {
        Self {
            name: settings.name,
            lights: settings.lights,
            bounds: settings.bounds,
            options: Arc::new(settings.options),
            restore_on_startup: settings.restore_on_startup,
            enabled: true,
            disabled_lights: BTreeSet::new(),
            registry: OverrideRegistry::new(),
            sun_cache: SunTimesCache::new(),
            location,
            provider,
            sink,
            applied: HashMap::new(),
            last_state: None,
            last_sun_times: None,
            last_report: None,
            debug_enabled: false,
        }
    }

    pub fn with_debug(mut self, debug_enabled: bool) -> Self {
        self.debug_enabled = debug_enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn restore_on_startup(&self) -> bool {
        self.restore_on_startup
    }

    pub fn options(&self) -> GroupOptions {
        *self.options
    }

    pub fn contains_light(&self, light_id: &str) -> bool {
        self.lights.iter().any(|id| id == light_id)
    }

    pub fn is_overridden(&self, light_id: &str) -> bool {
        self.registry.is_overridden(light_id)
    }

    /// Run one reconciliation pass at `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let options = Arc::clone(&self.options);

        let today = self.location.local_date(now);
        let overrides_cleared = self.registry.daily_reset(today);
        if overrides_cleared > 0 {
            // Lights may still sit at their manual values; start detection fresh.
            self.applied.clear();
            log_info!(
                "[{}] New day {}, cleared {} manual override(s)",
                self.name,
                today,
                overrides_cleared
            );
        }

        let (sun_times, previous_day) = match self.sun_times_at(now, today) {
            Ok(times) => times,
            Err(e) => {
                log_warning!("[{}] Failed to get sun times for {}: {:#}", self.name, today, e);
                log_indented!("Keeping the last target, retrying on the next update");
                let report = TickReport {
                    at: now,
                    phase: self.last_state.map(|s| s.phase),
                    target: self.last_state.map(|s| s.target),
                    update_error: Some(format!("{e:#}")),
                    commands_suppressed: true,
                    overrides_cleared,
                    lights: Vec::new(),
                };
                self.last_report = Some(report.clone());
                return report;
            }
        };

        let state = circadian::compute_with_previous_day(
            now,
            &sun_times,
            previous_day.as_ref(),
            options.sunset_offset,
            &self.bounds,
            options.transition_speed,
        );
        self.last_state = Some(state);
        self.last_sun_times = Some(sun_times);

        let mut report = TickReport {
            at: now,
            phase: Some(state.phase),
            target: Some(state.target),
            update_error: None,
            commands_suppressed: !self.enabled,
            overrides_cleared,
            lights: Vec::with_capacity(self.lights.len()),
        };

        if self.enabled {
            let lights = self.lights.clone();
            for light_id in lights {
                let outcome = self.reconcile_light(&light_id, &state.target, &options, now);
                report.lights.push((light_id, outcome));
            }
        }

        if self.debug_enabled {
            let counts = report.counts();
            log_debug!(
                "[{}] {} → {}% / {}K ({} updated, {} skipped, {} failed)",
                self.name,
                state.phase,
                state.target.brightness_pct,
                state.target.color_temp_kelvin,
                counts.updated,
                counts.skipped,
                counts.failed
            );
        }

        self.last_report = Some(report.clone());
        report
    }

    /// Today's sun times, plus the previous day's while `now` is before sunrise.
    fn sun_times_at(
        &mut self,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<(SunTimes, Option<SunTimes>)> {
        let provider = self.provider.as_ref();
        let times = self.sun_cache.get_or_compute(today, &self.location, provider)?;
        if now >= times.sunrise {
            return Ok((times, None));
        }

        let previous_day = match today.pred_opt() {
            Some(date) => Some(self.sun_cache.get_or_compute(date, &self.location, provider)?),
            None => None,
        };
        Ok((times, previous_day))
    }

    fn reconcile_light(
        &mut self,
        light_id: &str,
        target: &LightingTarget,
        options: &GroupOptions,
        now: DateTime<Utc>,
    ) -> LightOutcome {
        if self.registry.is_overridden(light_id) {
            return LightOutcome::Skipped(SkipReason::Overridden);
        }
        if self.disabled_lights.contains(light_id) {
            return LightOutcome::Skipped(SkipReason::SwitchedOff);
        }

        let state = match self.sink.get_light_state(light_id) {
            Ok(Some(state)) => state,
            Ok(None) => {
                log_warning!("[{}] Light {} not found, skipping", self.name, light_id);
                return LightOutcome::Skipped(SkipReason::UnknownLight);
            }
            Err(e) => {
                log_warning!("[{}] Failed to read state of {}: {:#}", self.name, light_id, e);
                return LightOutcome::Failed(format!("{e:#}"));
            }
        };

        if !state.is_on() {
            return LightOutcome::Skipped(SkipReason::NotOn);
        }

        if options.override_detection
            && let Some(history) = self.applied.get(light_id)
            && history.drifted(&state, now)
        {
            self.registry
                .add_override(light_id, CapturedState::from(&state));
            self.applied.remove(light_id);
            log_info!(
                "[{}] Manual change detected on {}, leaving it alone until restored",
                self.name,
                light_id
            );
            return LightOutcome::Skipped(SkipReason::OverrideDetected);
        }

        let command = LightCommand {
            brightness_pct: Some(target.brightness_pct),
            color_temp_kelvin: state
                .supports_color_temp()
                .then_some(target.color_temp_kelvin),
            rgb_color: None,
            transition_seconds: Some(target.transition_seconds),
        };

        self.send(light_id, command, now)
    }

    fn send(&mut self, light_id: &str, command: LightCommand, now: DateTime<Utc>) -> LightOutcome {
        match self.sink.set_light(light_id, &command) {
            Ok(()) => {
                self.applied
                    .entry(light_id.to_string())
                    .or_default()
                    .push(now, command);
                LightOutcome::Updated
            }
            Err(e) => {
                log_warning!("[{}] Failed to update {}: {:#}", self.name, light_id, e);
                LightOutcome::Failed(format!("{e:#}"))
            }
        }
    }

    pub fn enable(&mut self) {
        if !self.enabled {
            // Lights drifted freely while disabled.
            self.applied.clear();
        }
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Replace the runtime options; takes effect on the next tick.
    pub fn update_options(&mut self, options: GroupOptions) {
        self.options = Arc::new(options);
    }

    /// Toggle a light's participation switch.
    ///
    /// Returns false when the light is not part of this group.
    pub fn set_light_enabled(&mut self, light_id: &str, enabled: bool) -> bool {
        if !self.contains_light(light_id) {
            return false;
        }
        if enabled {
            if self.disabled_lights.remove(light_id) {
                self.applied.remove(light_id);
            }
        } else {
            self.disabled_lights.insert(light_id.to_string());
        }
        true
    }

    /// Put lights under manual control and apply the explicit values.
    ///
    /// Ids that do not belong to this group are ignored. Fields left out of
    /// `values` are not changed on the light.
    pub fn override_lights(
        &mut self,
        light_ids: &[String],
        values: OverrideValues,
    ) -> Vec<(String, LightOutcome)> {
        let command = values.to_command();
        let mut outcomes = Vec::new();

        let ours: Vec<&String> = light_ids
            .iter()
            .filter(|id| self.contains_light(id))
            .collect();

        for light_id in ours {
            let captured = match self.sink.get_light_state(light_id) {
                Ok(Some(state)) => CapturedState::from(&state),
                Ok(None) => {
                    log_warning!("[{}] Light {} not found, skipping override", self.name, light_id);
                    outcomes.push((light_id.clone(), LightOutcome::Skipped(SkipReason::UnknownLight)));
                    continue;
                }
                Err(e) => {
                    log_warning!("[{}] Failed to read state of {}: {:#}", self.name, light_id, e);
                    CapturedState::default()
                }
            };

            self.registry.add_override(light_id, captured);
            self.applied.remove(light_id);

            let outcome = if command.is_empty() {
                LightOutcome::Updated
            } else {
                match self.sink.set_light(light_id, &command) {
                    Ok(()) => LightOutcome::Updated,
                    Err(e) => {
                        log_warning!("[{}] Failed to override {}: {:#}", self.name, light_id, e);
                        LightOutcome::Failed(format!("{e:#}"))
                    }
                }
            };
            outcomes.push((light_id.clone(), outcome));
        }

        if !outcomes.is_empty() {
            log_decorated!("[{}] Overrode {} light(s)", self.name, outcomes.len());
        }
        outcomes
    }

    /// Return overridden lights to the schedule.
    ///
    /// With no ids every overridden light is restored; otherwise only the ids
    /// that are currently overridden. Returns the restored ids.
    pub fn restore_lights(&mut self, light_ids: Option<&[String]>) -> Vec<String> {
        let targets: Vec<String> = match light_ids {
            Some(ids) if !ids.is_empty() => ids
                .iter()
                .filter(|id| self.registry.is_overridden(id))
                .cloned()
                .collect(),
            _ => self.registry.overridden_ids(),
        };

        for light_id in &targets {
            self.registry.remove_override(light_id);
            self.applied.remove(light_id);
        }

        if !targets.is_empty() {
            log_decorated!("[{}] Restored {} light(s) to the schedule", self.name, targets.len());
        }
        targets
    }

    /// Turn every light of the group on with the current target.
    ///
    /// Lights with color temperature support get the target temperature,
    /// RGB-only lights get the coarse RGB tone. A disabled group only switches
    /// lights on.
    pub fn turn_on_group(&mut self, now: DateTime<Utc>) -> Result<Vec<(String, LightOutcome)>> {
        let target = if self.enabled {
            let today = self.location.local_date(now);
            let (sun_times, previous_day) = self.sun_times_at(now, today)?;
            let state = circadian::compute_with_previous_day(
                now,
                &sun_times,
                previous_day.as_ref(),
                self.options.sunset_offset,
                &self.bounds,
                self.options.transition_speed,
            );
            self.last_state = Some(state);
            self.last_sun_times = Some(sun_times);
            Some(state.target)
        } else {
            None
        };

        let lights = self.lights.clone();
        let mut outcomes = Vec::with_capacity(lights.len());
        for light_id in lights {
            let command = match target {
                Some(target) => self.turn_on_command(&light_id, &target),
                None => LightCommand::default(),
            };
            let outcome = if target.is_some() {
                self.send(&light_id, command, now)
            } else {
                match self.sink.set_light(&light_id, &command) {
                    Ok(()) => LightOutcome::Updated,
                    Err(e) => {
                        log_warning!("[{}] Failed to turn on {}: {:#}", self.name, light_id, e);
                        LightOutcome::Failed(format!("{e:#}"))
                    }
                }
            };
            outcomes.push((light_id, outcome));
        }

        log_decorated!("[{}] Turned on {} light(s)", self.name, outcomes.len());
        Ok(outcomes)
    }

    fn turn_on_command(&self, light_id: &str, target: &LightingTarget) -> LightCommand {
        // Capabilities unknown when the query fails; send brightness only.
        let state = self.sink.get_light_state(light_id).ok().flatten();
        let supports_ct = state.as_ref().is_some_and(LightState::supports_color_temp);
        let supports_rgb = state.as_ref().is_some_and(LightState::supports_rgb);

        LightCommand {
            brightness_pct: Some(target.brightness_pct),
            color_temp_kelvin: supports_ct.then_some(target.color_temp_kelvin),
            rgb_color: (!supports_ct && supports_rgb).then(|| target.rgb_color()),
            transition_seconds: Some(target.transition_seconds),
        }
    }

    /// Turn every light of the group off.
    pub fn turn_off_group(&mut self) -> Vec<(String, LightOutcome)> {
        let mut outcomes = Vec::with_capacity(self.lights.len());
        for light_id in &self.lights {
            let outcome = match self.sink.turn_off(light_id) {
                Ok(()) => LightOutcome::Updated,
                Err(e) => {
                    log_warning!("[{}] Failed to turn off {}: {:#}", self.name, light_id, e);
                    LightOutcome::Failed(format!("{e:#}"))
                }
            };
            outcomes.push((light_id.clone(), outcome));
        }
        log_decorated!("[{}] Turned off {} light(s)", self.name, outcomes.len());
        outcomes
    }

    pub fn snapshot(&self) -> GroupSnapshot {
        let state = self.last_state;
        GroupSnapshot {
            name: self.name.clone(),
            enabled: self.enabled,
            lights: self.lights.clone(),
            phase: state.map(|s| s.phase),
            target: state.map(|s| s.target),
            rgb_color: state.map(|s| s.target.rgb_color()),
            sunrise: self.last_sun_times.map(|t| t.sunrise),
            sunset: self.last_sun_times.map(|t| t.sunset),
            sunset_adjusted: state.map(|s| s.sunset_adjusted),
            next_transition: state.map(|s| s.next_transition),
            overrides: self
                .registry
                .entries()
                .map(|(light, captured)| OverrideInfo {
                    light: light.clone(),
                    captured: *captured,
                })
                .collect(),
            disabled_lights: self.disabled_lights.iter().cloned().collect(),
            last_tick: self.last_report.as_ref().map(|r| r.at),
            last_counts: self
                .last_report
                .as_ref()
                .map(TickReport::counts)
                .unwrap_or_default(),
            last_error: self
                .last_report
                .as_ref()
                .and_then(|r| r.update_error.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::VirtualBackend;
    use crate::backend::{ColorMode, LightPower, MockLightSink};
    use crate::geo::MockSunTimesProvider;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn location() -> Location {
        Location {
            latitude: 52.37,
            longitude: 4.89,
            timezone: chrono_tz::UTC,
        }
    }

    fn sun_times() -> SunTimes {
        SunTimes {
            sunrise: Utc.with_ymd_and_hms(2024, 6, 21, 4, 0, 0).unwrap(),
            sunset: Utc.with_ymd_and_hms(2024, 6, 21, 20, 0, 0).unwrap(),
        }
    }

    fn provider() -> Arc<dyn SunTimesProvider> {
        let mut provider = MockSunTimesProvider::new();
        provider.expect_sun_times().returning(|date, _| {
            let offset = date - sun_times().sunrise.date_naive();
            Ok(SunTimes {
                sunrise: sun_times().sunrise + offset,
                sunset: sun_times().sunset + offset,
            })
        });
        Arc::new(provider)
    }

    fn settings(lights: &[&str]) -> GroupSettings {
        GroupSettings {
            name: "living_room".into(),
            lights: lights.iter().map(|l| l.to_string()).collect(),
            bounds: ScheduleBounds {
                min_brightness: 20,
                max_brightness: 100,
                min_color_temp: 2700,
                max_color_temp: 5000,
            },
            options: GroupOptions {
                sunset_offset: 0,
                transition_speed: TransitionSpeed::Moderate,
                override_detection: true,
            },
            restore_on_startup: true,
        }
    }

    fn group_with(lights: &[&str]) -> (LightGroup, Arc<VirtualBackend>) {
        let backend = Arc::new(VirtualBackend::with_lights(
            lights.iter().map(|l| l.to_string()),
        ));
        let group = LightGroup::new(settings(lights), location(), provider(), backend.clone());
        (group, backend)
    }

    fn evening() -> DateTime<Utc> {
        sun_times().sunset + ChronoDuration::hours(2)
    }

    #[test]
    fn test_tick_applies_target_to_on_lights() {
        let (mut group, backend) = group_with(&["light.a", "light.b"]);
        let report = group.tick(evening());

        assert_eq!(report.counts().updated, 2);
        let command = backend.commands_for("light.a")[0];
        assert_eq!(command.brightness_pct, Some(60));
        assert_eq!(command.color_temp_kelvin, Some(3850));
        assert_eq!(command.transition_seconds, Some(180));
    }

    #[test]
    fn test_color_temp_only_when_supported() {
        let (mut group, backend) = group_with(&["light.dimmer"]);
        let mut state = VirtualBackend::default_state();
        state.supported_color_modes = [ColorMode::Brightness].into_iter().collect();
        backend.insert("light.dimmer", state);

        group.tick(evening());
        let command = backend.commands_for("light.dimmer")[0];
        assert_eq!(command.brightness_pct, Some(60));
        assert_eq!(command.color_temp_kelvin, None);
    }

    #[test]
    fn test_off_and_unknown_lights_are_skipped() {
        let backend = Arc::new(VirtualBackend::with_lights(
            ["light.on", "light.off", "light.porch"].map(String::from),
        ));
        backend.turn_off("light.off").unwrap();
        let mut porch = VirtualBackend::default_state();
        porch.power = LightPower::Unavailable;
        backend.insert("light.porch", porch);
        backend.clear_calls();

        let mut group = LightGroup::new(
            settings(&["light.on", "light.off", "light.porch", "light.ghost"]),
            location(),
            provider(),
            backend.clone(),
        );
        let report = group.tick(evening());

        assert_eq!(report.outcome("light.on"), Some(&LightOutcome::Updated));
        assert_eq!(
            report.outcome("light.off"),
            Some(&LightOutcome::Skipped(SkipReason::NotOn))
        );
        assert_eq!(
            report.outcome("light.porch"),
            Some(&LightOutcome::Skipped(SkipReason::NotOn))
        );
        assert_eq!(
            report.outcome("light.ghost"),
            Some(&LightOutcome::Skipped(SkipReason::UnknownLight))
        );
        assert_eq!(backend.calls().len(), 1);
    }

    #[test]
    fn test_disabled_group_publishes_but_sends_nothing() {
        let (mut group, backend) = group_with(&["light.a"]);
        group.disable();
        let report = group.tick(evening());

        assert!(report.commands_suppressed);
        assert!(report.lights.is_empty());
        assert_eq!(report.target.map(|t| t.brightness_pct), Some(60));
        assert!(backend.calls().is_empty());
        assert!(!group.snapshot().enabled);
    }

    #[test]
    fn test_partial_failure_isolation() {
        let mut sink = MockLightSink::new();
        sink.expect_get_light_state()
            .returning(|_| Ok(Some(VirtualBackend::default_state())));
        sink.expect_set_light()
            .withf(|id, _| id == "light.b")
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("device unreachable")));
        sink.expect_set_light()
            .withf(|id, _| id != "light.b")
            .times(2)
            .returning(|_, _| Ok(()));

        let mut group = LightGroup::new(
            settings(&["light.a", "light.b", "light.c"]),
            location(),
            provider(),
            Arc::new(sink),
        );
        let report = group.tick(evening());

        assert_eq!(report.counts().updated, 2);
        assert_eq!(report.counts().failed, 1);
        assert_eq!(
            report.outcome("light.b"),
            Some(&LightOutcome::Failed("device unreachable".into()))
        );
    }

    #[test]
    fn test_sun_time_failure_keeps_last_target() {
        let mut provider = MockSunTimesProvider::new();
        let mut calls = 0;
        provider.expect_sun_times().returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Ok(sun_times())
            } else {
                Err(anyhow::anyhow!("ephemeris unavailable"))
            }
        });
        let backend = Arc::new(VirtualBackend::with_lights(["light.a".to_string()]));
        let mut group = LightGroup::new(
            settings(&["light.a"]),
            location(),
            Arc::new(provider),
            backend.clone(),
        );

        let first = group.tick(evening());
        assert!(first.update_error.is_none());

        let next_day = evening() + ChronoDuration::days(1);
        let second = group.tick(next_day);
        assert!(second.update_error.is_some());
        assert_eq!(second.target, first.target);
        assert!(second.lights.is_empty());
        assert_eq!(group.snapshot().last_error, second.update_error);
    }

    #[test]
    fn test_override_then_restore() {
        let (mut group, backend) = group_with(&["light.a", "light.b"]);
        let outcomes = group.override_lights(
            &["light.a".to_string(), "light.elsewhere".to_string()],
            OverrideValues {
                brightness: Some(80),
                ..Default::default()
            },
        );
        assert_eq!(outcomes, vec![("light.a".to_string(), LightOutcome::Updated)]);
        assert_eq!(backend.state("light.a").unwrap().brightness_pct, Some(80));
        assert_eq!(
            group.snapshot().overrides[0].captured.brightness,
            Some(100)
        );

        let report = group.tick(evening());
        assert_eq!(
            report.outcome("light.a"),
            Some(&LightOutcome::Skipped(SkipReason::Overridden))
        );
        assert_eq!(report.outcome("light.b"), Some(&LightOutcome::Updated));

        assert_eq!(group.restore_lights(None), vec!["light.a".to_string()]);
        let report = group.tick(evening());
        assert_eq!(report.outcome("light.a"), Some(&LightOutcome::Updated));
        assert_eq!(backend.state("light.a").unwrap().brightness_pct, Some(60));
    }

    #[test]
    fn test_restore_only_intersection() {
        let (mut group, _backend) = group_with(&["light.a", "light.b"]);
        let ids = ["light.a".to_string(), "light.b".to_string()];
        group.override_lights(&ids, OverrideValues::default());

        let requested = ["light.b".to_string(), "light.z".to_string()];
        let restored = group.restore_lights(Some(&requested[..]));
        assert_eq!(restored, vec!["light.b".to_string()]);
        assert!(group.is_overridden("light.a"));
    }

    #[test]
    fn test_overrides_cleared_on_new_day() {
        let (mut group, _backend) = group_with(&["light.a"]);
        group.tick(evening());
        group.override_lights(&["light.a".to_string()], OverrideValues::default());

        let report = group.tick(evening() + ChronoDuration::days(1));
        assert_eq!(report.overrides_cleared, 1);
        assert_eq!(report.outcome("light.a"), Some(&LightOutcome::Updated));
    }

    #[test]
    fn test_manual_change_detected() {
        let (mut group, backend) = group_with(&["light.a"]);
        group.tick(evening());

        // Someone dims the light by hand.
        let mut state = backend.state("light.a").unwrap();
        state.brightness_pct = Some(15);
        backend.insert("light.a", state);

        let report = group.tick(evening() + ChronoDuration::minutes(1));
        assert_eq!(
            report.outcome("light.a"),
            Some(&LightOutcome::Skipped(SkipReason::OverrideDetected))
        );
        assert!(group.is_overridden("light.a"));
        assert_eq!(group.snapshot().overrides[0].captured.brightness, Some(15));
    }

    #[test]
    fn test_fading_light_is_not_a_manual_change() {
        let (mut group, backend) = group_with(&["light.a"]);
        group.tick(evening());
        group.tick(evening() + ChronoDuration::minutes(30));

        // Still fading between the last two targets (60% then 50%).
        let mut state = backend.state("light.a").unwrap();
        state.brightness_pct = Some(58);
        state.color_temp_kelvin = Some(3750);
        backend.insert("light.a", state);

        let report = group.tick(evening() + ChronoDuration::minutes(31));
        assert_eq!(report.outcome("light.a"), Some(&LightOutcome::Updated));
    }

    #[test]
    fn test_slow_fade_after_options_change_is_not_a_manual_change() {
        let (mut group, backend) = group_with(&["light.a"]);
        let start = evening() - ChronoDuration::minutes(30);
        group.tick(start);
        assert_eq!(backend.state("light.a").unwrap().brightness_pct, Some(70));

        // A later sunset puts the target back at the maximum, with a long fade.
        group.update_options(GroupOptions {
            sunset_offset: 120,
            transition_speed: TransitionSpeed::Slow,
            override_detection: true,
        });
        group.tick(start + ChronoDuration::minutes(1));
        assert_eq!(backend.state("light.a").unwrap().brightness_pct, Some(100));

        for (minute, reported) in [(2, 75), (3, 88)] {
            let mut state = backend.state("light.a").unwrap();
            state.brightness_pct = Some(reported);
            backend.insert("light.a", state);

            let report = group.tick(start + ChronoDuration::minutes(minute));
            assert_eq!(report.outcome("light.a"), Some(&LightOutcome::Updated));
        }
        assert!(!group.is_overridden("light.a"));

        // Once every fade has had time to finish, a departure is a manual change.
        let mut state = backend.state("light.a").unwrap();
        state.brightness_pct = Some(60);
        backend.insert("light.a", state);
        let report = group.tick(start + ChronoDuration::minutes(15));
        assert_eq!(
            report.outcome("light.a"),
            Some(&LightOutcome::Skipped(SkipReason::OverrideDetected))
        );
    }

    #[test]
    fn test_night_floor_holds_across_midnight() {
        let (mut group, backend) = group_with(&["light.a"]);
        let midnight = Utc.with_ymd_and_hms(2024, 6, 22, 0, 0, 0).unwrap();

        for at in [
            midnight - ChronoDuration::minutes(1),
            midnight + ChronoDuration::minutes(1),
            midnight + ChronoDuration::hours(2),
        ] {
            let report = group.tick(at);
            assert_eq!(report.target.map(|t| t.brightness_pct), Some(20), "at {at}");
            assert_eq!(report.outcome("light.a"), Some(&LightOutcome::Updated));
        }
        assert_eq!(group.snapshot().phase, Some(circadian::CircadianPhase::Night));
        assert_eq!(
            group.snapshot().next_transition,
            Some(midnight + ChronoDuration::hours(4))
        );

        let commands: Vec<_> = backend
            .commands_for("light.a")
            .iter()
            .map(|c| c.brightness_pct)
            .collect();
        assert_eq!(commands, vec![Some(20); 3]);

        // Sunrise brings the daytime values back.
        let report = group.tick(midnight + ChronoDuration::hours(5));
        assert_eq!(report.phase, Some(circadian::CircadianPhase::Day));
        assert_eq!(report.target.map(|t| t.brightness_pct), Some(100));
    }

    #[test]
    fn test_turn_on_before_sunrise_uses_night_floor() {
        let (mut group, backend) = group_with(&["light.a"]);
        let early = Utc.with_ymd_and_hms(2024, 6, 22, 2, 0, 0).unwrap();

        group.turn_on_group(early).unwrap();
        let command = backend.commands_for("light.a")[0];
        assert_eq!(command.brightness_pct, Some(20));
        assert_eq!(command.color_temp_kelvin, Some(2700));
    }

    #[test]
    fn test_detection_disabled_by_option() {
        let (mut group, backend) = group_with(&["light.a"]);
        group.update_options(GroupOptions {
            override_detection: false,
            ..group.options()
        });
        group.tick(evening());

        let mut state = backend.state("light.a").unwrap();
        state.brightness_pct = Some(5);
        backend.insert("light.a", state);

        let report = group.tick(evening() + ChronoDuration::minutes(1));
        assert_eq!(report.outcome("light.a"), Some(&LightOutcome::Updated));
    }

    #[test]
    fn test_options_update_applies_on_next_tick() {
        let (mut group, backend) = group_with(&["light.a"]);
        group.update_options(GroupOptions {
            sunset_offset: 120,
            transition_speed: TransitionSpeed::Fast,
            override_detection: true,
        });
        group.tick(evening());

        let command = backend.commands_for("light.a")[0];
        assert_eq!(command.brightness_pct, Some(100));
        assert_eq!(command.transition_seconds, Some(60));
    }

    #[test]
    fn test_light_switch_skips_light() {
        let (mut group, backend) = group_with(&["light.a", "light.b"]);
        assert!(group.set_light_enabled("light.b", false));
        assert!(!group.set_light_enabled("light.other", false));

        let report = group.tick(evening());
        assert_eq!(
            report.outcome("light.b"),
            Some(&LightOutcome::Skipped(SkipReason::SwitchedOff))
        );
        assert!(backend.commands_for("light.b").is_empty());
        assert_eq!(group.snapshot().disabled_lights, vec!["light.b".to_string()]);

        group.set_light_enabled("light.b", true);
        let report = group.tick(evening());
        assert_eq!(report.outcome("light.b"), Some(&LightOutcome::Updated));
    }

    #[test]
    fn test_turn_on_group_uses_rgb_for_color_only_lights() {
        let (mut group, backend) = group_with(&["light.ct", "light.rgb"]);
        let mut rgb = VirtualBackend::default_state();
        rgb.power = LightPower::Off;
        rgb.supported_color_modes = [ColorMode::Rgb].into_iter().collect();
        backend.insert("light.rgb", rgb);

        let outcomes = group.turn_on_group(evening()).unwrap();
        assert!(outcomes.iter().all(|(_, o)| *o == LightOutcome::Updated));

        let rgb_command = backend.commands_for("light.rgb")[0];
        assert_eq!(rgb_command.color_temp_kelvin, None);
        assert_eq!(rgb_command.rgb_color, Some([255, 197, 143]));
        assert!(backend.state("light.rgb").unwrap().is_on());

        let ct_command = backend.commands_for("light.ct")[0];
        assert_eq!(ct_command.color_temp_kelvin, Some(3850));
        assert_eq!(ct_command.rgb_color, None);
    }

    #[test]
    fn test_turn_off_group_isolates_failures() {
        let (mut group, backend) = group_with(&["light.a", "light.b"]);
        let mut broken = VirtualBackend::default_state();
        broken.power = LightPower::Unavailable;
        backend.insert("light.a", broken);

        let outcomes = group.turn_off_group();
        assert!(matches!(outcomes[0].1, LightOutcome::Failed(_)));
        assert_eq!(outcomes[1].1, LightOutcome::Updated);
        assert_eq!(backend.state("light.b").unwrap().power, LightPower::Off);
    }

    #[test]
    fn test_snapshot_reports_schedule() {
        let (mut group, _backend) = group_with(&["light.a"]);
        group.tick(evening());
        let snapshot = group.snapshot();

        assert_eq!(snapshot.phase, Some(circadian::CircadianPhase::Evening));
        assert_eq!(snapshot.sunset, Some(sun_times().sunset));
        assert_eq!(
            snapshot.next_transition,
            Some(sun_times().sunset + ChronoDuration::hours(4))
        );
        assert_eq!(snapshot.rgb_color, Some([255, 197, 143]));
        assert_eq!(snapshot.last_counts.updated, 1);
    }
}
