//! `lumaflow simulate`: print a day of the schedule without touching lights.
//!
//! The day is walked on a simulated clock so every log line carries the
//! simulated instant, the same way a daemon running on a fast-forward clock
//! would report it.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::Arc;

use crate::circadian::{CircadianPhase, LightingTarget, calculations};
use crate::config;
use crate::core::GroupSettings;
use crate::geo::{Location, SolarCalculator, SunTimes, SunTimesProvider};
use crate::time_source::{self, SimulatedTimeSource};

/// One sampled instant of a simulated day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationRow {
    pub at: DateTime<Utc>,
    pub phase: CircadianPhase,
    pub target: LightingTarget,
}

/// Sample the schedule of `group` every `step` from local midnight of `date`
/// for 24 hours.
pub fn simulate_day(
    group: &GroupSettings,
    location: &Location,
    provider: &dyn SunTimesProvider,
    date: NaiveDate,
    step: ChronoDuration,
) -> Result<(SunTimes, Vec<SimulationRow>)> {
    if step <= ChronoDuration::zero() {
        anyhow::bail!("Simulation step must be positive");
    }

    let sun_times = provider
        .sun_times(date, location)
        .with_context(|| format!("No sun times for {date}"))?;
    let previous_day = match date.pred_opt() {
        Some(previous) => Some(
            provider
                .sun_times(previous, location)
                .with_context(|| format!("No sun times for {previous}"))?,
        ),
        None => None,
    };

    let start = location
        .timezone
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .ok_or_else(|| anyhow::anyhow!("Local midnight of {date} does not exist"))?
        .with_timezone(&Utc);
    let end = start + ChronoDuration::hours(24);

    let mut rows = Vec::new();
    let mut at = start;
    while at < end {
        let state = calculations::compute_with_previous_day(
            at,
            &sun_times,
            previous_day.as_ref(),
            group.options.sunset_offset,
            &group.bounds,
            group.options.transition_speed,
        );
        rows.push(SimulationRow {
            at,
            phase: state.phase,
            target: state.target,
        });
        at += step;
    }

    Ok((sun_times, rows))
}

/// Run the `simulate` subcommand against the configured location and groups.
pub fn handle_simulate_command(
    date: Option<NaiveDate>,
    step_minutes: u32,
    group: Option<&str>,
    debug_enabled: bool,
) -> Result<()> {
    log_version!();

    let config = config::load()?;
    let location = config.location()?;

    let groups: Vec<GroupSettings> = match group {
        Some(name) => vec![
            config
                .group(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown group '{name}'"))?
                .settings(),
        ],
        None => config.group_settings(),
    };

    let date = date.unwrap_or_else(|| location.local_date(Utc::now()));
    let step = ChronoDuration::minutes(i64::from(step_minutes));

    log_block_start!(
        "Simulating {} at {:.4}, {:.4} ({})",
        date,
        location.latitude,
        location.longitude,
        location.timezone
    );
    if debug_enabled {
        log_debug!("Step: {} minutes", step_minutes);
    }

    let provider = SolarCalculator::new();
    let mut clock: Option<Arc<SimulatedTimeSource>> = None;

    for settings in &groups {
        let (sun_times, rows) = simulate_day(settings, &location, &provider, date, step)?;

        // The process clock follows the rows so log lines carry the simulated time
        let source = match &clock {
            Some(source) => source.clone(),
            None => {
                let source = Arc::new(SimulatedTimeSource::new(rows.first().map_or(
                    sun_times.sunrise,
                    |row| row.at,
                )));
                time_source::init(source.clone())?;
                clock = Some(source.clone());
                source
            }
        };

        let local = |instant: DateTime<Utc>| {
            instant
                .with_timezone(&location.timezone)
                .format("%H:%M")
                .to_string()
        };

        log_block_start!("Group {}", settings.name);
        log_indented!(
            "Sunrise {}, sunset {} (adjusted {})",
            local(sun_times.sunrise),
            local(sun_times.sunset),
            local(calculations::sunset_adjusted(
                &sun_times,
                settings.options.sunset_offset
            ))
        );

        let mut previous: Option<CircadianPhase> = None;
        for row in rows {
            source.set(row.at);
            if previous != Some(row.phase) {
                log_decorated!("{}", row.phase);
                previous = Some(row.phase);
            }
            log_indented!(
                "{}  {:>3}%  {}K",
                local(row.at),
                row.target.brightness_pct,
                row.target.color_temp_kelvin
            );
        }
    }

    log_end!();
    Ok(())
}
