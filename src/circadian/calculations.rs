//! Pure schedule calculations.
//!
//! Everything here is a function of its arguments only: no clock reads, no
//! configuration lookups, no I/O. Group workers and the `simulate` command both
//! call [`compute`] with the instant they care about.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use super::{CircadianPhase, LightingTarget, ScheduleBounds, TransitionSpeed};
use crate::constants::{RAMP_DURATION_HOURS, SUNSET_PHASE_HOURS};
use crate::geo::SunTimes;

/// Result of one schedule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircadianState {
    pub phase: CircadianPhase,
    pub target: LightingTarget,
    pub sunset_adjusted: DateTime<Utc>,
    pub next_transition: DateTime<Utc>,
}

/// Evaluate the schedule at `now`.
///
/// Phase and target are derived independently: the phase follows the table of
/// half-open windows around the adjusted sunset, while the target depends only
/// on the time elapsed since the adjusted sunset.
pub fn compute(
    now: DateTime<Utc>,
    sun_times: &SunTimes,
    offset_minutes: i32,
    bounds: &ScheduleBounds,
    speed: TransitionSpeed,
) -> CircadianState {
    let sunset_adjusted = sunset_adjusted(sun_times, offset_minutes);
    let phase = current_phase(now, sun_times.sunrise, sunset_adjusted);

    CircadianState {
        phase,
        target: lighting_target(now, sunset_adjusted, bounds, speed),
        sunset_adjusted,
        next_transition: next_transition(phase, sun_times.sunrise, sunset_adjusted),
    }
}

/// Evaluate the schedule at `now`, carrying last night's ramp until sunrise.
///
/// Sun times are per local calendar day, so after local midnight today's
/// adjusted sunset is ahead again. Before `today.sunrise` the target therefore
/// follows `previous_day`'s adjusted sunset and stays at the night floor. When
/// the previous day is unknown its sunset is taken as today's minus one day.
pub fn compute_with_previous_day(
    now: DateTime<Utc>,
    today: &SunTimes,
    previous_day: Option<&SunTimes>,
    offset_minutes: i32,
    bounds: &ScheduleBounds,
    speed: TransitionSpeed,
) -> CircadianState {
    let mut state = compute(now, today, offset_minutes, bounds, speed);
    if now < today.sunrise {
        let last_sunset = match previous_day {
            Some(times) => sunset_adjusted(times, offset_minutes),
            None => state.sunset_adjusted - ChronoDuration::days(1),
        };
        state.target = lighting_target(now, last_sunset, bounds, speed);
    }
    state
}

pub fn sunset_adjusted(sun_times: &SunTimes, offset_minutes: i32) -> DateTime<Utc> {
    sun_times.sunset + ChronoDuration::minutes(i64::from(offset_minutes))
}

/// Phase for `now`, using half-open windows.
pub fn current_phase(
    now: DateTime<Utc>,
    sunrise: DateTime<Utc>,
    sunset_adjusted: DateTime<Utc>,
) -> CircadianPhase {
    let sunset_end = sunset_adjusted + ChronoDuration::hours(SUNSET_PHASE_HOURS);
    let evening_end = sunset_adjusted + ChronoDuration::hours(RAMP_DURATION_HOURS);

    if now < sunrise {
        CircadianPhase::Night
    } else if now < sunset_adjusted {
        CircadianPhase::Day
    } else if now < sunset_end {
        CircadianPhase::Sunset
    } else if now < evening_end {
        CircadianPhase::Evening
    } else {
        CircadianPhase::Night
    }
}

/// Target brightness and color temperature for `now`.
///
/// Values ramp linearly from the maxima at `sunset_adjusted` to the minima four
/// hours later and stay there. Results are truncated toward zero once, after
/// interpolation.
pub fn lighting_target(
    now: DateTime<Utc>,
    sunset_adjusted: DateTime<Utc>,
    bounds: &ScheduleBounds,
    speed: TransitionSpeed,
) -> LightingTarget {
    let transition_seconds = speed.transition_seconds();

    if now < sunset_adjusted {
        return LightingTarget {
            brightness_pct: bounds.max_brightness,
            color_temp_kelvin: bounds.max_color_temp,
            transition_seconds,
        };
    }

    let progression = ramp_progression(now, sunset_adjusted);

    let brightness = interpolate(
        f64::from(bounds.max_brightness),
        f64::from(bounds.min_brightness),
        progression,
    );
    let color_temp = interpolate(
        f64::from(bounds.max_color_temp),
        f64::from(bounds.min_color_temp),
        progression,
    );

    LightingTarget {
        brightness_pct: brightness as u8,
        color_temp_kelvin: color_temp as u32,
        transition_seconds,
    }
}

/// Fraction of the ramp completed at `now`, clamped to [0, 1].
pub fn ramp_progression(now: DateTime<Utc>, sunset_adjusted: DateTime<Utc>) -> f64 {
    let elapsed_ms = (now - sunset_adjusted).num_milliseconds() as f64;
    let ramp_ms = ChronoDuration::hours(RAMP_DURATION_HOURS).num_milliseconds() as f64;
    (elapsed_ms / ramp_ms).clamp(0.0, 1.0)
}

fn interpolate(from: f64, to: f64, progression: f64) -> f64 {
    (from - progression * (from - to)).trunc()
}

/// Instant at which the current phase is expected to end.
pub fn next_transition(
    phase: CircadianPhase,
    sunrise: DateTime<Utc>,
    sunset_adjusted: DateTime<Utc>,
) -> DateTime<Utc> {
    match phase {
        CircadianPhase::Day | CircadianPhase::Sunrise => sunset_adjusted,
        CircadianPhase::Sunset => sunset_adjusted + ChronoDuration::hours(SUNSET_PHASE_HOURS),
        CircadianPhase::Evening => sunset_adjusted + ChronoDuration::hours(RAMP_DURATION_HOURS),
        CircadianPhase::Night => sunrise,
    }
}
