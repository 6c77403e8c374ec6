//! Astronomical sunrise/sunset calculations.
//!
//! Uses the `sunrise` crate for the solar events and `tzf-rs` to find the
//! timezone of a coordinate pair when the configuration does not name one.

use anyhow::Result;
use chrono::NaiveDate;
use chrono_tz::Tz;
use sunrise::{Coordinates, SolarDay, SolarEvent};

use super::{Location, SunTimes, SunTimesProvider};

/// Sun times computed from coordinates with the standard 0° horizon.
#[derive(Debug, Default, Clone, Copy)]
pub struct SolarCalculator;

impl SolarCalculator {
    pub fn new() -> Self {
        Self
    }
}

impl SunTimesProvider for SolarCalculator {
    fn sun_times(&self, date: NaiveDate, location: &Location) -> Result<SunTimes> {
        calculate_sun_times(date, location.latitude, location.longitude)
    }
}

/// Compute sunrise and sunset for `date` at the given coordinates.
///
/// Fails for polar day or polar night, where the sun does not cross the
/// horizon and the library returns degenerate event times.
pub fn calculate_sun_times(date: NaiveDate, latitude: f64, longitude: f64) -> Result<SunTimes> {
    if !(-90.0..=90.0).contains(&latitude) {
        anyhow::bail!("Invalid latitude: {latitude}. Must be between -90 and 90 degrees");
    }
    if !(-180.0..=180.0).contains(&longitude) {
        anyhow::bail!("Invalid longitude: {longitude}. Must be between -180 and 180 degrees");
    }

    let coord = Coordinates::new(latitude, longitude)
        .ok_or_else(|| anyhow::anyhow!("Invalid coordinates"))?;
    let solar_day = SolarDay::new(coord, date);

    let sunrise = solar_day.event_time(SolarEvent::Sunrise);
    let sunset = solar_day.event_time(SolarEvent::Sunset);

    if sunrise >= sunset {
        anyhow::bail!(
            "No sunrise/sunset on {date} at {latitude:.4}°, {longitude:.4}° (polar day or night)"
        );
    }

    Ok(SunTimes { sunrise, sunset })
}

/// Determine the timezone for given coordinates using timezone boundary data.
///
/// Falls back to `$TZ` and then UTC when the boundary lookup yields a name
/// chrono-tz does not know.
pub fn determine_timezone_from_coordinates(latitude: f64, longitude: f64) -> Tz {
    use std::sync::OnceLock;
    use tzf_rs::DefaultFinder;

    static FINDER: OnceLock<DefaultFinder> = OnceLock::new();
    let finder = FINDER.get_or_init(DefaultFinder::new);

    // tzf-rs takes (longitude, latitude)
    let tz_name = finder.get_tz_name(longitude, latitude);

    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => match std::env::var("TZ") {
            Ok(tz_str) => tz_str.parse().unwrap_or(Tz::UTC),
            Err(_) => Tz::UTC,
        },
    }
}
