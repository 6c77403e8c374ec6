//! Location and sun times.
//!
//! The schedule is anchored to the local sunrise and sunset of one configured
//! location. Sun times are supplied by a [`SunTimesProvider`] so the
//! astronomical calculation can be swapped out in tests, and groups keep a
//! [`SunTimesCache`] so the provider is asked at most once per calendar day.

pub mod cache;
pub mod solar;

pub use cache::SunTimesCache;
pub use solar::{SolarCalculator, determine_timezone_from_coordinates};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Geographic location shared read-only by all groups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: Tz,
}

impl Location {
    /// Calendar date of `instant` in the location's timezone.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }
}

/// Sunrise and sunset of one calendar day, as UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SunTimes {
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

/// Source of sunrise/sunset instants for a date and location.
#[cfg_attr(test, mockall::automock)]
pub trait SunTimesProvider: Send + Sync {
    fn sun_times(&self, date: NaiveDate, location: &Location) -> Result<SunTimes>;
}
