use anyhow::Result;
use chrono::NaiveDate;

use super::{Location, SunTimes, SunTimesProvider};

/// Dates kept at once: today and the day before, for the night after midnight.
const CACHED_DAYS: usize = 2;

/// Sun times of the most recently requested dates.
///
/// A failed lookup is not cached, so the next tick asks the provider again.
#[derive(Debug, Default)]
pub struct SunTimesCache {
    entries: Vec<(NaiveDate, SunTimes)>,
}

impl SunTimesCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(
        &mut self,
        date: NaiveDate,
        location: &Location,
        provider: &dyn SunTimesProvider,
    ) -> Result<SunTimes> {
        if let Some((_, times)) = self.entries.iter().find(|(cached, _)| *cached == date) {
            return Ok(*times);
        }

        let times = provider.sun_times(date, location)?;
        self.entries.push((date, times));
        if self.entries.len() > CACHED_DAYS {
            self.entries.remove(0);
        }
        Ok(times)
    }
}
