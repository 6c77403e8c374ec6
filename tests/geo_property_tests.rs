use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use lumaflow::geo::solar::{calculate_sun_times, determine_timezone_from_coordinates};

fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (2020i32..2035, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

proptest! {
    /// Away from the poles the sun always rises before it sets, within a day.
    #[test]
    fn sunrise_precedes_sunset(
        lat in -60.0f64..60.0,
        lon in -180.0f64..=180.0,
        date in date_strategy(),
    ) {
        let times = calculate_sun_times(date, lat, lon).unwrap();
        prop_assert!(times.sunrise < times.sunset);
        prop_assert!(times.sunset - times.sunrise < Duration::hours(24));
    }

    #[test]
    fn out_of_range_coordinates_are_rejected(
        lat in 90.1f64..1000.0,
        lon in -180.0f64..=180.0,
        date in date_strategy(),
    ) {
        prop_assert!(calculate_sun_times(date, lat, lon).is_err());
        prop_assert!(calculate_sun_times(date, -lat, lon).is_err());
    }

    /// Timezone lookup never panics, even over the open ocean.
    #[test]
    fn timezone_lookup_is_total(
        lat in -90.0f64..=90.0,
        lon in -180.0f64..=180.0,
    ) {
        let _ = determine_timezone_from_coordinates(lat, lon);
    }
}

#[test]
fn known_cities_resolve_to_their_timezone() {
    let cases = [
        (40.71, -74.01, chrono_tz::America::New_York),
        (-33.87, 151.21, chrono_tz::Australia::Sydney),
        (-23.55, -46.63, chrono_tz::America::Sao_Paulo),
    ];
    for (lat, lon, expected) in cases {
        assert_eq!(determine_timezone_from_coordinates(lat, lon), expected);
    }
}
