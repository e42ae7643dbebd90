//! Observation epochs as decimal Julian years.
//!
//! Proper motions are tabulated per Julian year (365.25 days), so epochs are
//! carried as `f64` Julian years: J2000.0 is 2000-01-01T12:00:00 TT. The
//! TT/UTC offset (about a minute) is far below the resolution proper-motion
//! corrections care about and is ignored.

use chrono::{DateTime, TimeZone, Utc};

/// Reference epoch of most astrometric catalogs.
pub const J2000: f64 = 2000.0;

/// Gaia DR3 reference epoch.
pub const J2016_5: f64 = 2016.5;

const DAYS_PER_JULIAN_YEAR: f64 = 365.25;
const SECONDS_PER_DAY: f64 = 86_400.0;

fn j2000_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Convert a UTC timestamp to a decimal Julian year.
pub fn decimal_year(time: DateTime<Utc>) -> f64 {
    let elapsed = time.signed_duration_since(j2000_instant());
    let days = elapsed.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY;
    J2000 + days / DAYS_PER_JULIAN_YEAR
}

/// Convert a Julian date to a decimal Julian year.
pub fn julian_date_to_year(jd: f64) -> f64 {
    J2000 + (jd - 2_451_545.0) / DAYS_PER_JULIAN_YEAR
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_j2000_instant() {
        let t = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(decimal_year(t), 2000.0);
    }

    #[test]
    fn test_one_julian_year_later() {
        // 365.25 days after J2000
        let t = Utc.with_ymd_and_hms(2000, 12, 31, 18, 0, 0).unwrap();
        assert_relative_eq!(decimal_year(t), 2001.0, epsilon = 1e-12);
    }

    #[test]
    fn test_julian_date() {
        assert_eq!(julian_date_to_year(2_451_545.0), 2000.0);
        assert_eq!(julian_date_to_year(2_457_389.0), 2016.0);
    }
}
