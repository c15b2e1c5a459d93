use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Canonical timezone used when deriving business dates (evaluation ids,
/// daily survey limits, naive timestamp cells).
pub const BUSINESS_TIMEZONE: Tz = chrono_tz::Asia::Tokyo;

/// Business-calendar date of `at`.
pub fn business_date(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&BUSINESS_TIMEZONE).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn business_date_rolls_over_at_tokyo_midnight() {
        let before = Utc.with_ymd_and_hms(2024, 3, 31, 14, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 3, 31, 15, 0, 0).unwrap();

        assert_eq!(business_date(before), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        assert_eq!(business_date(after), NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
    }
}
