use crate::error::{BookingError, BookingResult};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Accepts a plain `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp.
pub fn parse_stay_date(raw: &str, field: &str) -> BookingResult<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            BookingError::ValidationFailure(format!(
                "{field} must be a date (YYYY-MM-DD) or ISO8601 timestamp"
            ))
        })
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
}

/// Rejects stays starting before today or ending on or before their start.
pub fn validate_stay(
    check_in: DateTime<Utc>,
    check_out: DateTime<Utc>,
    now: DateTime<Utc>,
) -> BookingResult<()> {
    if check_in < start_of_day(now) {
        return Err(BookingError::InvalidDateRange(
            "check-in date cannot be in the past",
        ));
    }
    if check_out <= check_in {
        return Err(BookingError::InvalidDateRange(
            "check-out must be after check-in",
        ));
    }
    Ok(())
}

/// Started days count as a full night.
pub fn nights_between(check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> i32 {
    let secs = (check_out - check_in).num_seconds();
    let nights = (secs + SECS_PER_DAY - 1).div_euclid(SECS_PER_DAY);
    i32::try_from(nights.max(1)).unwrap_or(i32::MAX)
}

/// Half-open interval intersection: touching ranges do not overlap.
pub fn overlaps(
    a_in: DateTime<Utc>,
    a_out: DateTime<Utc>,
    b_in: DateTime<Utc>,
    b_out: DateTime<Utc>,
) -> bool {
    a_in < b_out && a_out > b_in
}
