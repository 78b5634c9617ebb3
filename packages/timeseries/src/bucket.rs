//! Bucket alignment and counting per aggregation granularity.
//!
//! Fixed-width granularities align to multiples of their width from the Unix
//! epoch. `month` and `year` align to UTC calendar boundaries. Buckets are
//! half-open: a timestamp on a boundary belongs to the bucket starting there.

use chrono::{Datelike as _, TimeZone as _, Utc};
use dd_node_timeseries_models::AggregationWindow;
use dd_node_timeseries_models::timestamp::millis_to_datetime;

use crate::ResolveError;

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Returns the bucket width in milliseconds for fixed-width granularities.
///
/// `raw`, `month` and `year` have no fixed width.
#[must_use]
pub const fn fixed_width_ms(granularity: AggregationWindow) -> Option<i64> {
    match granularity {
        AggregationWindow::Second => Some(SECOND_MS),
        AggregationWindow::Minute => Some(MINUTE_MS),
        AggregationWindow::FiveMinute => Some(5 * MINUTE_MS),
        AggregationWindow::Hour => Some(HOUR_MS),
        AggregationWindow::Day => Some(DAY_MS),
        AggregationWindow::Week => Some(7 * DAY_MS),
        AggregationWindow::Raw | AggregationWindow::Month | AggregationWindow::Year => None,
    }
}

/// Returns the start of the bucket containing `timestamp`.
///
/// # Errors
///
/// Returns [`ResolveError::InvalidParameter`] for `raw` or when the
/// timestamp is outside the representable calendar range.
pub fn bucket_start(granularity: AggregationWindow, timestamp: i64) -> Result<i64, ResolveError> {
    if let Some(width) = fixed_width_ms(granularity) {
        return timestamp
            .div_euclid(width)
            .checked_mul(width)
            .ok_or_else(|| ResolveError::invalid("bucket start overflow"));
    }

    let dt = millis_to_datetime(timestamp)
        .ok_or_else(|| ResolveError::invalid(format!("timestamp {timestamp} out of range")))?;

    let start = match granularity {
        AggregationWindow::Month => Utc.with_ymd_and_hms(dt.year(), dt.month(), 1, 0, 0, 0),
        AggregationWindow::Year => Utc.with_ymd_and_hms(dt.year(), 1, 1, 0, 0, 0),
        _ => return Err(ResolveError::invalid("raw has no buckets")),
    };

    start
        .single()
        .map(|s| s.timestamp_millis())
        .ok_or_else(|| ResolveError::invalid(format!("timestamp {timestamp} out of range")))
}

/// Sequential index of the calendar bucket containing `timestamp`.
fn calendar_index(granularity: AggregationWindow, timestamp: i64) -> Result<i64, ResolveError> {
    let dt = millis_to_datetime(timestamp)
        .ok_or_else(|| ResolveError::invalid(format!("timestamp {timestamp} out of range")))?;
    let year = i64::from(dt.year());
    Ok(match granularity {
        AggregationWindow::Month => year * 12 + i64::from(dt.month0()),
        _ => year,
    })
}

/// Number of buckets the window `[start, end)` spans at `granularity`.
///
/// Fixed widths use `ceil((end - start) / width)`; calendar granularities
/// count the months or years touched by the window.
///
/// # Errors
///
/// Returns [`ResolveError::InvalidParameter`] if `start > end`, for `raw`,
/// or when the computation overflows.
pub fn bucket_count(
    granularity: AggregationWindow,
    start: i64,
    end: i64,
) -> Result<u64, ResolveError> {
    if start > end {
        return Err(ResolveError::invalid("start must not be after end"));
    }
    if start == end {
        return Ok(0);
    }

    let count = if let Some(width) = fixed_width_ms(granularity) {
        let span = end
            .checked_sub(start)
            .ok_or_else(|| ResolveError::invalid("bucket count overflow"))?;
        span / width + i64::from(span % width != 0)
    } else if granularity.is_raw() {
        return Err(ResolveError::invalid("raw has no buckets"));
    } else {
        calendar_index(granularity, end - 1)? - calendar_index(granularity, start)? + 1
    };

    u64::try_from(count).map_err(|_| ResolveError::invalid("bucket count overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc_ms(y: i32, m: u32, d: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0)
            .single()
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn fixed_buckets_align_to_epoch() {
        assert_eq!(bucket_start(AggregationWindow::Minute, 61_000).unwrap(), 60_000);
        assert_eq!(bucket_start(AggregationWindow::Minute, 60_000).unwrap(), 60_000);
        assert_eq!(bucket_start(AggregationWindow::Minute, 59_999).unwrap(), 0);
        assert_eq!(
            bucket_start(AggregationWindow::FiveMinute, 299_999).unwrap(),
            0
        );
        assert_eq!(bucket_start(AggregationWindow::Hour, -1).unwrap(), -HOUR_MS);
    }

    #[test]
    fn calendar_buckets_align_to_month_and_year() {
        let mid_feb = utc_ms(2024, 2, 15) + 12 * HOUR_MS;
        assert_eq!(
            bucket_start(AggregationWindow::Month, mid_feb).unwrap(),
            utc_ms(2024, 2, 1)
        );
        assert_eq!(
            bucket_start(AggregationWindow::Year, mid_feb).unwrap(),
            utc_ms(2024, 1, 1)
        );
        assert_eq!(
            bucket_start(AggregationWindow::Month, utc_ms(2024, 3, 1)).unwrap(),
            utc_ms(2024, 3, 1)
        );
    }

    #[test]
    fn raw_has_no_bucket_start() {
        assert!(bucket_start(AggregationWindow::Raw, 0).is_err());
    }

    #[test]
    fn fixed_counts_round_up() {
        assert_eq!(bucket_count(AggregationWindow::Minute, 0, 120_000).unwrap(), 2);
        assert_eq!(bucket_count(AggregationWindow::Minute, 0, 120_001).unwrap(), 3);
        assert_eq!(bucket_count(AggregationWindow::Hour, 0, HOUR_MS).unwrap(), 1);
        assert_eq!(
            bucket_count(AggregationWindow::Second, 0, HOUR_MS).unwrap(),
            3600
        );
        assert_eq!(bucket_count(AggregationWindow::Day, 5, 5).unwrap(), 0);
    }

    #[test]
    fn calendar_counts_touched_periods() {
        let start = utc_ms(2024, 1, 15);
        let end = utc_ms(2024, 3, 1);
        assert_eq!(bucket_count(AggregationWindow::Month, start, end).unwrap(), 2);
        assert_eq!(bucket_count(AggregationWindow::Year, start, end).unwrap(), 1);
        assert_eq!(
            bucket_count(AggregationWindow::Year, utc_ms(2023, 12, 31), utc_ms(2024, 1, 2))
                .unwrap(),
            2
        );
    }

    #[test]
    fn inverted_and_overflowing_windows_are_rejected() {
        assert!(bucket_count(AggregationWindow::Minute, 10, 0).is_err());
        assert!(bucket_count(AggregationWindow::Second, i64::MIN, i64::MAX).is_err());
    }
}
