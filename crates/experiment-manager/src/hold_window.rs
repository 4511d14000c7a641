use chrono::{DateTime, Duration, Utc};
use wavesens_core::market_hours::{after_hours_close_on, market_status_at, next_market_open, regular_close_on, MarketStatus};

const CLOSE_BUFFER_MINUTES: i64 = 15;

/// The next safe close instant that a position opened "now" could
/// still be held into, rolling past weekends/holidays. A position
/// opened during the after-hours session closes out against the
/// after-hours close (20:00 Eastern), not the regular close that has
/// already passed — otherwise every after-hours entry would look like
/// it's past its close and get rolled into an overnight hold.
fn safe_close_after(now: DateTime<Utc>) -> DateTime<Utc> {
    let status = market_status_at(now);
    let today_close = match status {
        MarketStatus::AfterHours => after_hours_close_on(now) - Duration::minutes(CLOSE_BUFFER_MINUTES),
        _ => regular_close_on(now) - Duration::minutes(CLOSE_BUFFER_MINUTES),
    };

    if matches!(status, MarketStatus::Weekend | MarketStatus::Holiday) || now >= today_close {
        let next_open = next_market_open(now);
        regular_close_on(next_open) - Duration::minutes(CLOSE_BUFFER_MINUTES)
    } else {
        today_close
    }
}

/// Clamps a desired hold duration to the next safe close, refusing to
/// open at all if not even the minimum hold fits before then.
pub fn adjust_max_hold_until(entry_time: DateTime<Utc>, desired_hours: f64, min_hold_hours: f64) -> Option<DateTime<Utc>> {
    let close = safe_close_after(entry_time);
    let time_until_close = close - entry_time;
    if time_until_close < Duration::milliseconds((min_hold_hours * 3_600_000.0) as i64) {
        return None;
    }

    let desired = entry_time + Duration::milliseconds((desired_hours * 3_600_000.0) as i64);
    Some(desired.min(close))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn clamps_to_safe_close_when_desired_exceeds_it() {
        // 2024-03-12 (Tuesday) 14:00 UTC = 10:00 Eastern, well before close.
        let entry = Utc.with_ymd_and_hms(2024, 3, 12, 14, 0, 0).unwrap();
        let result = adjust_max_hold_until(entry, 8.0, 2.0).unwrap();
        let expected_close = Utc.with_ymd_and_hms(2024, 3, 12, 19, 45, 0).unwrap(); // 15:45 Eastern = 16:00 - 15min
        assert_eq!(result, expected_close);
    }

    #[test]
    fn refuses_to_open_when_too_close_to_close() {
        // 2024-03-12 19:40 UTC = 15:40 Eastern, 5 min before the 15-min-buffered close.
        let entry = Utc.with_ymd_and_hms(2024, 3, 12, 19, 40, 0).unwrap();
        assert!(adjust_max_hold_until(entry, 8.0, 2.0).is_none());
    }

    #[test]
    fn uses_desired_duration_when_it_fits() {
        let entry = Utc.with_ymd_and_hms(2024, 3, 12, 14, 0, 0).unwrap(); // 10:00 Eastern
        let result = adjust_max_hold_until(entry, 2.0, 1.0).unwrap();
        assert_eq!(result, entry + Duration::hours(2));
    }

    #[test]
    fn after_hours_entry_closes_same_day_instead_of_rolling_overnight() {
        // 2024-03-12 21:00 UTC = 17:00 Eastern, squarely in the after-hours session.
        let entry = Utc.with_ymd_and_hms(2024, 3, 12, 21, 0, 0).unwrap();
        let result = adjust_max_hold_until(entry, 2.0, 1.0).unwrap();
        // 20:00 Eastern - 15min buffer = 19:45 Eastern = 23:45 UTC, same trading day.
        let after_hours_close = Utc.with_ymd_and_hms(2024, 3, 12, 23, 45, 0).unwrap();
        assert_eq!(result, entry + Duration::hours(2));
        assert!(result < after_hours_close);
    }
}
