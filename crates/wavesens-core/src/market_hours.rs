use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::US::Eastern;
use serde::{Deserialize, Serialize};

/// Market session as seen from US/Eastern local time. Thresholds are
/// minutes since Eastern local midnight: pre-market opens at 04:00
/// (240), regular session at 09:30 (570), closes at 16:00 (960),
/// after-hours ends at 20:00 (1200).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    Closed,
    PreMarket,
    Regular,
    AfterHours,
    Weekend,
    Holiday,
}

impl MarketStatus {
    pub fn is_open(self) -> bool {
        matches!(self, MarketStatus::PreMarket | MarketStatus::Regular | MarketStatus::AfterHours)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MarketStatus::Closed => "closed",
            MarketStatus::PreMarket => "pre_market",
            MarketStatus::Regular => "regular",
            MarketStatus::AfterHours => "after_hours",
            MarketStatus::Weekend => "weekend",
            MarketStatus::Holiday => "holiday",
        }
    }
}

const PRE_MARKET_START_MIN: i64 = 240;
const REGULAR_START_MIN: i64 = 570;
const REGULAR_END_MIN: i64 = 960;
const AFTER_HOURS_END_MIN: i64 = 1200;

/// A small, fixed set of market holidays (month, day) observed every
/// year — enough to distinguish `Holiday` from `Closed` for the dates
/// the US exchanges actually close on. Not exhaustive of moveable
/// holidays (Thanksgiving, Good Friday); those are treated as ordinary
/// weekdays, matching the scope the original `MarketDetector` covered.
const FIXED_HOLIDAYS: &[(u32, u32)] = &[(1, 1), (6, 19), (7, 4), (12, 25)];

fn is_fixed_holiday(date: chrono::NaiveDate) -> bool {
    FIXED_HOLIDAYS.contains(&(date.month(), date.day()))
}

/// Determines the current market session from a UTC instant.
pub fn market_status_at(now_utc: DateTime<Utc>) -> MarketStatus {
    let eastern = now_utc.with_timezone(&Eastern);

    if matches!(eastern.weekday(), Weekday::Sat | Weekday::Sun) {
        return MarketStatus::Weekend;
    }
    if is_fixed_holiday(eastern.date_naive()) {
        return MarketStatus::Holiday;
    }

    let minute_of_day = eastern.hour() as i64 * 60 + eastern.minute() as i64;

    if minute_of_day < PRE_MARKET_START_MIN {
        MarketStatus::Closed
    } else if minute_of_day < REGULAR_START_MIN {
        MarketStatus::PreMarket
    } else if minute_of_day < REGULAR_END_MIN {
        MarketStatus::Regular
    } else if minute_of_day < AFTER_HOURS_END_MIN {
        MarketStatus::AfterHours
    } else {
        MarketStatus::Closed
    }
}

/// Next regular-session open, rolling weekends forward to Monday.
pub fn next_market_open(now_utc: DateTime<Utc>) -> DateTime<Utc> {
    let eastern = now_utc.with_timezone(&Eastern);
    let today_open = Eastern
        .with_ymd_and_hms(eastern.year(), eastern.month(), eastern.day(), 9, 30, 0)
        .single()
        .expect("valid local time");

    let minute_of_day = eastern.hour() as i64 * 60 + eastern.minute() as i64;
    let mut candidate = if minute_of_day < REGULAR_START_MIN
        && !matches!(eastern.weekday(), Weekday::Sat | Weekday::Sun)
        && !is_fixed_holiday(eastern.date_naive())
    {
        today_open
    } else {
        today_open + chrono::Duration::days(1)
    };

    while matches!(candidate.weekday(), Weekday::Sat | Weekday::Sun) || is_fixed_holiday(candidate.date_naive()) {
        candidate += chrono::Duration::days(1);
    }

    candidate.with_timezone(&Utc)
}

/// Regular-session close (16:00 Eastern) for the given UTC instant's
/// local trading day.
pub fn regular_close_on(now_utc: DateTime<Utc>) -> DateTime<Utc> {
    let eastern = now_utc.with_timezone(&Eastern);
    Eastern
        .with_ymd_and_hms(eastern.year(), eastern.month(), eastern.day(), 16, 0, 0)
        .single()
        .expect("valid local time")
        .with_timezone(&Utc)
}

/// After-hours session close (20:00 Eastern) for the given UTC
/// instant's local trading day.
pub fn after_hours_close_on(now_utc: DateTime<Utc>) -> DateTime<Utc> {
    let eastern = now_utc.with_timezone(&Eastern);
    Eastern
        .with_ymd_and_hms(eastern.year(), eastern.month(), eastern.day(), 20, 0, 0)
        .single()
        .expect("valid local time")
        .with_timezone(&Utc)
}

/// Whether `now_utc` and `other_utc` fall on the same US/Eastern
/// calendar day — used to decide when `realized_pnl_today` resets.
pub fn same_eastern_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.with_timezone(&Eastern).date_naive() == b.with_timezone(&Eastern).date_naive()
}

/// Fixed wave boundaries, in minutes since publication. Index is the
/// wave number (0..=6).
pub const WAVE_BOUNDS_MINUTES: [(i64, i64); 7] = [
    (0, 5),
    (5, 30),
    (30, 120),
    (120, 360),
    (360, 1440),
    (1440, 4320),
    (4320, 10080),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveState {
    Missed,
    Ongoing,
    Upcoming,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveStatus {
    pub wave: usize,
    pub start_minutes: i64,
    pub end_minutes: i64,
    pub state: WaveState,
    /// Minutes remaining in the wave's window, only meaningful when `state == Ongoing`.
    pub minutes_left: Option<i64>,
}

/// Classifies every wave relative to a news item's age in minutes.
pub fn wave_status_table(age_minutes: i64) -> Vec<WaveStatus> {
    WAVE_BOUNDS_MINUTES
        .iter()
        .enumerate()
        .map(|(wave, &(start, end))| {
            let state = if age_minutes >= end {
                WaveState::Missed
            } else if age_minutes >= start {
                WaveState::Ongoing
            } else {
                WaveState::Upcoming
            };
            let minutes_left = if state == WaveState::Ongoing { Some(end - age_minutes) } else { None };
            WaveStatus { wave, start_minutes: start, end_minutes: end, state, minutes_left }
        })
        .collect()
}

/// Wave whose interval contains `age_minutes`, used as the LLM-failure
/// fallback for wave selection. Clamps to the last wave once the news
/// is older than every interval.
pub fn fallback_wave_for_age(age_minutes: i64) -> usize {
    for (wave, &(start, end)) in WAVE_BOUNDS_MINUTES.iter().enumerate() {
        if age_minutes >= start && age_minutes < end {
            return wave;
        }
    }
    WAVE_BOUNDS_MINUTES.len() - 1
}

/// Formats a single wave's line the way `_format_wave_status` does in
/// the original wave analyzer: only ongoing waves get a time-left note.
pub fn format_wave_status(status: &WaveStatus) -> String {
    match status.state {
        WaveState::Ongoing => format!(
            "Wave {}: ongoing ({} min left)",
            status.wave,
            status.minutes_left.unwrap_or(0)
        ),
        WaveState::Missed => format!("Wave {}: missed", status.wave),
        WaveState::Upcoming => format!("Wave {}: upcoming", status.wave),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn wave_status_classifies_age_45_minutes() {
        let table = wave_status_table(45);
        assert_eq!(table[0].state, WaveState::Missed);
        assert_eq!(table[1].state, WaveState::Missed);
        assert_eq!(table[2].state, WaveState::Ongoing);
        assert_eq!(table[2].minutes_left, Some(75));
        for w in &table[3..] {
            assert_eq!(w.state, WaveState::Upcoming);
        }
    }

    #[test]
    fn fallback_wave_picks_containing_interval() {
        assert_eq!(fallback_wave_for_age(45), 2);
        assert_eq!(fallback_wave_for_age(0), 0);
        assert_eq!(fallback_wave_for_age(20_000), 6);
    }

    #[test]
    fn market_status_regular_session() {
        // 2024-03-12 (Tuesday) 14:00 UTC = 10:00 Eastern (EDT, UTC-4)
        let t = Utc.with_ymd_and_hms(2024, 3, 12, 14, 0, 0).unwrap();
        assert_eq!(market_status_at(t), MarketStatus::Regular);
    }

    #[test]
    fn market_status_weekend() {
        let t = Utc.with_ymd_and_hms(2024, 3, 16, 14, 0, 0).unwrap();
        assert_eq!(market_status_at(t), MarketStatus::Weekend);
    }
}
