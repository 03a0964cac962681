//! Calendar windows: turning "this day / week / month" into a half-open UTC
//! interval, and selecting the records that fall inside one.

use std::fmt;

use chrono::{
    DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
    Weekday,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Timed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Day,
    Week,
    Month,
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("cannot resolve the {window} window around {anchor}")]
    InvalidWindow {
        window: TimeWindow,
        anchor: NaiveDateTime,
    },
}

/// Half-open `[start, end)` range of instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Local calendar rules used when resolving windows. The time zone comes from
/// the anchor itself; only the first day of the week is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    pub week_start: Weekday,
}

impl Default for Calendar {
    fn default() -> Self {
        Self {
            week_start: Weekday::Mon,
        }
    }
}

impl Calendar {
    pub fn new(week_start: Weekday) -> Self {
        Self { week_start }
    }

    pub fn resolve<Tz: TimeZone>(
        &self,
        window: TimeWindow,
        now: &DateTime<Tz>,
    ) -> Result<Interval, EngineError> {
        let invalid = || EngineError::InvalidWindow {
            window,
            anchor: now.naive_local(),
        };

        let today = now.date_naive();
        let (first, last) = match window {
            TimeWindow::Day => today.succ_opt().map(|next| (today, next)),
            TimeWindow::Week => self.week_bounds(today),
            TimeWindow::Month => month_bounds(today),
        }
        .ok_or_else(invalid)?;

        let tz = now.timezone();
        let start = local_midnight(&tz, first).ok_or_else(invalid)?;
        let end = local_midnight(&tz, last).ok_or_else(invalid)?;

        Ok(Interval { start, end })
    }

    fn week_bounds(&self, date: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let into_week = (7 + date.weekday().num_days_from_monday()
            - self.week_start.num_days_from_monday())
            % 7;
        let first = date.checked_sub_days(Days::new(u64::from(into_week)))?;
        let last = first.checked_add_days(Days::new(7))?;
        Some((first, last))
    }
}

pub fn resolve_window<Tz: TimeZone>(
    window: TimeWindow,
    now: &DateTime<Tz>,
) -> Result<Interval, EngineError> {
    Calendar::default().resolve(window, now)
}

pub fn filter_by_window<T: Timed + Clone>(records: &[T], interval: &Interval) -> Vec<T> {
    records
        .iter()
        .filter(|record| interval.contains(record.timestamp()))
        .cloned()
        .collect()
}

fn month_bounds(date: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let first = date.with_day(1)?;
    let last = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)?
    };
    Some((first, last))
}

/// First instant of `date` in `tz`. A midnight skipped by a DST jump moves
/// forward to the first representable hour; a repeated one takes the earlier.
fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<DateTime<Utc>> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..=24)
        .filter_map(|hours| midnight.checked_add_signed(Duration::hours(hours)))
        .find_map(|candidate| tz.from_local_datetime(&candidate).earliest())
        .map(|instant| instant.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoreRecord;
    use chrono::FixedOffset;

    fn plus_two() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn day_window_follows_local_midnight() {
        let now = plus_two().with_ymd_and_hms(2025, 11, 8, 23, 30, 0).unwrap();
        let interval = resolve_window(TimeWindow::Day, &now).unwrap();
        assert_eq!(interval.start, utc(2025, 11, 7, 22));
        assert_eq!(interval.end, utc(2025, 11, 8, 22));
    }

    #[test]
    fn week_window_starts_on_monday_by_default() {
        // Saturday
        let now = plus_two().with_ymd_and_hms(2025, 11, 8, 9, 0, 0).unwrap();
        let interval = resolve_window(TimeWindow::Week, &now).unwrap();
        assert_eq!(interval.start, utc(2025, 11, 2, 22));
        assert_eq!(interval.end, utc(2025, 11, 9, 22));
    }

    #[test]
    fn week_window_honours_sunday_start() {
        let calendar = Calendar::new(Weekday::Sun);

        let saturday = plus_two().with_ymd_and_hms(2025, 11, 8, 9, 0, 0).unwrap();
        let interval = calendar.resolve(TimeWindow::Week, &saturday).unwrap();
        assert_eq!(interval.start, utc(2025, 11, 1, 22));
        assert_eq!(interval.end, utc(2025, 11, 8, 22));

        let sunday = plus_two().with_ymd_and_hms(2025, 11, 9, 0, 0, 0).unwrap();
        let interval = calendar.resolve(TimeWindow::Week, &sunday).unwrap();
        assert_eq!(interval.start, utc(2025, 11, 8, 22));
    }

    #[test]
    fn month_window_rolls_over_the_year() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        let interval = resolve_window(TimeWindow::Month, &now).unwrap();
        assert_eq!(interval.start, utc(2025, 12, 1, 0));
        assert_eq!(interval.end, utc(2026, 1, 1, 0));
    }

    #[test]
    fn month_window_covers_leap_february() {
        let now = Utc.with_ymd_and_hms(2024, 2, 10, 12, 0, 0).unwrap();
        let interval = resolve_window(TimeWindow::Month, &now).unwrap();
        assert_eq!((interval.end - interval.start).num_days(), 29);
    }

    #[test]
    fn every_window_contains_its_anchor() {
        let zones = [
            FixedOffset::east_opt(0).unwrap(),
            FixedOffset::east_opt(5 * 3600 + 1800).unwrap(),
            FixedOffset::west_opt(8 * 3600).unwrap(),
        ];
        let calendars = [Calendar::new(Weekday::Mon), Calendar::new(Weekday::Sun)];
        let windows = [TimeWindow::Day, TimeWindow::Week, TimeWindow::Month];
        let first = utc(2024, 1, 1, 0);

        for step in 0..(2 * 365 * 24 / 7) {
            let instant = first + Duration::hours(7 * step);
            for zone in &zones {
                let now = instant.with_timezone(zone);
                for calendar in &calendars {
                    for window in windows {
                        let interval = calendar.resolve(window, &now).unwrap();
                        assert!(interval.start < interval.end);
                        assert!(interval.contains(instant), "{window} around {now}");
                    }
                }
            }
        }
    }

    /// Checks the Day window around a DST transition: every hourly anchor
    /// inside it resolves to the same interval, and it meets its neighbours.
    fn assert_day_window<Tz: TimeZone>(tz: &Tz, start: DateTime<Utc>, end: DateTime<Utc>) {
        assert!(start < end);

        let mut instant = start;
        while instant < end {
            let now = instant.with_timezone(tz);
            let interval = resolve_window(TimeWindow::Day, &now).unwrap();
            assert_eq!((interval.start, interval.end), (start, end), "anchor {instant}");
            assert!(interval.contains(instant));
            for window in [TimeWindow::Week, TimeWindow::Month] {
                assert!(resolve_window(window, &now).unwrap().contains(instant));
            }
            instant += Duration::hours(1);
        }

        let before = resolve_window(TimeWindow::Day, &(start - Duration::hours(1)).with_timezone(tz))
            .unwrap();
        let after = resolve_window(TimeWindow::Day, &end.with_timezone(tz)).unwrap();
        assert_eq!(before.end, start);
        assert_eq!(after.start, end);
    }

    #[test]
    fn day_window_across_a_skipped_midnight() {
        // Sao Paulo jumped from 00:00 to 01:00 on 2018-11-04.
        let start = utc(2018, 11, 4, 3);
        let end = utc(2018, 11, 5, 2);
        assert_eq!((end - start).num_hours(), 23);
        assert_day_window(&chrono_tz::America::Sao_Paulo, start, end);
    }

    #[test]
    fn day_window_across_a_repeated_midnight() {
        // Havana fell back from 01:00 to 00:00 on 2023-11-05; the first
        // midnight (04:00 UTC) opens the day.
        let start = utc(2023, 11, 5, 4);
        let end = utc(2023, 11, 6, 5);
        assert_eq!((end - start).num_hours(), 25);
        assert_day_window(&chrono_tz::America::Havana, start, end);
    }

    #[test]
    fn interval_includes_start_and_excludes_end() {
        let interval = Interval {
            start: utc(2025, 3, 1, 0),
            end: utc(2025, 3, 2, 0),
        };
        let records = vec![
            ScoreRecord::new(interval.start, 70).unwrap(),
            ScoreRecord::new(interval.end, 90).unwrap(),
        ];
        let kept = filter_by_window(&records, &interval);
        assert_eq!(kept, vec![records[0].clone()]);
    }

    #[test]
    fn filter_keeps_input_order() {
        let interval = Interval {
            start: utc(2025, 3, 1, 0),
            end: utc(2025, 3, 8, 0),
        };
        let records = vec![
            ScoreRecord::new(utc(2025, 3, 5, 6), 81).unwrap(),
            ScoreRecord::new(utc(2025, 2, 27, 6), 50).unwrap(),
            ScoreRecord::new(utc(2025, 3, 2, 6), 64).unwrap(),
            ScoreRecord::new(utc(2025, 3, 9, 6), 99).unwrap(),
            ScoreRecord::new(utc(2025, 3, 1, 6), 72).unwrap(),
        ];
        let kept: Vec<u8> = filter_by_window(&records, &interval)
            .into_iter()
            .map(|record| record.score)
            .collect();
        assert_eq!(kept, vec![81, 64, 72]);
    }

    #[test]
    fn filter_on_empty_input_is_empty() {
        let interval = resolve_window(TimeWindow::Week, &Utc::now()).unwrap();
        assert!(filter_by_window::<ScoreRecord>(&[], &interval).is_empty());
    }
}
