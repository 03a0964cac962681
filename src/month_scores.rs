//! Per-day scores for a whole month, fetched from the sleep API and backed by
//! synthetic placeholders when the fetch does not work out.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rand::Rng;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::device::DeviceId;
use crate::models::{DayCount, DayScore, NightmareRecord, ScoreRecord};
use crate::source::{MonthScoreSource, SourceError};

/// Calendar month written as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearMonth {
    first: NaiveDate,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first| Self { first })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            first: date.with_day(1).unwrap_or(date),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first
    }

    /// Every date in the month, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let month = self.first.month();
        self.first
            .iter_days()
            .take_while(move |date| date.month() == month)
    }
}

impl FromStr for YearMonth {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let first = NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")?;
        Ok(Self { first })
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first.format("%Y-%m"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonthScoresResponse {
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    month: Option<String>,
    scores: Vec<RawDayScore>,
}

#[derive(Debug, Deserialize)]
struct RawDayScore {
    date: NaiveDate,
    score: i64,
}

/// Parses a sleep API month-scores body into validated day scores.
pub fn decode_month_scores(body: &[u8]) -> Result<Vec<DayScore>, SourceError> {
    let response: MonthScoresResponse =
        serde_json::from_slice(body).map_err(|err| SourceError::Decode(err.to_string()))?;
    debug!(
        device = response.device_id.as_deref().unwrap_or("-"),
        month = response.month.as_deref().unwrap_or("-"),
        days = response.scores.len(),
        "Decoded month scores"
    );

    response
        .scores
        .into_iter()
        .map(|raw| {
            let score = u8::try_from(raw.score)
                .ok()
                .filter(|score| *score <= 100)
                .ok_or_else(|| {
                    SourceError::Decode(format!("score {} on {} out of range", raw.score, raw.date))
                })?;
            Ok(DayScore {
                date: raw.date,
                score,
            })
        })
        .collect()
}

/// Synthetic scores for every day of `month`: a weekday-weighted base
/// (Monday lowest) with jitter, clamped to 50..=100.
pub fn placeholder_scores<R: Rng>(month: YearMonth, rng: &mut R) -> Vec<DayScore> {
    month
        .days()
        .map(|date| {
            let base = 60 + 3 * date.weekday().num_days_from_monday() as i64;
            let score = (base + rng.random_range(-10..=15)).clamp(50, 100);
            DayScore {
                date,
                score: score as u8,
            }
        })
        .collect()
}

/// Month scores from `source`, or placeholders for the whole month if the
/// fetch or decode fails. Errors are logged, never surfaced.
#[tracing::instrument(skip_all, fields(device = %device, month = %month))]
pub async fn month_scores_or_placeholder<S, R>(
    source: &S,
    device: &DeviceId,
    month: YearMonth,
    rng: &mut R,
) -> Vec<DayScore>
where
    S: MonthScoreSource + ?Sized,
    R: Rng,
{
    match source.fetch_month_scores(device, month).await {
        Ok(scores) => scores,
        Err(err) => {
            warn!(error = %err, "Using placeholder month scores");
            placeholder_scores(month, rng)
        }
    }
}

/// Buckets score records into one averaged score per local day of `month`,
/// using the calendar of `tz`. Days without records are left out.
pub fn daily_scores<Tz: TimeZone>(
    records: &[ScoreRecord],
    month: YearMonth,
    tz: &Tz,
) -> Vec<DayScore> {
    month
        .days()
        .filter_map(|date| {
            let day: Vec<f64> = records
                .iter()
                .filter(|record| local_date(record.timestamp, tz) == date)
                .map(|record| f64::from(record.score))
                .collect();
            if day.is_empty() {
                return None;
            }
            let average = day.iter().sum::<f64>() / day.len() as f64;
            Some(DayScore {
                date,
                score: average.round() as u8,
            })
        })
        .collect()
}

/// Nightmare count for every local day of `month`, zero-filled. Only
/// `occurred` entries count.
pub fn daily_nightmare_counts<Tz: TimeZone>(
    records: &[NightmareRecord],
    month: YearMonth,
    tz: &Tz,
) -> Vec<DayCount> {
    month
        .days()
        .map(|date| DayCount {
            date,
            count: records
                .iter()
                .filter(|record| record.occurred && local_date(record.timestamp, tz) == date)
                .count(),
        })
        .collect()
}

fn local_date<Tz: TimeZone>(instant: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

/// HTTP client for `GET {base}/api/devices/{id}/sleep-scores?month=YYYY-MM`.
pub struct SleepApiClient {
    base_url: Url,
    http: reqwest::Client,
}

impl SleepApiClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            http: reqwest::Client::new(),
        })
    }

    fn scores_url(&self, device: &DeviceId, month: YearMonth) -> Result<Url, SourceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::Fetch(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "devices", device.as_str(), "sleep-scores"]);
        url.query_pairs_mut()
            .append_pair("month", &month.to_string());
        Ok(url)
    }
}

#[async_trait]
impl MonthScoreSource for SleepApiClient {
    async fn fetch_month_scores(
        &self,
        device: &DeviceId,
        month: YearMonth,
    ) -> Result<Vec<DayScore>, SourceError> {
        let url = self.scores_url(device, month)?;
        debug!(%url, "Requesting month scores");

        let body = self
            .http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| SourceError::Fetch(err.to_string()))?
            .bytes()
            .await
            .map_err(|err| SourceError::Fetch(err.to_string()))?;

        decode_month_scores(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Unreachable;

    #[async_trait]
    impl MonthScoreSource for Unreachable {
        async fn fetch_month_scores(
            &self,
            _device: &DeviceId,
            _month: YearMonth,
        ) -> Result<Vec<DayScore>, SourceError> {
            Err(SourceError::Fetch("connection refused".to_string()))
        }
    }

    struct Fixed(Vec<DayScore>);

    #[async_trait]
    impl MonthScoreSource for Fixed {
        async fn fetch_month_scores(
            &self,
            _device: &DeviceId,
            _month: YearMonth,
        ) -> Result<Vec<DayScore>, SourceError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn year_month_round_trips_its_text_form() {
        let month: YearMonth = "2025-02".parse().unwrap();
        assert_eq!(month.to_string(), "2025-02");
        assert_eq!(month, YearMonth::new(2025, 2).unwrap());
        assert!("2025-13".parse::<YearMonth>().is_err());
        assert!("February".parse::<YearMonth>().is_err());
    }

    #[test]
    fn days_cover_the_whole_month() {
        assert_eq!(YearMonth::new(2024, 2).unwrap().days().count(), 29);
        assert_eq!(YearMonth::new(2025, 12).unwrap().days().count(), 31);
    }

    #[test]
    fn placeholders_fill_every_day_within_bounds() {
        let month = YearMonth::new(2025, 11).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let scores = placeholder_scores(month, &mut rng);

        assert_eq!(scores.len(), 30);
        assert_eq!(scores[0].date, month.first_day());
        assert!(scores.iter().all(|day| (50..=100).contains(&day.score)));
    }

    #[test]
    fn decodes_api_body() {
        let body = br#"{
            "success": true,
            "deviceId": "abc",
            "month": "2025-11",
            "scores": [{"date": "2025-11-01", "score": 72}, {"date": "2025-11-02", "score": 88}]
        }"#;
        let scores = decode_month_scores(body).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[1].date, NaiveDate::from_ymd_opt(2025, 11, 2).unwrap());
        assert_eq!(scores[1].score, 88);
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let body = br#"{"scores": [{"date": "2025-11-01", "score": 140}]}"#;
        assert!(matches!(
            decode_month_scores(body),
            Err(SourceError::Decode(_))
        ));
    }

    #[test]
    fn builds_endpoint_url() {
        let client = SleepApiClient::new("http://localhost:5000/").unwrap();
        let url = client
            .scores_url(&DeviceId::new("abc"), YearMonth::new(2025, 3).unwrap())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/devices/abc/sleep-scores?month=2025-03"
        );
    }

    #[test]
    fn daily_scores_average_each_day() {
        let records = vec![
            ScoreRecord::new(Utc.with_ymd_and_hms(2025, 3, 2, 6, 0, 0).unwrap(), 70).unwrap(),
            ScoreRecord::new(Utc.with_ymd_and_hms(2025, 3, 2, 14, 0, 0).unwrap(), 81).unwrap(),
            ScoreRecord::new(Utc.with_ymd_and_hms(2025, 3, 5, 6, 0, 0).unwrap(), 64).unwrap(),
            ScoreRecord::new(Utc.with_ymd_and_hms(2025, 4, 1, 6, 0, 0).unwrap(), 99).unwrap(),
        ];
        let scores = daily_scores(&records, YearMonth::new(2025, 3).unwrap(), &Utc);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].score, 76);
        assert_eq!(scores[1].score, 64);
    }

    #[test]
    fn daily_scores_follow_the_local_calendar() {
        let eastern = FixedOffset::west_opt(5 * 3600).unwrap();
        let late_evening = eastern.with_ymd_and_hms(2025, 3, 31, 21, 0, 0).unwrap();
        let records = vec![ScoreRecord::new(late_evening.with_timezone(&Utc), 77).unwrap()];

        let march = daily_scores(&records, YearMonth::new(2025, 3).unwrap(), &eastern);
        let april = daily_scores(&records, YearMonth::new(2025, 4).unwrap(), &eastern);

        assert_eq!(
            march,
            vec![DayScore {
                date: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
                score: 77,
            }]
        );
        assert!(april.is_empty());

        let window = crate::window::resolve_window(
            crate::window::TimeWindow::Month,
            &eastern.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap(),
        )
        .unwrap();
        assert!(window.contains(records[0].timestamp));
    }

    #[test]
    fn nightmare_calendar_is_zero_filled_and_counts_only_occurrences() {
        let eastern = FixedOffset::west_opt(5 * 3600).unwrap();
        let at = |day: u32, hour: u32| {
            eastern
                .with_ymd_and_hms(2025, 11, day, hour, 0, 0)
                .unwrap()
                .with_timezone(&Utc)
        };
        let records = vec![
            NightmareRecord::new(at(3, 2), true),
            NightmareRecord::new(at(3, 23), true),
            NightmareRecord::new(at(3, 4), false),
            NightmareRecord::new(at(10, 22), false),
            NightmareRecord::new(at(30, 22), true),
        ];

        let calendar = daily_nightmare_counts(&records, YearMonth::new(2025, 11).unwrap(), &eastern);

        assert_eq!(calendar.len(), 30);
        assert_eq!(calendar[0].date, NaiveDate::from_ymd_opt(2025, 11, 1).unwrap());
        assert_eq!(calendar[2].count, 2);
        assert_eq!(calendar[9].count, 0);
        assert_eq!(calendar[29].count, 1);
        assert_eq!(calendar.iter().map(|day| day.count).sum::<usize>(), 3);
    }

    #[tokio::test]
    async fn failed_fetch_falls_back_to_placeholders() {
        let month = YearMonth::new(2025, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let scores =
            month_scores_or_placeholder(&Unreachable, &DeviceId::unknown(), month, &mut rng).await;
        assert_eq!(scores.len(), 28);
    }

    #[tokio::test]
    async fn successful_fetch_is_passed_through() {
        let month = YearMonth::new(2025, 2).unwrap();
        let served = vec![DayScore {
            date: month.first_day(),
            score: 91,
        }];
        let mut rng = StdRng::seed_from_u64(1);
        let scores = month_scores_or_placeholder(
            &Fixed(served.clone()),
            &DeviceId::unknown(),
            month,
            &mut rng,
        )
        .await;
        assert_eq!(scores, served);
    }
}
