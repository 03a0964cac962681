//! Score and nightmare statistics over a single resolved window.

use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;

use crate::models::{NightmareRecord, ScoreRecord};
use crate::window::{filter_by_window, Calendar, EngineError, Interval, TimeWindow};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub filtered: Vec<ScoreRecord>,
    pub count: usize,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub window: TimeWindow,
    pub interval: Interval,
    pub filtered_scores: Vec<ScoreRecord>,
    pub average: f64,
    pub nightmare_count: usize,
    pub filtered_nightmares: Vec<NightmareRecord>,
}

/// Source of the anchor instant for a summary.
pub trait Clock {
    type Tz: TimeZone;

    fn now(&self) -> DateTime<Self::Tz>;
}

/// Wall clock in the machine's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Tz = Local;

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

pub fn aggregate(records: Vec<ScoreRecord>) -> AggregationResult {
    let count = records.len();
    let average = if count == 0 {
        0.0
    } else {
        let total: f64 = records.iter().map(|record| f64::from(record.score)).sum();
        total / count as f64
    };

    AggregationResult {
        filtered: records,
        count,
        average,
    }
}

/// Only explicit "yes" entries count; a logged "no nightmare" night does not.
pub fn count_nightmares(records: &[NightmareRecord]) -> usize {
    records.iter().filter(|record| record.occurred).count()
}

pub fn summarize<Tz: TimeZone>(
    scores: &[ScoreRecord],
    nightmares: &[NightmareRecord],
    window: TimeWindow,
    now: &DateTime<Tz>,
) -> Result<Summary, EngineError> {
    Calendar::default().summarize(scores, nightmares, window, now)
}

impl Calendar {
    pub fn summarize<Tz: TimeZone>(
        &self,
        scores: &[ScoreRecord],
        nightmares: &[NightmareRecord],
        window: TimeWindow,
        now: &DateTime<Tz>,
    ) -> Result<Summary, EngineError> {
        let interval = self.resolve(window, now)?;

        let scored = aggregate(filter_by_window(scores, &interval));
        let filtered_nightmares = filter_by_window(nightmares, &interval);

        Ok(Summary {
            window,
            interval,
            filtered_scores: scored.filtered,
            average: scored.average,
            nightmare_count: count_nightmares(&filtered_nightmares),
            filtered_nightmares,
        })
    }

    /// Samples `clock` once and summarizes both collections against that anchor.
    pub fn summarize_now<C: Clock>(
        &self,
        clock: &C,
        scores: &[ScoreRecord],
        nightmares: &[NightmareRecord],
        window: TimeWindow,
    ) -> Result<Summary, EngineError> {
        let now = clock.now();
        self.summarize(scores, nightmares, window, &now)
    }
}
