use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("sleep score {0} is outside 0..=100")]
    ScoreOutOfRange(i64),
    #[error("nightmare intensity {0} is outside 1..=10")]
    IntensityOutOfRange(i64),
}

/// Anything that sits at a single point in time.
pub trait Timed {
    fn timestamp(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub timestamp: DateTime<Utc>,
    pub score: u8,
}

impl ScoreRecord {
    pub fn new(timestamp: DateTime<Utc>, score: i64) -> Result<Self, RecordError> {
        match u8::try_from(score) {
            Ok(value) if value <= 100 => Ok(Self {
                timestamp,
                score: value,
            }),
            _ => Err(RecordError::ScoreOutOfRange(score)),
        }
    }
}

/// Self-reported nightmare intensity on a 1..=10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Intensity(u8);

impl Intensity {
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Intensity {
    type Error = RecordError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (1..=10).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(RecordError::IntensityOutOfRange(value))
        }
    }
}

impl From<Intensity> for u8 {
    fn from(intensity: Intensity) -> Self {
        intensity.0
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/10", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightmareRecord {
    pub timestamp: DateTime<Utc>,
    pub occurred: bool,
    pub description: Option<String>,
    pub intensity: Option<Intensity>,
}

impl NightmareRecord {
    pub fn new(timestamp: DateTime<Utc>, occurred: bool) -> Self {
        Self {
            timestamp,
            occurred,
            description: None,
            intensity: None,
        }
    }
}

/// Payload for the append-only nightmare log.
#[derive(Debug, Clone)]
pub struct NewNightmare {
    pub occurred: bool,
    pub description: String,
    pub intensity: Intensity,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimedRecord {
    Score(ScoreRecord),
    Nightmare(NightmareRecord),
}

impl Timed for ScoreRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timed for NightmareRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timed for TimedRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TimedRecord::Score(record) => record.timestamp,
            TimedRecord::Nightmare(record) => record.timestamp,
        }
    }
}

impl From<ScoreRecord> for TimedRecord {
    fn from(record: ScoreRecord) -> Self {
        TimedRecord::Score(record)
    }
}

impl From<NightmareRecord> for TimedRecord {
    fn from(record: NightmareRecord) -> Self {
        TimedRecord::Nightmare(record)
    }
}

/// One calendar day's score as served by the month-score endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayScore {
    pub date: NaiveDate,
    pub score: u8,
}

/// Number of nightmares logged on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: usize,
}
