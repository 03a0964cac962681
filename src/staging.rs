//! Nightly sleep score derived from per-epoch sleep-stage probabilities, as
//! produced by the ECG stage classifier on the headband.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{RecordError, ScoreRecord};

/// Classifier output for one epoch, ordered `[unknown, nrem, rem, awake]`.
pub type StageProbabilities = [f64; 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unknown,
    Nrem,
    Rem,
    Awake,
}

impl Stage {
    const ORDER: [Stage; 4] = [Stage::Unknown, Stage::Nrem, Stage::Rem, Stage::Awake];

    /// The most probable stage; ties go to the earlier column and NaN never wins.
    pub fn most_likely(probabilities: &StageProbabilities) -> Stage {
        let mut best = 0;
        for (index, value) in probabilities.iter().enumerate().skip(1) {
            if *value > probabilities[best] || probabilities[best].is_nan() {
                best = index;
            }
        }
        Self::ORDER[best]
    }
}

/// Nine hours asleep earns a full total-sleep score.
const FULL_NIGHT_SECS: f64 = 9.0 * 3600.0;
/// `(seconds worth 95 points, seconds worth 100 points)`
const NREM_TARGET: (f64, f64) = (5580.0, 8670.0);
const REM_TARGET: (f64, f64) = (6690.0, 8820.0);

const TOTAL_WEIGHT: f64 = 0.6;
const NREM_WEIGHT: f64 = 0.15;
const REM_WEIGHT: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NightScore {
    pub asleep_secs: f64,
    pub nrem_secs: f64,
    pub rem_secs: f64,
    pub total_sleep_score: f64,
    pub nrem_score: f64,
    pub rem_score: f64,
    pub score: f64,
}

impl NightScore {
    pub fn asleep_hours(&self) -> f64 {
        self.asleep_secs / 3600.0
    }
}

/// Linear up to 95 at the first target, then linear from 95 to 100 at the
/// second, capped at 100.
fn stage_score(secs: f64, (target, full): (f64, f64)) -> f64 {
    if secs < target {
        95.0 / target * secs
    } else {
        (95.0 + 5.0 * (secs - target) / (full - target)).min(100.0)
    }
}

pub fn score_night(epochs: &[StageProbabilities], epoch_secs: u32) -> NightScore {
    let (mut nrem, mut rem) = (0usize, 0usize);
    for epoch in epochs {
        match Stage::most_likely(epoch) {
            Stage::Nrem => nrem += 1,
            Stage::Rem => rem += 1,
            Stage::Unknown | Stage::Awake => {}
        }
    }

    let epoch_secs = f64::from(epoch_secs);
    let nrem_secs = nrem as f64 * epoch_secs;
    let rem_secs = rem as f64 * epoch_secs;
    let asleep_secs = nrem_secs + rem_secs;

    let total_sleep_score = (100.0 / FULL_NIGHT_SECS * asleep_secs).min(100.0);
    let nrem_score = stage_score(nrem_secs, NREM_TARGET);
    let rem_score = stage_score(rem_secs, REM_TARGET);

    NightScore {
        asleep_secs,
        nrem_secs,
        rem_secs,
        total_sleep_score,
        nrem_score,
        rem_score,
        score: total_sleep_score * TOTAL_WEIGHT + nrem_score * NREM_WEIGHT + rem_score * REM_WEIGHT,
    }
}

/// Scores a night and stamps it at `ended_at` (wake-up time).
pub fn score_record(
    ended_at: DateTime<Utc>,
    epochs: &[StageProbabilities],
    epoch_secs: u32,
) -> Result<ScoreRecord, RecordError> {
    let night = score_night(epochs, epoch_secs);
    ScoreRecord::new(ended_at, night.score.round() as i64)
}

/// Reads headerless `unknown,nrem,rem,awake` rows, one per epoch.
pub fn read_stage_csv(path: &Path) -> anyhow::Result<Vec<StageProbabilities>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    reader
        .deserialize::<(f64, f64, f64, f64)>()
        .enumerate()
        .map(|(index, row)| {
            let (unknown, nrem, rem, awake) =
                row.with_context(|| format!("malformed epoch {}", index + 1))?;
            Ok([unknown, nrem, rem, awake])
        })
        .collect()
}
