//! Collaborator interfaces for the remote record store.
//!
//! [`RecordSource`] hands back snapshots of a device's records,
//! [`NightmareLog`] is the append-only write side, [`MonthScoreSource`]
//! serves per-day scores for one month, and [`DeviceRegistry`] records that a
//! device has been seen. Failures stay at this boundary:
//! [`load_records`] degrades them into empty collections before the engine
//! ever sees them.

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::device::DeviceId;
use crate::models::{DayScore, NewNightmare, NightmareRecord, ScoreRecord};
use crate::month_scores::YearMonth;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_score_records(&self, device: &DeviceId) -> Result<Vec<ScoreRecord>, SourceError>;

    async fn fetch_nightmare_records(
        &self,
        device: &DeviceId,
    ) -> Result<Vec<NightmareRecord>, SourceError>;
}

#[async_trait]
pub trait NightmareLog: Send + Sync {
    async fn append_nightmare_record(
        &self,
        device: &DeviceId,
        entry: NewNightmare,
    ) -> Result<(), SourceError>;
}

#[async_trait]
pub trait MonthScoreSource: Send + Sync {
    async fn fetch_month_scores(
        &self,
        device: &DeviceId,
        month: YearMonth,
    ) -> Result<Vec<DayScore>, SourceError>;
}

#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn register_device(&self, device: &DeviceId) -> Result<(), SourceError>;
}

/// Registers `device` with `store` before handing the store out, so every
/// device that touches the store has a registry entry.
pub async fn open_for_device<S: DeviceRegistry>(
    store: S,
    device: &DeviceId,
) -> Result<S, SourceError> {
    store.register_device(device).await?;
    Ok(store)
}

/// Fetches both collections for `device`, substituting an empty set for
/// whichever fetch fails.
#[tracing::instrument(skip_all, fields(device = %device))]
pub async fn load_records<S: RecordSource + ?Sized>(
    source: &S,
    device: &DeviceId,
) -> (Vec<ScoreRecord>, Vec<NightmareRecord>) {
    let (scores, nightmares) = tokio::join!(
        source.fetch_score_records(device),
        source.fetch_nightmare_records(device)
    );

    let scores = scores.unwrap_or_else(|err| {
        warn!(error = %err, "Falling back to no sleep scores");
        Vec::new()
    });
    let nightmares = nightmares.unwrap_or_else(|err| {
        warn!(error = %err, "Falling back to no nightmare records");
        Vec::new()
    });

    (scores, nightmares)
}
