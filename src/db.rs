use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::device::DeviceId;
use crate::models::{DayScore, Intensity, NewNightmare, NightmareRecord, ScoreRecord};
use crate::month_scores::{daily_scores, YearMonth};
use crate::source::{DeviceRegistry, MonthScoreSource, NightmareLog, RecordSource, SourceError};

/// Postgres-backed record store, partitioned by device id.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Loads a week of sample nights ending on `today`.
    pub async fn seed(&self, device: &DeviceId, today: NaiveDate) -> anyhow::Result<()> {
        self.register_device(device).await?;

        let wake_up = NaiveTime::from_hms_opt(7, 0, 0).context("invalid time")?;
        let scores = [65, 90, 78, 85, 70, 80, 75];

        for (days_ago, score) in scores.into_iter().enumerate() {
            let date = today - Duration::days(days_ago as i64);
            let recorded_at = date.and_time(wake_up).and_utc();
            let record = ScoreRecord::new(recorded_at, score)?;
            self.record_score(device, &record, &format!("seed-{device}-{date}"))
                .await?;
        }

        let nightmares = [
            (1, true, "Chased through an endless hallway", 7),
            (3, false, "", 1),
            (4, true, "Falling from a tower", 5),
        ];

        for (days_ago, occurred, description, intensity) in nightmares {
            let date = today - Duration::days(days_ago);
            let occurred_at = date.and_time(wake_up).and_utc() - Duration::hours(4);
            sqlx::query(
                r#"
                INSERT INTO sleep_tracker.nightmares
                (id, device_id, occurred_at, had_nightmare, description, intensity, source_key)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (source_key) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(device.as_str())
            .bind(occurred_at)
            .bind(occurred)
            .bind(Some(description).filter(|text| !text.is_empty()))
            .bind(intensity as i16)
            .bind(format!("seed-nightmare-{device}-{date}"))
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Imports `timestamp,score[,source_key]` rows; rows whose source key is
    /// already present are skipped. Returns the number of inserted rows.
    pub async fn import_scores_csv(
        &self,
        device: &DeviceId,
        csv_path: &std::path::Path,
    ) -> anyhow::Result<usize> {
        #[derive(serde::Deserialize)]
        struct CsvRow {
            timestamp: DateTime<Utc>,
            score: i64,
            source_key: Option<String>,
        }

        let mut reader = csv::Reader::from_path(csv_path)
            .with_context(|| format!("failed to open {}", csv_path.display()))?;
        let mut inserted = 0usize;

        for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
            let row = result.with_context(|| format!("malformed row {}", index + 1))?;
            let record = ScoreRecord::new(row.timestamp, row.score)
                .with_context(|| format!("invalid row {}", index + 1))?;
            let source_key = row
                .source_key
                .filter(|key| !key.is_empty())
                .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

            if self.record_score(device, &record, &source_key).await? {
                inserted += 1;
            }
        }

        info!(device = %device, inserted, "Imported sleep scores");
        Ok(inserted)
    }

    pub async fn record_score(
        &self,
        device: &DeviceId,
        record: &ScoreRecord,
        source_key: &str,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO sleep_tracker.sleep_scores
            (id, device_id, recorded_at, score, source_key)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(device.as_str())
        .bind(record.timestamp)
        .bind(i16::from(record.score))
        .bind(source_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn fetch_failure(err: sqlx::Error) -> SourceError {
    SourceError::Fetch(err.to_string())
}

fn decode_failure(err: impl std::fmt::Display) -> SourceError {
    SourceError::Decode(err.to_string())
}

#[async_trait]
impl DeviceRegistry for PgStore {
    async fn register_device(&self, device: &DeviceId) -> Result<(), SourceError> {
        sqlx::query(
            r#"
            INSERT INTO sleep_tracker.devices (device_id)
            VALUES ($1)
            ON CONFLICT (device_id) DO UPDATE SET last_seen_at = now()
            "#,
        )
        .bind(device.as_str())
        .execute(&self.pool)
        .await
        .map_err(fetch_failure)?;
        debug!(device = %device, "Device registered");
        Ok(())
    }
}

#[async_trait]
impl RecordSource for PgStore {
    async fn fetch_score_records(&self, device: &DeviceId) -> Result<Vec<ScoreRecord>, SourceError> {
        let rows = sqlx::query(
            "SELECT recorded_at, score FROM sleep_tracker.sleep_scores WHERE device_id = $1",
        )
        .bind(device.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(fetch_failure)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let recorded_at: DateTime<Utc> = row.try_get("recorded_at").map_err(decode_failure)?;
            let score: i16 = row.try_get("score").map_err(decode_failure)?;
            records.push(ScoreRecord::new(recorded_at, i64::from(score)).map_err(decode_failure)?);
        }

        debug!(device = %device, count = records.len(), "Fetched sleep scores");
        Ok(records)
    }

    async fn fetch_nightmare_records(
        &self,
        device: &DeviceId,
    ) -> Result<Vec<NightmareRecord>, SourceError> {
        let rows = sqlx::query(
            "SELECT occurred_at, had_nightmare, description, intensity \
             FROM sleep_tracker.nightmares WHERE device_id = $1",
        )
        .bind(device.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(fetch_failure)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let intensity: Option<i16> = row.try_get("intensity").map_err(decode_failure)?;
            records.push(NightmareRecord {
                timestamp: row.try_get("occurred_at").map_err(decode_failure)?,
                occurred: row.try_get("had_nightmare").map_err(decode_failure)?,
                description: row.try_get("description").map_err(decode_failure)?,
                intensity: intensity
                    .map(|value| Intensity::try_from(i64::from(value)))
                    .transpose()
                    .map_err(decode_failure)?,
            });
        }

        debug!(device = %device, count = records.len(), "Fetched nightmare records");
        Ok(records)
    }
}

#[async_trait]
impl NightmareLog for PgStore {
    async fn append_nightmare_record(
        &self,
        device: &DeviceId,
        entry: NewNightmare,
    ) -> Result<(), SourceError> {
        let description = Some(entry.description.trim().to_string()).filter(|text| !text.is_empty());

        sqlx::query(
            r#"
            INSERT INTO sleep_tracker.nightmares
            (id, device_id, occurred_at, had_nightmare, description, intensity)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(device.as_str())
        .bind(entry.timestamp)
        .bind(entry.occurred)
        .bind(description)
        .bind(i16::from(entry.intensity.value()))
        .execute(&self.pool)
        .await
        .map_err(fetch_failure)?;

        info!(device = %device, occurred = entry.occurred, "Nightmare entry logged");
        Ok(())
    }
}

#[async_trait]
impl MonthScoreSource for PgStore {
    async fn fetch_month_scores(
        &self,
        device: &DeviceId,
        month: YearMonth,
    ) -> Result<Vec<DayScore>, SourceError> {
        let records = self.fetch_score_records(device).await?;
        Ok(daily_scores(&records, month, &Local))
    }
}
