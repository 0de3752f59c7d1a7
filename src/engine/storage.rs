/// SQLite persistence for scheduled jobs and their triggers
///
/// One row per job key. Job data and trigger state are stored as JSON columns;
/// the next fire time is duplicated into its own column for ordered listing.

use crate::engine::trigger::Trigger;
use crate::error::{Result, SchedulerError};
use crate::jobs::data::JobDataMap;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::path::Path;

/// A job as held by the trigger store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredJob {
    pub key: String,
    pub data: JobDataMap,
    pub trigger: Trigger,
}

/// SQLite-backed trigger store
#[derive(Debug, Clone)]
pub struct TriggerStorage {
    pool: SqlitePool,
}

impl TriggerStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database file and initialize the schema
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!("🗄️ Opening trigger store: {}", db_path.display());

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let storage = Self::new(pool);
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create the jobs table. Safe to call repeatedly.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_jobs (
                job_key TEXT PRIMARY KEY,
                job_data JSON NOT NULL,
                trigger_state JSON NOT NULL,
                next_fire_at TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_next_fire ON scheduled_jobs(next_fire_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert a new job; fails with `JobAlreadyExists` if the key is taken
    pub async fn insert(&self, job: &StoredJob) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO scheduled_jobs (job_key, job_data, trigger_state, next_fire_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(job_key) DO NOTHING
            "#,
        )
        .bind(&job.key)
        .bind(serde_json::to_string(&job.data)?)
        .bind(serde_json::to_string(&job.trigger)?)
        .bind(job.trigger.next_fire_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::JobAlreadyExists(job.key.clone()));
        }
        Ok(())
    }

    /// Persist a trigger after it fired
    pub async fn update_trigger(&self, key: &str, trigger: &Trigger) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_jobs
            SET trigger_state = ?, next_fire_at = ?, updated_at = CURRENT_TIMESTAMP
            WHERE job_key = ?
            "#,
        )
        .bind(serde_json::to_string(trigger)?)
        .bind(trigger.next_fire_at.map(|t| t.to_rfc3339()))
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, key: &str) -> Result<Option<StoredJob>> {
        let row = sqlx::query("SELECT job_key, job_data, trigger_state FROM scheduled_jobs WHERE job_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::decode(&row)).transpose()
    }

    /// Every stored job, soonest fire first
    pub async fn list(&self) -> Result<Vec<StoredJob>> {
        let rows = sqlx::query(
            "SELECT job_key, job_data, trigger_state FROM scheduled_jobs ORDER BY next_fire_at IS NULL, next_fire_at, job_key",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode).collect()
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scheduled_jobs WHERE job_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove every job; returns how many were removed
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM scheduled_jobs").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<StoredJob> {
        let data_json: String = row.get("job_data");
        let trigger_json: String = row.get("trigger_state");
        Ok(StoredJob {
            key: row.get("job_key"),
            data: serde_json::from_str(&data_json)?,
            trigger: serde_json::from_str(&trigger_json)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn job(key: &str, start_in_secs: i64) -> StoredJob {
        let mut data = JobDataMap::new();
        data.insert("action_identifier".into(), key.into());
        StoredJob {
            key: key.to_string(),
            data,
            trigger: Trigger::simple(
                Duration::from_secs(5),
                Some(2),
                Utc::now() + chrono::Duration::seconds(start_in_secs),
            )
            .unwrap(),
        }
    }

    #[tokio::test]
    async fn jobs_round_trip_and_list_in_fire_order() {
        let dir = TempDir::new().unwrap();
        let storage = TriggerStorage::connect(&dir.path().join("jobs.db")).await.unwrap();

        storage.insert(&job("later", 60)).await.unwrap();
        storage.insert(&job("sooner", 10)).await.unwrap();

        let loaded = storage.get("later").await.unwrap().unwrap();
        assert_eq!(loaded, job_with_trigger("later", &loaded.trigger));

        let keys: Vec<String> = storage.list().await.unwrap().into_iter().map(|j| j.key).collect();
        assert_eq!(keys, vec!["sooner", "later"]);
    }

    fn job_with_trigger(key: &str, trigger: &Trigger) -> StoredJob {
        let mut expected = job(key, 0);
        expected.trigger = trigger.clone();
        expected
    }

    #[tokio::test]
    async fn duplicate_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let storage = TriggerStorage::connect(&dir.path().join("jobs.db")).await.unwrap();

        storage.insert(&job("dup", 0)).await.unwrap();
        assert!(matches!(
            storage.insert(&job("dup", 0)).await,
            Err(SchedulerError::JobAlreadyExists(key)) if key == "dup"
        ));
    }

    #[tokio::test]
    async fn update_delete_and_clear() {
        let dir = TempDir::new().unwrap();
        let storage = TriggerStorage::connect(&dir.path().join("jobs.db")).await.unwrap();

        let mut stored = job("a", 0);
        storage.insert(&stored).await.unwrap();
        storage.insert(&job("b", 0)).await.unwrap();

        stored.trigger.advance(Utc::now()).unwrap();
        assert!(storage.update_trigger("a", &stored.trigger).await.unwrap());
        assert_eq!(storage.get("a").await.unwrap().unwrap().trigger.times_triggered, 1);
        assert!(!storage.update_trigger("missing", &stored.trigger).await.unwrap());

        assert!(storage.delete("a").await.unwrap());
        assert!(!storage.delete("a").await.unwrap());
        assert_eq!(storage.clear().await.unwrap(), 1);
        assert!(storage.list().await.unwrap().is_empty());
    }
}
