//! `sqlx`-backed repository (feature `db`). Uses runtime query construction
//! (`sqlx::query_as::<_, T>(...).bind(...)`) rather than the compile-time
//! `query!`/`query_as!` macros, since those require a live database (or an
//! `SQLX_OFFLINE` cache) at build time.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use super::{MicrogridLockGuard, Repository};
use crate::domain::device::Device;
use crate::domain::schedule::{Alert, Schedule};
use crate::domain::system::MicrogridProfile;

pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn load_config(&self, microgrid_id: Uuid) -> anyhow::Result<MicrogridProfile> {
        let row = sqlx::query_as::<_, (Value,)>("SELECT config FROM microgrid_configs WHERE microgrid_id = $1")
            .bind(microgrid_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(serde_json::from_value(row.0)?)
    }

    async fn load_devices(&self, microgrid_id: Uuid, active_only: bool) -> anyhow::Result<Vec<Device>> {
        let query = if active_only {
            "SELECT device FROM devices WHERE microgrid_id = $1 AND (device->>'is_active')::boolean = true"
        } else {
            "SELECT device FROM devices WHERE microgrid_id = $1"
        };
        let rows = sqlx::query_as::<_, (Value,)>(query)
            .bind(microgrid_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|(v,)| serde_json::from_value(v).map_err(anyhow::Error::from))
            .collect()
    }

    async fn load_latest_sensor(&self, microgrid_id: Uuid) -> anyhow::Result<f64> {
        let row = sqlx::query(
            "SELECT soc FROM battery_sensor_readings WHERE microgrid_id = $1 ORDER BY observed_at DESC LIMIT 1",
        )
        .bind(microgrid_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<f64, _>("soc")?)
    }

    async fn save_schedule(&self, schedule: &Schedule) -> anyhow::Result<()> {
        let payload = serde_json::to_value(schedule)?;
        sqlx::query(
            "INSERT INTO schedules (microgrid_id, date, schedule, created_at) VALUES ($1, $2, $3, $4)
             ON CONFLICT (microgrid_id, date) DO UPDATE SET schedule = EXCLUDED.schedule, created_at = EXCLUDED.created_at",
        )
        .bind(schedule.microgrid_id)
        .bind(schedule.date)
        .bind(payload)
        .bind(schedule.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_latest_schedule(&self, microgrid_id: Uuid) -> anyhow::Result<Option<Schedule>> {
        let row = sqlx::query_as::<_, (Value,)>(
            "SELECT schedule FROM schedules WHERE microgrid_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(microgrid_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(v,)| serde_json::from_value(v).map_err(anyhow::Error::from)).transpose()
    }

    async fn load_alerts(&self, microgrid_id: Uuid) -> anyhow::Result<Vec<Alert>> {
        let rows = sqlx::query_as::<_, (uuid::Uuid, uuid::Uuid, Value, Value, String, Option<chrono::DateTime<chrono::Utc>>, chrono::DateTime<chrono::Utc>)>(
            "SELECT id, microgrid_id, severity, kind, message, bucket_start, created_at FROM alerts WHERE microgrid_id = $1 ORDER BY created_at DESC",
        )
        .bind(microgrid_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(id, microgrid_id, severity, kind, message, bucket_start, created_at)| {
                Ok(Alert {
                    id,
                    microgrid_id,
                    severity: serde_json::from_value(severity)?,
                    kind: serde_json::from_value(kind)?,
                    message,
                    bucket_start,
                    created_at,
                    acknowledged_at: None,
                })
            })
            .collect()
    }

    async fn append_alerts(&self, alerts: &[Alert]) -> anyhow::Result<()> {
        for alert in alerts {
            sqlx::query(
                "INSERT INTO alerts (id, microgrid_id, severity, kind, message, bucket_start, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (microgrid_id, kind, bucket_start) DO NOTHING",
            )
            .bind(alert.id)
            .bind(alert.microgrid_id)
            .bind(serde_json::to_value(alert.severity)?)
            .bind(serde_json::to_value(alert.kind)?)
            .bind(&alert.message)
            .bind(alert.bucket_start)
            .bind(alert.created_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// `pg_advisory_xact_lock` keyed on the microgrid id hash, held for the
    /// lifetime of a transaction — released automatically when the guard's
    /// `release()` commits it (or, if never called, when the connection is
    /// dropped back to the pool).
    async fn acquire_lock(&self, microgrid_id: Uuid) -> anyhow::Result<Box<dyn MicrogridLockGuard>> {
        let mut tx: Transaction<'static, Postgres> = self.pool.begin().await?;
        let key = advisory_lock_key(microgrid_id);
        sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(key).execute(&mut *tx).await?;
        Ok(Box::new(PgLockGuard { tx: Some(tx) }))
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn advisory_lock_key(microgrid_id: Uuid) -> i64 {
    let bytes = microgrid_id.as_bytes();
    i64::from_be_bytes(bytes[0..8].try_into().unwrap())
}

struct PgLockGuard {
    tx: Option<Transaction<'static, Postgres>>,
}

#[async_trait]
impl MicrogridLockGuard for PgLockGuard {
    async fn release(mut self: Box<Self>) -> anyhow::Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }
}

impl Drop for PgLockGuard {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!("microgrid lock guard dropped without release(); lock held until connection returns to pool");
        }
    }
}
