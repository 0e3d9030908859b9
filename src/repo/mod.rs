//! Persistence interface (§6): a repository capability set consumed by
//! `controller::run_pipeline`. Two implementations: `memory` (default,
//! used by tests and `sim` builds) and `pg` (feature `db`).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::device::Device;
use crate::domain::schedule::{Alert, Schedule};
use crate::domain::system::MicrogridProfile;

pub mod memory;

#[cfg(feature = "db")]
pub mod pg;

/// Held for the duration of `[fetch inputs -> engine run -> write schedule]`
/// (§5) so two requests targeting the same microgrid serialize on write.
/// Async cleanup (committing a Postgres transaction, say) can't happen in
/// `Drop`, so callers must call `release()` explicitly; `Drop` only warns if
/// a guard was dropped without one.
#[async_trait]
pub trait MicrogridLockGuard: Send {
    async fn release(self: Box<Self>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn load_config(&self, microgrid_id: Uuid) -> anyhow::Result<MicrogridProfile>;
    async fn load_devices(&self, microgrid_id: Uuid, active_only: bool) -> anyhow::Result<Vec<Device>>;
    /// Most recently observed battery state of charge, 0..1 (§6).
    async fn load_latest_sensor(&self, microgrid_id: Uuid) -> anyhow::Result<f64>;
    async fn save_schedule(&self, schedule: &Schedule) -> anyhow::Result<()>;
    async fn load_latest_schedule(&self, microgrid_id: Uuid) -> anyhow::Result<Option<Schedule>>;
    async fn append_alerts(&self, alerts: &[Alert]) -> anyhow::Result<()>;
    async fn load_alerts(&self, microgrid_id: Uuid) -> anyhow::Result<Vec<Alert>>;
    async fn acquire_lock(&self, microgrid_id: Uuid) -> anyhow::Result<Box<dyn MicrogridLockGuard>>;
    /// Cheap connectivity check for `/health`; a no-op for the in-memory store.
    async fn ping(&self) -> anyhow::Result<()>;

    /// Lets bootstrap code (`main::seed_default_microgrid`) reach the
    /// concrete in-memory store's seeding helpers without widening this
    /// trait with seed-only methods every backend would have to implement.
    fn as_memory(&self) -> Option<&memory::InMemoryRepository> {
        None
    }
}

/// Aggregates the active `Repository` implementation for `AppState`.
pub struct Repositories {
    pub store: std::sync::Arc<dyn Repository>,
}

impl Repositories {
    #[cfg(not(feature = "db"))]
    pub async fn new(_cfg: &crate::config::AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            store: std::sync::Arc::new(memory::InMemoryRepository::new()),
        })
    }

    #[cfg(feature = "db")]
    pub async fn new(cfg: &crate::config::AppConfig) -> anyhow::Result<Self> {
        if cfg.database.enabled {
            let repo = pg::PgRepository::connect(&cfg.database.url).await?;
            Ok(Self { store: std::sync::Arc::new(repo) })
        } else {
            Ok(Self { store: std::sync::Arc::new(memory::InMemoryRepository::new()) })
        }
    }
}
