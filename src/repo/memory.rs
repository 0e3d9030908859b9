use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{MicrogridLockGuard, Repository};
use crate::domain::device::Device;
use crate::domain::schedule::{Alert, Schedule};
use crate::domain::system::MicrogridProfile;

/// `tokio::sync::RwLock`-guarded maps, the default for `sim` builds and all
/// unit/integration tests. Per-microgrid locking uses a lazily-created
/// `tokio::sync::Mutex` keyed on microgrid id, mirroring §5's serialization
/// requirement without needing a database.
#[derive(Default)]
pub struct InMemoryRepository {
    configs: RwLock<HashMap<Uuid, MicrogridProfile>>,
    devices: RwLock<HashMap<Uuid, Vec<Device>>>,
    sensors: RwLock<HashMap<Uuid, f64>>,
    schedules: RwLock<HashMap<Uuid, Schedule>>,
    alerts: RwLock<HashMap<Uuid, Vec<Alert>>>,
    locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_config(&self, microgrid_id: Uuid, profile: MicrogridProfile) {
        self.configs.write().await.insert(microgrid_id, profile);
    }

    pub async fn seed_devices(&self, microgrid_id: Uuid, devices: Vec<Device>) {
        self.devices.write().await.insert(microgrid_id, devices);
    }

    pub async fn seed_sensor(&self, microgrid_id: Uuid, initial_soc: f64) {
        self.sensors.write().await.insert(microgrid_id, initial_soc);
    }

    pub async fn latest_schedule(&self, microgrid_id: Uuid) -> Option<Schedule> {
        self.schedules.read().await.get(&microgrid_id).cloned()
    }

    pub async fn alerts_for(&self, microgrid_id: Uuid) -> Vec<Alert> {
        self.alerts.read().await.get(&microgrid_id).cloned().unwrap_or_default()
    }

    async fn lock_for(&self, microgrid_id: Uuid) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(&microgrid_id) {
            return lock.clone();
        }
        let mut locks = self.locks.write().await;
        locks.entry(microgrid_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

struct MemoryLockGuard {
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl MicrogridLockGuard for MemoryLockGuard {
    async fn release(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn load_config(&self, microgrid_id: Uuid) -> anyhow::Result<MicrogridProfile> {
        self.configs
            .read()
            .await
            .get(&microgrid_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no configuration for microgrid {microgrid_id}"))
    }

    async fn load_devices(&self, microgrid_id: Uuid, active_only: bool) -> anyhow::Result<Vec<Device>> {
        let devices = self.devices.read().await.get(&microgrid_id).cloned().unwrap_or_default();
        Ok(if active_only {
            devices.into_iter().filter(|d| d.is_active).collect()
        } else {
            devices
        })
    }

    async fn load_latest_sensor(&self, microgrid_id: Uuid) -> anyhow::Result<f64> {
        self.sensors
            .read()
            .await
            .get(&microgrid_id)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no sensor reading for microgrid {microgrid_id}"))
    }

    async fn save_schedule(&self, schedule: &Schedule) -> anyhow::Result<()> {
        self.schedules.write().await.insert(schedule.microgrid_id, schedule.clone());
        Ok(())
    }

    async fn load_latest_schedule(&self, microgrid_id: Uuid) -> anyhow::Result<Option<Schedule>> {
        Ok(self.schedules.read().await.get(&microgrid_id).cloned())
    }

    async fn load_alerts(&self, microgrid_id: Uuid) -> anyhow::Result<Vec<Alert>> {
        Ok(self.alerts.read().await.get(&microgrid_id).cloned().unwrap_or_default())
    }

    async fn append_alerts(&self, alerts: &[Alert]) -> anyhow::Result<()> {
        if alerts.is_empty() {
            return Ok(());
        }
        let microgrid_id = alerts[0].microgrid_id;
        let mut store = self.alerts.write().await;
        let existing = store.entry(microgrid_id).or_default();
        let seen: std::collections::HashSet<_> = existing.iter().map(|a| a.idempotence_key()).collect();
        for alert in alerts {
            if !seen.contains(&alert.idempotence_key()) {
                existing.push(alert.clone());
            }
        }
        Ok(())
    }

    async fn acquire_lock(&self, microgrid_id: Uuid) -> anyhow::Result<Box<dyn MicrogridLockGuard>> {
        let lock = self.lock_for(microgrid_id).await;
        let guard = lock.lock_owned().await;
        Ok(Box::new(MemoryLockGuard { _guard: guard }))
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn as_memory(&self) -> Option<&InMemoryRepository> {
        Some(self)
    }
}
