//! Orchestration (§6): `AppState` plus the `run_pipeline` entry point —
//! forecast fetch, adapt, advisory-mode validate, dispatch, metrics, alerts,
//! persist — wired together exactly in the order §2/§6 describe. The
//! dispatch engine itself has no I/O; everything here is the glue around it.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::alerts;
use crate::config::AppConfig;
use crate::dispatch;
use crate::domain::schedule::Schedule;
use crate::forecast_adapter::{self, RawForecastPoint};
use crate::forecast_validator;
use crate::metrics;
use crate::repo::Repositories;

#[derive(Clone)]
pub struct AppState {
    pub cfg: AppConfig,
    pub repos: Arc<Repositories>,
}

impl AppState {
    pub async fn new(cfg: AppConfig) -> Result<Self> {
        let repos = Arc::new(Repositories::new(&cfg).await.context("failed to initialize repositories")?);
        Ok(Self { cfg, repos })
    }
}

/// A hint to the repository layer about which upstream forecast collaborator
/// to use; the engine itself is indifferent to its provenance (§6).
#[derive(Debug, Clone, Default)]
pub struct ForecastSourceHint(pub Option<String>);

/// Supplies the raw, pre-grid-alignment forecast a run needs. The default
/// `sim` build's implementation lives alongside the in-memory repository;
/// a real deployment would materialize this from an external forecast API.
#[async_trait::async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch(&self, microgrid_id: Uuid, hint: &ForecastSourceHint) -> Result<Vec<RawForecastPoint>>;
}

/// Clear-sky-only forecast source: no weather collaborator, just the clear
/// sky GHI curve for the microgrid's location over the next 48 hours.
/// The bundled default for `sim` builds where no external forecast API is
/// wired up — real deployments swap in a `ForecastSource` backed by an
/// actual weather/irradiance provider.
pub struct ClearSkyForecastSource {
    pub location: crate::domain::types::Location,
}

#[async_trait::async_trait]
impl ForecastSource for ClearSkyForecastSource {
    async fn fetch(&self, _microgrid_id: Uuid, _hint: &ForecastSourceHint) -> Result<Vec<RawForecastPoint>> {
        let now = Utc::now();
        let points = (0..48)
            .map(|h| {
                let timestamp = now + chrono::Duration::hours(h);
                let ghi = crate::solar::clear_sky_ghi_w_m2(self.location.latitude_deg, self.location.longitude_deg, timestamp);
                RawForecastPoint { timestamp, ghi_w_m2: ghi, power_kw: 0.0, p10_kw: None, p50_kw: None, p90_kw: None }
            })
            .collect();
        Ok(points)
    }
}

/// §6 `run(microgrid_id, horizon_hours, date, forecast_source_hint)`.
pub async fn run_pipeline(
    state: &AppState,
    forecast_source: &dyn ForecastSource,
    microgrid_id: Uuid,
    horizon_hours: u32,
    date: NaiveDate,
    hint: ForecastSourceHint,
) -> Result<Schedule> {
    let guard = state.repos.store.acquire_lock(microgrid_id).await.context("failed to acquire microgrid lock")?;

    let result = run_locked(state, forecast_source, microgrid_id, horizon_hours, date, hint).await;

    guard.release().await.context("failed to release microgrid lock")?;
    result
}

async fn run_locked(
    state: &AppState,
    forecast_source: &dyn ForecastSource,
    microgrid_id: Uuid,
    horizon_hours: u32,
    date: NaiveDate,
    hint: ForecastSourceHint,
) -> Result<Schedule> {
    let profile = state.repos.store.load_config(microgrid_id).await.context("failed to load microgrid configuration")?;
    profile.config.validate().map_err(|e| anyhow::anyhow!("invalid system configuration: {e}"))?;

    let devices = state.repos.store.load_devices(microgrid_id, true).await.context("failed to load devices")?;
    let initial_soc = state.repos.store.load_latest_sensor(microgrid_id).await.context("failed to load latest sensor reading")?;

    let raw_forecast = forecast_source
        .fetch(microgrid_id, &hint)
        .await
        .context("forecast fetch failed")?;

    let now = Utc::now();
    let forecast = forecast_adapter::adapt(&raw_forecast, profile.location, horizon_hours, profile.solar_capacity_kw, now)
        .map_err(anyhow::Error::from)
        .context("forecast adapter")?;

    let verdict = forecast_validator::validate(&forecast, profile.location, profile.solar_capacity_kw)
        .map_err(anyhow::Error::from)
        .context("forecast validator")?;
    info!(%microgrid_id, verdict = ?verdict.verdict, "forecast validated (advisory)");

    let dispatch_result = dispatch::run(&forecast, &devices, &profile.config, initial_soc, date, true)
        .map_err(anyhow::Error::from)
        .context("dispatch engine")?;

    if dispatch_result.buckets.iter().any(|b| b.essential_unserved) {
        warn!(%microgrid_id, "essential load unserved in at least one bucket");
    }

    let peak_ghi = forecast.points.iter().map(|p| p.ghi_w_m2).fold(0.0, f64::max);
    let (schedule_metrics, mut warnings) = metrics::compute(&dispatch_result.buckets, &profile.config, profile.solar_capacity_kw, peak_ghi);
    warnings.extend(dispatch_result.warnings);

    let created_at: DateTime<Utc> = Utc::now();
    let schedule = Schedule {
        microgrid_id,
        date,
        buckets: dispatch_result.buckets,
        metrics: schedule_metrics,
        warnings,
        created_at,
    };

    state.repos.store.save_schedule(&schedule).await.context("failed to persist schedule")?;

    let emitted = alerts::scan(microgrid_id, &forecast, &verdict, &schedule.buckets, &schedule.metrics, &profile.config, created_at);
    if !emitted.is_empty() {
        state.repos.store.append_alerts(&emitted).await.context("failed to persist alerts")?;
    }

    Ok(schedule)
}
