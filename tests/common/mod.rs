//! Shared fixtures for the scenario and boundary integration tests: device/
//! config builders plus a `run_scenario` helper that drives the pipeline
//! `controller::run_locked` implements — validate, dispatch, metrics, alerts,
//! persist — directly against an `InMemoryRepository`. It skips the
//! forecast-adapter step deliberately: that step anchors its grid to a live
//! `Utc::now()`, and these scenarios need a forecast pinned to specific
//! literal values instead.
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use suryadrishti::domain::device::{Device, DeviceType, PreferredHours};
use suryadrishti::domain::forecast::{ForecastPoint, ForecastSeries};
use suryadrishti::domain::schedule::{Alert, Schedule};
use suryadrishti::domain::system::{MicrogridProfile, OptimizationMode, PeakHours, SystemConfiguration};
use suryadrishti::domain::types::Location;
use suryadrishti::repo::memory::InMemoryRepository;
use suryadrishti::repo::Repository;
use suryadrishti::{alerts, dispatch, forecast_validator, metrics, solar};

/// New Delhi. Arbitrary but fixed so every scenario's solar geometry is
/// reproducible.
pub fn location() -> Location {
    Location::new(28.6139, 77.2090).unwrap()
}

pub fn base_config() -> SystemConfiguration {
    SystemConfiguration {
        battery_capacity_kwh: 20.0,
        battery_max_charge_kw: 5.0,
        battery_max_discharge_kw: 5.0,
        battery_min_soc: 0.15,
        battery_max_soc: 0.95,
        battery_efficiency: 0.95,
        grid_peak_rate_per_kwh: 9.5,
        grid_off_peak_rate_per_kwh: 5.0,
        grid_peak_hours: PeakHours { start: 18, end: 22 },
        grid_export_rate_per_kwh: 3.0,
        grid_export_enabled: true,
        generator_fuel_cost_per_liter: 95.0,
        generator_fuel_consumption_l_per_kwh: 0.35,
        generator_min_runtime_minutes: 15,
        generator_max_power_kw: 5.0,
        optimization_mode: OptimizationMode::Cost,
        safety_margin_critical_loads: 0.10,
    }
}

pub fn profile(config: SystemConfiguration, solar_capacity_kw: f64) -> MicrogridProfile {
    MicrogridProfile {
        config,
        location: location(),
        solar_capacity_kw,
    }
}

pub fn essential_device(name: &str, power_kw: f64) -> Device {
    Device {
        id: Uuid::new_v4(),
        name: name.to_string(),
        power_kw,
        device_type: DeviceType::Essential,
        min_runtime_minutes: 60,
        priority: 1,
        preferred_hours: None,
        is_active: true,
        irrigation_flag: false,
    }
}

pub fn flexible_device(name: &str, power_kw: f64, preferred_hours: Option<(u8, u8)>, irrigation: bool) -> Device {
    Device {
        id: Uuid::new_v4(),
        name: name.to_string(),
        power_kw,
        device_type: DeviceType::Flexible,
        min_runtime_minutes: 60,
        priority: 3,
        preferred_hours: preferred_hours.map(|(start, end)| PreferredHours::new(start, end)),
        is_active: true,
        irrigation_flag: irrigation,
    }
}

/// 2025-06-15T00:30:00Z, i.e. 06:00 IST — hour offset 0 of every scenario's
/// forecast below.
pub fn base_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 0, 30, 0).unwrap()
}

/// One hourly point `hour_offset` hours after `base_timestamp()`. Elevation,
/// daytime flag and clear-sky GHI come from `solar::` so they stay internally
/// consistent with `location()`; `power_kw` is the only value a scenario
/// actually drives.
pub fn point(hour_offset: i64, power_kw: f64) -> ForecastPoint {
    let loc = location();
    let timestamp = base_timestamp() + Duration::hours(hour_offset);
    let elevation = solar::solar_elevation_deg(loc.latitude_deg, loc.longitude_deg, timestamp);
    let is_daytime = solar::is_daytime(loc.latitude_deg, loc.longitude_deg, timestamp);
    let clear_sky = solar::clear_sky_ghi_w_m2(loc.latitude_deg, loc.longitude_deg, timestamp);
    let ghi = if is_daytime { clear_sky * 0.85 } else { 0.0 };
    ForecastPoint {
        timestamp,
        ghi_w_m2: ghi,
        ghi_clear_sky_w_m2: clear_sky,
        solar_elevation_deg: elevation,
        is_daytime,
        power_kw,
        p10_kw: power_kw * 0.9,
        p50_kw: power_kw,
        p90_kw: power_kw * 1.1,
        std_kw: power_kw * 0.1,
    }
}

/// A full day's bell-curve forecast: zero before `sunrise_offset`, a half-sine
/// peaking at `peak_power_kw` at `sunrise_offset + half_span`, zero again at
/// `sunrise_offset + 2*half_span`, zero for the rest of the 24-hour horizon.
pub fn bell_curve_day(peak_power_kw: f64, sunrise_offset: i64, half_span: i64) -> Vec<ForecastPoint> {
    (0..24)
        .map(|h| {
            let rel = h - sunrise_offset;
            let power = if (0..=2 * half_span).contains(&rel) {
                peak_power_kw * (std::f64::consts::PI * rel as f64 / (2 * half_span) as f64).sin()
            } else {
                0.0
            };
            point(h, power.max(0.0))
        })
        .collect()
}

/// Drives one end-to-end run against a fresh `InMemoryRepository` and
/// returns the persisted schedule plus whatever alerts the run emitted.
pub async fn run_scenario(
    profile: MicrogridProfile,
    devices: Vec<Device>,
    initial_soc: f64,
    forecast_points: Vec<ForecastPoint>,
    date: chrono::NaiveDate,
    grid_available: bool,
) -> (Schedule, Vec<Alert>) {
    let microgrid_id = Uuid::new_v4();
    let repo = InMemoryRepository::new();
    repo.seed_config(microgrid_id, profile).await;
    repo.seed_devices(microgrid_id, devices).await;
    repo.seed_sensor(microgrid_id, initial_soc).await;

    let profile = repo.load_config(microgrid_id).await.expect("config was just seeded");
    let devices = repo.load_devices(microgrid_id, true).await.expect("devices were just seeded");
    let soc = repo.load_latest_sensor(microgrid_id).await.expect("sensor was just seeded");
    let forecast = ForecastSeries::new(forecast_points);

    let verdict = forecast_validator::validate(&forecast, profile.location, profile.solar_capacity_kw)
        .expect("scenario forecasts always contain a daytime point");
    let dispatch_result = dispatch::run(&forecast, &devices, &profile.config, soc, date, grid_available).expect("scenario inputs are always valid");
    let peak_ghi = forecast.points.iter().map(|p| p.ghi_w_m2).fold(0.0, f64::max);
    let (schedule_metrics, mut warnings) = metrics::compute(&dispatch_result.buckets, &profile.config, profile.solar_capacity_kw, peak_ghi);
    warnings.extend(dispatch_result.warnings.clone());

    let created_at = Utc::now();
    let schedule = Schedule {
        microgrid_id,
        date,
        buckets: dispatch_result.buckets,
        metrics: schedule_metrics,
        warnings,
        created_at,
    };
    repo.save_schedule(&schedule).await.expect("in-memory save never fails");

    let emitted = alerts::scan(microgrid_id, &forecast, &verdict, &schedule.buckets, &schedule.metrics, &profile.config, created_at);
    if !emitted.is_empty() {
        repo.append_alerts(&emitted).await.expect("in-memory append never fails");
    }

    let persisted = repo
        .load_latest_schedule(microgrid_id)
        .await
        .expect("in-memory load never fails")
        .expect("schedule was just saved");
    let persisted_alerts = repo.load_alerts(microgrid_id).await.expect("in-memory load never fails");
    (persisted, persisted_alerts)
}
