//! Boundary behaviours from the spec's edge-case list: horizon length,
//! SOC limits, irrigation-deferral termination, export disablement, and a
//! cross-cutting invariants sweep over a full day's schedule.

mod common;

use chrono::NaiveDate;
use suryadrishti::domain::forecast::ForecastSeries;
use suryadrishti::dispatch;

fn scenario_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
}

#[test]
fn horizon_of_one_bucket_runs() {
    let config = common::base_config();
    let devices = vec![common::essential_device("fridge", 3.0)];
    let forecast = ForecastSeries::new(vec![common::point(6, 20.0)]);

    let result = dispatch::run(&forecast, &devices, &config, 0.5, scenario_date(), true).unwrap();

    assert_eq!(result.buckets.len(), 1);
}

#[test]
fn horizon_of_forty_eight_buckets_runs() {
    let config = common::base_config();
    let devices = vec![common::essential_device("fridge", 3.0)];
    let mut points = common::bell_curve_day(45.0, 0, 6);
    points.extend(common::bell_curve_day(45.0, 0, 6).into_iter().map(|mut p| {
        p.timestamp += chrono::Duration::hours(24);
        p
    }));
    let forecast = ForecastSeries::new(points);

    let result = dispatch::run(&forecast, &devices, &config, 0.5, scenario_date(), true).unwrap();

    assert_eq!(result.buckets.len(), 48);
}

#[test]
fn initial_soc_at_exact_minimum_is_accepted() {
    let config = common::base_config();
    let devices = vec![common::essential_device("fridge", 3.0)];
    let forecast = ForecastSeries::new(common::bell_curve_day(45.0, 0, 6));

    let result = dispatch::run(&forecast, &devices, &config, config.battery_min_soc, scenario_date(), true).unwrap();

    assert_eq!(result.buckets.len(), 24);
}

#[test]
fn initial_soc_at_exact_maximum_is_accepted() {
    let config = common::base_config();
    let devices = vec![common::essential_device("fridge", 3.0)];
    let forecast = ForecastSeries::new(common::bell_curve_day(45.0, 0, 6));

    let result = dispatch::run(&forecast, &devices, &config, config.battery_max_soc, scenario_date(), true).unwrap();

    assert_eq!(result.buckets.len(), 24);
}

/// Every device irrigation-flagged, forecast strictly increasing all day:
/// deferral must still terminate rather than loop, leaving a minority of
/// buckets deferred and the rest served.
#[test]
fn all_irrigation_devices_deferral_terminates() {
    let config = common::base_config();
    let devices = vec![
        common::flexible_device("pump_a", 4.0, None, true),
        common::flexible_device("pump_b", 4.0, None, true),
    ];
    let forecast = ForecastSeries::new((0..24).map(|h| common::point(h, h as f64)).collect());

    let result = dispatch::run(&forecast, &devices, &config, 0.5, scenario_date(), true).unwrap();

    assert_eq!(result.buckets.len(), 24);
    let deferred_count = result.buckets.iter().filter(|b| !b.irrigation_deferred.is_empty()).count();
    assert!(deferred_count < result.buckets.len(), "deferral never resolved: every bucket deferred");
}

/// No solar at all: essential load must fall back to battery, then grid and
/// generator, rather than going unserved outright (contrast with S3 where
/// grid and generator are both unavailable).
#[test]
fn zero_solar_day_falls_back_to_battery_then_grid_and_generator() {
    let config = common::base_config();
    let devices = vec![common::essential_device("fridge", 3.0)];
    let forecast: Vec<_> = (0..24).map(|h| common::point(h, 0.0)).collect();
    let forecast = ForecastSeries::new(forecast);

    let result = dispatch::run(&forecast, &devices, &config, 0.9, scenario_date(), true).unwrap();

    assert!(!result.buckets.iter().any(|b| b.essential_unserved));
    assert!(result.buckets.iter().any(|b| b.grid_import_kw > 0.0 || b.generator_kw > 0.0));
}

#[test]
fn export_disabled_means_export_is_always_zero() {
    let mut config = common::base_config();
    config.grid_export_enabled = false;
    let devices = vec![common::essential_device("fridge", 3.0)];
    let forecast = ForecastSeries::new(common::bell_curve_day(45.0, 0, 6));

    let result = dispatch::run(&forecast, &devices, &config, 0.5, scenario_date(), true).unwrap();

    let total_export: f64 = result.buckets.iter().map(|b| b.grid_export_kw).sum();
    assert_eq!(total_export, 0.0);
}

/// A full day's schedule must never violate the per-bucket power balance or
/// exclusivity invariants, must keep SOC within configured limits, and every
/// essential-unserved bucket must have a corresponding critical alert.
#[tokio::test]
async fn full_day_schedule_holds_universal_invariants() {
    let config = common::base_config();
    let (min_soc, max_soc) = (config.battery_min_soc, config.battery_max_soc);
    let profile = common::profile(config, 60.0);
    let devices = vec![
        common::essential_device("fridge", 3.0),
        common::flexible_device("irrigation_pump", 6.0, Some((10, 16)), true),
    ];
    let forecast = common::bell_curve_day(45.0, 0, 6);

    let (schedule, alerts) = common::run_scenario(profile, devices, 0.5, forecast, scenario_date(), true).await;

    assert!(schedule.power_balance_holds(0.01), "power balance violated somewhere in {:?}", schedule.buckets);
    assert!(schedule.buckets.iter().all(|b| b.exclusivity_holds()));
    assert!(schedule
        .buckets
        .iter()
        .all(|b| b.soc_end >= min_soc - 1e-9 && b.soc_end <= max_soc + 1e-9));

    for bucket in schedule.buckets.iter().filter(|b| b.essential_unserved) {
        assert!(alerts.iter().any(|a| a.kind == suryadrishti::domain::schedule::AlertKind::EssentialUnserved
            && a.severity == suryadrishti::domain::schedule::AlertSeverity::Critical
            && a.bucket_start == Some(bucket.start_time)));
    }
}
