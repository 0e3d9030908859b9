//! Alert Rules (§4.7): scans the forecast and the resulting schedule for
//! conditions worth surfacing to an operator. Pure; the caller is
//! responsible for persisting/emitting the returned alerts.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::forecast::{ForecastSeries, Severity, ValidationVerdict, Verdict};
use crate::domain::schedule::{Alert, AlertKind, AlertSeverity, Bucket, ScheduleMetrics};
use crate::domain::system::SystemConfiguration;

const POWER_DROP_THRESHOLD: f64 = 0.20;
const SOC_CRITICAL_MARGIN: f64 = 0.02;
const BATTERY_CYCLE_EFFICIENCY_FLOOR: f64 = 0.70;

/// Runs all six §4.7 rules and returns the alerts they raise. `now_created_at`
/// is the single timestamp stamped on every alert produced by this scan.
pub fn scan(
    microgrid_id: Uuid,
    forecast: &ForecastSeries,
    verdict: &ValidationVerdict,
    buckets: &[Bucket],
    metrics: &ScheduleMetrics,
    config: &SystemConfiguration,
    now_created_at: DateTime<Utc>,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    alerts.extend(power_drop_alerts(microgrid_id, forecast, now_created_at));
    alerts.extend(forecast_implausible_alert(microgrid_id, verdict, now_created_at));
    alerts.extend(soc_critical_alerts(microgrid_id, buckets, config, now_created_at));
    alerts.extend(essential_unserved_alerts(microgrid_id, buckets, now_created_at));
    alerts.extend(irrigation_deferred_alerts(microgrid_id, buckets, now_created_at));
    if let Some(alert) = battery_cycle_anomaly_alert(microgrid_id, metrics, now_created_at) {
        alerts.push(alert);
    }

    alerts
}

fn alert(
    microgrid_id: Uuid,
    severity: AlertSeverity,
    kind: AlertKind,
    message: String,
    bucket_start: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
) -> Alert {
    Alert {
        id: Uuid::new_v4(),
        microgrid_id,
        severity,
        kind,
        message,
        bucket_start,
        created_at,
        acknowledged_at: None,
    }
}

/// §4.7: max(power_kw in next 30-60 min) - power_kw(now) >= 0.20 * power_kw(now),
/// now daytime. The forecast is hourly, so "next 30-60 min" is read as the
/// single next point.
fn power_drop_alerts(microgrid_id: Uuid, forecast: &ForecastSeries, created_at: DateTime<Utc>) -> Vec<Alert> {
    let mut alerts = Vec::new();
    for window in forecast.points.windows(2) {
        let now = &window[0];
        let next = &window[1];
        if !now.is_daytime || now.power_kw <= 0.0 {
            continue;
        }
        if now.power_kw - next.power_kw >= POWER_DROP_THRESHOLD * now.power_kw {
            alerts.push(alert(
                microgrid_id,
                AlertSeverity::Warning,
                AlertKind::PowerDropImminent,
                format!(
                    "forecast power drops from {:.2} kW to {:.2} kW at {}",
                    now.power_kw, next.power_kw, next.timestamp
                ),
                Some(now.timestamp),
                created_at,
            ));
        }
    }
    alerts
}

fn forecast_implausible_alert(microgrid_id: Uuid, verdict: &ValidationVerdict, created_at: DateTime<Utc>) -> Vec<Alert> {
    let severity = match verdict.verdict {
        Verdict::Optimistic => AlertSeverity::Warning,
        Verdict::Incorrect => AlertSeverity::Critical,
        Verdict::Realistic | Verdict::MostlyRealistic => return Vec::new(),
    };
    vec![alert(
        microgrid_id,
        severity,
        AlertKind::ForecastImplausible,
        verdict.summary.clone(),
        None,
        created_at,
    )]
}

fn soc_critical_alerts(microgrid_id: Uuid, buckets: &[Bucket], config: &SystemConfiguration, created_at: DateTime<Utc>) -> Vec<Alert> {
    let threshold = config.battery_min_soc + SOC_CRITICAL_MARGIN;
    buckets
        .iter()
        .filter(|b| b.soc_end <= threshold)
        .map(|b| {
            alert(
                microgrid_id,
                AlertSeverity::Critical,
                AlertKind::SocCritical,
                format!("battery SOC {:.3} at or below critical floor {:.3}", b.soc_end, threshold),
                Some(b.start_time),
                created_at,
            )
        })
        .collect()
}

fn essential_unserved_alerts(microgrid_id: Uuid, buckets: &[Bucket], created_at: DateTime<Utc>) -> Vec<Alert> {
    buckets
        .iter()
        .filter(|b| b.essential_unserved)
        .map(|b| {
            alert(
                microgrid_id,
                AlertSeverity::Critical,
                AlertKind::EssentialUnserved,
                "essential load could not be served by grid or generator".to_string(),
                Some(b.start_time),
                created_at,
            )
        })
        .collect()
}

fn irrigation_deferred_alerts(microgrid_id: Uuid, buckets: &[Bucket], created_at: DateTime<Utc>) -> Vec<Alert> {
    buckets
        .iter()
        .filter(|b| !b.irrigation_deferred.is_empty())
        .map(|b| {
            alert(
                microgrid_id,
                AlertSeverity::Warning,
                AlertKind::IrrigationDeferred,
                format!("{} irrigation pump(s) deferred", b.irrigation_deferred.len()),
                Some(b.start_time),
                created_at,
            )
        })
        .collect()
}

fn battery_cycle_anomaly_alert(microgrid_id: Uuid, metrics: &ScheduleMetrics, created_at: DateTime<Utc>) -> Option<Alert> {
    if metrics.battery_cycle_efficiency > 0.0 && metrics.battery_cycle_efficiency < BATTERY_CYCLE_EFFICIENCY_FLOOR {
        Some(alert(
            microgrid_id,
            AlertSeverity::Info,
            AlertKind::BatteryCycleAnomaly,
            format!("battery cycle efficiency {:.2} below expected floor", metrics.battery_cycle_efficiency),
            None,
            created_at,
        ))
    } else {
        None
    }
}
