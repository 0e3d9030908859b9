//! Forecast Adapter (§4.3): normalizes a raw external forecast record into
//! the scheduler's internal bucketized `ForecastSeries`.

use chrono::{DateTime, TimeZone, Timelike, Utc};
use thiserror::Error;
use std::collections::HashMap;

use crate::domain::forecast::{ForecastPoint, ForecastSeries};
use crate::domain::types::{ist_offset, Location};
use crate::solar;

/// GHI->power composite loss factor: 0.85 (system) × 0.95 (temperature) ×
/// 0.95 (pollution) × 0.97 (soiling) (§4.3 step 6).
pub const CONVERSION_EFFICIENCY: f64 = 0.85 * 0.95 * 0.95 * 0.97;

const SYNTHESIZED_DAYTIME_FRACTION_LIMIT: f64 = 0.25;

/// One sample as received from the external forecast collaborator, before
/// grid alignment. Quantiles are optional because not every upstream feed
/// reports spread; missing ones default to the point estimate.
#[derive(Debug, Clone)]
pub struct RawForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub ghi_w_m2: f64,
    pub power_kw: f64,
    pub p10_kw: Option<f64>,
    pub p50_kw: Option<f64>,
    pub p90_kw: Option<f64>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdapterError {
    #[error("forecast horizon must be between 1 and 48 hours, got {0}")]
    InvalidHorizon(u32),
    #[error("more than 25% of daytime buckets ({synthesized}/{daytime_total}) had to be synthesized")]
    UnusableForecast { synthesized: usize, daytime_total: usize },
}

/// Adapts a raw forecast into a uniform-hourly `ForecastSeries` covering
/// `horizon_hours` starting at the next IST hour boundary after `now`.
pub fn adapt(
    raw: &[RawForecastPoint],
    location: Location,
    horizon_hours: u32,
    capacity_kw: f64,
    now: DateTime<Utc>,
) -> Result<ForecastSeries, AdapterError> {
    if horizon_hours == 0 || horizon_hours > 48 {
        return Err(AdapterError::InvalidHorizon(horizon_hours));
    }

    let deduped = dedupe_last_write_wins(raw);
    let grid_start = next_ist_hour_boundary(now);

    let mut points = Vec::with_capacity(horizon_hours as usize);
    let mut synthesized_daytime = 0usize;
    let mut daytime_total = 0usize;

    for i in 0..horizon_hours {
        let start_time = grid_start + chrono::Duration::hours(i as i64);
        let elevation = solar::solar_elevation_deg(location.latitude_deg, location.longitude_deg, start_time);
        let is_daytime = solar::is_daytime(location.latitude_deg, location.longitude_deg, start_time);
        let clear_sky = solar::clear_sky_ghi_w_m2(location.latitude_deg, location.longitude_deg, start_time);

        if is_daytime {
            daytime_total += 1;
        }

        let (mut ghi, mut p10, mut p50, mut p90, synthesized) = if let Some(exact) = find_exact(&deduped, start_time) {
            (exact.ghi_w_m2, exact.p10_kw.unwrap_or(exact.power_kw), exact.p50_kw.unwrap_or(exact.power_kw), exact.p90_kw.unwrap_or(exact.power_kw), false)
        } else if !is_daytime {
            (0.0, 0.0, 0.0, 0.0, false)
        } else {
            let interpolated = interpolate(&deduped, start_time, clear_sky);
            (interpolated, interpolated * default_daytime_ratio(), interpolated, interpolated * (1.0 / default_daytime_ratio().max(1e-6)), true)
        };

        if is_daytime && synthesized {
            synthesized_daytime += 1;
        }

        // Step 3: nighttime clamping.
        if !is_daytime {
            ghi = 0.0;
            p10 = 0.0;
            p50 = 0.0;
            p90 = 0.0;
        }

        points.push(ForecastPoint {
            timestamp: start_time,
            ghi_w_m2: ghi,
            ghi_clear_sky_w_m2: clear_sky,
            solar_elevation_deg: elevation,
            is_daytime,
            power_kw: 0.0, // filled in below once the zero-repair pass has run
            p10_kw: p10,
            p50_kw: p50,
            p90_kw: p90,
            std_kw: ((p90 - p10) / 4.0).max(0.0),
        });
    }

    if daytime_total > 0 {
        let synthesized_fraction = synthesized_daytime as f64 / daytime_total as f64;
        if synthesized_fraction > SYNTHESIZED_DAYTIME_FRACTION_LIMIT {
            return Err(AdapterError::UnusableForecast {
                synthesized: synthesized_daytime,
                daytime_total,
            });
        }
    }

    repair_daytime_zeros(&mut points);
    apply_realistic_bounds(&mut points, location);
    convert_ghi_to_power(&mut points, capacity_kw);

    Ok(ForecastSeries::new(points))
}

fn dedupe_last_write_wins(raw: &[RawForecastPoint]) -> Vec<RawForecastPoint> {
    let mut by_timestamp: HashMap<DateTime<Utc>, RawForecastPoint> = HashMap::new();
    for point in raw {
        by_timestamp.insert(point.timestamp, point.clone());
    }
    let mut deduped: Vec<RawForecastPoint> = by_timestamp.into_values().collect();
    deduped.sort_by_key(|p| p.timestamp);
    deduped
}

fn find_exact(raw: &[RawForecastPoint], at: DateTime<Utc>) -> Option<&RawForecastPoint> {
    raw.iter().find(|p| p.timestamp == at)
}

/// Linear interpolation between the nearest known points bracketing `at`,
/// falling back to the clear-sky envelope (scaled by a plausible default
/// ratio) when no bracket exists.
fn interpolate(raw: &[RawForecastPoint], at: DateTime<Utc>, clear_sky: f64) -> f64 {
    let before = raw.iter().filter(|p| p.timestamp <= at).max_by_key(|p| p.timestamp);
    let after = raw.iter().filter(|p| p.timestamp >= at).min_by_key(|p| p.timestamp);

    match (before, after) {
        (Some(b), Some(a)) if b.timestamp != a.timestamp => {
            let span = (a.timestamp - b.timestamp).num_seconds() as f64;
            let frac = (at - b.timestamp).num_seconds() as f64 / span;
            b.ghi_w_m2 + (a.ghi_w_m2 - b.ghi_w_m2) * frac
        }
        (Some(b), _) if b.timestamp == at => b.ghi_w_m2,
        _ => clear_sky * default_daytime_ratio(),
    }
}

/// A conservative default clear-sky ratio used only when no real data point
/// can be interpolated (total extrapolation).
fn default_daytime_ratio() -> f64 {
    0.6
}

/// §4.3 step 4: daytime buckets left at zero GHI (e.g. a gap in an
/// otherwise-populated series) are replaced by the clear-sky curve scaled by
/// the median ratio observed across the rest of the daytime buckets.
fn repair_daytime_zeros(points: &mut [ForecastPoint]) {
    let mut ratios: Vec<f64> = points
        .iter()
        .filter(|p| p.is_daytime && p.ghi_w_m2 > 0.0 && p.ghi_clear_sky_w_m2 > 0.0)
        .map(|p| p.ghi_w_m2 / p.ghi_clear_sky_w_m2)
        .collect();
    if ratios.is_empty() {
        return;
    }
    ratios.sort_by(f64::total_cmp);
    let median_ratio = ratios[ratios.len() / 2];

    for point in points.iter_mut() {
        if point.is_daytime && point.ghi_w_m2 == 0.0 && point.ghi_clear_sky_w_m2 > 0.0 {
            point.ghi_w_m2 = point.ghi_clear_sky_w_m2 * median_ratio;
            // No real quantile data survives a full gap-fill; seed a plausible
            // spread around the fallback GHI, consistent with the ratio used
            // for points that came from total extrapolation (`interpolate`).
            point.p50_kw = point.ghi_w_m2;
            point.p10_kw = point.ghi_w_m2 * default_daytime_ratio();
            point.p90_kw = point.ghi_w_m2 / default_daytime_ratio();
        }
    }
}

/// §4.3 step 5: cap GHI at absolute and clear-sky-relative ceilings, and
/// taper it to zero for elevations below 5°.
fn apply_realistic_bounds(points: &mut [ForecastPoint], _location: Location) {
    for point in points.iter_mut() {
        let pre_bounds_ghi = point.ghi_w_m2;
        if pre_bounds_ghi <= 0.0 {
            continue;
        }

        let mut ghi = pre_bounds_ghi.min(1000.0);
        if point.ghi_clear_sky_w_m2 > 0.0 {
            ghi = ghi.min(1.10 * point.ghi_clear_sky_w_m2);
        }
        if point.solar_elevation_deg < 5.0 {
            let taper = (point.solar_elevation_deg / 5.0).clamp(0.0, 1.0);
            ghi *= taper;
        }

        let ratio = if pre_bounds_ghi > 0.0 { ghi / pre_bounds_ghi } else { 1.0 };
        point.ghi_w_m2 = ghi;
        point.p10_kw *= ratio;
        point.p50_kw *= ratio;
        point.p90_kw *= ratio;
    }

    // Step 7: re-check and repair quantile ordering (isotonic clipping).
    for point in points.iter_mut() {
        if point.p50_kw < point.p10_kw {
            point.p50_kw = point.p10_kw;
        }
        if point.p90_kw < point.p50_kw {
            point.p90_kw = point.p50_kw;
        }
    }
}

/// §4.3 step 6: derive the point-estimate power from the final, bounded GHI.
fn convert_ghi_to_power(points: &mut [ForecastPoint], capacity_kw: f64) {
    for point in points.iter_mut() {
        point.power_kw = (point.ghi_w_m2 / 1000.0) * capacity_kw * CONVERSION_EFFICIENCY;
        point.std_kw = ((point.p90_kw - point.p10_kw) / 4.0).max(0.0);
    }
}

fn next_ist_hour_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let ist_now = now.with_timezone(&ist_offset());
    let on_boundary = ist_now.minute() == 0 && ist_now.second() == 0 && ist_now.nanosecond() == 0;
    let truncated = ist_now.date_naive().and_hms_opt(ist_now.hour(), 0, 0).expect("valid hour");
    let truncated_dt = ist_offset()
        .from_local_datetime(&truncated)
        .single()
        .expect("unambiguous fixed-offset local time");
    let boundary = if on_boundary { truncated_dt } else { truncated_dt + chrono::Duration::hours(1) };
    boundary.with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> Location {
        Location::new(28.4595, 77.0266).unwrap()
    }

    #[test]
    fn rejects_zero_and_oversized_horizon() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap();
        assert!(matches!(adapt(&[], location(), 0, 50.0, now), Err(AdapterError::InvalidHorizon(0))));
        assert!(matches!(adapt(&[], location(), 49, 50.0, now), Err(AdapterError::InvalidHorizon(49))));
    }

    #[test]
    fn grid_start_aligns_to_next_ist_hour_boundary() {
        // 2025-06-14T19:17:00Z = 2025-06-15T00:47 IST -> next boundary is
        // 01:00 IST = 2025-06-14T19:30:00Z. Picked in the nighttime window
        // so the bucket doesn't also need real/interpolated daytime data.
        let now = Utc.with_ymd_and_hms(2025, 6, 14, 19, 17, 0).unwrap();
        let series = adapt(&[], location(), 1, 50.0, now).unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 6, 14, 19, 30, 0).unwrap();
        assert_eq!(series.points[0].timestamp, expected);
    }

    #[test]
    fn empty_raw_input_is_fully_synthesized_but_nighttime_only_passes() {
        // A horizon starting right at midnight IST stays all-night for a while,
        // so no daytime buckets exist to trip the synthesized-fraction check.
        let now = Utc.with_ymd_and_hms(2025, 6, 14, 18, 30, 0).unwrap(); // 00:00 IST
        let series = adapt(&[], location(), 4, 50.0, now).unwrap();
        assert!(series.points.iter().all(|p| p.ghi_w_m2 == 0.0 && p.power_kw == 0.0));
    }

    #[test]
    fn too_much_daytime_synthesis_is_unusable() {
        let now = Utc.with_ymd_and_hms(2025, 6, 14, 18, 30, 0).unwrap(); // 00:00 IST
        // 24h horizon covers a full daytime window with no real raw data at all.
        let result = adapt(&[], location(), 24, 50.0, now);
        assert!(matches!(result, Err(AdapterError::UnusableForecast { .. })));
    }

    #[test]
    fn exact_match_is_used_verbatim_and_power_is_derived_from_ghi() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 6, 17, 0).unwrap();
        let bucket_start = Utc.with_ymd_and_hms(2025, 6, 15, 6, 30, 0).unwrap();
        let raw = vec![RawForecastPoint {
            timestamp: bucket_start,
            ghi_w_m2: 600.0,
            power_kw: 999.0, // must be ignored; power is re-derived from ghi
            p10_kw: Some(20.0),
            p50_kw: Some(24.0),
            p90_kw: Some(28.0),
        }];
        let series = adapt(&raw, location(), 1, 50.0, now).unwrap();
        let point = &series.points[0];
        assert_eq!(point.ghi_w_m2, 600.0);
        let expected_power = 0.6 * 50.0 * CONVERSION_EFFICIENCY;
        assert!((point.power_kw - expected_power).abs() < 1e-9);
    }

    #[test]
    fn quantile_ordering_holds_after_adaptation() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 6, 17, 0).unwrap();
        let raw = vec![RawForecastPoint {
            timestamp: Utc.with_ymd_and_hms(2025, 6, 15, 6, 30, 0).unwrap(),
            ghi_w_m2: 1200.0, // forces capping, exercising the isotonic repair path
            power_kw: 50.0,
            p10_kw: Some(60.0),
            p50_kw: Some(10.0),
            p90_kw: Some(5.0),
        }];
        let series = adapt(&raw, location(), 1, 50.0, now).unwrap();
        let point = &series.points[0];
        assert!(point.p10_kw <= point.p50_kw);
        assert!(point.p50_kw <= point.p90_kw);
        assert!(point.ghi_w_m2 <= 1000.0);
    }

    #[test]
    fn dedupe_keeps_last_write_for_duplicate_timestamps() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 6, 17, 0).unwrap();
        let ts = Utc.with_ymd_and_hms(2025, 6, 15, 6, 30, 0).unwrap();
        let raw = vec![
            RawForecastPoint { timestamp: ts, ghi_w_m2: 100.0, power_kw: 1.0, p10_kw: None, p50_kw: None, p90_kw: None },
            RawForecastPoint { timestamp: ts, ghi_w_m2: 500.0, power_kw: 20.0, p10_kw: None, p50_kw: None, p90_kw: None },
        ];
        let deduped = dedupe_last_write_wins(&raw);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].ghi_w_m2, 500.0);
    }
}
