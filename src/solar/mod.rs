//! Clock & Solar Geometry (§4.1). Pure functions of location and UTC instant;
//! no state, no I/O. IST is always the fixed +05:30 offset — see
//! `domain::types::ist_offset`.

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};
use std::f64::consts::PI;

use crate::domain::types::ist_offset;

const DEG: f64 = PI / 180.0;
const SOLAR_CONSTANT_W_M2: f64 = 1361.0;
/// Continental-baseline Linke turbidity. Fixed rather than modelled, so the
/// clear-sky curve stays deterministic (§8 property 7).
const LINKE_TURBIDITY: f64 = 3.0;

/// Civil time in Asia/Kolkata for a UTC instant.
pub fn local_time_ist(instant: DateTime<Utc>) -> DateTime<FixedOffset> {
    instant.with_timezone(&ist_offset())
}

struct SolarGeometry {
    elevation_deg: f64,
    sin_elevation: f64,
}

/// Declination (Spencer 1971) and equation-of-time based hour angle, used to
/// derive true solar elevation — distinct from `local_time_ist`'s civil
/// clock, which only gates the daytime *window*.
fn solar_geometry(lat_deg: f64, lon_deg: f64, instant: DateTime<Utc>) -> SolarGeometry {
    let doy = instant.ordinal() as f64;
    let ut_h = instant.hour() as f64 + instant.minute() as f64 / 60.0 + instant.second() as f64 / 3600.0;

    let b = 2.0 * PI * (doy - 1.0) / 365.0;
    let decl_deg = (180.0 / PI)
        * (0.006918 - 0.399912 * b.cos() + 0.070257 * b.sin() - 0.006758 * (2.0 * b).cos()
            + 0.000907 * (2.0 * b).sin()
            - 0.002697 * (3.0 * b).cos()
            + 0.00148 * (3.0 * b).sin());
    let decl = decl_deg * DEG;

    let eot_min = 229.18
        * (0.000075 + 0.001868 * b.cos() - 0.032077 * b.sin() - 0.014615 * (2.0 * b).cos()
            - 0.04089 * (2.0 * b).sin());

    let lstm_deg = 15.0 * (lon_deg / 15.0).round();
    let tc_min = 4.0 * (lon_deg - lstm_deg) + eot_min;
    let utc_offset_h = (lon_deg / 15.0).round();
    let local_clock_h = (ut_h + utc_offset_h).rem_euclid(24.0);
    let lst_h = local_clock_h + tc_min / 60.0;

    let omega_deg = 15.0 * (lst_h - 12.0);
    let omega = omega_deg * DEG;

    let lat = lat_deg * DEG;
    let sin_elevation = lat.sin() * decl.sin() + lat.cos() * decl.cos() * omega.cos();
    let elevation_deg = sin_elevation.clamp(-1.0, 1.0).asin() / DEG;

    SolarGeometry {
        elevation_deg,
        sin_elevation,
    }
}

pub fn solar_elevation_deg(lat_deg: f64, lon_deg: f64, instant: DateTime<Utc>) -> f64 {
    solar_geometry(lat_deg, lon_deg, instant).elevation_deg
}

/// §4.1: elevation ≥ 0 and local (civil IST) hour in [6, 19).
pub fn is_daytime(lat_deg: f64, lon_deg: f64, instant: DateTime<Utc>) -> bool {
    let elevation = solar_elevation_deg(lat_deg, lon_deg, instant);
    let hour = local_time_ist(instant).hour();
    elevation >= 0.0 && (6..19).contains(&hour)
}

/// Simplified Bird & Hulstrom clear-sky GHI, W/m². Clipped at 0 for
/// non-positive elevation; monotonic increasing with elevation above that.
pub fn clear_sky_ghi_w_m2(lat_deg: f64, lon_deg: f64, instant: DateTime<Utc>) -> f64 {
    let geometry = solar_geometry(lat_deg, lon_deg, instant);
    if geometry.elevation_deg <= 0.0 {
        return 0.0;
    }
    let doy = instant.ordinal() as f64;
    let b = 2.0 * PI * (doy - 1.0) / 365.0;
    let e0 = SOLAR_CONSTANT_W_M2
        * (1.00011 + 0.034221 * b.cos() + 0.00128 * b.sin() + 0.000719 * (2.0 * b).cos()
            + 0.000077 * (2.0 * b).sin());

    let sin_elevation = geometry.sin_elevation.max(1e-6);
    let am = (1.0 / (sin_elevation + 0.50572 * (geometry.elevation_deg + 6.07995).powf(-1.6364))).max(1.0);

    let tr = (-0.0903 * am.powf(0.84) * (1.0 + am - am.powf(1.01))).exp();
    let to = 1.0 - 0.0013 * am;
    let ta = (-0.09 * LINKE_TURBIDITY.powf(0.978) * am.powf(0.9455)).exp();
    let tw = 1.0 - 0.0075 * am.powf(0.65);
    let total_t = tr * to * ta * tw;

    let dni = 0.9762 * e0 * total_t;
    let dhi = (0.79 * e0 * sin_elevation * (1.0 - total_t) * 0.35 / (1.0 - am + am.powf(1.02))).max(0.0);

    (dni * sin_elevation + dhi).max(0.0)
}

/// Integer hour-of-day bucket index (IST-anchored), 0..23.
pub fn bucket_index(instant: DateTime<Utc>) -> u32 {
    local_time_ist(instant).hour()
}
