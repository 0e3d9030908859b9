use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One hourly sample of the forecast timeseries (§3 ForecastPoint).
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub ghi_w_m2: f64,
    pub ghi_clear_sky_w_m2: f64,
    pub solar_elevation_deg: f64,
    pub is_daytime: bool,
    pub power_kw: f64,
    pub p10_kw: f64,
    pub p50_kw: f64,
    pub p90_kw: f64,
    pub std_kw: f64,
}

impl ForecastPoint {
    /// §3 invariant check for a single point: quantile ordering and the
    /// ghi-zero-at-night rule. Does not check cross-point invariants
    /// (monotonic timestamps, uniform spacing) — those belong to the series.
    pub fn check_invariants(&self) -> Result<(), String> {
        if !(self.p10_kw <= self.p50_kw && self.p50_kw <= self.p90_kw) {
            return Err(format!(
                "quantile ordering violated: p10={} p50={} p90={}",
                self.p10_kw, self.p50_kw, self.p90_kw
            ));
        }
        if !self.is_daytime && self.ghi_w_m2 != 0.0 {
            return Err("ghi must be zero when not daytime".to_string());
        }
        Ok(())
    }
}

/// An ordered hourly forecast timeseries (§3 ForecastSeries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub horizon_hours: u32,
    pub points: Vec<ForecastPoint>,
}

impl ForecastSeries {
    pub fn new(points: Vec<ForecastPoint>) -> Self {
        Self {
            horizon_hours: points.len() as u32,
            points,
        }
    }

    pub fn is_uniform_hourly(&self) -> bool {
        self.points.windows(2).all(|w| {
            let gap = w[1].timestamp - w[0].timestamp;
            gap == chrono::Duration::hours(1)
        })
    }

    pub fn is_monotonic(&self) -> bool {
        self.points.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
    }
}

/// Forecast-validator verdict classes (§4.2).
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Realistic,
    MostlyRealistic,
    Optimistic,
    Incorrect,
}

/// Severity shared by validator verdicts and alerts (§3, §4.7).
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Low,
    Medium,
    Critical,
}

/// Result of §4.2 Forecast Validator.
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub verdict: Verdict,
    pub severity: Severity,
    pub summary: String,
    pub passed: Vec<String>,
    pub warnings: Vec<String>,
    pub issues: Vec<String>,
    pub causes: Vec<String>,
    pub recommendations: Vec<String>,
}
