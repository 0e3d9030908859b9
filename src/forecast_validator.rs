//! Forecast Validator (§4.2): physical-plausibility checks on an incoming
//! ForecastSeries. Pure, side-effect free; gates what the Dispatch Engine is
//! allowed to act on but never mutates the series itself.

use ordered_float::OrderedFloat;
use thiserror::Error;

use crate::domain::forecast::{ForecastSeries, Severity, ValidationVerdict, Verdict};
use crate::domain::types::Location;
use crate::solar;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidatorError {
    #[error("forecast is structurally invalid: {0}")]
    MalformedForecast(String),
}

struct CheckOutcome {
    label: &'static str,
    issue: Option<String>,
    warning: Option<String>,
}

/// Applies the seven §4.2 checks in order and reduces them to a verdict.
pub fn validate(series: &ForecastSeries, location: Location, capacity_kw: f64) -> Result<ValidationVerdict, ValidatorError> {
    if series.points.is_empty() {
        return Err(ValidatorError::MalformedForecast("forecast series has no points".into()));
    }
    if series.points.iter().all(|p| p.solar_elevation_deg < 0.0) {
        return Err(ValidatorError::MalformedForecast(
            "every point has negative solar elevation; series cannot contain a daytime window".into(),
        ));
    }

    let checks = [
        check_max_ghi(series),
        check_peak_capacity_factor(series, capacity_kw),
        check_average_capacity_factor(series, capacity_kw),
        check_clear_sky_ratio(series),
        check_elevation_consistency(series),
        check_daytime_detection(series, location),
        check_power_ghi_conversion(series, capacity_kw),
    ];

    let mut passed = Vec::new();
    let mut warnings = Vec::new();
    let mut issues = Vec::new();
    let mut causes = Vec::new();

    for outcome in &checks {
        if let Some(issue) = &outcome.issue {
            issues.push(format!("{}: {}", outcome.label, issue));
            causes.push(issue.clone());
        } else if let Some(warning) = &outcome.warning {
            warnings.push(format!("{}: {}", outcome.label, warning));
        } else {
            passed.push(outcome.label.to_string());
        }
    }

    let (verdict, severity) = if !issues.is_empty() {
        (Verdict::Incorrect, Severity::Critical)
    } else if warnings.len() >= 2 {
        (Verdict::Optimistic, Severity::Medium)
    } else if warnings.len() == 1 {
        (Verdict::MostlyRealistic, Severity::Low)
    } else {
        (Verdict::Realistic, Severity::None)
    };

    let recommendations = recommendations_for(&issues, &warnings);
    let summary = format!(
        "{:?} forecast: {} passed, {} warnings, {} issues",
        verdict,
        passed.len(),
        warnings.len(),
        issues.len()
    );

    Ok(ValidationVerdict {
        verdict,
        severity,
        summary,
        passed,
        warnings,
        issues,
        causes,
        recommendations,
    })
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn check_max_ghi(series: &ForecastSeries) -> CheckOutcome {
    let max_ghi = series.points.iter().map(|p| p.ghi_w_m2).fold(0.0, f64::max);
    if max_ghi > 1000.0 {
        CheckOutcome {
            label: "max_ghi",
            issue: Some(format!("peak GHI {max_ghi:.0} W/m² exceeds 1000")),
            warning: None,
        }
    } else if max_ghi > 900.0 {
        CheckOutcome {
            label: "max_ghi",
            issue: None,
            warning: Some(format!("peak GHI {max_ghi:.0} W/m² exceeds 900")),
        }
    } else {
        CheckOutcome { label: "max_ghi", issue: None, warning: None }
    }
}

fn check_peak_capacity_factor(series: &ForecastSeries, capacity_kw: f64) -> CheckOutcome {
    let max_power = series.points.iter().map(|p| p.power_kw).fold(0.0, f64::max);
    let peak_cf = if capacity_kw > 0.0 { max_power / capacity_kw } else { 0.0 };
    if peak_cf > 0.85 {
        CheckOutcome {
            label: "peak_capacity_factor",
            issue: Some(format!("peak capacity factor {:.0}% exceeds 85%", peak_cf * 100.0)),
            warning: None,
        }
    } else if peak_cf > 0.75 {
        CheckOutcome {
            label: "peak_capacity_factor",
            issue: None,
            warning: Some(format!("peak capacity factor {:.0}% exceeds 75%", peak_cf * 100.0)),
        }
    } else {
        CheckOutcome { label: "peak_capacity_factor", issue: None, warning: None }
    }
}

fn check_average_capacity_factor(series: &ForecastSeries, capacity_kw: f64) -> CheckOutcome {
    let avg_power = mean(series.points.iter().map(|p| p.power_kw));
    let avg_cf = if capacity_kw > 0.0 { avg_power / capacity_kw } else { 0.0 };
    if avg_cf > 0.40 {
        CheckOutcome {
            label: "average_capacity_factor",
            issue: None,
            warning: Some(format!("average capacity factor {:.0}% exceeds 40%", avg_cf * 100.0)),
        }
    } else {
        CheckOutcome { label: "average_capacity_factor", issue: None, warning: None }
    }
}

fn check_clear_sky_ratio(series: &ForecastSeries) -> CheckOutcome {
    let ratio = mean(
        series
            .points
            .iter()
            .filter(|p| p.is_daytime && p.ghi_clear_sky_w_m2 > 0.0)
            .map(|p| p.ghi_w_m2 / p.ghi_clear_sky_w_m2),
    );
    if ratio > 1.15 {
        CheckOutcome {
            label: "clear_sky_ratio",
            issue: Some(format!("average clear-sky ratio {ratio:.2} exceeds 1.15")),
            warning: None,
        }
    } else if ratio > 1.10 {
        CheckOutcome {
            label: "clear_sky_ratio",
            issue: None,
            warning: Some(format!("average clear-sky ratio {ratio:.2} exceeds 1.10")),
        }
    } else if ratio < 0.30 {
        CheckOutcome {
            label: "clear_sky_ratio",
            issue: None,
            warning: Some(format!("average clear-sky ratio {ratio:.2} below 0.30")),
        }
    } else {
        CheckOutcome { label: "clear_sky_ratio", issue: None, warning: None }
    }
}

fn check_elevation_consistency(series: &ForecastSeries) -> CheckOutcome {
    let Some(peak_elevation) = series.points.iter().max_by_key(|p| OrderedFloat(p.solar_elevation_deg)) else {
        return CheckOutcome { label: "elevation_consistency", issue: None, warning: None };
    };
    let expected = peak_elevation.solar_elevation_deg.to_radians().sin().max(0.0) * peak_elevation.ghi_clear_sky_w_m2;
    if expected > 0.0 && peak_elevation.ghi_w_m2 > 1.2 * expected {
        CheckOutcome {
            label: "elevation_consistency",
            issue: None,
            warning: Some(format!(
                "GHI at peak elevation ({:.0}) exceeds 1.2x expected ({:.0})",
                peak_elevation.ghi_w_m2, expected
            )),
        }
    } else {
        CheckOutcome { label: "elevation_consistency", issue: None, warning: None }
    }
}

fn check_daytime_detection(series: &ForecastSeries, location: Location) -> CheckOutcome {
    let violation = series.points.iter().any(|p| {
        !p.is_daytime && solar::is_daytime(location.latitude_deg, location.longitude_deg, p.timestamp)
    });
    if violation {
        CheckOutcome {
            label: "daytime_detection",
            issue: Some("a point marked non-daytime falls inside the elevation+civil-hour daytime window".into()),
            warning: None,
        }
    } else {
        CheckOutcome { label: "daytime_detection", issue: None, warning: None }
    }
}

fn check_power_ghi_conversion(series: &ForecastSeries, capacity_kw: f64) -> CheckOutcome {
    let Some(peak) = series.points.iter().filter(|p| p.is_daytime).max_by_key(|p| OrderedFloat(p.ghi_w_m2)) else {
        return CheckOutcome { label: "power_ghi_conversion", issue: None, warning: None };
    };
    if peak.ghi_w_m2 <= 0.0 || capacity_kw <= 0.0 {
        return CheckOutcome { label: "power_ghi_conversion", issue: None, warning: None };
    }
    let efficiency = peak.power_kw / (peak.ghi_w_m2 / 1000.0 * capacity_kw);
    if (efficiency - 0.77).abs() > 0.15 {
        CheckOutcome {
            label: "power_ghi_conversion",
            issue: None,
            warning: Some(format!("daytime-peak GHI->power efficiency {efficiency:.2} deviates from 0.77 by more than 0.15")),
        }
    } else {
        CheckOutcome { label: "power_ghi_conversion", issue: None, warning: None }
    }
}

fn recommendations_for(issues: &[String], warnings: &[String]) -> Vec<String> {
    let mut recommendations = Vec::new();
    if !issues.is_empty() {
        recommendations.push("reject this forecast and request a fresh run from the upstream model".to_string());
    }
    if !warnings.is_empty() {
        recommendations.push("proceed with caution; monitor realized generation against this forecast".to_string());
    }
    recommendations
}
