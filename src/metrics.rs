//! Metrics & Audit (§4.6): post-hoc figures computed once a Schedule's
//! buckets are final. Pure function of the buckets and the system
//! configuration used to produce them — no engine state is needed here.

use chrono::Timelike;

use crate::domain::schedule::{Bucket, CapacityFactor, ScheduleMetrics};
use crate::domain::system::SystemConfiguration;

/// Peak capacity factor above which §4.2/§4.6 both raise a warning.
const PEAK_CAPACITY_FACTOR_WARNING: f64 = 0.85;
const PEAK_GHI_WARNING_W_M2: f64 = 900.0;

pub fn compute(buckets: &[Bucket], config: &SystemConfiguration, capacity_kw: f64, peak_ghi_w_m2: f64) -> (ScheduleMetrics, Vec<String>) {
    let total_solar: f64 = buckets.iter().map(|b| b.solar_kw).sum();
    let total_load: f64 = buckets.iter().map(|b| b.load_kw).sum();
    let total_charge: f64 = buckets.iter().map(|b| b.battery_charge_kw).sum();
    let total_export: f64 = buckets.iter().map(|b| b.grid_export_kw).sum();
    let total_import: f64 = buckets.iter().map(|b| b.grid_import_kw).sum();
    let total_generator: f64 = buckets.iter().map(|b| b.generator_kw).sum();
    let total_discharge: f64 = buckets.iter().map(|b| b.battery_discharge_kw).sum();

    let solar_utilization_percent = if total_solar > 0.0 {
        100.0
            * buckets
                .iter()
                .map(|b| b.solar_kw.min(b.load_kw + b.battery_charge_kw + b.grid_export_kw))
                .sum::<f64>()
            / total_solar
    } else {
        0.0
    };

    // Counterfactual: the same load, served entirely from grid at the
    // bucket's applicable rate, with no solar/battery/generator offset.
    let baseline_grid_energy: f64 = total_load;
    let baseline_cost: f64 = buckets
        .iter()
        .map(|b| b.load_kw * rate_for(b, config))
        .sum();
    let actual_cost: f64 = buckets
        .iter()
        .map(|b| b.grid_import_kw * rate_for(b, config))
        .sum::<f64>()
        + total_generator * config.generator_fuel_cost_per_liter * config.generator_fuel_consumption_l_per_kwh
        - total_export * config.grid_export_rate_per_kwh;
    let estimated_cost_savings = baseline_cost - actual_cost;

    let battery_cycle_efficiency = if total_charge > 0.0 {
        total_discharge / total_charge
    } else {
        0.0
    };

    let grid_import_reduction_percent = if baseline_grid_energy > 0.0 {
        100.0 * (baseline_grid_energy - total_import) / baseline_grid_energy
    } else {
        0.0
    };

    let baseline_generator_energy = 0.0; // counterfactual never runs a generator
    let carbon_footprint_reduction_kg = 0.5 * (baseline_grid_energy - total_import) + 2.7 * (baseline_generator_energy - total_generator);

    let peak_load = buckets.iter().map(|b| b.load_kw).fold(0.0, f64::max);
    let average_load = if buckets.is_empty() { 0.0 } else { total_load / buckets.len() as f64 };
    let capacity_factor = CapacityFactor {
        peak_percent: if capacity_kw > 0.0 { 100.0 * peak_load / capacity_kw } else { 0.0 },
        average_percent: if capacity_kw > 0.0 { 100.0 * average_load / capacity_kw } else { 0.0 },
    };

    let mut warnings = Vec::new();
    if capacity_factor.peak_percent > PEAK_CAPACITY_FACTOR_WARNING * 100.0 {
        warnings.push(format!(
            "peak capacity factor {:.1}% exceeds {:.0}%",
            capacity_factor.peak_percent,
            PEAK_CAPACITY_FACTOR_WARNING * 100.0
        ));
    }
    if peak_ghi_w_m2 > PEAK_GHI_WARNING_W_M2 {
        warnings.push(format!("peak forecast ghi {peak_ghi_w_m2:.0} W/m² exceeds {PEAK_GHI_WARNING_W_M2:.0} W/m²"));
    }

    let metrics = ScheduleMetrics {
        solar_utilization_percent,
        estimated_cost_savings,
        battery_cycle_efficiency,
        grid_import_reduction_percent,
        grid_export_energy_kwh: total_export,
        grid_export_revenue: total_export * config.grid_export_rate_per_kwh,
        carbon_footprint_reduction_kg,
        capacity_factor,
    };

    (metrics, warnings)
}

fn rate_for(bucket: &Bucket, config: &SystemConfiguration) -> f64 {
    let hour = crate::solar::local_time_ist(bucket.start_time).hour() as u32;
    if config.grid_peak_hours.contains(hour) {
        config.grid_peak_rate_per_kwh
    } else {
        config.grid_off_peak_rate_per_kwh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schedule::DeviceAllocation;
    use crate::domain::system::{OptimizationMode, PeakHours};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn config() -> SystemConfiguration {
        SystemConfiguration {
            battery_capacity_kwh: 10.0,
            battery_max_charge_kw: 3.0,
            battery_max_discharge_kw: 3.0,
            battery_min_soc: 0.10,
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

    fn bucket(hour_offset: i64, solar: f64, load: f64, charge: f64, discharge: f64, import: f64, export: f64, generator: f64) -> Bucket {
        let base = Utc.with_ymd_and_hms(2025, 6, 15, 0, 30, 0).unwrap();
        Bucket {
            index: hour_offset as u32,
            start_time: base + chrono::Duration::hours(hour_offset),
            duration_hours: 1.0,
            solar_kw: solar,
            load_kw: load,
            battery_charge_kw: charge,
            battery_discharge_kw: discharge,
            grid_import_kw: import,
            grid_export_kw: export,
            generator_kw: generator,
            soc_end: 0.5,
            devices: vec![DeviceAllocation {
                id: Uuid::new_v4(),
                name: "load".into(),
                power_kw: load,
                power_source: crate::domain::schedule::PowerSource::Solar,
            }],
            essential_unserved: false,
            irrigation_deferred: vec![],
        }
    }

    #[test]
    fn solar_utilization_is_zero_when_no_solar_produced() {
        let buckets = vec![bucket(0, 0.0, 2.0, 0.0, 0.0, 2.0, 0.0, 0.0)];
        let (metrics, _) = compute(&buckets, &config(), 5.0, 0.0);
        assert_eq!(metrics.solar_utilization_percent, 0.0);
    }

    #[test]
    fn solar_utilization_full_when_all_solar_consumed() {
        let buckets = vec![bucket(0, 5.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0)];
        let (metrics, _) = compute(&buckets, &config(), 5.0, 0.0);
        assert!((metrics.solar_utilization_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn battery_cycle_efficiency_reflects_round_trip_losses() {
        let buckets = vec![
            bucket(0, 5.0, 1.0, 2.0, 0.0, 0.0, 2.0, 0.0),
            bucket(1, 0.0, 1.0, 0.0, 1.9, 0.0, 0.0, 0.0),
        ];
        let (metrics, _) = compute(&buckets, &config(), 5.0, 0.0);
        assert!((metrics.battery_cycle_efficiency - 0.95).abs() < 1e-9);
    }

    #[test]
    fn export_revenue_matches_export_energy_times_rate() {
        let buckets = vec![bucket(0, 5.0, 1.0, 2.0, 0.0, 0.0, 2.0, 0.0)];
        let (metrics, _) = compute(&buckets, &config(), 5.0, 0.0);
        assert_eq!(metrics.grid_export_energy_kwh, 2.0);
        assert!((metrics.grid_export_revenue - 6.0).abs() < 1e-9);
    }

    #[test]
    fn warnings_flag_high_peak_capacity_factor_and_high_peak_ghi() {
        let buckets = vec![bucket(0, 5.0, 4.5, 0.0, 0.0, 0.0, 0.5, 0.0)];
        let (_, warnings) = compute(&buckets, &config(), 5.0, 950.0);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn grid_import_reduction_is_positive_when_solar_offsets_load() {
        let buckets = vec![bucket(0, 5.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0)];
        let (metrics, _) = compute(&buckets, &config(), 5.0, 0.0);
        assert!((metrics.grid_import_reduction_percent - 100.0).abs() < 1e-9);
    }
}
