//! SystemConfiguration (§3): the per-microgrid battery/grid/generator knobs
//! the Dispatch Engine treats as a read-only snapshot for the duration of a
//! run.

use serde::{Deserialize, Serialize};

use crate::domain::types::Location;

#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMode {
    Cost,
    SelfConsumption,
    Backup,
}

/// Hour-of-day window for grid peak pricing, with the same wrap-around
/// convention as `device::PreferredHours`.
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakHours {
    pub start: u8,
    pub end: u8,
}

impl PeakHours {
    pub fn contains(&self, h: u32) -> bool {
        let h = h as u8;
        if self.start <= self.end {
            h >= self.start && h < self.end
        } else {
            h >= self.start || h < self.end
        }
    }
}

#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfiguration {
    pub battery_capacity_kwh: f64,
    pub battery_max_charge_kw: f64,
    pub battery_max_discharge_kw: f64,
    pub battery_min_soc: f64,
    pub battery_max_soc: f64,
    pub battery_efficiency: f64,

    pub grid_peak_rate_per_kwh: f64,
    pub grid_off_peak_rate_per_kwh: f64,
    pub grid_peak_hours: PeakHours,
    pub grid_export_rate_per_kwh: f64,
    pub grid_export_enabled: bool,

    pub generator_fuel_cost_per_liter: f64,
    pub generator_fuel_consumption_l_per_kwh: f64,
    pub generator_min_runtime_minutes: u32,
    pub generator_max_power_kw: f64,

    pub optimization_mode: OptimizationMode,
    pub safety_margin_critical_loads: f64,
}

impl SystemConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.battery_capacity_kwh <= 0.0 {
            return Err("battery_capacity_kwh must be positive".into());
        }
        if self.battery_max_charge_kw <= 0.0 || self.battery_max_discharge_kw <= 0.0 {
            return Err("battery max charge/discharge power must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.battery_min_soc) || !(0.0..=1.0).contains(&self.battery_max_soc) {
            return Err("battery_min_soc/battery_max_soc must be in [0, 1]".into());
        }
        if self.battery_max_soc <= self.battery_min_soc {
            return Err("battery_max_soc must exceed battery_min_soc".into());
        }
        if !(0.0..=1.0).contains(&self.battery_efficiency) || self.battery_efficiency <= 0.0 {
            return Err("battery_efficiency must be in (0, 1]".into());
        }
        if self.generator_fuel_consumption_l_per_kwh <= 0.0 {
            return Err("generator_fuel_consumption_l_per_kwh must be positive".into());
        }
        if self.generator_max_power_kw <= 0.0 {
            return Err("generator_max_power_kw must be positive".into());
        }
        if !(0.0..1.0).contains(&self.safety_margin_critical_loads) {
            return Err("safety_margin_critical_loads must be in [0, 1)".into());
        }
        Ok(())
    }

    /// Safety-margin-adjusted floor below which the battery will not be
    /// discharged for essential load (§4.5.2 step 2).
    pub fn critical_load_floor_soc(&self) -> f64 {
        self.battery_min_soc
            + self.safety_margin_critical_loads * (self.battery_max_soc - self.battery_min_soc)
    }

    pub fn midpoint_soc(&self) -> f64 {
        (self.battery_min_soc + self.battery_max_soc) / 2.0
    }
}

/// Everything `Repository::load_config` returns for a microgrid: the tunable
/// §3 SystemConfiguration plus the two site constants (§4.2/§4.3 `capacity_kw`,
/// §4.1 `Location`) the engine's surrounding modules need but which are not
/// themselves part of SystemConfiguration's invariant set.
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicrogridProfile {
    pub config: SystemConfiguration,
    pub location: Location,
    pub solar_capacity_kw: f64,
}
