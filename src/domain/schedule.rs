use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Nominal power source attributed to a device in a bucket (§4.5.4).
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSource {
    Solar,
    Battery,
    Grid,
    Generator,
}

/// A device's activation snapshot inside one bucket. Stored by value (not by
/// reference to the live Device record) so a Schedule is self-contained and
/// replayable even if the device fleet later changes (§9 anti-cycle note).
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAllocation {
    pub id: Uuid,
    pub name: String,
    pub power_kw: f64,
    pub power_source: PowerSource,
}

/// One hour of the dispatch schedule (§3 Bucket, §4.5).
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub index: u32,
    pub start_time: DateTime<Utc>,
    pub duration_hours: f64,
    pub solar_kw: f64,
    pub load_kw: f64,
    pub battery_charge_kw: f64,
    pub battery_discharge_kw: f64,
    pub grid_import_kw: f64,
    pub grid_export_kw: f64,
    pub generator_kw: f64,
    pub soc_end: f64,
    pub devices: Vec<DeviceAllocation>,
    /// Set by §4.5.6 when essential load could not be served even with
    /// grid and generator fallback.
    pub essential_unserved: bool,
    /// Irrigation-pump devices deferred out of this bucket by §4.5.2 step 5,
    /// retried in the next bucket. Feeds the `irrigation_deferred` alert.
    #[serde(default)]
    pub irrigation_deferred: Vec<Uuid>,
}

impl Bucket {
    /// Signed imbalance per §4.5.1: positive means sources exceed sinks.
    pub fn power_balance_error(&self) -> f64 {
        (self.solar_kw + self.battery_discharge_kw + self.grid_import_kw + self.generator_kw)
            - (self.load_kw + self.battery_charge_kw + self.grid_export_kw)
    }

    pub fn power_balance_holds(&self, tolerance_kw: f64) -> bool {
        self.power_balance_error().abs() <= tolerance_kw
    }

    /// §3 invariant: charge/discharge and import/export are mutually exclusive.
    pub fn exclusivity_holds(&self) -> bool {
        !(self.battery_charge_kw > 0.0 && self.battery_discharge_kw > 0.0)
            && !(self.grid_import_kw > 0.0 && self.grid_export_kw > 0.0)
    }
}

#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacityFactor {
    pub peak_percent: f64,
    pub average_percent: f64,
}

/// §4.6 Metrics & Audit output.
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleMetrics {
    pub solar_utilization_percent: f64,
    pub estimated_cost_savings: f64,
    pub battery_cycle_efficiency: f64,
    pub grid_import_reduction_percent: f64,
    pub grid_export_energy_kwh: f64,
    pub grid_export_revenue: f64,
    pub carbon_footprint_reduction_kg: f64,
    pub capacity_factor: CapacityFactor,
}

/// A completed dispatch plan (§3 Schedule).
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub microgrid_id: Uuid,
    pub date: NaiveDate,
    pub buckets: Vec<Bucket>,
    pub metrics: ScheduleMetrics,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    pub fn power_balance_holds(&self, tolerance_kw: f64) -> bool {
        self.buckets.iter().all(|b| b.power_balance_holds(tolerance_kw))
    }

    pub fn has_essential_unserved(&self) -> bool {
        self.buckets.iter().any(|b| b.essential_unserved)
    }
}

/// §4.7 alert kinds.
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    PowerDropImminent,
    ForecastImplausible,
    SocCritical,
    EssentialUnserved,
    IrrigationDeferred,
    BatteryCycleAnomaly,
}

#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

/// §3 Alert / §4.7.
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub microgrid_id: Uuid,
    pub severity: AlertSeverity,
    pub kind: AlertKind,
    pub message: String,
    /// Bucket this alert concerns, used as part of the idempotence key
    /// alongside (microgrid_id, kind) — a re-run must not duplicate alerts.
    pub bucket_start: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn idempotence_key(&self) -> (Uuid, AlertKind, Option<DateTime<Utc>>) {
        (self.microgrid_id, self.kind, self.bucket_start)
    }
}
