use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Device scheduling class (§3, §4.4, GLOSSARY). Essential devices must
/// always run when eligible; flexible devices may be deferred within their
/// minimum-runtime constraint; optional devices may be skipped entirely.
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Essential,
    Flexible,
    Optional,
}

impl DeviceType {
    /// Ordering weight used by the device-policy sort (§4.4): essential
    /// first, then flexible, then optional.
    pub fn weight(&self) -> u8 {
        match self {
            DeviceType::Essential => 0,
            DeviceType::Flexible => 1,
            DeviceType::Optional => 2,
        }
    }
}

/// An hour-of-day window, inclusive of `start`, exclusive of `end`, with
/// wrap-around support (`start=22, end=6` covers 22,23,0,1,2,3,4,5).
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredHours {
    pub start: u8,
    pub end: u8,
}

impl PreferredHours {
    pub fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Whether hour `h` (0..23) falls inside this window.
    pub fn contains(&self, h: u32) -> bool {
        let h = h as u8;
        if self.start <= self.end {
            h >= self.start && h < self.end
        } else {
            h >= self.start || h < self.end
        }
    }
}

/// A schedulable load (§3 Device).
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub name: String,
    pub power_kw: f64,
    pub device_type: DeviceType,
    pub min_runtime_minutes: u32,
    /// 1 = highest priority, 5 = lowest.
    pub priority: u8,
    pub preferred_hours: Option<PreferredHours>,
    pub is_active: bool,
    pub irrigation_flag: bool,
}

impl Device {
    /// `min_runtime_buckets = ceil(min_runtime_minutes / 60)` (§4.4).
    pub fn min_runtime_buckets(&self) -> u32 {
        (self.min_runtime_minutes + 59) / 60
    }

    /// §3 invariant: priority must be consistent with device type
    /// (essential -> 1..2, optional -> 4..5). Flexible devices may take any
    /// priority in 1..5.
    pub fn validate(&self) -> Result<(), String> {
        if self.power_kw <= 0.0 {
            return Err(format!("device {} power_kw must be positive", self.id));
        }
        if !(1..=5).contains(&self.priority) {
            return Err(format!("device {} priority must be in 1..5", self.id));
        }
        match self.device_type {
            DeviceType::Essential if !(1..=2).contains(&self.priority) => Err(format!(
                "essential device {} must have priority 1 or 2, got {}",
                self.id, self.priority
            )),
            DeviceType::Optional if !(4..=5).contains(&self.priority) => Err(format!(
                "optional device {} must have priority 4 or 5, got {}",
                self.id, self.priority
            )),
            _ => Ok(()),
        }
    }
}
