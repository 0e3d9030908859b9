use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

/// Fixed UTC+05:30 offset for India Standard Time. India does not observe
/// daylight saving, so this is a compile-time constant rather than a
/// timezone-database lookup.
pub const IST_OFFSET_SECONDS: i32 = 5 * 3600 + 30 * 60;

pub fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECONDS).expect("IST offset is a valid fixed offset")
}

/// A microgrid's fixed geographic position. Timezone is always Asia/Kolkata;
/// this is not a field because the spec forbids per-location timezone drift
/// (§9 "ambient timezone handling" redesign note).
#[cfg_attr(feature = "swagger", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

impl Location {
    pub fn new(latitude_deg: f64, longitude_deg: f64) -> Result<Self, String> {
        if !(-90.0..=90.0).contains(&latitude_deg) {
            return Err(format!("latitude {latitude_deg} out of range [-90, 90]"));
        }
        if !(-180.0..=180.0).contains(&longitude_deg) {
            return Err(format!("longitude {longitude_deg} out of range [-180, 180]"));
        }
        Ok(Self {
            latitude_deg,
            longitude_deg,
        })
    }
}
