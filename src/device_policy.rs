//! Device Policy (§4.4): stateless orderings and predicates over the device
//! fleet. Produces no allocations itself — the Dispatch Engine consumes
//! these to decide who gets scheduled and when.

use ordered_float::OrderedFloat;

use crate::domain::device::Device;

/// Sort order for scheduling: priority ascending, then type weight
/// (essential before flexible before optional), then power ascending as a
/// tiebreaker so small essential loads commit before large flexible ones.
pub fn sort_for_scheduling(devices: &mut [Device]) {
    devices.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.device_type.weight().cmp(&b.device_type.weight()))
            .then_with(|| OrderedFloat(a.power_kw).cmp(&OrderedFloat(b.power_kw)))
    });
}

/// Whether `device` may run in the bucket starting at civil hour `h` (0..23).
pub fn eligible(device: &Device, h: u32) -> bool {
    device.is_active && device.preferred_hours.map_or(true, |window| window.contains(h))
}

/// §9 open question: a device whose minimum runtime cannot fit inside the
/// requested horizon is ineligible for the whole run, not just individual
/// buckets.
pub fn eligible_for_horizon(device: &Device, horizon_hours: u32) -> bool {
    device.min_runtime_buckets() <= horizon_hours
}

/// The irrigation-pump flag is authoritative; device type/name are not
/// consulted (§4.4).
pub fn is_irrigation_pump(device: &Device) -> bool {
    device.irrigation_flag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::{DeviceType, PreferredHours};
    use uuid::Uuid;

    fn device(name: &str, device_type: DeviceType, priority: u8, power_kw: f64) -> Device {
        Device {
            id: Uuid::new_v4(),
            name: name.to_string(),
            power_kw,
            device_type,
            min_runtime_minutes: 60,
            priority,
            preferred_hours: None,
            is_active: true,
            irrigation_flag: false,
        }
    }

    #[test]
    fn sort_orders_by_priority_then_type_then_power() {
        let mut devices = vec![
            device("optional-big", DeviceType::Optional, 5, 10.0),
            device("essential-small", DeviceType::Essential, 1, 1.0),
            device("essential-big", DeviceType::Essential, 1, 5.0),
            device("flexible", DeviceType::Flexible, 3, 2.0),
        ];
        sort_for_scheduling(&mut devices);
        let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["essential-small", "essential-big", "flexible", "optional-big"]);
    }

    #[test]
    fn eligible_respects_active_flag_and_preferred_hours() {
        let mut d = device("pump", DeviceType::Flexible, 3, 3.0);
        assert!(eligible(&d, 5));
        d.preferred_hours = Some(PreferredHours::new(10, 14));
        assert!(eligible(&d, 11));
        assert!(!eligible(&d, 20));
        d.is_active = false;
        assert!(!eligible(&d, 11));
    }

    #[test]
    fn horizon_eligibility_excludes_devices_that_cannot_fit() {
        let mut d = device("long-runner", DeviceType::Flexible, 3, 3.0);
        d.min_runtime_minutes = 600; // 10 buckets
        assert!(!eligible_for_horizon(&d, 6));
        assert!(eligible_for_horizon(&d, 12));
    }

    #[test]
    fn irrigation_flag_is_authoritative() {
        let mut d = device("pump", DeviceType::Flexible, 3, 3.0);
        d.name = "not-named-pump-at-all".to_string();
        d.irrigation_flag = true;
        assert!(is_irrigation_pump(&d));
    }
}
