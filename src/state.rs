//! Cumulative device state cache.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The merged latest-value state of the device.
///
/// Three disjoint label-keyed maps, one per schema section. `BTreeMap` keeps
/// labels in ascending order so serialization is deterministic. Keys appear
/// only after their first successful read; a failed read leaves the previous
/// value untouched (stale but present, never reverted to absent).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Coil status bits, label → 0/1.
    pub coils: BTreeMap<String, u8>,

    /// Scaled input register values.
    pub input_registers: BTreeMap<String, f64>,

    /// Values recovered from FC06 echo reads.
    pub write_registers: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_sorts_labels() {
        let mut snapshot = DeviceSnapshot::default();
        snapshot.coils.insert("Sum alarm failure".to_string(), 0);
        snapshot.coils.insert("Heating element".to_string(), 1);
        snapshot
            .input_registers
            .insert("Outdoor".to_string(), -3.5);
        snapshot
            .input_registers
            .insert("Evaporator".to_string(), 21.5);
        snapshot.write_registers.insert("vv_mode".to_string(), 1.0);
        snapshot
            .write_registers
            .insert("curve_temp".to_string(), 30.5);

        let json = serde_json::to_string(&snapshot).unwrap();

        // Label order is a pure function of label string ordering.
        let heating = json.find("Heating element").unwrap();
        let alarm = json.find("Sum alarm failure").unwrap();
        assert!(heating < alarm);
        let evaporator = json.find("Evaporator").unwrap();
        let outdoor = json.find("Outdoor").unwrap();
        assert!(evaporator < outdoor);
        let curve = json.find("curve_temp").unwrap();
        let vv = json.find("vv_mode").unwrap();
        assert!(curve < vv);
    }

    #[test]
    fn test_round_trip() {
        let mut snapshot = DeviceSnapshot::default();
        snapshot.coils.insert("Heating element".to_string(), 1);
        snapshot
            .input_registers
            .insert("Evaporator".to_string(), 21.5);
        snapshot
            .write_registers
            .insert("comp_hours".to_string(), 42.0);

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: DeviceSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_payload_has_exactly_three_keys() {
        let snapshot = DeviceSnapshot::default();
        let value = serde_json::to_value(&snapshot).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert!(object.contains_key("coils"));
        assert!(object.contains_key("input_registers"));
        assert!(object.contains_key("write_registers"));
    }
}
