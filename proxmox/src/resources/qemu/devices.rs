//! Reconciliation between configured device blocks and devices reported
//! by Proxmox
//!
//! Proxmox omits device options that equal their default, and reports
//! flags as `0`/`1`. The configured block is the source of truth for which
//! devices exist and which keys are tracked; reported values are overlaid
//! onto it after filling gaps from the configuration.

use crate::api::nodes::qemu_config::parse_bool;
use crate::api::nodes::{DeviceValue, QemuDevice, QemuDevices};
use std::collections::HashMap;
use tfplug::schema::{AttributeType, Block};
use tfplug::types::Dynamic;

/// Converts configured device blocks into a map keyed by the `id` attribute
///
/// Elements without a numeric id are skipped. Null and unknown attributes
/// are not carried over.
pub fn devices_set_to_map(set: &[Dynamic]) -> QemuDevices {
    set.iter()
        .filter_map(|element| {
            let map = element.as_map()?;
            let id = map.get("id")?.as_number()?.trunc() as i64;
            Some((id, dynamic_map_to_device(map)))
        })
        .collect()
}

pub fn dynamic_map_to_device(map: &HashMap<String, Dynamic>) -> QemuDevice {
    map.iter()
        .filter_map(|(key, value)| Some((key.clone(), dynamic_to_device_value(value)?)))
        .collect()
}

fn dynamic_to_device_value(value: &Dynamic) -> Option<DeviceValue> {
    match value {
        Dynamic::String(s) => Some(DeviceValue::Str(s.clone())),
        Dynamic::Number(n) => Some(DeviceValue::Int(n.trunc() as i64)),
        Dynamic::Bool(b) => Some(DeviceValue::Bool(*b)),
        _ => None,
    }
}

/// Fills gaps in the reported devices from the configured ones
///
/// A configured device missing from `active` is copied in whole; for a
/// present device each configured key it lacks is added. Reported values
/// always win.
pub fn update_devices_defaults(mut active: QemuDevices, config: &QemuDevices) -> QemuDevices {
    for (id, configured) in config {
        let device = active.entry(*id).or_insert_with(|| configured.clone());
        for (key, value) in configured {
            device.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    active
}

/// Rebuilds the configured device set with reported values overlaid
///
/// Only configured devices appear in the result, and only keys that
/// `block` declares are overlaid.
pub fn update_devices_set(config_set: &[Dynamic], active: &QemuDevices, block: &Block) -> Vec<Dynamic> {
    let active = update_devices_defaults(active.clone(), &devices_set_to_map(config_set));

    config_set
        .iter()
        .map(|element| {
            let Some(map) = element.as_map() else {
                return element.clone();
            };
            let device = map
                .get("id")
                .and_then(Dynamic::as_number)
                .and_then(|id| active.get(&(id.trunc() as i64)));
            match device {
                Some(device) => Dynamic::Map(overlay_device(map, device, block)),
                None => element.clone(),
            }
        })
        .collect()
}

/// Backfills the single vga element from the reported display settings
pub fn update_vga_set(config_set: &[Dynamic], active: &QemuDevice, block: &Block) -> Vec<Dynamic> {
    let Some(map) = config_set.first().and_then(Dynamic::as_map) else {
        return Vec::new();
    };

    let mut device = active.clone();
    for (key, value) in dynamic_map_to_device(map) {
        device.entry(key).or_insert(value);
    }
    vec![Dynamic::Map(overlay_device(map, &device, block))]
}

fn overlay_device(
    config: &HashMap<String, Dynamic>,
    device: &QemuDevice,
    block: &Block,
) -> HashMap<String, Dynamic> {
    let mut merged = config.clone();
    for (key, value) in device {
        let Some(attr) = block.attribute(key) else {
            continue;
        };
        if let Some(v) = overlay_value(config.get(key), value, &attr.r#type) {
            merged.insert(key.clone(), v);
        }
    }
    merged
}

/// Value written for one key. `None` keeps the configured value.
fn overlay_value(
    configured: Option<&Dynamic>,
    active: &DeviceValue,
    attr_type: &AttributeType,
) -> Option<Dynamic> {
    match (configured, active) {
        (Some(Dynamic::Bool(_)), DeviceValue::Bool(b)) => Some(Dynamic::Bool(*b)),
        (Some(Dynamic::Bool(_)), DeviceValue::Int(i)) => parse_bool(&i.to_string()).map(Dynamic::Bool),
        (Some(Dynamic::Bool(_)), DeviceValue::Str(s)) => parse_bool(s).map(Dynamic::Bool),
        (_, value) => device_value_to_dynamic(value, attr_type),
    }
}

/// Converts a reported value to the attribute's schema type
pub fn device_value_to_dynamic(value: &DeviceValue, attr_type: &AttributeType) -> Option<Dynamic> {
    match (attr_type, value) {
        (AttributeType::Number, DeviceValue::Int(i)) => Some(Dynamic::Number(*i as f64)),
        (AttributeType::Number, DeviceValue::Str(s)) => s.parse().ok().map(Dynamic::Number),
        (AttributeType::Bool, DeviceValue::Bool(b)) => Some(Dynamic::Bool(*b)),
        (AttributeType::Bool, DeviceValue::Int(i)) => {
            parse_bool(&i.to_string()).map(Dynamic::Bool)
        }
        (AttributeType::Bool, DeviceValue::Str(s)) => parse_bool(s).map(Dynamic::Bool),
        (AttributeType::String, DeviceValue::Str(s)) => Some(Dynamic::String(s.clone())),
        (AttributeType::String, other) => Some(Dynamic::String(other.to_string())),
        _ => None,
    }
}
