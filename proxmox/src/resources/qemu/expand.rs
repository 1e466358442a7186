//! Terraform configuration to [`ConfigQemu`]

use super::devices::{devices_set_to_map, dynamic_map_to_device};
use crate::api::nodes::{ConfigQemu, DiskSlot, QemuDevice};
use tfplug::types::{AttributePath, Dynamic, DynamicValue};

fn string(config: &DynamicValue, name: &str) -> String {
    config
        .get_optional_string(&AttributePath::new(name))
        .unwrap_or_default()
}

fn string_or(config: &DynamicValue, name: &str, fallback: &str) -> String {
    config
        .get_optional_string(&AttributePath::new(name))
        .unwrap_or_else(|| fallback.to_string())
}

fn int_or(config: &DynamicValue, name: &str, fallback: i64) -> i64 {
    config
        .get(&AttributePath::new(name))
        .and_then(Dynamic::as_number)
        .map(|n| n.trunc() as i64)
        .unwrap_or(fallback)
}

fn bool_or(config: &DynamicValue, name: &str, fallback: bool) -> bool {
    config
        .get(&AttributePath::new(name))
        .and_then(Dynamic::as_bool)
        .unwrap_or(fallback)
}

fn set(config: &DynamicValue, name: &str) -> Vec<Dynamic> {
    config
        .get(&AttributePath::new(name))
        .and_then(Dynamic::as_list)
        .cloned()
        .unwrap_or_default()
}

/// Builds the API view of a planned or configured resource
///
/// Absent attributes fall back to the schema defaults.
pub fn expand_vm_qemu(config: &DynamicValue) -> ConfigQemu {
    let vga = set(config, "vga")
        .first()
        .and_then(Dynamic::as_map)
        .map(dynamic_map_to_device)
        .unwrap_or_else(QemuDevice::new);

    ConfigQemu {
        name: string(config, "name"),
        description: string(config, "desc"),
        pool: string(config, "pool"),
        bios: string_or(config, "bios", "seabios"),
        onboot: bool_or(config, "onboot", true),
        boot: string_or(config, "boot", "cdn"),
        bootdisk: string(config, "bootdisk"),
        agent: int_or(config, "agent", 0),
        memory: int_or(config, "memory", 512),
        balloon: int_or(config, "balloon", 0),
        cores: int_or(config, "cores", 1),
        sockets: int_or(config, "sockets", 1),
        vcpus: int_or(config, "vcpus", 0),
        cpu: string_or(config, "cpu", "host"),
        numa: bool_or(config, "numa", false),
        hotplug: string_or(config, "hotplug", "network,disk,usb"),
        scsihw: string(config, "scsihw"),
        hastate: string(config, "hastate"),
        qemu_os: string_or(config, "qemu_os", "l26"),
        iso: string(config, "iso"),
        ciuser: string(config, "ciuser"),
        cipassword: string(config, "cipassword"),
        cicustom: string(config, "cicustom"),
        searchdomain: string(config, "searchdomain"),
        nameserver: string(config, "nameserver"),
        sshkeys: string(config, "sshkeys"),
        ipconfig0: string(config, "ipconfig0"),
        ipconfig1: string(config, "ipconfig1"),
        ipconfig2: string(config, "ipconfig2"),
        disks: DiskSlot::key_devices(devices_set_to_map(&set(config, "disk"))),
        networks: devices_set_to_map(&set(config, "network")),
        serials: devices_set_to_map(&set(config, "serial")),
        vga,
    }
}

/// Settings that steer creation but are not part of the VM configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOptions {
    pub target_node: String,
    pub clone: String,
    pub full_clone: bool,
    pub force_create: bool,
    pub clone_wait: u64,
}

impl CreateOptions {
    pub fn from_config(config: &DynamicValue) -> Self {
        Self {
            target_node: string(config, "target_node"),
            clone: string(config, "clone"),
            full_clone: bool_or(config, "full_clone", true),
            force_create: bool_or(config, "force_create", false),
            clone_wait: int_or(config, "clone_wait", 15).max(0) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::nodes::DeviceValue;
    use std::collections::HashMap;

    fn object(pairs: Vec<(&str, Dynamic)>) -> Dynamic {
        Dynamic::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<HashMap<_, _>>(),
        )
    }

    #[test]
    fn expands_scalars_and_devices() {
        let config = DynamicValue::new(object(vec![
            ("name", Dynamic::String("web-1".to_string())),
            ("target_node", Dynamic::String("pve".to_string())),
            ("desc", Dynamic::String("frontend".to_string())),
            ("memory", Dynamic::Number(2048.0)),
            ("cores", Dynamic::Number(2.0)),
            ("onboot", Dynamic::Bool(false)),
            ("clone", Dynamic::String("ubuntu-template".to_string())),
            ("full_clone", Dynamic::Bool(false)),
            (
                "disk",
                Dynamic::List(vec![object(vec![
                    ("id", Dynamic::Number(0.0)),
                    ("type", Dynamic::String("scsi".to_string())),
                    ("storage", Dynamic::String("local-lvm".to_string())),
                    ("size", Dynamic::String("32G".to_string())),
                    ("backup", Dynamic::Bool(true)),
                ])]),
            ),
            (
                "vga",
                Dynamic::List(vec![object(vec![
                    ("type", Dynamic::String("qxl".to_string())),
                    ("memory", Dynamic::Null),
                ])]),
            ),
        ]));

        let qemu = expand_vm_qemu(&config);

        assert_eq!(qemu.name, "web-1");
        assert_eq!(qemu.description, "frontend");
        assert_eq!(qemu.memory, 2048);
        assert_eq!(qemu.cores, 2);
        assert!(!qemu.onboot);
        assert_eq!(qemu.bios, "seabios");
        assert_eq!(qemu.qemu_os, "l26");
        let disk = &qemu.disks[&DiskSlot::new("scsi", 0)];
        assert_eq!(disk["size"], DeviceValue::Str("32G".to_string()));
        assert_eq!(disk["backup"], DeviceValue::Bool(true));
        assert!(qemu.networks.is_empty());
        assert_eq!(qemu.vga["type"], DeviceValue::Str("qxl".to_string()));
        assert!(!qemu.vga.contains_key("memory"));

        let options = CreateOptions::from_config(&config);
        assert_eq!(options.target_node, "pve");
        assert_eq!(options.clone, "ubuntu-template");
        assert!(!options.full_clone);
        assert!(!options.force_create);
        assert_eq!(options.clone_wait, 15);
    }
}
