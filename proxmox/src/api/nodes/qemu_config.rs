//! Typed view of a VM configuration
//!
//! Proxmox reports devices as comma separated option strings keyed by slot
//! (`scsi0`, `net1`, `serial0`). [`ConfigQemu`] splits them into per-slot
//! attribute maps and renders them back into request parameters.

use super::qemu::RawQemuConfig;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Single attribute of a device option string
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl DeviceValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DeviceValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            DeviceValue::Int(i) => Some(*i),
            DeviceValue::Str(s) => s.trim().parse().ok(),
            DeviceValue::Bool(b) => Some(i64::from(*b)),
        }
    }

    /// Proxmox flags arrive as `0`/`1`
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            DeviceValue::Bool(b) => Some(*b),
            DeviceValue::Int(0) => Some(false),
            DeviceValue::Int(1) => Some(true),
            DeviceValue::Int(_) => None,
            DeviceValue::Str(s) => parse_bool(s),
        }
    }

    /// Types an option value: integers become `Int`, the rest stays a string
    fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(i) if !raw.starts_with('+') => DeviceValue::Int(i),
            _ => DeviceValue::Str(raw.to_string()),
        }
    }
}

impl std::fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceValue::Str(s) => f.write_str(s),
            DeviceValue::Int(i) => write!(f, "{}", i),
            DeviceValue::Bool(b) => write!(f, "{}", u8::from(*b)),
        }
    }
}

/// Boolean parsing that accepts `1`, `t`, `T`, `TRUE`, `true`, `True` and
/// their false counterparts
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

pub type QemuDevice = BTreeMap<String, DeviceValue>;

/// Devices of one kind keyed by slot id
pub type QemuDevices = BTreeMap<i64, QemuDevice>;

/// Bus and index of a disk, e.g. `scsi0`
///
/// The same index can be in use on several buses at once, so disks are
/// never identified by index alone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiskSlot {
    pub kind: String,
    pub id: i64,
}

impl DiskSlot {
    pub fn new(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }

    /// Keys configured disks by bus and index; disks without a `type` are
    /// dropped
    pub fn key_devices(devices: QemuDevices) -> QemuDisks {
        devices
            .into_iter()
            .filter_map(|(id, disk)| {
                let kind = disk.get("type").and_then(DeviceValue::as_str)?.to_string();
                Some((DiskSlot::new(kind, id), disk))
            })
            .collect()
    }
}

impl std::fmt::Display for DiskSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind, self.id)
    }
}

pub type QemuDisks = BTreeMap<DiskSlot, QemuDevice>;

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigQemu {
    pub name: String,
    pub description: String,
    pub pool: String,
    pub bios: String,
    pub onboot: bool,
    pub boot: String,
    pub bootdisk: String,
    pub agent: i64,
    pub memory: i64,
    pub balloon: i64,
    pub cores: i64,
    pub sockets: i64,
    pub vcpus: i64,
    pub cpu: String,
    pub numa: bool,
    pub hotplug: String,
    pub scsihw: String,
    pub hastate: String,
    pub qemu_os: String,
    pub iso: String,
    pub ciuser: String,
    pub cipassword: String,
    pub cicustom: String,
    pub searchdomain: String,
    pub nameserver: String,
    pub sshkeys: String,
    pub ipconfig0: String,
    pub ipconfig1: String,
    pub ipconfig2: String,
    pub disks: QemuDisks,
    pub networks: QemuDevices,
    pub serials: QemuDevices,
    pub vga: QemuDevice,
}

impl Default for ConfigQemu {
    /// Values Proxmox assumes when a key is absent from the config
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            pool: String::new(),
            bios: "seabios".to_string(),
            onboot: true,
            boot: "cdn".to_string(),
            bootdisk: String::new(),
            agent: 0,
            memory: 512,
            balloon: 0,
            cores: 1,
            sockets: 1,
            vcpus: 0,
            cpu: "host".to_string(),
            numa: false,
            hotplug: "network,disk,usb".to_string(),
            scsihw: String::new(),
            hastate: String::new(),
            qemu_os: "other".to_string(),
            iso: String::new(),
            ciuser: String::new(),
            cipassword: String::new(),
            cicustom: String::new(),
            searchdomain: String::new(),
            nameserver: String::new(),
            sshkeys: String::new(),
            ipconfig0: String::new(),
            ipconfig1: String::new(),
            ipconfig2: String::new(),
            disks: QemuDisks::new(),
            networks: QemuDevices::new(),
            serials: QemuDevices::new(),
            vga: QemuDevice::new(),
        }
    }
}

fn disk_key_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(ide|sata|scsi|virtio)(\d+)$").ok())
        .as_ref()
}

fn size_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"([0-9]+)([A-Z]*)").ok())
        .as_ref()
}

fn raw_string(raw: &RawQemuConfig, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(u8::from(*b).to_string()),
        _ => None,
    }
}

fn raw_int(raw: &RawQemuConfig, key: &str) -> Option<i64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn raw_bool(raw: &RawQemuConfig, key: &str) -> Option<bool> {
    match raw.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => parse_bool(s.trim()),
        _ => None,
    }
}

/// Splits `a,b=c,d=1` into the leading positional value (if any) and the
/// typed `key=value` pairs.
fn split_options(raw: &str) -> (Option<&str>, QemuDevice) {
    let mut head = None;
    let mut options = QemuDevice::new();
    for (idx, part) in raw.split(',').filter(|p| !p.is_empty()).enumerate() {
        match part.split_once('=') {
            Some((k, v)) => {
                options.insert(k.to_string(), DeviceValue::parse(v));
            }
            None if idx == 0 => head = Some(part),
            None => {}
        }
    }
    (head, options)
}

impl ConfigQemu {
    /// Decodes the raw `/config` response
    pub fn from_api(raw: &RawQemuConfig) -> Self {
        let defaults = Self::default();
        let string_or = |key: &str, fallback: &str| {
            raw_string(raw, key).unwrap_or_else(|| fallback.to_string())
        };

        let mut config = Self {
            name: string_or("name", ""),
            description: string_or("description", ""),
            bios: string_or("bios", &defaults.bios),
            onboot: raw_bool(raw, "onboot").unwrap_or(defaults.onboot),
            boot: string_or("boot", &defaults.boot),
            bootdisk: string_or("bootdisk", ""),
            agent: raw_string(raw, "agent")
                .map(|a| parse_agent(&a))
                .unwrap_or(defaults.agent),
            memory: raw_int(raw, "memory").unwrap_or(defaults.memory),
            balloon: raw_int(raw, "balloon").unwrap_or(defaults.balloon),
            cores: raw_int(raw, "cores").unwrap_or(defaults.cores),
            sockets: raw_int(raw, "sockets").unwrap_or(defaults.sockets),
            vcpus: raw_int(raw, "vcpus").unwrap_or(defaults.vcpus),
            cpu: string_or("cpu", &defaults.cpu),
            numa: raw_bool(raw, "numa").unwrap_or(defaults.numa),
            hotplug: string_or("hotplug", &defaults.hotplug),
            scsihw: string_or("scsihw", ""),
            qemu_os: string_or("ostype", &defaults.qemu_os),
            ciuser: string_or("ciuser", ""),
            cipassword: string_or("cipassword", ""),
            cicustom: string_or("cicustom", ""),
            searchdomain: string_or("searchdomain", ""),
            nameserver: string_or("nameserver", ""),
            sshkeys: raw_string(raw, "sshkeys")
                .map(|k| {
                    urlencoding::decode(&k)
                        .map(|d| d.into_owned())
                        .unwrap_or(k)
                })
                .unwrap_or_default(),
            ipconfig0: string_or("ipconfig0", ""),
            ipconfig1: string_or("ipconfig1", ""),
            ipconfig2: string_or("ipconfig2", ""),
            ..defaults
        };

        for (key, value) in raw {
            let Value::String(value) = value else {
                continue;
            };

            if let Some(id) = key.strip_prefix("net").and_then(|n| n.parse::<i64>().ok()) {
                config.networks.insert(id, parse_network(id, value));
            } else if let Some(id) = key
                .strip_prefix("serial")
                .and_then(|n| n.parse::<i64>().ok())
            {
                config.serials.insert(
                    id,
                    QemuDevice::from([
                        ("id".to_string(), DeviceValue::Int(id)),
                        ("type".to_string(), DeviceValue::Str(value.clone())),
                    ]),
                );
            } else if key == "vga" {
                config.vga = parse_vga(value);
            } else if let Some(caps) = disk_key_pattern().and_then(|p| p.captures(key)) {
                let kind = &caps[1];
                let Ok(id) = caps[2].parse::<i64>() else {
                    continue;
                };
                let (volume, options) = split_options(value);
                if options.get("media").and_then(DeviceValue::as_str) == Some("cdrom") {
                    if let Some(iso) = volume.filter(|v| *v != "none") {
                        config.iso = iso.to_string();
                    }
                    continue;
                }
                config
                    .disks
                    .insert(DiskSlot::new(kind, id), parse_disk(id, kind, volume, options));
            }
        }

        config
    }

    /// Renders request parameters for create (`current` is `None`) or for
    /// an update of the VM whose present configuration is `current`.
    pub fn to_params(&self, current: Option<&ConfigQemu>) -> BTreeMap<String, Value> {
        let mut params = BTreeMap::new();
        let mut delete = Vec::new();

        params.insert("name".to_string(), Value::from(self.name.clone()));
        params.insert("bios".to_string(), Value::from(self.bios.clone()));
        params.insert("onboot".to_string(), Value::from(u8::from(self.onboot)));
        params.insert("boot".to_string(), Value::from(self.boot.clone()));
        params.insert("agent".to_string(), Value::from(format!("enabled={}", self.agent)));
        params.insert("memory".to_string(), Value::from(self.memory));
        params.insert("balloon".to_string(), Value::from(self.balloon));
        params.insert("cores".to_string(), Value::from(self.cores));
        params.insert("sockets".to_string(), Value::from(self.sockets));
        params.insert("cpu".to_string(), Value::from(self.cpu.clone()));
        params.insert("numa".to_string(), Value::from(u8::from(self.numa)));
        params.insert("hotplug".to_string(), Value::from(self.hotplug.clone()));
        if self.vcpus > 0 {
            params.insert("vcpus".to_string(), Value::from(self.vcpus));
        }

        let optional = [
            ("description", &self.description),
            ("bootdisk", &self.bootdisk),
            ("scsihw", &self.scsihw),
            ("ostype", &self.qemu_os),
        ];
        for (key, value) in optional {
            if !value.is_empty() {
                params.insert(key.to_string(), Value::from(value.clone()));
            }
        }

        let encoded_keys = urlencoding::encode(&self.sshkeys);
        let cloud_init: [(&str, &str, Option<&str>); 9] = [
            ("ciuser", &self.ciuser, current.map(|c| c.ciuser.as_str())),
            ("cipassword", &self.cipassword, current.map(|c| c.cipassword.as_str())),
            ("cicustom", &self.cicustom, current.map(|c| c.cicustom.as_str())),
            ("searchdomain", &self.searchdomain, current.map(|c| c.searchdomain.as_str())),
            ("nameserver", &self.nameserver, current.map(|c| c.nameserver.as_str())),
            ("sshkeys", &encoded_keys, current.map(|c| c.sshkeys.as_str())),
            ("ipconfig0", &self.ipconfig0, current.map(|c| c.ipconfig0.as_str())),
            ("ipconfig1", &self.ipconfig1, current.map(|c| c.ipconfig1.as_str())),
            ("ipconfig2", &self.ipconfig2, current.map(|c| c.ipconfig2.as_str())),
        ];
        for (key, value, previous) in cloud_init {
            if !value.is_empty() {
                params.insert(key.to_string(), Value::from(value));
            } else if previous.is_some_and(|p| !p.is_empty()) {
                delete.push(key.to_string());
            }
        }

        if current.is_none() && !self.iso.is_empty() {
            params.insert(
                "ide2".to_string(),
                Value::from(format!("{},media=cdrom", self.iso)),
            );
        }

        for (slot, disk) in &self.disks {
            let existing = current.and_then(|c| c.disks.get(slot));
            params.insert(slot.to_string(), Value::from(format_disk(disk, existing)));
        }

        for (id, net) in &self.networks {
            params.insert(format!("net{}", id), Value::from(format_network(net)));
        }

        for (id, serial) in &self.serials {
            if let Some(kind) = serial.get("type") {
                params.insert(format!("serial{}", id), Value::from(kind.to_string()));
            }
        }

        if let Some(vga) = format_vga(&self.vga) {
            params.insert("vga".to_string(), Value::from(vga));
        }

        if let Some(current) = current {
            for id in current.networks.keys() {
                if !self.networks.contains_key(id) {
                    delete.push(format!("net{}", id));
                }
            }
            for id in current.serials.keys() {
                if !self.serials.contains_key(id) {
                    delete.push(format!("serial{}", id));
                }
            }
        }

        if !delete.is_empty() {
            params.insert("delete".to_string(), Value::from(delete.join(",")));
        }

        params
    }

    /// Reported disks on the given slots, keyed by index for reconciliation
    /// against configured disk blocks
    pub fn disks_at<'s>(&self, slots: impl IntoIterator<Item = &'s DiskSlot>) -> QemuDevices {
        slots
            .into_iter()
            .filter_map(|slot| Some((slot.id, self.disks.get(slot)?.clone())))
            .collect()
    }
}

/// `enabled=1,fstrim_cloned_disks=1` or a bare `1`
fn parse_agent(raw: &str) -> i64 {
    let (head, options) = split_options(raw);
    options
        .get("enabled")
        .and_then(DeviceValue::as_int)
        .or_else(|| head.and_then(|h| h.parse().ok()))
        .unwrap_or(0)
}

fn parse_network(id: i64, raw: &str) -> QemuDevice {
    let mut device = QemuDevice::new();
    let mut parts = raw.split(',');
    if let Some(first) = parts.next() {
        match first.split_once('=') {
            Some((model, mac)) => {
                device.insert("model".to_string(), DeviceValue::Str(model.to_string()));
                device.insert("macaddr".to_string(), DeviceValue::Str(mac.to_string()));
            }
            None => {
                device.insert("model".to_string(), DeviceValue::Str(first.to_string()));
            }
        }
    }
    for part in parts {
        if let Some((k, v)) = part.split_once('=') {
            device.insert(k.to_string(), DeviceValue::parse(v));
        }
    }
    device.insert("id".to_string(), DeviceValue::Int(id));
    device
}

fn parse_disk(id: i64, kind: &str, volume: Option<&str>, mut options: QemuDevice) -> QemuDevice {
    options.insert("id".to_string(), DeviceValue::Int(id));
    options.insert("type".to_string(), DeviceValue::Str(kind.to_string()));
    if let Some((storage, file)) = volume.and_then(|v| v.split_once(':')) {
        options.insert("storage".to_string(), DeviceValue::Str(storage.to_string()));
        options.insert("volume".to_string(), DeviceValue::Str(file.to_string()));
        if let Some((_, ext)) = file.rsplit_once('.') {
            if matches!(ext, "raw" | "qcow2" | "vmdk") {
                options
                    .entry("format".to_string())
                    .or_insert_with(|| DeviceValue::Str(ext.to_string()));
            }
        }
    }
    options
}

fn parse_vga(raw: &str) -> QemuDevice {
    let (head, mut options) = split_options(raw);
    if let Some(kind) = head {
        options.insert("type".to_string(), DeviceValue::Str(kind.to_string()));
    }
    options
}

fn flag(device: &QemuDevice, key: &str) -> Option<bool> {
    device.get(key).and_then(DeviceValue::as_flag)
}

fn positive(device: &QemuDevice, key: &str) -> Option<i64> {
    device
        .get(key)
        .and_then(DeviceValue::as_int)
        .filter(|v| *v > 0)
}

fn format_disk(disk: &QemuDevice, existing: Option<&QemuDevice>) -> String {
    let storage = disk.get("storage").map(|s| s.to_string()).unwrap_or_default();
    let size = disk.get("size").map(|s| s.to_string()).unwrap_or_default();

    let volume = existing.and_then(|e| {
        let storage = e.get("storage")?;
        let file = e.get("volume")?;
        Some(format!("{}:{}", storage, file))
    });
    let mut out = match volume {
        Some(volume) => volume,
        None => {
            let gb = disk.get("size").map(disk_size_gb).unwrap_or(0.0).ceil().max(1.0);
            format!("{}:{}", storage, gb as i64)
        }
    };

    if !size.is_empty() {
        out.push_str(&format!(",size={}", size));
    }
    if let Some(cache) = disk.get("cache").and_then(DeviceValue::as_str) {
        if !cache.is_empty() {
            out.push_str(&format!(",cache={}", cache));
        }
    }
    let storage_type = disk
        .get("storage_type")
        .and_then(DeviceValue::as_str)
        .unwrap_or("dir");
    if storage_type == "dir" {
        if let Some(format) = disk.get("format").and_then(DeviceValue::as_str) {
            out.push_str(&format!(",format={}", format));
        }
    }
    if flag(disk, "backup") == Some(false) {
        out.push_str(",backup=0");
    }
    if flag(disk, "iothread") == Some(true) {
        out.push_str(",iothread=1");
    }
    if flag(disk, "replicate") == Some(false) {
        out.push_str(",replicate=0");
    }
    for key in ["mbps", "mbps_rd", "mbps_rd_max", "mbps_wr", "mbps_wr_max"] {
        if let Some(limit) = positive(disk, key) {
            out.push_str(&format!(",{}={}", key, limit));
        }
    }
    out
}

fn format_network(net: &QemuDevice) -> String {
    let model = net.get("model").map(|m| m.to_string()).unwrap_or_default();
    let mut out = match net.get("macaddr").and_then(DeviceValue::as_str) {
        Some(mac) if !mac.is_empty() => format!("{}={}", model, mac),
        _ => model,
    };
    if let Some(bridge) = net.get("bridge") {
        out.push_str(&format!(",bridge={}", bridge));
    }
    for key in ["tag", "rate", "queues"] {
        if let Some(value) = positive(net, key) {
            out.push_str(&format!(",{}={}", key, value));
        }
    }
    if flag(net, "firewall") == Some(true) {
        out.push_str(",firewall=1");
    }
    if flag(net, "link_down") == Some(true) {
        out.push_str(",link_down=1");
    }
    out
}

fn format_vga(vga: &QemuDevice) -> Option<String> {
    let kind = vga.get("type")?.to_string();
    Some(match positive(vga, "memory") {
        Some(memory) => format!("{},memory={}", kind, memory),
        None => kind,
    })
}

/// Disk size in GB from values such as `32G`, `512M`, `1T` or a plain number
///
/// Unknown units and unparsable strings yield 0.
pub fn disk_size_gb(size: &DeviceValue) -> f64 {
    let raw = match size {
        DeviceValue::Int(i) => return *i as f64,
        DeviceValue::Bool(_) => return 0.0,
        DeviceValue::Str(s) => s.to_uppercase(),
    };

    let Some(caps) = size_pattern().and_then(|p| p.captures(&raw)) else {
        return 0.0;
    };
    let Ok(number) = caps[1].parse::<f64>() else {
        return 0.0;
    };

    match &caps[2] {
        "T" | "TB" => number * 1000.0,
        "G" | "GB" | "" => number,
        "M" | "MB" => number / 1000.0,
        "K" | "KB" => number / 1_000_000.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawQemuConfig {
        serde_json::from_value(value).unwrap()
    }

    fn s(v: &str) -> DeviceValue {
        DeviceValue::Str(v.to_string())
    }

    #[test]
    fn disk_size_units() {
        assert_eq!(disk_size_gb(&s("32G")), 32.0);
        assert_eq!(disk_size_gb(&s("32gb")), 32.0);
        assert_eq!(disk_size_gb(&s("2T")), 2000.0);
        assert_eq!(disk_size_gb(&s("512M")), 0.512);
        assert_eq!(disk_size_gb(&s("1000000K")), 1.0);
        assert_eq!(disk_size_gb(&s("10")), 10.0);
        assert_eq!(disk_size_gb(&DeviceValue::Int(8)), 8.0);
        assert_eq!(disk_size_gb(&s("10P")), 0.0);
        assert_eq!(disk_size_gb(&s("big")), 0.0);
    }

    #[test]
    fn parse_bool_accepts_go_spellings() {
        for t in ["1", "t", "T", "TRUE", "true", "True"] {
            assert_eq!(parse_bool(t), Some(true), "{}", t);
        }
        for f in ["0", "f", "F", "FALSE", "false", "False"] {
            assert_eq!(parse_bool(f), Some(false), "{}", f);
        }
        assert_eq!(parse_bool("yes"), None);
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn from_api_applies_proxmox_defaults() {
        let config = ConfigQemu::from_api(&raw(json!({"name": "bare"})));

        assert_eq!(config.name, "bare");
        assert_eq!(config.bios, "seabios");
        assert!(config.onboot);
        assert_eq!(config.cpu, "host");
        assert_eq!(config.hotplug, "network,disk,usb");
        assert_eq!(config.boot, "cdn");
        assert_eq!(config.cores, 1);
        assert_eq!(config.sockets, 1);
        assert_eq!(config.memory, 512);
        assert!(config.disks.is_empty());
    }

    #[test]
    fn from_api_parses_scalars() {
        let config = ConfigQemu::from_api(&raw(json!({
            "name": "web-1",
            "memory": "2048",
            "cores": 4,
            "onboot": 0,
            "numa": 1,
            "agent": "enabled=1,fstrim_cloned_disks=1",
            "ostype": "l26",
            "sshkeys": "ssh-rsa%20AAAA%2B%2Fk%3D%20me%40host%0A",
            "ipconfig0": "ip=dhcp"
        })));

        assert_eq!(config.memory, 2048);
        assert_eq!(config.cores, 4);
        assert!(!config.onboot);
        assert!(config.numa);
        assert_eq!(config.agent, 1);
        assert_eq!(config.qemu_os, "l26");
        assert_eq!(config.sshkeys, "ssh-rsa AAAA+/k= me@host\n");
        assert_eq!(config.ipconfig0, "ip=dhcp");
    }

    #[test]
    fn from_api_parses_devices() {
        let config = ConfigQemu::from_api(&raw(json!({
            "scsi0": "local-lvm:vm-100-disk-0,cache=writeback,backup=0,size=32G",
            "virtio1": "local:100/vm-100-disk-1.qcow2,size=10G,iothread=1",
            "ide2": "local:iso/debian-12.iso,media=cdrom",
            "net0": "virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0,firewall=1,tag=20",
            "serial0": "socket",
            "vga": "qxl,memory=32"
        })));

        let disk = &config.disks[&DiskSlot::new("scsi", 0)];
        assert_eq!(disk["type"], s("scsi"));
        assert_eq!(disk["storage"], s("local-lvm"));
        assert_eq!(disk["volume"], s("vm-100-disk-0"));
        assert_eq!(disk["size"], s("32G"));
        assert_eq!(disk["backup"], DeviceValue::Int(0));
        assert_eq!(disk["cache"], s("writeback"));

        let disk = &config.disks[&DiskSlot::new("virtio", 1)];
        assert_eq!(disk["type"], s("virtio"));
        assert_eq!(disk["format"], s("qcow2"));
        assert_eq!(disk["iothread"], DeviceValue::Int(1));

        assert_eq!(config.disks.len(), 2);
        assert_eq!(config.iso, "local:iso/debian-12.iso");

        let net = &config.networks[&0];
        assert_eq!(net["id"], DeviceValue::Int(0));
        assert_eq!(net["model"], s("virtio"));
        assert_eq!(net["macaddr"], s("AA:BB:CC:DD:EE:FF"));
        assert_eq!(net["bridge"], s("vmbr0"));
        assert_eq!(net["firewall"], DeviceValue::Int(1));
        assert_eq!(net["tag"], DeviceValue::Int(20));

        assert_eq!(config.serials[&0]["type"], s("socket"));
        assert_eq!(config.vga["type"], s("qxl"));
        assert_eq!(config.vga["memory"], DeviceValue::Int(32));
    }

    #[test]
    fn from_api_keeps_disks_sharing_an_index_apart() {
        let config = ConfigQemu::from_api(&raw(json!({
            "ide0": "local-lvm:vm-100-disk-3,size=4G",
            "sata0": "local-lvm:vm-100-disk-2,size=6G",
            "scsi0": "local-lvm:vm-100-disk-0,size=8G",
            "virtio0": "local-lvm:vm-100-disk-1,size=10G"
        })));

        assert_eq!(config.disks.len(), 4);
        for (kind, volume) in [
            ("ide", "vm-100-disk-3"),
            ("sata", "vm-100-disk-2"),
            ("scsi", "vm-100-disk-0"),
            ("virtio", "vm-100-disk-1"),
        ] {
            let disk = &config.disks[&DiskSlot::new(kind, 0)];
            assert_eq!(disk["type"], s(kind));
            assert_eq!(disk["volume"], s(volume));
        }

        let slots = [DiskSlot::new("virtio", 0)];
        let active = config.disks_at(&slots);
        assert_eq!(active.len(), 1);
        assert_eq!(active[&0]["size"], s("10G"));
    }

    fn disk(id: i64, size: &str) -> QemuDevice {
        typed_disk("scsi", id, size)
    }

    fn disks(devices: impl IntoIterator<Item = QemuDevice>) -> QemuDisks {
        DiskSlot::key_devices(
            devices
                .into_iter()
                .map(|d| (d["id"].as_int().unwrap(), d))
                .collect(),
        )
    }

    fn typed_disk(kind: &str, id: i64, size: &str) -> QemuDevice {
        QemuDevice::from([
            ("id".to_string(), DeviceValue::Int(id)),
            ("type".to_string(), s(kind)),
            ("storage".to_string(), s("local-lvm")),
            ("storage_type".to_string(), s("lvm")),
            ("size".to_string(), s(size)),
            ("cache".to_string(), s("none")),
            ("format".to_string(), s("raw")),
            ("backup".to_string(), DeviceValue::Bool(false)),
            ("iothread".to_string(), DeviceValue::Bool(true)),
            ("replicate".to_string(), DeviceValue::Bool(true)),
            ("mbps".to_string(), DeviceValue::Int(0)),
            ("mbps_rd".to_string(), DeviceValue::Int(100)),
        ])
    }

    #[test]
    fn to_params_formats_new_disk() {
        let config = ConfigQemu {
            name: "web-1".to_string(),
            disks: disks([disk(0, "32G")]),
            ..ConfigQemu::default()
        };

        let params = config.to_params(None);
        assert_eq!(
            params["scsi0"],
            "local-lvm:32,size=32G,cache=none,backup=0,iothread=1,mbps_rd=100"
        );
        assert_eq!(params["onboot"], 1);
        assert_eq!(params["numa"], 0);
        assert_eq!(params["ostype"], "other");
        assert!(!params.contains_key("vcpus"));
        assert!(!params.contains_key("description"));
        assert!(!params.contains_key("delete"));
    }

    #[test]
    fn to_params_keeps_existing_volume() {
        let current = ConfigQemu::from_api(&raw(json!({
            "scsi0": "local-lvm:vm-100-disk-0,size=10G"
        })));
        let config = ConfigQemu {
            disks: disks([disk(0, "20G")]),
            ..ConfigQemu::default()
        };

        let params = config.to_params(Some(&current));
        let scsi0 = params["scsi0"].as_str().unwrap();
        assert!(scsi0.starts_with("local-lvm:vm-100-disk-0,size=20G"));
    }

    #[test]
    fn to_params_allocates_disk_on_a_different_bus() {
        let current = ConfigQemu::from_api(&raw(json!({
            "scsi0": "local-lvm:vm-100-disk-0,size=10G"
        })));
        let config = ConfigQemu {
            disks: disks([typed_disk("virtio", 0, "20G")]),
            ..ConfigQemu::default()
        };

        let params = config.to_params(Some(&current));
        let virtio0 = params["virtio0"].as_str().unwrap();
        assert!(virtio0.starts_with("local-lvm:20,size=20G"), "{}", virtio0);
        assert!(!params.contains_key("scsi0"));
    }

    #[test]
    fn to_params_formats_dir_storage_format() {
        let mut d = disk(1, "8G");
        d.insert("storage_type".to_string(), s("dir"));
        d.insert("format".to_string(), s("qcow2"));
        let config = ConfigQemu {
            disks: disks([d]),
            ..ConfigQemu::default()
        };

        let params = config.to_params(None);
        assert!(params["scsi1"].as_str().unwrap().contains(",format=qcow2"));
    }

    #[test]
    fn to_params_formats_network_serial_vga() {
        let config = ConfigQemu {
            iso: "local:iso/debian.iso".to_string(),
            networks: QemuDevices::from([(
                0,
                QemuDevice::from([
                    ("id".to_string(), DeviceValue::Int(0)),
                    ("model".to_string(), s("virtio")),
                    ("bridge".to_string(), s("vmbr0")),
                    ("tag".to_string(), DeviceValue::Int(-1)),
                    ("rate".to_string(), DeviceValue::Int(10)),
                    ("firewall".to_string(), DeviceValue::Bool(true)),
                    ("link_down".to_string(), DeviceValue::Bool(false)),
                ]),
            )]),
            serials: QemuDevices::from([(
                0,
                QemuDevice::from([("type".to_string(), s("socket"))]),
            )]),
            vga: QemuDevice::from([
                ("type".to_string(), s("std")),
                ("memory".to_string(), DeviceValue::Int(16)),
            ]),
            sshkeys: "ssh-ed25519 AAAA+x me@host".to_string(),
            ..ConfigQemu::default()
        };

        let params = config.to_params(None);
        assert_eq!(params["net0"], "virtio,bridge=vmbr0,rate=10,firewall=1");
        assert_eq!(params["serial0"], "socket");
        assert_eq!(params["vga"], "std,memory=16");
        assert_eq!(params["ide2"], "local:iso/debian.iso,media=cdrom");
        assert_eq!(params["sshkeys"], "ssh-ed25519%20AAAA%2Bx%20me%40host");
    }

    #[test]
    fn to_params_deletes_removed_devices_and_cleared_cloud_init() {
        let current = ConfigQemu::from_api(&raw(json!({
            "net0": "virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0",
            "net1": "e1000=AA:BB:CC:DD:EE:00,bridge=vmbr1",
            "serial0": "socket",
            "ciuser": "ubuntu",
            "ide2": "local:iso/debian.iso,media=cdrom"
        })));
        let mut config = current.clone();
        config.networks.remove(&1);
        config.serials.clear();
        config.ciuser.clear();

        let params = config.to_params(Some(&current));
        assert_eq!(params["delete"], "ciuser,net1,serial0");
        assert_eq!(params["net0"], "virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0");
        assert!(!params.contains_key("ide2"));
    }
}
