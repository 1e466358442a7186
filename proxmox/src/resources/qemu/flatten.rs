//! [`ConfigQemu`] back into Terraform state

use super::devices::{devices_set_to_map, update_devices_set, update_vga_set};
use crate::api::cluster::VmRef;
use crate::api::nodes::{ConfigQemu, DiskSlot};
use tfplug::schema::Block;
use tfplug::types::{AttributePath, Dynamic, DynamicValue};

/// Optional strings Proxmox reports as empty stay null when they were null
fn set_optional_string(
    state: &mut DynamicValue,
    prior: &DynamicValue,
    name: &str,
    value: &str,
) -> tfplug::Result<()> {
    let path = AttributePath::new(name);
    let was_null = prior.get(&path).map_or(true, Dynamic::is_null);
    if value.is_empty() && was_null {
        state.set(&path, Dynamic::Null)
    } else {
        state.set_string(&path, value.to_string())
    }
}

fn device_set(prior: &DynamicValue, name: &str) -> Vec<Dynamic> {
    prior
        .get(&AttributePath::new(name))
        .and_then(Dynamic::as_list)
        .cloned()
        .unwrap_or_default()
}

/// Writes the VM as reported by Proxmox over `prior`
///
/// Attributes Proxmox does not report (`clone`, `force_create`, the wait
/// settings) keep their prior values. Device sets are reconciled against
/// the prior ones, so only configured devices are tracked.
pub fn flatten_vm_qemu(
    id: &str,
    vm_ref: &VmRef,
    config: &ConfigQemu,
    prior: &DynamicValue,
    block: &Block,
) -> tfplug::Result<DynamicValue> {
    let mut state = match prior.value {
        Dynamic::Map(_) => prior.clone(),
        _ => DynamicValue::object(),
    };

    state.set_string(&AttributePath::new("id"), id.to_string())?;
    state.set_string(&AttributePath::new("target_node"), vm_ref.node.clone())?;
    state.set_string(&AttributePath::new("name"), config.name.clone())?;
    state.set_string(&AttributePath::new("bios"), config.bios.clone())?;
    state.set_bool(&AttributePath::new("onboot"), config.onboot)?;
    state.set_string(&AttributePath::new("boot"), config.boot.clone())?;
    state.set_number(&AttributePath::new("agent"), config.agent as f64)?;
    state.set_number(&AttributePath::new("memory"), config.memory as f64)?;
    state.set_number(&AttributePath::new("balloon"), config.balloon as f64)?;
    state.set_number(&AttributePath::new("cores"), config.cores as f64)?;
    state.set_number(&AttributePath::new("sockets"), config.sockets as f64)?;
    state.set_number(&AttributePath::new("vcpus"), config.vcpus as f64)?;
    state.set_string(&AttributePath::new("cpu"), config.cpu.clone())?;
    state.set_bool(&AttributePath::new("numa"), config.numa)?;
    state.set_string(&AttributePath::new("hotplug"), config.hotplug.clone())?;
    state.set_string(&AttributePath::new("scsihw"), config.scsihw.clone())?;
    state.set_string(&AttributePath::new("qemu_os"), config.qemu_os.clone())?;

    let optional: [(&str, &str); 13] = [
        ("desc", config.description.as_str()),
        ("bootdisk", config.bootdisk.as_str()),
        ("ciuser", config.ciuser.as_str()),
        ("cipassword", config.cipassword.as_str()),
        ("cicustom", config.cicustom.as_str()),
        ("searchdomain", config.searchdomain.as_str()),
        ("nameserver", config.nameserver.as_str()),
        ("sshkeys", config.sshkeys.as_str()),
        ("ipconfig0", config.ipconfig0.as_str()),
        ("ipconfig1", config.ipconfig1.as_str()),
        ("ipconfig2", config.ipconfig2.as_str()),
        ("hastate", vm_ref.hastate.as_deref().unwrap_or_default()),
        ("pool", vm_ref.pool.as_deref().unwrap_or_default()),
    ];
    for (name, value) in optional {
        set_optional_string(&mut state, prior, name, value)?;
    }

    let configured_disks = DiskSlot::key_devices(devices_set_to_map(&device_set(prior, "disk")));
    let active_disks = config.disks_at(configured_disks.keys());

    for (name, active) in [
        ("disk", &active_disks),
        ("network", &config.networks),
        ("serial", &config.serials),
    ] {
        let Some(nested) = block.nested_block(name) else {
            continue;
        };
        let reconciled = update_devices_set(&device_set(prior, name), active, &nested.block);
        state.set_list(&AttributePath::new(name), reconciled)?;
    }

    let configured_vga = device_set(prior, "vga");
    if let Some(nested) = block.nested_block("vga") {
        let vga = update_vga_set(&configured_vga, &config.vga, &nested.block);
        state.set_list(&AttributePath::new("vga"), vga)?;
    }

    Ok(state)
}
