//! Schema of the `proxmox_vm_qemu` resource

use tfplug::defaults::StaticDefault;
use tfplug::plan_modifier::{
    prior_empty, trim_space_equal, RequiresReplaceIfChanged, SuppressDiffIf, UseStateForUnknown,
};
use tfplug::schema::{
    AttributeBuilder, AttributeType, NestedBlock, NestedBlockBuilder, NestingMode,
    PlanModifierRequest, Schema, SchemaBuilder,
};
use tfplug::types::AttributePath;
use tfplug::validator::{NumberRange, StringOneOf, StringPattern};

pub const NIC_MODELS: &[&str] = &[
    "e1000",
    "e1000-82540em",
    "e1000-82544gc",
    "e1000-82545em",
    "i82551",
    "i82557b",
    "i82559er",
    "ne2k_isa",
    "ne2k_pci",
    "pcnet",
    "rtl8139",
    "virtio",
    "vmxnet3",
];

fn string(name: &str) -> AttributeBuilder {
    AttributeBuilder::new(name, AttributeType::String).optional()
}

fn string_default(name: &str, default: &str) -> AttributeBuilder {
    string(name).default(StaticDefault::string(default))
}

fn number_default(name: &str, default: f64) -> AttributeBuilder {
    AttributeBuilder::new(name, AttributeType::Number)
        .optional()
        .default(StaticDefault::number(default))
}

fn bool_default(name: &str, default: bool) -> AttributeBuilder {
    AttributeBuilder::new(name, AttributeType::Bool)
        .optional()
        .default(StaticDefault::bool(default))
}

fn required(name: &str, type_: AttributeType) -> AttributeBuilder {
    AttributeBuilder::new(name, type_).required()
}

/// A cloned VM keeps the source's OS type unless one is asked for explicitly
fn qemu_os_suppress(request: &PlanModifierRequest) -> bool {
    let planned = request.plan_value.value.as_str().unwrap_or_default();
    if planned == "l26" {
        return request
            .resource_config
            .get_optional_string(&AttributePath::new("clone"))
            .is_some_and(|c| !c.is_empty());
    }
    let prior = request.state_value.value.as_str().unwrap_or_default();
    prior.trim() == planned.trim()
}

fn vga_block() -> NestedBlock {
    NestedBlockBuilder::new("vga", NestingMode::Set)
        .description("Display adapter")
        .max_items(1)
        .attribute(string_default("type", "std").build())
        .attribute(
            AttributeBuilder::new("memory", AttributeType::Number)
                .optional()
                .description("Display memory in MiB")
                .build(),
        )
        .build()
}

fn network_block() -> NestedBlock {
    NestedBlockBuilder::new("network", NestingMode::Set)
        .description("Network interfaces keyed by slot id")
        .attribute(required("id", AttributeType::Number).build())
        .attribute(
            required("model", AttributeType::String)
                .validator(StringOneOf::create(NIC_MODELS))
                .build(),
        )
        .attribute(string("macaddr").computed().build())
        .attribute(string_default("bridge", "nat").build())
        .attribute(
            number_default("tag", -1.0)
                .description("VLAN tag, -1 for none")
                .build(),
        )
        .attribute(bool_default("firewall", false).build())
        .attribute(number_default("rate", -1.0).build())
        .attribute(number_default("queues", -1.0).build())
        .attribute(bool_default("link_down", false).build())
        .build()
}

fn disk_block() -> NestedBlock {
    let mut builder = NestedBlockBuilder::new("disk", NestingMode::Set)
        .description("Disks keyed by slot id")
        .attribute(required("id", AttributeType::Number).build())
        .attribute(
            required("type", AttributeType::String)
                .validator(StringOneOf::create(&["ide", "sata", "scsi", "virtio"]))
                .build(),
        )
        .attribute(required("storage", AttributeType::String).build())
        .attribute(
            string_default("storage_type", "dir")
                .description("Proxmox storage type, e.g. dir, lvm, lvmthin, zfspool")
                .build(),
        )
        .attribute(
            required("size", AttributeType::String)
                .validator(StringPattern::create(
                    r"^(?i)[0-9]+[TGMK]?B?$",
                    "size must be a number with an optional T, G, M or K unit",
                ))
                .build(),
        )
        .attribute(string_default("format", "raw").build())
        .attribute(string_default("cache", "none").build())
        .attribute(bool_default("backup", false).build())
        .attribute(bool_default("iothread", false).build())
        .attribute(bool_default("replicate", false).build());

    for limit in ["mbps", "mbps_rd", "mbps_rd_max", "mbps_wr", "mbps_wr_max"] {
        builder = builder.attribute(number_default(limit, 0.0).build());
    }
    builder.build()
}

fn serial_block() -> NestedBlock {
    NestedBlockBuilder::new("serial", NestingMode::Set)
        .description("Serial ports keyed by slot id")
        .attribute(required("id", AttributeType::Number).build())
        .attribute(required("type", AttributeType::String).build())
        .build()
}

/// Builds the resource schema. Attributes carry boxed validators and
/// modifiers, so callers build a fresh copy instead of cloning one.
pub fn qemu_schema() -> Schema {
    SchemaBuilder::new()
        .version(0)
        .description("Manages a QEMU/KVM virtual machine in Proxmox VE")
        .attribute(
            AttributeBuilder::new("id", AttributeType::String)
                .computed()
                .description("Resource id in the form <node>/qemu/<vmid>")
                .plan_modifier(UseStateForUnknown::create())
                .build(),
        )
        .attribute(required("name", AttributeType::String).build())
        .attribute(
            required("target_node", AttributeType::String)
                .description("Node to place the VM on; changing it migrates the VM")
                .build(),
        )
        .attribute(string("desc").plan_modifier(trim_space_equal()).build())
        .attribute(
            string_default("bios", "seabios")
                .validator(StringOneOf::create(&["seabios", "ovmf"]))
                .build(),
        )
        .attribute(bool_default("onboot", true).build())
        .attribute(string_default("boot", "cdn").build())
        .attribute(string("bootdisk").build())
        .attribute(number_default("agent", 0.0).build())
        .attribute(
            string("iso")
                .plan_modifier(RequiresReplaceIfChanged::create())
                .build(),
        )
        .attribute(
            string("clone")
                .description("Name of the VM or template to clone")
                .plan_modifier(RequiresReplaceIfChanged::create())
                .build(),
        )
        .attribute(
            bool_default("full_clone", true)
                .plan_modifier(RequiresReplaceIfChanged::create())
                .build(),
        )
        .attribute(string("hastate").build())
        .attribute(
            string_default("qemu_os", "l26")
                .plan_modifier(SuppressDiffIf::create(
                    qemu_os_suppress,
                    "keeps the OS type of a cloned VM",
                ))
                .build(),
        )
        .attribute(
            number_default("memory", 512.0)
                .validator(NumberRange::at_least(16.0))
                .build(),
        )
        .attribute(number_default("balloon", 0.0).build())
        .attribute(
            number_default("cores", 1.0)
                .validator(NumberRange::at_least(1.0))
                .build(),
        )
        .attribute(
            number_default("sockets", 1.0)
                .validator(NumberRange::at_least(1.0))
                .build(),
        )
        .attribute(number_default("vcpus", 0.0).build())
        .attribute(string_default("cpu", "host").build())
        .attribute(bool_default("numa", false).build())
        .attribute(string_default("hotplug", "network,disk,usb").build())
        .attribute(string_default("scsihw", "").build())
        .attribute(string("os_type").build())
        .attribute(
            string("os_network_config")
                .plan_modifier(trim_space_equal())
                .plan_modifier(RequiresReplaceIfChanged::create())
                .build(),
        )
        .attribute(bool_default("force_create", false).build())
        .attribute(
            number_default("clone_wait", 15.0)
                .description("Seconds to wait after cloning before reconfiguring")
                .build(),
        )
        .attribute(
            number_default("ci_wait", 30.0)
                .description("Seconds to wait before provisioning")
                .plan_modifier(prior_empty())
                .build(),
        )
        .attribute(string("ciuser").build())
        .attribute(string("cipassword").sensitive().build())
        .attribute(string("cicustom").build())
        .attribute(string("searchdomain").build())
        .attribute(string("nameserver").build())
        .attribute(string("sshkeys").plan_modifier(trim_space_equal()).build())
        .attribute(string("ipconfig0").build())
        .attribute(string("ipconfig1").build())
        .attribute(string("ipconfig2").build())
        .attribute(string("pool").build())
        .block(vga_block())
        .block(network_block())
        .block(disk_block())
        .block(serial_block())
        .build()
}
