//! Create, read, update and delete of a QEMU VM against the Proxmox API

use super::expand::{expand_vm_qemu, CreateOptions};
use super::flatten::flatten_vm_qemu;
use super::schema::qemu_schema;
use crate::api::cluster::VmRef;
use crate::api::nodes::{disk_size_gb, CloneQemuRequest, ConfigQemu, QemuApi};
use crate::api::{ApiError, TaskId};
use crate::ProxmoxProviderData;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tfplug::context::Context;
use tfplug::types::{AttributePath, Diagnostic, DynamicValue};
use tfplug::TfplugError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QemuError {
    #[error("Duplicate VM name ({name}) with vmId: {vmid}. Set force_create=false to recycle")]
    DuplicateName { name: String, vmid: u32 },

    #[error("Duplicate VM name ({name}) with vmId: {vmid} on different target_node={node}")]
    DuplicateOnOtherNode { name: String, vmid: u32, node: String },

    #[error("Either clone or iso must be set")]
    MissingSource,

    #[error("Clone source VM '{0}' not found")]
    CloneSourceNotFound(String),

    #[error("Invalid resource id '{0}', expected <node>/qemu/<vmid>")]
    InvalidId(String),

    #[error("VM {0} not found")]
    NotFound(VmResourceId),

    /// The VM exists but a later step failed; Terraform should track it
    #[error("{source}")]
    Incomplete {
        id: VmResourceId,
        #[source]
        source: Box<QemuError>,
    },

    #[error("Proxmox API error: {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Framework(#[from] TfplugError),

    #[error("Provider is shutting down")]
    Closed(#[from] tokio::sync::AcquireError),
}

/// `<node>/qemu/<vmid>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmResourceId {
    pub node: String,
    pub vmid: u32,
}

impl VmResourceId {
    pub fn new(node: impl Into<String>, vmid: u32) -> Self {
        Self {
            node: node.into(),
            vmid,
        }
    }

    pub fn from_state(state: &DynamicValue) -> Result<Self, QemuError> {
        state
            .get_optional_string(&AttributePath::new("id"))
            .unwrap_or_default()
            .parse()
    }
}

impl FromStr for VmResourceId {
    type Err = QemuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [node, "qemu", vmid] if !node.is_empty() => vmid
                .parse()
                .map(|vmid| Self::new(*node, vmid))
                .map_err(|_| QemuError::InvalidId(s.to_string())),
            _ => Err(QemuError::InvalidId(s.to_string())),
        }
    }
}

impl fmt::Display for VmResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/qemu/{}", self.node, self.vmid)
    }
}

/// Result of an update: the refreshed state plus non-fatal problems
pub struct Applied {
    pub state: DynamicValue,
    pub warnings: Vec<Diagnostic>,
}

fn qemu<'a>(data: &'a ProxmoxProviderData, node: &str) -> QemuApi<'a> {
    data.client.nodes().node(node).qemu()
}

/// Waits for `task` on the node that owns it
async fn wait_task(data: &ProxmoxProviderData, node: &str, task: &TaskId) -> Result<(), ApiError> {
    let node = task.node().unwrap_or(node);
    data.client
        .nodes()
        .node(node)
        .tasks()
        .wait(task, data.task_timeout, data.delays.task_poll)
        .await
}

async fn wait_optional(
    data: &ProxmoxProviderData,
    node: &str,
    task: Option<TaskId>,
) -> Result<(), ApiError> {
    match task {
        Some(task) => wait_task(data, node, &task).await,
        None => Ok(()),
    }
}

async fn current_config(
    data: &ProxmoxProviderData,
    node: &str,
    vmid: u32,
) -> Result<ConfigQemu, ApiError> {
    let raw = qemu(data, node).get_config(vmid).await?;
    Ok(ConfigQemu::from_api(&raw))
}

/// Pushes `config` onto an existing VM, deleting slots it no longer has
async fn apply_config(
    data: &ProxmoxProviderData,
    id: &VmResourceId,
    config: &ConfigQemu,
) -> Result<(), ApiError> {
    let current = current_config(data, &id.node, id.vmid).await?;
    let params = config.to_params(Some(&current));
    tracing::debug!("Applying {} parameters to VM {}", params.len(), id);
    let task = qemu(data, &id.node).update_config(id.vmid, &params).await?;
    wait_optional(data, &id.node, task).await
}

/// Grows configured disks that are smaller on the VM than requested
///
/// Disks the VM does not have yet are skipped; shrinking is never attempted.
pub async fn prepare_disk_size(
    data: &ProxmoxProviderData,
    id: &VmResourceId,
    config: &ConfigQemu,
) -> Result<(), ApiError> {
    let current = current_config(data, &id.node, id.vmid).await?;

    for (slot, disk) in &config.disks {
        let Some(active) = current.disks.get(slot) else {
            continue;
        };
        let want = disk.get("size").map(disk_size_gb).unwrap_or(0.0);
        let have = active.get("size").map(disk_size_gb).unwrap_or(0.0);
        if want <= have {
            continue;
        }

        let disk_name = slot.to_string();
        let diff = (want - have).ceil() as i64;
        tracing::info!("Growing {} of VM {} by {}G", disk_name, id, diff);
        let task = qemu(data, &id.node)
            .resize_disk(id.vmid, &disk_name, &format!("+{}G", diff))
            .await?;
        wait_optional(data, &id.node, task).await?;
    }
    Ok(())
}

async fn start(data: &ProxmoxProviderData, ctx: &Context, id: &VmResourceId) -> Result<(), QemuError> {
    ctx.sleep(data.delays.before_start).await?;
    tracing::info!("Starting VM {}", id);
    let task = qemu(data, &id.node).start(id.vmid).await?;
    wait_task(data, &id.node, &task).await?;
    Ok(())
}

async fn set_ha_state(data: &ProxmoxProviderData, id: &VmResourceId, hastate: &str) -> Result<(), ApiError> {
    if hastate.is_empty() {
        return Ok(());
    }
    data.client.cluster().set_ha_state(id.vmid, hastate).await
}

/// Creates the VM described by `planned`, starts it and returns its state
pub async fn create(
    data: &ProxmoxProviderData,
    ctx: &Context,
    planned: &DynamicValue,
) -> Result<DynamicValue, QemuError> {
    let _permit = data.semaphore.acquire().await?;
    let config = expand_vm_qemu(planned);
    let options = CreateOptions::from_config(planned);

    let duplicate = match data.client.cluster().find_vm_by_name(&config.name).await {
        Ok(vm) => vm,
        Err(e) => {
            tracing::warn!("Looking up VMs named {} failed: {}", config.name, e);
            None
        }
    };

    let id = match duplicate {
        Some(vm) if options.force_create => {
            return Err(QemuError::DuplicateName {
                name: config.name.clone(),
                vmid: vm.vmid,
            })
        }
        Some(vm) if vm.node != options.target_node => {
            return Err(QemuError::DuplicateOnOtherNode {
                name: config.name.clone(),
                vmid: vm.vmid,
                node: vm.node,
            })
        }
        Some(vm) => {
            let id = VmResourceId::new(vm.node, vm.vmid);
            recycle(data, ctx, &id, &config)
                .await
                .map_err(|e| incomplete(&id, e))?;
            id
        }
        None => provision(data, ctx, &config, &options).await?,
    };

    finish(data, ctx, &id, &config, planned)
        .await
        .map_err(|e| incomplete(&id, e))
}

fn incomplete(id: &VmResourceId, source: QemuError) -> QemuError {
    match source {
        QemuError::Incomplete { .. } => source,
        source => QemuError::Incomplete {
            id: id.clone(),
            source: Box::new(source),
        },
    }
}

/// Allocates a new VM by cloning or from an ISO
async fn provision(
    data: &ProxmoxProviderData,
    ctx: &Context,
    config: &ConfigQemu,
    options: &CreateOptions,
) -> Result<VmResourceId, QemuError> {
    if options.clone.is_empty() && config.iso.is_empty() {
        return Err(QemuError::MissingSource);
    }

    let vmid = data.client.cluster().next_id().await?;
    let id = VmResourceId::new(options.target_node.clone(), vmid);

    if !options.clone.is_empty() {
        let source = data
            .client
            .cluster()
            .find_vm_by_name(&options.clone)
            .await?
            .ok_or_else(|| QemuError::CloneSourceNotFound(options.clone.clone()))?;
        clone_from(data, &source, &id, config, options).await?;

        let configure = async {
            apply_config(data, &id, config).await?;
            ctx.sleep(Duration::from_secs(options.clone_wait)).await?;
            prepare_disk_size(data, &id, config).await?;
            Ok::<(), QemuError>(())
        };
        configure.await.map_err(|e| incomplete(&id, e))?;
    } else {
        let mut params = config.to_params(None);
        if !config.pool.is_empty() {
            params.insert("pool".to_string(), config.pool.clone().into());
        }
        tracing::info!("Creating VM {} from ISO {}", id, config.iso);
        let task = qemu(data, &id.node).create(vmid, &params).await?;
        wait_task(data, &id.node, &task).await?;
    }

    Ok(id)
}

async fn clone_from(
    data: &ProxmoxProviderData,
    source: &VmRef,
    id: &VmResourceId,
    config: &ConfigQemu,
    options: &CreateOptions,
) -> Result<(), ApiError> {
    tracing::info!(
        "Cloning VM {} ({}) into {} as {}",
        source.vmid,
        options.clone,
        id,
        if options.full_clone { "full clone" } else { "linked clone" }
    );
    let request = CloneQemuRequest {
        newid: id.vmid,
        name: config.name.clone(),
        full: options.full_clone.into(),
        target: Some(id.node.clone()),
        pool: Some(config.pool.clone()).filter(|p| !p.is_empty()),
    };
    let task = qemu(data, &source.node).clone_vm(source.vmid, &request).await?;
    wait_task(data, &source.node, &task).await
}

/// Reuses an existing VM of the same name on the target node
async fn recycle(
    data: &ProxmoxProviderData,
    ctx: &Context,
    id: &VmResourceId,
    config: &ConfigQemu,
) -> Result<(), QemuError> {
    tracing::info!("Recycling existing VM {} named {}", id, config.name);
    match qemu(data, &id.node).stop(id.vmid).await {
        Ok(task) => {
            if let Err(e) = wait_task(data, &id.node, &task).await {
                tracing::warn!("Stopping VM {} failed: {}", id, e);
            }
        }
        Err(e) => tracing::warn!("Stopping VM {} failed: {}", id, e),
    }

    apply_config(data, id, config).await?;
    ctx.sleep(data.delays.settle).await?;
    prepare_disk_size(data, id, config).await?;
    Ok(())
}

async fn finish(
    data: &ProxmoxProviderData,
    ctx: &Context,
    id: &VmResourceId,
    config: &ConfigQemu,
    planned: &DynamicValue,
) -> Result<DynamicValue, QemuError> {
    set_ha_state(data, id, &config.hastate).await?;
    start(data, ctx, id).await?;
    read_vm(data, id, planned)
        .await?
        .ok_or_else(|| QemuError::NotFound(id.clone()))
}

/// Fetches the VM and flattens it over `prior`; `None` when it is gone
async fn read_vm(
    data: &ProxmoxProviderData,
    id: &VmResourceId,
    prior: &DynamicValue,
) -> Result<Option<DynamicValue>, QemuError> {
    let cluster = data.client.cluster();
    let api = qemu(data, &id.node);
    let (vm_ref, raw) = futures::join!(cluster.find_vm_by_id(id.vmid), api.get_config(id.vmid));

    let Some(vm_ref) = vm_ref? else {
        return Ok(None);
    };
    let raw = if vm_ref.node == id.node {
        raw?
    } else {
        tracing::debug!("VM {} now lives on node {}", id, vm_ref.node);
        qemu(data, &vm_ref.node).get_config(id.vmid).await?
    };

    let config = ConfigQemu::from_api(&raw);
    let actual = VmResourceId::new(vm_ref.node.clone(), id.vmid);
    let schema = qemu_schema();
    let state = flatten_vm_qemu(&actual.to_string(), &vm_ref, &config, prior, &schema.block)?;
    Ok(Some(state))
}

/// Refreshes `current` from Proxmox
pub async fn read(
    data: &ProxmoxProviderData,
    current: &DynamicValue,
) -> Result<Option<DynamicValue>, QemuError> {
    let _permit = data.semaphore.acquire().await?;
    let id = VmResourceId::from_state(current)?;
    let state = read_vm(data, &id, current).await?;
    if state.is_none() {
        tracing::info!("VM {} no longer exists", id);
    }
    Ok(state)
}

/// Moves, reconfigures and restarts the VM to match `planned`
pub async fn update(
    data: &ProxmoxProviderData,
    ctx: &Context,
    prior: &DynamicValue,
    planned: &DynamicValue,
) -> Result<Applied, QemuError> {
    let _permit = data.semaphore.acquire().await?;
    let mut id = VmResourceId::from_state(prior)?;
    let mut warnings = Vec::new();
    let config = expand_vm_qemu(planned);
    let target_node = CreateOptions::from_config(planned).target_node;

    if !target_node.is_empty() && target_node != id.node {
        tracing::info!("Migrating VM {} to {}", id, target_node);
        let task = qemu(data, &id.node)
            .migrate(id.vmid, &target_node, true)
            .await?;
        wait_task(data, &id.node, &task).await?;
        id = VmResourceId::new(target_node, id.vmid);
    }

    apply_config(data, &id, &config).await?;
    ctx.sleep(data.delays.settle).await?;
    if let Err(e) = prepare_disk_size(data, &id, &config).await {
        tracing::warn!("Resizing disks of VM {} failed: {}", id, e);
        warnings.push(Diagnostic::warning("Failed to resize disks", e.to_string()));
    }
    set_ha_state(data, &id, &config.hastate).await?;

    ctx.sleep(data.delays.before_start).await?;
    let status = qemu(data, &id.node).get_status(id.vmid).await?;
    if status.status == "stopped" {
        tracing::info!("Starting VM {}", id);
        let task = qemu(data, &id.node).start(id.vmid).await?;
        wait_task(data, &id.node, &task).await?;
    }

    let state = read_vm(data, &id, planned)
        .await?
        .ok_or_else(|| QemuError::NotFound(id.clone()))?;
    Ok(Applied { state, warnings })
}

/// Stops and purges the VM; a VM that is already gone is not an error
pub async fn delete(
    data: &ProxmoxProviderData,
    ctx: &Context,
    prior: &DynamicValue,
) -> Result<(), QemuError> {
    let _permit = data.semaphore.acquire().await?;
    let id = VmResourceId::from_state(prior)?;
    let Some(vm_ref) = data.client.cluster().find_vm_by_id(id.vmid).await? else {
        tracing::info!("VM {} already removed", id);
        return Ok(());
    };
    let node = vm_ref.node;

    tracing::info!("Stopping VM {}", id);
    let task = qemu(data, &node).stop(id.vmid).await?;
    wait_task(data, &node, &task).await?;
    ctx.sleep(data.delays.after_stop).await?;

    tracing::info!("Deleting VM {}", id);
    let task = qemu(data, &node).delete(id.vmid, true).await?;
    wait_task(data, &node, &task).await?;
    Ok(())
}
