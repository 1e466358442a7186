//! QEMU/KVM virtual machine API implementation

use crate::api::common::{ProxmoxBool, TaskId};
use crate::api::{error::ApiError, Client};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Undecoded `/config` response. Device entries are option strings such as
/// `local-lvm:vm-100-disk-0,size=32G`; see [`super::ConfigQemu::from_api`].
pub type RawQemuConfig = HashMap<String, serde_json::Value>;

/// QEMU API providing virtual machine operations
pub struct QemuApi<'a> {
    client: &'a Client,
    node: String,
}

impl<'a> QemuApi<'a> {
    pub fn new(client: &'a Client, node: &str) -> Self {
        Self {
            client,
            node: node.to_string(),
        }
    }

    fn vm_path(&self, vmid: u32, suffix: &str) -> String {
        format!("/api2/json/nodes/{}/qemu/{}{}", self.node, vmid, suffix)
    }

    /// GET /api2/json/nodes/{node}/qemu/{vmid}/config
    pub async fn get_config(&self, vmid: u32) -> Result<RawQemuConfig, ApiError> {
        self.client.get(&self.vm_path(vmid, "/config")).await
    }

    /// POST /api2/json/nodes/{node}/qemu
    pub async fn create(
        &self,
        vmid: u32,
        params: &BTreeMap<String, serde_json::Value>,
    ) -> Result<TaskId, ApiError> {
        let mut body = params.clone();
        body.insert("vmid".to_string(), vmid.into());
        let path = format!("/api2/json/nodes/{}/qemu", self.node);
        self.client.post(&path, &body).await
    }

    /// POST /api2/json/nodes/{node}/qemu/{vmid}/config
    ///
    /// Returns a task id when Proxmox applies the change asynchronously.
    pub async fn update_config(
        &self,
        vmid: u32,
        params: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Option<TaskId>, ApiError> {
        self.client.post(&self.vm_path(vmid, "/config"), params).await
    }

    /// POST /api2/json/nodes/{node}/qemu/{vmid}/clone
    ///
    /// `vmid` is the source; the node must be the one holding the source.
    pub async fn clone_vm(
        &self,
        vmid: u32,
        request: &CloneQemuRequest,
    ) -> Result<TaskId, ApiError> {
        self.client.post(&self.vm_path(vmid, "/clone"), request).await
    }

    /// PUT /api2/json/nodes/{node}/qemu/{vmid}/resize
    ///
    /// `size` is either absolute (`32G`) or relative (`+8G`).
    pub async fn resize_disk(
        &self,
        vmid: u32,
        disk: &str,
        size: &str,
    ) -> Result<Option<TaskId>, ApiError> {
        let body = ResizeRequest { disk, size };
        self.client.put(&self.vm_path(vmid, "/resize"), &body).await
    }

    /// POST /api2/json/nodes/{node}/qemu/{vmid}/status/start
    pub async fn start(&self, vmid: u32) -> Result<TaskId, ApiError> {
        self.client
            .post_empty(&self.vm_path(vmid, "/status/start"))
            .await
    }

    /// POST /api2/json/nodes/{node}/qemu/{vmid}/status/stop
    pub async fn stop(&self, vmid: u32) -> Result<TaskId, ApiError> {
        self.client
            .post_empty(&self.vm_path(vmid, "/status/stop"))
            .await
    }

    /// GET /api2/json/nodes/{node}/qemu/{vmid}/status/current
    pub async fn get_status(&self, vmid: u32) -> Result<QemuStatus, ApiError> {
        self.client
            .get(&self.vm_path(vmid, "/status/current"))
            .await
    }

    /// POST /api2/json/nodes/{node}/qemu/{vmid}/migrate
    pub async fn migrate(&self, vmid: u32, target: &str, online: bool) -> Result<TaskId, ApiError> {
        let body = MigrateRequest {
            target,
            online: online.into(),
        };
        self.client.post(&self.vm_path(vmid, "/migrate"), &body).await
    }

    /// DELETE /api2/json/nodes/{node}/qemu/{vmid}
    pub async fn delete(&self, vmid: u32, purge: bool) -> Result<TaskId, ApiError> {
        let path = if purge {
            self.vm_path(vmid, "?purge=1")
        } else {
            self.vm_path(vmid, "")
        };
        self.client.delete(&path).await
    }
}

/// Request for cloning a VM
#[derive(Debug, Clone, Serialize)]
pub struct CloneQemuRequest {
    pub newid: u32,
    pub name: String,
    pub full: ProxmoxBool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
}

#[derive(Serialize)]
struct ResizeRequest<'a> {
    disk: &'a str,
    size: &'a str,
}

#[derive(Serialize)]
struct MigrateRequest<'a> {
    target: &'a str,
    online: ProxmoxBool,
}

/// Runtime status of a VM
#[derive(Debug, Clone, Deserialize)]
pub struct QemuStatus {
    pub status: String,
    pub qmpstatus: Option<String>,
    pub name: Option<String>,
    pub uptime: Option<u64>,
    pub ha: Option<serde_json::Value>,
}

impl QemuStatus {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

#[cfg(test)]
#[path = "./qemu_test.rs"]
mod qemu_test;
