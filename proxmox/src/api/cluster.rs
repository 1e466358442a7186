//! Cluster-wide endpoints: VM id allocation, resource lookup and HA state

use crate::api::common::{deserialize_u32_from_string_or_int, ApiQueryParams};
use crate::api::{error::ApiError, Client};
use serde::{Deserialize, Serialize};

pub struct ClusterApi<'a> {
    client: &'a Client,
}

impl<'a> ClusterApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// GET /api2/json/cluster/nextid
    pub async fn next_id(&self) -> Result<u32, ApiError> {
        #[derive(Deserialize)]
        struct NextId(#[serde(deserialize_with = "deserialize_u32_from_string_or_int")] u32);

        let NextId(id) = self.client.get("/api2/json/cluster/nextid").await?;
        Ok(id)
    }

    /// GET /api2/json/cluster/resources?type=vm, restricted to QEMU guests
    pub async fn vm_resources(&self) -> Result<Vec<VmRef>, ApiError> {
        let params = ApiQueryParams::new().add("type", "vm");
        let resources: Vec<ClusterResource> = self
            .client
            .get_with_params("/api2/json/cluster/resources", &params)
            .await?;

        Ok(resources
            .into_iter()
            .filter(|r| r.type_ == "qemu")
            .filter_map(ClusterResource::into_vm_ref)
            .collect())
    }

    /// First QEMU guest whose name matches exactly
    pub async fn find_vm_by_name(&self, name: &str) -> Result<Option<VmRef>, ApiError> {
        Ok(self
            .vm_resources()
            .await?
            .into_iter()
            .find(|vm| vm.name.as_deref() == Some(name)))
    }

    pub async fn find_vm_by_id(&self, vmid: u32) -> Result<Option<VmRef>, ApiError> {
        Ok(self
            .vm_resources()
            .await?
            .into_iter()
            .find(|vm| vm.vmid == vmid))
    }

    /// GET /api2/json/cluster/ha/resources
    pub async fn ha_resources(&self) -> Result<Vec<HaResource>, ApiError> {
        self.client.get("/api2/json/cluster/ha/resources").await
    }

    /// Puts the VM under HA management with `state`, or updates the state of
    /// an existing HA resource.
    pub async fn set_ha_state(&self, vmid: u32, state: &str) -> Result<(), ApiError> {
        let sid = format!("vm:{}", vmid);
        let managed = self
            .ha_resources()
            .await?
            .iter()
            .any(|r| r.sid == sid);

        if managed {
            tracing::debug!("Updating HA state of {} to {}", sid, state);
            let path = format!("/api2/json/cluster/ha/resources/{}", sid);
            let _: Option<serde_json::Value> = self
                .client
                .put(&path, &HaStateRequest { sid: None, state })
                .await?;
        } else {
            tracing::debug!("Adding {} to HA with state {}", sid, state);
            let _: Option<serde_json::Value> = self
                .client
                .post(
                    "/api2/json/cluster/ha/resources",
                    &HaStateRequest {
                        sid: Some(&sid),
                        state,
                    },
                )
                .await?;
        }
        Ok(())
    }
}

/// Location and cluster-level attributes of a VM
#[derive(Debug, Clone, PartialEq)]
pub struct VmRef {
    pub vmid: u32,
    pub node: String,
    pub name: Option<String>,
    pub pool: Option<String>,
    pub hastate: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClusterResource {
    #[serde(rename = "type")]
    type_: String,
    vmid: Option<u32>,
    node: Option<String>,
    name: Option<String>,
    pool: Option<String>,
    hastate: Option<String>,
    status: Option<String>,
}

impl ClusterResource {
    fn into_vm_ref(self) -> Option<VmRef> {
        Some(VmRef {
            vmid: self.vmid?,
            node: self.node?,
            name: self.name,
            pool: self.pool.filter(|p| !p.is_empty()),
            hastate: self.hastate.filter(|s| !s.is_empty()),
            status: self.status,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HaResource {
    pub sid: String,
    pub state: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
}

#[derive(Serialize)]
struct HaStateRequest<'s> {
    #[serde(skip_serializing_if = "Option::is_none")]
    sid: Option<&'s str>,
    state: &'s str,
}
