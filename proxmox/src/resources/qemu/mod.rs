//! `proxmox_vm_qemu` resource

pub mod devices;
pub mod expand;
pub mod flatten;
pub mod lifecycle;
pub mod schema;

pub use lifecycle::{QemuError, VmResourceId};

use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::import::import_state_passthrough_id;
use tfplug::plan_modifier::apply_plan_modifiers;
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ModifyPlanRequest,
    ModifyPlanResponse, ReadResourceRequest, ReadResourceResponse, Resource,
    ResourceMetadataRequest, ResourceMetadataResponse, ResourceSchemaRequest,
    ResourceSchemaResponse, ResourceWithConfigure, ResourceWithImportState,
    ResourceWithModifyPlan, UpdateResourceRequest, UpdateResourceResponse,
    ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::validate_block;

#[derive(Default)]
pub struct QemuVmResource {
    provider_data: Option<crate::ProxmoxProviderData>,
}

impl QemuVmResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn provider_data(&self) -> Result<&crate::ProxmoxProviderData, Diagnostic> {
        self.provider_data.as_ref().ok_or_else(|| {
            Diagnostic::error(
                "Provider not configured",
                "Provider data was not properly configured",
            )
        })
    }
}

fn error_diagnostic(summary: &str, err: &QemuError) -> Diagnostic {
    Diagnostic::error(summary, err.to_string())
}

/// Keeps computed device values Terraform cannot plan on its own
///
/// `macaddr` of a network slot carries over from the prior state; a new slot
/// gets an unknown address.
fn plan_computed(
    planned: &mut DynamicValue,
    prior: &DynamicValue,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if prior.is_null() {
        let path = AttributePath::new("id");
        if let Err(e) = planned.set(&path, Dynamic::Unknown) {
            diagnostics.push(
                Diagnostic::error("Failed to plan VM id", e.to_string()).with_attribute(path),
            );
        }
    }

    let prior_macs: HashMap<i64, Dynamic> = prior
        .get(&AttributePath::new("network"))
        .and_then(Dynamic::as_list)
        .into_iter()
        .flatten()
        .filter_map(|nic| {
            let nic = nic.as_map()?;
            let id = nic.get("id")?.as_number()?.trunc() as i64;
            let mac = nic.get("macaddr").filter(|m| !m.is_null())?;
            Some((id, mac.clone()))
        })
        .collect();

    let Ok(mut networks) = planned.get_list(&AttributePath::new("network")) else {
        return;
    };
    for nic in networks.iter_mut() {
        let Dynamic::Map(map) = nic else {
            continue;
        };
        if !map.get("macaddr").map_or(true, Dynamic::is_null) {
            continue;
        }
        let id = map
            .get("id")
            .and_then(Dynamic::as_number)
            .map(|n| n.trunc() as i64);
        let mac = id
            .and_then(|id| prior_macs.get(&id).cloned())
            .unwrap_or(Dynamic::Unknown);
        map.insert("macaddr".to_string(), mac);
    }
    let path = AttributePath::new("network");
    if let Err(e) = planned.set_list(&path, networks) {
        diagnostics.push(
            Diagnostic::error("Failed to plan network devices", e.to_string())
                .with_attribute(path),
        );
    }
}

#[async_trait]
impl Resource for QemuVmResource {
    fn type_name(&self) -> &str {
        "proxmox_vm_qemu"
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ResourceMetadataRequest,
    ) -> ResourceMetadataResponse {
        ResourceMetadataResponse {
            type_name: self.type_name().to_string(),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: schema::qemu_schema(),
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        let schema = schema::qemu_schema();
        let mut diagnostics =
            validate_block(&schema.block, &request.config.value, &AttributePath::root());

        let is_set = |name: &str| {
            request
                .config
                .get_optional_string(&AttributePath::new(name))
                .is_some_and(|v| !v.is_empty())
        };
        if is_set("clone") && is_set("iso") {
            diagnostics.push(
                Diagnostic::error(
                    "Conflicting VM source",
                    "Only one of clone or iso may be set",
                )
                .with_attribute(AttributePath::new("iso")),
            );
        }

        ValidateResourceConfigResponse { diagnostics }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let provider_data = match self.provider_data() {
            Ok(data) => data,
            Err(diag) => {
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    private: vec![],
                    diagnostics: vec![diag],
                };
            }
        };

        match lifecycle::create(provider_data, &ctx, &request.planned_state).await {
            Ok(new_state) => CreateResourceResponse {
                new_state,
                private: vec![],
                diagnostics: vec![],
            },
            Err(QemuError::Incomplete { id, source }) => {
                tracing::warn!("VM {} created but not fully configured: {}", id, source);
                let mut new_state = request.planned_state;
                let mut diagnostics = vec![error_diagnostic("Failed to create VM", &source)];
                if let Err(e) = new_state.set_string(&AttributePath::new("id"), id.to_string()) {
                    diagnostics.push(Diagnostic::error(
                        "Failed to record VM id",
                        format!("VM {} exists but its id could not be stored: {}", id, e),
                    ));
                }
                CreateResourceResponse {
                    new_state,
                    private: vec![],
                    diagnostics,
                }
            }
            Err(e) => CreateResourceResponse {
                new_state: DynamicValue::null(),
                private: vec![],
                diagnostics: vec![error_diagnostic("Failed to create VM", &e)],
            },
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let provider_data = match self.provider_data() {
            Ok(data) => data,
            Err(diag) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![diag],
                    private: request.private,
                    deferred: None,
                    new_identity: None,
                };
            }
        };

        match lifecycle::read(provider_data, &request.current_state).await {
            Ok(new_state) => ReadResourceResponse {
                new_state,
                diagnostics: vec![],
                private: request.private,
                deferred: None,
                new_identity: None,
            },
            Err(e) => ReadResourceResponse {
                diagnostics: vec![error_diagnostic("Failed to read VM", &e)],
                new_state: Some(request.current_state),
                private: request.private,
                deferred: None,
                new_identity: None,
            },
        }
    }

    async fn update(&self, ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let provider_data = match self.provider_data() {
            Ok(data) => data,
            Err(diag) => {
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    private: vec![],
                    diagnostics: vec![diag],
                    new_identity: None,
                };
            }
        };

        match lifecycle::update(
            provider_data,
            &ctx,
            &request.prior_state,
            &request.planned_state,
        )
        .await
        {
            Ok(applied) => UpdateResourceResponse {
                new_state: applied.state,
                private: vec![],
                diagnostics: applied.warnings,
                new_identity: None,
            },
            Err(e) => UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics: vec![error_diagnostic("Failed to update VM", &e)],
                new_identity: None,
            },
        }
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let provider_data = match self.provider_data() {
            Ok(data) => data,
            Err(diag) => {
                return DeleteResourceResponse {
                    diagnostics: vec![diag],
                };
            }
        };

        let diagnostics = match lifecycle::delete(provider_data, &ctx, &request.prior_state).await
        {
            Ok(()) => vec![],
            Err(e) => vec![error_diagnostic("Failed to delete VM", &e)],
        };
        DeleteResourceResponse { diagnostics }
    }
}

#[async_trait]
impl ResourceWithConfigure for QemuVmResource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        let mut diagnostics = vec![];

        if let Some(data) = request.provider_data {
            if let Some(provider_data) = data.downcast_ref::<crate::ProxmoxProviderData>() {
                self.provider_data = Some(provider_data.clone());
            } else {
                diagnostics.push(Diagnostic::error(
                    "Invalid provider data",
                    "Failed to extract ProxmoxProviderData from provider data",
                ));
            }
        } else {
            diagnostics.push(Diagnostic::error(
                "No provider data",
                "No provider data was provided to the resource",
            ));
        }

        ConfigureResourceResponse { diagnostics }
    }
}

#[async_trait]
impl ResourceWithModifyPlan for QemuVmResource {
    async fn modify_plan(&self, _ctx: Context, request: ModifyPlanRequest) -> ModifyPlanResponse {
        if request.proposed_new_state.is_null() {
            return ModifyPlanResponse {
                planned_state: request.proposed_new_state,
                requires_replace: vec![],
                planned_private: request.prior_private,
                diagnostics: vec![],
            };
        }

        let schema = schema::qemu_schema();
        let mut proposed = request.proposed_new_state;
        schema
            .block
            .apply_defaults(&mut proposed.value, &AttributePath::root());

        let mut modification = apply_plan_modifiers(
            &schema.block,
            &request.config,
            &request.prior_state,
            proposed,
        );
        plan_computed(
            &mut modification.planned_state,
            &request.prior_state,
            &mut modification.diagnostics,
        );

        ModifyPlanResponse {
            planned_state: modification.planned_state,
            requires_replace: modification.requires_replace,
            planned_private: request.prior_private,
            diagnostics: modification.diagnostics,
        }
    }
}

#[async_trait]
impl ResourceWithImportState for QemuVmResource {
    async fn import_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
            deferred: None,
        };

        if let Err(e) = request.id.parse::<VmResourceId>() {
            response
                .diagnostics
                .push(error_diagnostic("Invalid import ID", &e));
            return response;
        }

        import_state_passthrough_id(&ctx, AttributePath::new("id"), &request, &mut response);
        response
    }
}

#[cfg(test)]
#[path = "./resource_test.rs"]
mod resource_test;
