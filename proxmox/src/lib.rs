//! Terraform provider for Proxmox VE QEMU virtual machines

pub mod api;
pub mod provider_data;
pub mod resources;

pub use provider_data::{LifecycleDelays, ProxmoxProviderData};

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tfplug::context::Context;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, Provider, ProviderMetadataRequest,
    ProviderMetadataResponse, ProviderSchemaRequest, ProviderSchemaResponse, ResourceFactory,
};
use tfplug::resource::ManagedResource;
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, DynamicValue};

const DEFAULT_PARALLEL: usize = 4;
const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Default)]
pub struct ProxmoxProvider;

impl ProxmoxProvider {
    pub fn new() -> Self {
        Self
    }
}

fn config_string(config: &DynamicValue, name: &str, env: &str) -> Option<String> {
    config
        .get_optional_string(&AttributePath::new(name))
        .filter(|v| !v.is_empty())
        .or_else(|| std::env::var(env).ok().filter(|v| !v.is_empty()))
}

fn config_bool(config: &DynamicValue, name: &str, env: &str) -> bool {
    config
        .get(&AttributePath::new(name))
        .and_then(|v| v.as_bool())
        .or_else(|| std::env::var(env).ok().and_then(|v| v.parse().ok()))
        .unwrap_or(false)
}

fn config_number(config: &DynamicValue, name: &str, env: &str) -> Option<u64> {
    config
        .get(&AttributePath::new(name))
        .and_then(|v| v.as_number())
        .filter(|n| *n >= 0.0)
        .map(|n| n as u64)
        .or_else(|| std::env::var(env).ok().and_then(|v| v.parse().ok()))
}

#[async_trait]
impl Provider for ProxmoxProvider {
    fn type_name(&self) -> &str {
        "proxmox"
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ProviderMetadataRequest,
    ) -> ProviderMetadataResponse {
        ProviderMetadataResponse {
            type_name: self.type_name().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ProviderSchemaRequest,
    ) -> ProviderSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Proxmox VE provider")
            .attribute(
                AttributeBuilder::new("endpoint", AttributeType::String)
                    .description("API endpoint, e.g. https://pve.example.com:8006. Falls back to PROXMOX_ENDPOINT")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("api_token", AttributeType::String)
                    .description("API token as user@realm!tokenid=secret. Falls back to PROXMOX_API_TOKEN")
                    .optional()
                    .sensitive()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("insecure", AttributeType::Bool)
                    .description("Skip TLS verification. Falls back to PROXMOX_INSECURE")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("parallel", AttributeType::Number)
                    .description("Maximum concurrent VM operations. Falls back to PROXMOX_PARALLEL")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("timeout", AttributeType::Number)
                    .description("Seconds to wait for a Proxmox task. Falls back to PROXMOX_TIMEOUT")
                    .optional()
                    .build(),
            )
            .build();

        ProviderSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        let mut diagnostics = vec![];
        let config = &request.config;

        let endpoint = config_string(config, "endpoint", "PROXMOX_ENDPOINT");
        let api_token = config_string(config, "api_token", "PROXMOX_API_TOKEN");
        let insecure = config_bool(config, "insecure", "PROXMOX_INSECURE");
        let parallel = config_number(config, "parallel", "PROXMOX_PARALLEL")
            .map_or(DEFAULT_PARALLEL, |n| n as usize);
        let timeout = config_number(config, "timeout", "PROXMOX_TIMEOUT")
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let (endpoint, api_token) = match (endpoint, api_token) {
            (Some(endpoint), Some(api_token)) => (endpoint, api_token),
            (None, _) => {
                diagnostics.push(
                    Diagnostic::error(
                        "endpoint is required",
                        "Set endpoint in the provider block or the PROXMOX_ENDPOINT environment variable",
                    )
                    .with_attribute(AttributePath::new("endpoint")),
                );
                return ConfigureProviderResponse {
                    diagnostics,
                    provider_data: None,
                };
            }
            (_, None) => {
                diagnostics.push(
                    Diagnostic::error(
                        "api_token is required",
                        "Set api_token in the provider block or the PROXMOX_API_TOKEN environment variable",
                    )
                    .with_attribute(AttributePath::new("api_token")),
                );
                return ConfigureProviderResponse {
                    diagnostics,
                    provider_data: None,
                };
            }
        };

        match api::Client::new(&endpoint, &api_token, insecure) {
            Ok(client) => {
                tracing::info!(
                    "Configured Proxmox provider for {} (parallel={}, timeout={}s)",
                    endpoint,
                    parallel,
                    timeout
                );
                let data =
                    ProxmoxProviderData::new(client, parallel, Duration::from_secs(timeout));
                ConfigureProviderResponse {
                    diagnostics,
                    provider_data: Some(Arc::new(data) as Arc<dyn Any + Send + Sync>),
                }
            }
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    "Failed to create API client",
                    e.to_string(),
                ));
                ConfigureProviderResponse {
                    diagnostics,
                    provider_data: None,
                }
            }
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut factories: HashMap<String, ResourceFactory> = HashMap::new();
        factories.insert(
            "proxmox_vm_qemu".to_string(),
            Box::new(|| Box::new(resources::QemuVmResource::new()) as Box<dyn ManagedResource>),
        );
        factories
    }
}
