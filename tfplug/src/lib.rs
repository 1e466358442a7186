//! tfplug - Terraform Plugin Framework for Rust
//!
//! Types and traits a provider implements: dynamic values, schemas with
//! defaults, validators and plan modifiers, and the async provider/resource
//! lifecycle traits. Wire transport is left to the host.

// Core modules
pub mod context;
pub mod error;
pub mod schema;
pub mod types;

// Provider API modules
pub mod provider;
pub mod resource;

// Helper modules
pub mod defaults;
pub mod import;
pub mod plan_modifier;
pub mod validator;

// Re-exports for convenience
pub use context::Context;
pub use error::{Result, TfplugError};
pub use import::import_state_passthrough_id;
pub use provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, Provider, ProviderMetadataRequest,
    ProviderMetadataResponse, ProviderSchemaRequest, ProviderSchemaResponse, ResourceFactory,
};
pub use resource::{
    ManagedResource, Resource, ResourceWithConfigure, ResourceWithImportState,
    ResourceWithModifyPlan,
};
pub use schema::{AttributeBuilder, AttributeType, NestedBlockBuilder, Schema, SchemaBuilder};
pub use types::{AttributePath, Diagnostic, DiagnosticSeverity, Dynamic, DynamicValue};
