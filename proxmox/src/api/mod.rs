//! Typed client for the subset of the Proxmox VE API used by the provider

pub mod client;
pub mod cluster;
pub mod common;
pub mod error;
pub mod nodes;
pub mod pool;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use client::{Client, RetryConfig};
pub use common::{ApiErrorDetails, TaskId};
pub use error::ApiError;
