//! Common types and utilities for Proxmox API

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Task identifier (UPID) returned by asynchronous endpoints
///
/// Format: `UPID:<node>:<pid>:<pstart>:<starttime>:<type>:<id>:<user>:`
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TaskId(pub String);

impl TaskId {
    /// Node the task runs on, parsed from the UPID
    pub fn node(&self) -> Option<&str> {
        let mut parts = self.0.split(':');
        match (parts.next(), parts.next()) {
            (Some("UPID"), Some(node)) if !node.is_empty() => Some(node),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub errors: Option<HashMap<String, String>>,
    pub message: Option<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("API error details: message={message:?}, field_errors={field_errors:?}")]
pub struct ApiErrorDetails {
    pub message: Option<String>,
    pub field_errors: Option<HashMap<String, String>>,
}

/// Boolean that Proxmox encodes as 0/1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxmoxBool(pub bool);

impl ProxmoxBool {
    pub fn as_bool(&self) -> bool {
        self.0
    }
}

impl From<bool> for ProxmoxBool {
    fn from(value: bool) -> Self {
        Self(value)
    }
}

impl From<ProxmoxBool> for bool {
    fn from(value: ProxmoxBool) -> Self {
        value.0
    }
}

impl Serialize for ProxmoxBool {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(u8::from(self.0))
    }
}

impl<'de> Deserialize<'de> for ProxmoxBool {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum BoolOrInt {
            Bool(bool),
            Int(u8),
            Str(String),
        }

        match BoolOrInt::deserialize(deserializer)? {
            BoolOrInt::Bool(b) => Ok(ProxmoxBool(b)),
            BoolOrInt::Int(0) => Ok(ProxmoxBool(false)),
            BoolOrInt::Int(1) => Ok(ProxmoxBool(true)),
            BoolOrInt::Str(s) if s == "0" => Ok(ProxmoxBool(false)),
            BoolOrInt::Str(s) if s == "1" => Ok(ProxmoxBool(true)),
            _ => Err(serde::de::Error::custom("expected 0 or 1")),
        }
    }
}

/// Accepts `100` as well as `"100"`
pub fn deserialize_u32_from_string_or_int<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrU32 {
        String(String),
        U32(u32),
    }

    match StringOrU32::deserialize(deserializer)? {
        StringOrU32::String(s) => s.trim().parse::<u32>().map_err(serde::de::Error::custom),
        StringOrU32::U32(u) => Ok(u),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiQueryParams {
    params: Vec<(String, String)>,
}

impl ApiQueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn add_optional<K: Into<String>, V: ToString>(mut self, key: K, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.params.push((key.into(), v.to_string()));
        }
        self
    }

    pub fn to_query_string(&self) -> String {
        if self.params.is_empty() {
            String::new()
        } else {
            format!(
                "?{}",
                self.params
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                    .collect::<Vec<_>>()
                    .join("&")
            )
        }
    }
}
