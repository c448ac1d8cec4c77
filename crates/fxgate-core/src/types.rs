//! Core type definitions for JSON-RPC and cache reporting.
//!
//! # Type Categories
//!
//! ## JSON-RPC Protocol Types
//! - [`JsonRpcRequest`], [`JsonRpcResponse`], [`JsonRpcError`]: Protocol conformance
//! - [`CacheStatus`]: gateway extension reporting whether a read was served from cache
//!
//! ## Method Allowlist
//! - [`ALLOWED_METHODS`] / [`is_method_allowed`]: read-only methods the passthrough route forwards
//! - [`CACHEABLE_METHODS`] / [`is_method_cacheable`]: subset safe to memoize under the short TTL

use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    collections::HashSet,
    sync::LazyLock,
};

/// JSON-RPC protocol version constant to avoid repeated allocations.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for JSON-RPC version - zero allocation for static usage.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Read-only methods accepted by the generic passthrough route.
pub const ALLOWED_METHODS: &[&str] = &[
    "net_version",
    "eth_blockNumber",
    "eth_chainId",
    "eth_gasPrice",
    "eth_getBalance",
    "eth_getBlockByHash",
    "eth_getBlockByNumber",
    "eth_getTransactionByHash",
    "eth_getTransactionReceipt",
    "eth_getTransactionCount",
    "eth_getCode",
    "eth_call",
    "eth_estimateGas",
];

/// Methods whose results may be memoized for the short TTL.
///
/// `eth_call` and `eth_estimateGas` depend on caller-supplied payloads that are
/// rarely repeated, so caching them only grows the table.
pub const CACHEABLE_METHODS: &[&str] = &[
    "net_version",
    "eth_blockNumber",
    "eth_chainId",
    "eth_gasPrice",
    "eth_getBalance",
    "eth_getBlockByHash",
    "eth_getBlockByNumber",
    "eth_getTransactionByHash",
    "eth_getTransactionReceipt",
    "eth_getTransactionCount",
    "eth_getCode",
];

static ALLOWED_METHODS_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ALLOWED_METHODS.iter().copied().collect());

static CACHEABLE_METHODS_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| CACHEABLE_METHODS.iter().copied().collect());

/// Check if a method is in the allowed list (O(1) lookup)
#[inline]
#[must_use]
pub fn is_method_allowed(method: &str) -> bool {
    ALLOWED_METHODS_SET.contains(method)
}

#[inline]
#[must_use]
pub fn is_method_cacheable(method: &str) -> bool {
    CACHEABLE_METHODS_SET.contains(method)
}

/// Describes how a read was served.
///
/// Attached to handler results and surfaced as the `X-Cache-Status` response header.
///
/// # Example
///
/// ```
/// use fxgate_core::types::CacheStatus;
///
/// assert_eq!(CacheStatus::Hit.to_string(), "HIT");
/// assert_eq!(CacheStatus::Miss.to_string(), "MISS");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheStatus {
    /// Served from a live cache entry; no upstream call was made.
    Hit,
    /// Fetched from an upstream endpoint.
    Miss,
}

impl CacheStatus {
    /// Header value for `X-Cache-Status`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON-RPC 2.0 request structure.
///
/// # Example
///
/// ```
/// use fxgate_core::types::JsonRpcRequest;
/// use serde_json::json;
///
/// let request = JsonRpcRequest::new("eth_blockNumber", vec![], json!(1));
///
/// assert_eq!(request.method, "eth_blockNumber");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub id: serde_json::Value,
}

impl JsonRpcRequest {
    /// Creates a request with positional params. The version string is not allocated.
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        params: Vec<serde_json::Value>,
        id: serde_json::Value,
    ) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            method: method.into(),
            params: Some(serde_json::Value::Array(params)),
            id,
        }
    }

    /// Returns the positional params, treating a missing or non-array value as empty.
    #[must_use]
    pub fn positional_params(&self) -> Vec<serde_json::Value> {
        match &self.params {
            Some(serde_json::Value::Array(values)) => values.clone(),
            _ => Vec::new(),
        }
    }
}

/// JSON-RPC 2.0 response structure.
///
/// A response contains either a `result` or an `error`. Nodes legitimately return
/// `"result": null` (for example a receipt for a pending transaction), which
/// deserializes to `Some(Value::Null)`. A missing `result` key stays `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(default, deserialize_with = "deserialize_present", skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: serde_json::Value,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn success(result: serde_json::Value, id: serde_json::Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, result: Some(result), error: None, id }
    }

    #[must_use]
    pub fn error(code: i32, message: String, id: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            result: None,
            error: Some(JsonRpcError { code, message, data: None }),
            id,
        }
    }

    /// Splits the response into its result or error.
    ///
    /// `Ok(None)` means the node sent neither a `result` nor an `error`.
    ///
    /// # Errors
    ///
    /// Returns the embedded [`JsonRpcError`] when the node reported one.
    pub fn into_result(self) -> Result<Option<serde_json::Value>, JsonRpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result),
        }
    }
}

/// Maps a present field to `Some`, including an explicit `null`.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

/// JSON-RPC 2.0 error object.
///
/// Standard codes: `-32700` parse error, `-32600` invalid request, `-32601` method not
/// found, `-32602` invalid params, `-32603` internal error, `-32000..=-32099` server
/// defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}
