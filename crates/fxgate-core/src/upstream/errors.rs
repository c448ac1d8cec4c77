use serde::Serialize;
use thiserror::Error;

/// Classification of JSON-RPC errors returned by a node.
///
/// The category decides whether the pool fails over:
/// - Client and execution errors are the caller's fault and are returned as-is
/// - Provider, parse and rate-limit errors are the node's problem and trigger failover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorCategory {
    /// Invalid request, method not found, invalid params.
    ClientError,
    /// Internal error or a server-range error that is not an execution failure.
    ProviderError,
    /// Limit exceeded (-32005).
    RateLimit,
    /// The node could not parse what we sent, or sent garbage back.
    ParseError,
    /// Reverts, out of gas, insufficient funds and similar call failures.
    ExecutionError,
}

impl RpcErrorCategory {
    /// Classifies a JSON-RPC error code and message into a category.
    ///
    /// Standard JSON-RPC error codes:
    /// - -32700: Parse error
    /// - -32600: Invalid Request
    /// - -32601: Method not found
    /// - -32602: Invalid params
    /// - -32603: Internal error
    /// - -32005: Limit exceeded
    /// - -32000 to -32099: Server errors (classified by message)
    #[must_use]
    pub fn from_code_and_message(code: i32, message: &str) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32602..=-32600 => Self::ClientError,
            -32603 => Self::ProviderError,
            -32005 => Self::RateLimit,
            -32099..=-32000 => {
                let message_lower = message.to_lowercase();
                if message_lower.contains("execution reverted") ||
                    message_lower.contains("out of gas") ||
                    message_lower.contains("revert") ||
                    message_lower.contains("insufficient funds") ||
                    message_lower.contains("nonce too low") ||
                    message_lower.contains("gas too low")
                {
                    Self::ExecutionError
                } else {
                    Self::ProviderError
                }
            }
            _ => Self::ProviderError,
        }
    }

    /// Returns `true` when every node would answer the same way.
    #[must_use]
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::ClientError | Self::ExecutionError)
    }

    /// Returns a static string representation for metrics labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientError => "client_error",
            Self::ProviderError => "provider_error",
            Self::RateLimit => "rate_limit",
            Self::ParseError => "parse_error",
            Self::ExecutionError => "execution_error",
        }
    }
}

/// One failed attempt recorded while walking the endpoint list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointFailure {
    pub url: String,
    pub reason: String,
}

impl std::fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.url, self.reason)
    }
}

/// Errors that can occur when calling upstream RPC nodes.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// A single attempt exceeded the per-endpoint timeout.
    #[error("Request timeout")]
    Timeout,

    /// Failed to establish a connection to the endpoint.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Non-2xx HTTP status. Fields are the status code and a truncated body.
    #[error("HTTP error {0}: {1}")]
    HttpError(u16, String),

    /// JSON-RPC error object returned by the node. Fields are the code and message.
    #[error("RPC error {0}: {1}")]
    RpcError(i32, String),

    /// Network-level error from the underlying HTTP client.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response could not be parsed as a JSON-RPC response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be serialized.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The pool was built without any endpoints.
    #[error("No RPC endpoints configured")]
    NoEndpoints,

    /// Every configured endpoint failed. Attempts are listed in the order tried.
    #[error("All RPC endpoints failed: {}", format_attempts(.attempts))]
    Unavailable { attempts: Vec<EndpointFailure> },
}

fn format_attempts(attempts: &[EndpointFailure]) -> String {
    attempts.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl UpstreamError {
    /// Returns the RPC error category if this is an RPC error.
    #[must_use]
    pub fn rpc_category(&self) -> Option<RpcErrorCategory> {
        match self {
            Self::RpcError(code, message) => {
                Some(RpcErrorCategory::from_code_and_message(*code, message))
            }
            _ => None,
        }
    }

    /// Returns `true` if trying another endpoint could produce a different answer.
    ///
    /// Client-fault RPC errors and unserializable requests are the only failures that
    /// are returned immediately; everything else moves on to the next endpoint.
    #[must_use]
    pub fn should_failover(&self) -> bool {
        match self {
            Self::InvalidRequest(_) | Self::NoEndpoints | Self::Unavailable { .. } => false,
            Self::RpcError(_, _) => self.rpc_category().is_some_and(|cat| !cat.is_client_fault()),
            _ => true,
        }
    }

    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailed(_) | Self::Network(_) => "connection",
            Self::HttpError(_, _) => "http",
            Self::RpcError(_, _) => {
                self.rpc_category().map_or("rpc", |category| category.as_str())
            }
            Self::InvalidResponse(_) => "invalid_response",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NoEndpoints => "no_endpoints",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}
