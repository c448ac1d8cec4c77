use crate::types::{is_method_allowed, JsonRpcRequest};

const ADDRESS_HEX_LEN: usize = 40;
const TX_HASH_HEX_LEN: usize = 64;

/// Errors raised before any cache or upstream work is done.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// JSON-RPC version is not "2.0".
    #[error("Invalid JSON-RPC version: {0}")]
    InvalidVersion(String),

    /// Method name contains characters other than alphanumerics and underscores.
    #[error("Invalid method name: {0}")]
    InvalidMethod(String),

    /// Requested method is not in the passthrough allowlist.
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Block parameter is not a block tag or a hex number.
    #[error("Invalid block parameter: {0}")]
    InvalidBlockParameter(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid transaction hash: {0}")]
    InvalidTxHash(String),

    /// Signed transaction is not non-empty, even-length `0x` hex.
    #[error("Invalid transaction format: {0}")]
    InvalidRawTransaction(String),
}

fn is_prefixed_hex(value: &str, hex_len: usize) -> bool {
    value
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == hex_len && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Checks that `address` is `0x` followed by exactly 40 hex digits (either case).
///
/// # Errors
///
/// Returns [`ValidationError::InvalidAddress`] otherwise.
pub fn validate_address(address: &str) -> Result<(), ValidationError> {
    if is_prefixed_hex(address, ADDRESS_HEX_LEN) {
        Ok(())
    } else {
        Err(ValidationError::InvalidAddress(address.to_string()))
    }
}

/// Checks that `hash` is `0x` followed by exactly 64 hex digits.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidTxHash`] otherwise.
pub fn validate_tx_hash(hash: &str) -> Result<(), ValidationError> {
    if is_prefixed_hex(hash, TX_HASH_HEX_LEN) {
        Ok(())
    } else {
        Err(ValidationError::InvalidTxHash(hash.to_string()))
    }
}

/// Checks that `raw` is a `0x`-prefixed, non-empty, even-length hex string.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidRawTransaction`] naming the first problem found.
pub fn validate_raw_transaction(raw: &str) -> Result<(), ValidationError> {
    let Some(hex) = raw.strip_prefix("0x") else {
        return Err(ValidationError::InvalidRawTransaction("missing 0x prefix".to_string()));
    };
    if hex.is_empty() {
        return Err(ValidationError::InvalidRawTransaction("empty payload".to_string()));
    }
    if hex.len() % 2 != 0 {
        return Err(ValidationError::InvalidRawTransaction("odd number of hex digits".to_string()));
    }
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidRawTransaction("non-hex characters".to_string()));
    }
    Ok(())
}

impl JsonRpcRequest {
    /// Validates a passthrough request.
    ///
    /// Checks the version, the method name format, the allowlist, and the block
    /// parameter of methods that take one in first position.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.jsonrpc != "2.0" {
            return Err(ValidationError::InvalidVersion(self.jsonrpc.to_string()));
        }

        if self.method.is_empty() || !self.method.chars().all(|c| c.is_alphanumeric() || c == '_')
        {
            return Err(ValidationError::InvalidMethod(self.method.clone()));
        }

        if !is_method_allowed(&self.method) {
            return Err(ValidationError::MethodNotAllowed(self.method.clone()));
        }

        if let Some(params) = &self.params {
            self.validate_params_for_method(params)?;
        }

        Ok(())
    }

    fn validate_params_for_method(&self, params: &serde_json::Value) -> Result<(), ValidationError> {
        let positional = params.as_array();

        match self.method.as_str() {
            "eth_getBlockByNumber" => {
                if let Some(block_param) = positional.and_then(|a| a.first()) {
                    Self::validate_block_parameter(block_param)?;
                }
            }
            "eth_getBalance" | "eth_getTransactionCount" | "eth_getCode" => {
                if let Some(address) = positional.and_then(|a| a.first()).and_then(|v| v.as_str()) {
                    validate_address(address)?;
                }
                if let Some(block_param) = positional.and_then(|a| a.get(1)) {
                    Self::validate_block_parameter(block_param)?;
                }
            }
            "eth_getTransactionReceipt" | "eth_getTransactionByHash" => {
                if let Some(hash) = positional.and_then(|a| a.first()).and_then(|v| v.as_str()) {
                    validate_tx_hash(hash)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Accepts block tags or `0x` hex numbers of at most 66 characters.
    fn validate_block_parameter(param: &serde_json::Value) -> Result<(), ValidationError> {
        if let Some(block_str) = param.as_str() {
            const VALID_TAGS: &[&str] = &["latest", "earliest", "pending", "safe", "finalized"];

            if VALID_TAGS.contains(&block_str) {
                return Ok(());
            }

            let valid_hex = block_str.strip_prefix("0x").is_some_and(|hex| {
                !hex.is_empty() && hex.len() <= 66 && hex.chars().all(|c| c.is_ascii_hexdigit())
            });
            if !valid_hex {
                return Err(ValidationError::InvalidBlockParameter(block_str.to_string()));
            }
        }
        Ok(())
    }
}
