use solana_client::client_error::ClientError;
use thiserror::Error;

/// RPC layer error types
#[derive(Debug, Clone, Error)]
pub enum RpcManagerError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded { endpoint: String },

    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    #[error("Transaction expired (endpoint: {endpoint})")]
    TransactionExpired { endpoint: String },

    #[error("Insufficient funds (endpoint: {endpoint})")]
    InsufficientFunds { endpoint: String },

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RpcManagerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcManagerError::Transport { .. } => true,
            RpcManagerError::Timeout { .. } => true,
            RpcManagerError::RateLimitExceeded { .. } => true,
            RpcManagerError::BlockhashNotFound { .. } => true,

            RpcManagerError::TransactionExpired { .. } => false,
            RpcManagerError::InsufficientFunds { .. } => false,
            RpcManagerError::Internal(_) => false,

            // Retry on server errors (5xx)
            RpcManagerError::RpcResponse { code, .. } => {
                matches!(code, Some(c) if (500..600).contains(c))
            }
        }
    }

    /// Get the error category for metrics and logs
    pub fn category(&self) -> &'static str {
        match self {
            RpcManagerError::Transport { .. } => "transport",
            RpcManagerError::Timeout { .. } => "timeout",
            RpcManagerError::RpcResponse { .. } => "response",
            RpcManagerError::RateLimitExceeded { .. } => "rate_limit",
            RpcManagerError::BlockhashNotFound { .. } => "blockhash",
            RpcManagerError::TransactionExpired { .. } => "expired",
            RpcManagerError::InsufficientFunds { .. } => "funds",
            RpcManagerError::Internal(_) => "internal",
        }
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: ClientError, endpoint: &str) -> Self {
        Self::classify(&err.to_string(), endpoint)
    }

    /// Classify an error message returned by a node
    pub fn classify(message: &str, endpoint: &str) -> Self {
        let err_str = message.to_lowercase();
        let endpoint = endpoint.to_string();

        if err_str.contains("blockhash not found") {
            RpcManagerError::BlockhashNotFound { endpoint }
        } else if err_str.contains("transaction expired")
            || err_str.contains("block height exceeded")
        {
            RpcManagerError::TransactionExpired { endpoint }
        } else if err_str.contains("insufficient funds")
            || err_str.contains("insufficient lamports")
        {
            RpcManagerError::InsufficientFunds { endpoint }
        } else if err_str.contains("rate limit")
            || err_str.contains("too many requests")
            || err_str.contains("429")
        {
            RpcManagerError::RateLimitExceeded { endpoint }
        } else if err_str.contains("timeout") || err_str.contains("timed out") {
            RpcManagerError::Timeout {
                endpoint,
                timeout_ms: 0,
            }
        } else if err_str.contains("connection") || err_str.contains("dns") {
            RpcManagerError::Transport {
                endpoint,
                message: message.to_string(),
            }
        } else {
            let code = err_str
                .split("code:")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_end_matches(',').parse::<i64>().ok());

            RpcManagerError::RpcResponse {
                endpoint,
                message: message.to_string(),
                code,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(RpcManagerError::Transport {
            endpoint: "test".to_string(),
            message: "connection failed".to_string(),
        }
        .is_retryable());

        assert!(RpcManagerError::Timeout {
            endpoint: "test".to_string(),
            timeout_ms: 5000,
        }
        .is_retryable());

        assert!(!RpcManagerError::Internal("bad length".to_string()).is_retryable());
        assert!(!RpcManagerError::TransactionExpired {
            endpoint: "test".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_classify_messages() {
        let err = RpcManagerError::classify("Blockhash not found", "devnet");
        assert!(matches!(err, RpcManagerError::BlockhashNotFound { .. }));

        let err = RpcManagerError::classify("HTTP status 429 Too Many Requests", "devnet");
        assert!(matches!(err, RpcManagerError::RateLimitExceeded { .. }));

        let err = RpcManagerError::classify("insufficient lamports 10, need 20", "devnet");
        assert_eq!(err.category(), "funds");

        let err = RpcManagerError::classify("server said code: 503 unavailable", "devnet");
        assert!(err.is_retryable());
    }
}
