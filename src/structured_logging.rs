//! Structured logging for mint flow events

use solana_sdk::{pubkey::Pubkey, signature::Signature};

use crate::observability::TraceContext;

/// Structured logger bound to one mint flow
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context_id: String,
}

impl StructuredLogger {
    pub fn new(context_id: String) -> Self {
        Self { context_id }
    }

    pub fn for_trace(trace: &TraceContext) -> Self {
        Self::new(trace.correlation_id().to_string())
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn log_mint_started(&self, label: &str, requested: u64, amount: u64) {
        tracing::info!(
            context_id = %self.context_id,
            label = %label,
            requested,
            amount,
            "Mint started"
        );
    }

    pub fn log_batch_built(&self, tx_count: usize, cu_limit: u32, blockhash: &str) {
        tracing::info!(
            context_id = %self.context_id,
            tx_count,
            cu_limit,
            blockhash = %blockhash,
            "Mint batch built"
        );
    }

    /// `index` is 1-based
    pub fn log_send_success(&self, index: usize, signature: &Signature) {
        tracing::info!(
            context_id = %self.context_id,
            index,
            signature = %signature,
            "Transaction sent"
        );
    }

    /// `index` is 1-based
    pub fn log_send_failure(&self, index: usize, error: &str) {
        tracing::warn!(
            context_id = %self.context_id,
            index,
            error = %error,
            "Transaction failed to send"
        );
    }

    pub fn log_finalized(&self, finalized: usize, submitted: usize, latency_ms: u64) {
        tracing::info!(
            context_id = %self.context_id,
            finalized,
            submitted,
            latency_ms,
            "Batch finality settled"
        );
    }

    pub fn log_asset_fetched(&self, mint: &Pubkey, uri: &str) {
        tracing::debug!(
            context_id = %self.context_id,
            mint = %mint,
            uri = %uri,
            "Minted asset fetched"
        );
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(
            context_id = %self.context_id,
            message = %message,
            "Warning"
        );
    }

    pub fn error(&self, message: &str) {
        tracing::error!(
            context_id = %self.context_id,
            message = %message,
            "Error"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_uses_correlation_id() {
        let trace = TraceContext::new("mint");
        let logger = StructuredLogger::for_trace(&trace);
        assert_eq!(logger.context_id(), trace.correlation_id().as_str());
        logger.log_send_failure(2, "blockhash not found");
    }
}
