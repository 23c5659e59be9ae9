//! The mint flow, from resolved guard to displayed assets
//!
//! - **submit**: sign and send a batch, one outcome per transaction
//! - **finality**: poll signatures until finalized or the blockhash expires
//! - **materialize**: fetch metadata of the finalized assets
//! - **coordinator**: the end-to-end flow with notices and cleanup

use solana_sdk::{pubkey::Pubkey, signer::SignerError};
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::candy::DecodeError;
use crate::guards::GuardError;
use crate::rpc::RpcManagerError;
use crate::tx_builder::TransactionBuilderError;

pub mod coordinator;
pub mod finality;
pub mod materialize;
pub mod submit;

pub use crate::config::AllowListPolicy;
pub use coordinator::{load_drop, DropState, MintCoordinator, MintReport, MintSettings, MintSummary};
pub use finality::{verify_finality, MAX_FINALITY_WAIT};
pub use materialize::{materialize, HttpMetadataFetcher, MaterializeError, MetadataFetcher};
pub use submit::{sign_all, submit_batch, SignedMint};

/// Errors that abort a mint flow
#[derive(Error, Debug)]
pub enum MintError {
    #[error("Mint cancelled")]
    Cancelled,

    #[error("Allow list approval failed")]
    AllowListFailed,

    #[error("Account {0} not found")]
    MissingAccount(Pubkey),

    #[error("Build error: {0}")]
    Build(#[from] TransactionBuilderError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcManagerError),

    #[error("Account decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Guard error: {0}")]
    Guard(#[from] GuardError),

    #[error("Signing failed: {0}")]
    Signing(#[from] SignerError),
}

impl MintError {
    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::AllowListFailed => "allow_list",
            Self::MissingAccount(_) => "missing_account",
            Self::Build(err) => err.category(),
            Self::Rpc(err) => err.category(),
            Self::Decode(_) => "decode",
            Self::Guard(_) => "guard",
            Self::Signing(_) => "signing",
        }
    }
}

/// Await `fut` unless `cancel` fires first
pub async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, MintError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MintError::Cancelled),
        output = fut => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancellable() {
        let cancel = CancellationToken::new();
        assert_eq!(cancellable(&cancel, async { 7 }).await.unwrap(), 7);

        cancel.cancel();
        let result = cancellable(&cancel, std::future::pending::<()>()).await;
        assert!(matches!(result, Err(MintError::Cancelled)));
    }

    #[test]
    fn test_categories() {
        assert_eq!(MintError::Cancelled.category(), "cancelled");
        assert_eq!(
            MintError::from(TransactionBuilderError::Configuration("x".to_string())).category(),
            "config"
        );
    }
}
