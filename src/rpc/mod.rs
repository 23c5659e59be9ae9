//! RPC Module
//!
//! The chain-facing seam of the client. Everything the mint flow needs from a
//! node goes through [`ChainRpc`], so the flow can be driven by a scripted
//! implementation in tests and by [`SolanaRpc`] in production.

use async_trait::async_trait;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};

pub mod rpc_errors;
pub mod solana_rpc;

pub use rpc_errors::RpcManagerError;
pub use solana_rpc::SolanaRpc;

pub type RpcResult<T> = Result<T, RpcManagerError>;

/// A blockhash together with the last block height at which transactions
/// built against it are still accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockhashInfo {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Result of a simulation run
#[derive(Debug, Clone, Default)]
pub struct SimulationReport {
    pub units_consumed: Option<u64>,
    pub err: Option<String>,
    pub logs: Vec<String>,
}

/// Where a submitted signature stands relative to a target commitment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Unknown to the node or not yet at the target commitment
    Pending,
    /// Reached the target commitment without error
    Reached,
    /// Landed with an execution error
    Failed(String),
}

/// Chain access used by the mint flow
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Latest blockhash and its validity window at `commitment`
    async fn latest_blockhash(&self, commitment: CommitmentConfig) -> RpcResult<BlockhashInfo>;

    /// Current block height at `commitment`
    async fn block_height(&self, commitment: CommitmentConfig) -> RpcResult<u64>;

    /// Current slot at `commitment`
    async fn slot(&self, commitment: CommitmentConfig) -> RpcResult<u64>;

    /// Estimated production time of `slot`, unix seconds
    async fn block_time(&self, slot: u64) -> RpcResult<i64>;

    /// Simulate without signature verification
    async fn simulate(&self, tx: &VersionedTransaction) -> RpcResult<SimulationReport>;

    /// Submit a signed transaction (preflight skipped, one node-side retry)
    async fn send(&self, tx: &VersionedTransaction) -> RpcResult<Signature>;

    /// One status per input signature, in input order
    async fn signature_statuses(
        &self,
        signatures: &[Signature],
        commitment: CommitmentConfig,
    ) -> RpcResult<Vec<SignatureStatus>>;

    /// Raw account data, `None` when the account does not exist
    async fn account_data(&self, address: &Pubkey) -> RpcResult<Option<Vec<u8>>>;

    /// Lamport balance
    async fn balance(&self, address: &Pubkey) -> RpcResult<u64>;

    /// Raw data of every SPL token account owned by `owner`
    async fn token_accounts(&self, owner: &Pubkey) -> RpcResult<Vec<Vec<u8>>>;
}
