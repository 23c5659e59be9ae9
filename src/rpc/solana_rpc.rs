//! [`ChainRpc`] over the nonblocking `solana-client` RPC client

use async_trait::async_trait;
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::config::{
    RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcRequestAirdropConfig,
    RpcSendTransactionConfig, RpcSimulateTransactionConfig,
};
use solana_rpc_client_api::filter::{Memcmp, RpcFilterType};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use solana_transaction_status::{TransactionConfirmationStatus, TransactionStatus};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use super::{BlockhashInfo, ChainRpc, RpcManagerError, RpcResult, SignatureStatus, SimulationReport};
use crate::candy::accounts::TOKEN_ACCOUNT_SIZE;

/// Offset of the owner in an SPL token account
const TOKEN_OWNER_OFFSET: usize = 32;

/// Largest batch `getSignatureStatuses` accepts
const MAX_STATUS_BATCH: usize = 256;

/// Production RPC access
#[derive(Clone)]
pub struct SolanaRpc {
    client: Arc<RpcClient>,
    endpoint: String,
    max_retries: usize,
}

impl std::fmt::Debug for SolanaRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpc")
            .field("endpoint", &self.endpoint)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl SolanaRpc {
    pub fn new(url: &str, timeout: Duration, max_retries: usize) -> Self {
        let client = RpcClient::new_with_timeout_and_commitment(
            url.to_string(),
            timeout,
            CommitmentConfig::finalized(),
        );
        Self {
            client: Arc::new(client),
            endpoint: url.to_string(),
            max_retries,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_err(&self, err: solana_client::client_error::ClientError) -> RpcManagerError {
        RpcManagerError::from_client_error(err, &self.endpoint)
    }

    /// Run a read with jittered exponential backoff on retryable errors
    async fn with_retry<T, F, Fut>(&self, op: &'static str, action: F) -> RpcResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RpcResult<T>>,
    {
        let strategy = ExponentialBackoff::from_millis(100)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(self.max_retries);

        RetryIf::start(strategy, action, |err: &RpcManagerError| {
            let retry = err.is_retryable();
            if retry {
                debug!(op, error = %err, "Retrying RPC call");
            }
            retry
        })
        .await
    }

    /// Request lamports on a test cluster and wait for `commitment`
    pub async fn request_airdrop(
        &self,
        recipient: &Pubkey,
        lamports: u64,
        commitment: CommitmentConfig,
        timeout: Duration,
    ) -> RpcResult<Signature> {
        let signature = self
            .client
            .request_airdrop_with_config(
                recipient,
                lamports,
                RpcRequestAirdropConfig {
                    recent_blockhash: None,
                    commitment: Some(commitment),
                },
            )
            .await
            .map_err(|e| self.map_err(e))?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let confirmed = self
                .client
                .confirm_transaction_with_commitment(&signature, commitment)
                .await
                .map_err(|e| self.map_err(e))?
                .value;
            if confirmed {
                return Ok(signature);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(RpcManagerError::Timeout {
                    endpoint: self.endpoint.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

fn status_against(status: Option<TransactionStatus>, commitment: CommitmentConfig) -> SignatureStatus {
    let Some(status) = status else {
        return SignatureStatus::Pending;
    };
    if let Some(err) = &status.err {
        return SignatureStatus::Failed(err.to_string());
    }
    // the reported level wins; `confirmations` only decides for old nodes
    let level = status.confirmation_status();
    let reached = match commitment.commitment {
        CommitmentLevel::Finalized => level == TransactionConfirmationStatus::Finalized,
        CommitmentLevel::Confirmed => level != TransactionConfirmationStatus::Processed,
        _ => true,
    };
    if reached {
        SignatureStatus::Reached
    } else {
        SignatureStatus::Pending
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    async fn latest_blockhash(&self, commitment: CommitmentConfig) -> RpcResult<BlockhashInfo> {
        self.with_retry("latest_blockhash", || async move {
            let (blockhash, last_valid_block_height) = self
                .client
                .get_latest_blockhash_with_commitment(commitment)
                .await
                .map_err(|e| self.map_err(e))?;
            Ok(BlockhashInfo {
                blockhash,
                last_valid_block_height,
            })
        })
        .await
    }

    async fn block_height(&self, commitment: CommitmentConfig) -> RpcResult<u64> {
        self.with_retry("block_height", || async move {
            self.client
                .get_block_height_with_commitment(commitment)
                .await
                .map_err(|e| self.map_err(e))
        })
        .await
    }

    async fn slot(&self, commitment: CommitmentConfig) -> RpcResult<u64> {
        self.with_retry("slot", || async move {
            self.client
                .get_slot_with_commitment(commitment)
                .await
                .map_err(|e| self.map_err(e))
        })
        .await
    }

    async fn block_time(&self, slot: u64) -> RpcResult<i64> {
        self.with_retry("block_time", || async move {
            self.client
                .get_block_time(slot)
                .await
                .map_err(|e| self.map_err(e))
        })
        .await
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> RpcResult<SimulationReport> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(CommitmentConfig::finalized()),
            ..Default::default()
        };
        let result = self
            .client
            .simulate_transaction_with_config(tx, config)
            .await
            .map_err(|e| self.map_err(e))?
            .value;

        Ok(SimulationReport {
            units_consumed: result.units_consumed,
            err: result.err.map(|e| e.to_string()),
            logs: result.logs.unwrap_or_default(),
        })
    }

    async fn send(&self, tx: &VersionedTransaction) -> RpcResult<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            preflight_commitment: Some(CommitmentLevel::Finalized),
            max_retries: Some(1),
            ..Default::default()
        };
        self.client
            .send_transaction_with_config(tx, config)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn signature_statuses(
        &self,
        signatures: &[Signature],
        commitment: CommitmentConfig,
    ) -> RpcResult<Vec<SignatureStatus>> {
        let mut statuses = Vec::with_capacity(signatures.len());
        for chunk in signatures.chunks(MAX_STATUS_BATCH) {
            let response = self
                .with_retry("signature_statuses", || async move {
                    self.client
                        .get_signature_statuses(chunk)
                        .await
                        .map_err(|e| self.map_err(e))
                })
                .await?;

            if response.value.len() != chunk.len() {
                warn!(
                    expected = chunk.len(),
                    got = response.value.len(),
                    "Status response length mismatch"
                );
                return Err(RpcManagerError::Internal(
                    "signature status response length mismatch".to_string(),
                ));
            }
            statuses.extend(
                response
                    .value
                    .into_iter()
                    .map(|status| status_against(status, commitment)),
            );
        }
        Ok(statuses)
    }

    async fn account_data(&self, address: &Pubkey) -> RpcResult<Option<Vec<u8>>> {
        self.with_retry("account_data", || async move {
            let response = self
                .client
                .get_account_with_commitment(address, CommitmentConfig::confirmed())
                .await
                .map_err(|e| self.map_err(e))?;
            Ok(response.value.map(|account| account.data))
        })
        .await
    }

    async fn balance(&self, address: &Pubkey) -> RpcResult<u64> {
        self.with_retry("balance", || async move {
            self.client
                .get_balance_with_commitment(address, CommitmentConfig::confirmed())
                .await
                .map(|response| response.value)
                .map_err(|e| self.map_err(e))
        })
        .await
    }

    async fn token_accounts(&self, owner: &Pubkey) -> RpcResult<Vec<Vec<u8>>> {
        self.with_retry("token_accounts", || async move {
            let config = RpcProgramAccountsConfig {
                filters: Some(vec![
                    RpcFilterType::DataSize(TOKEN_ACCOUNT_SIZE as u64),
                    RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
                        TOKEN_OWNER_OFFSET,
                        owner.as_ref(),
                    )),
                ]),
                account_config: RpcAccountInfoConfig {
                    encoding: Some(UiAccountEncoding::Base64),
                    commitment: Some(CommitmentConfig::confirmed()),
                    ..Default::default()
                },
                ..Default::default()
            };
            let accounts = self
                .client
                .get_program_accounts_with_config(&spl_token::id(), config)
                .await
                .map_err(|e| self.map_err(e))?;
            debug!(owner = %owner, accounts = accounts.len(), "Token accounts fetched");
            Ok(accounts.into_iter().map(|(_, account)| account.data).collect())
        })
        .await
    }
}
