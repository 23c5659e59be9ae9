//! Finality polling for submitted mints
//!
//! Signatures are polled together until each one reached the target
//! commitment or failed, or until the batch blockhash can no longer land.
//! The expiry check reads the block height at `finalized`, which trails the
//! tip, so transactions that landed before expiry get time to finalize.

use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{cancellable, MintError};
use crate::metrics::metrics;
use crate::rpc::{BlockhashInfo, ChainRpc, SignatureStatus};
use crate::types::FinalizedMint;

/// Hard bound on one polling run, independent of block height reads
pub const MAX_FINALITY_WAIT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tracked {
    Pending,
    Finalized,
    Dropped,
}

/// Poll `submitted` until every signature settled or `blockhash` expired
///
/// Returns the finalized subset in input order. Failed and expired
/// signatures are logged and left out.
pub async fn verify_finality(
    rpc: &dyn ChainRpc,
    submitted: &[(Pubkey, Signature)],
    blockhash: &BlockhashInfo,
    commitment: CommitmentConfig,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<FinalizedMint>, MintError> {
    if submitted.is_empty() {
        return Ok(Vec::new());
    }

    let started = Instant::now();
    let mut tracked = vec![Tracked::Pending; submitted.len()];

    loop {
        let pending: Vec<usize> = (0..submitted.len())
            .filter(|&i| tracked[i] == Tracked::Pending)
            .collect();
        let signatures: Vec<Signature> = pending.iter().map(|&i| submitted[i].1).collect();

        match cancellable(cancel, rpc.signature_statuses(&signatures, commitment)).await? {
            Ok(statuses) => {
                for (&i, status) in pending.iter().zip(statuses) {
                    match status {
                        SignatureStatus::Pending => {}
                        SignatureStatus::Reached => {
                            debug!(signature = %submitted[i].1, "Transaction finalized");
                            tracked[i] = Tracked::Finalized;
                        }
                        SignatureStatus::Failed(err) => {
                            debug!(signature = %submitted[i].1, error = %err, "Transaction failed");
                            tracked[i] = Tracked::Dropped;
                        }
                    }
                }
            }
            Err(err) => warn!(error = %err, "Signature status poll failed"),
        }

        if !tracked.contains(&Tracked::Pending) {
            break;
        }

        let expired = match cancellable(cancel, rpc.block_height(CommitmentConfig::finalized()))
            .await?
        {
            Ok(height) => height > blockhash.last_valid_block_height,
            Err(err) => {
                warn!(error = %err, "Block height poll failed");
                false
            }
        };
        if expired || started.elapsed() >= MAX_FINALITY_WAIT {
            for (i, state) in tracked.iter_mut().enumerate() {
                if *state == Tracked::Pending {
                    debug!(signature = %submitted[i].1, "Blockhash expired before finality");
                    *state = Tracked::Dropped;
                }
            }
            break;
        }

        cancellable(cancel, tokio::time::sleep(poll_interval)).await?;
    }

    metrics()
        .finality_latency
        .observe(started.elapsed().as_secs_f64());

    Ok(submitted
        .iter()
        .zip(&tracked)
        .filter(|(_, state)| **state == Tracked::Finalized)
        .map(|((mint, signature), _)| FinalizedMint {
            mint: *mint,
            signature: *signature,
        })
        .collect())
}
