//! On-chain time, polled and shared through a watch channel

use solana_sdk::{commitment_config::CommitmentConfig, sysvar};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::candy::decode_clock_unix_timestamp;
use crate::metrics::metrics;
use crate::rpc::{ChainRpc, RpcManagerError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Current on-chain unix time
///
/// Block time of the current slot, or the clock sysvar when the node has no
/// block time for it yet.
pub async fn fetch_solana_time(rpc: &dyn ChainRpc) -> Result<i64, RpcManagerError> {
    let slot = rpc.slot(CommitmentConfig::confirmed()).await?;
    match rpc.block_time(slot).await {
        Ok(time) => Ok(time),
        Err(err) => {
            debug!(slot, error = %err, "Block time unavailable, reading clock sysvar");
            let data = rpc
                .account_data(&sysvar::clock::id())
                .await?
                .ok_or_else(|| RpcManagerError::Internal("clock sysvar missing".to_string()))?;
            decode_clock_unix_timestamp(&data)
                .map_err(|e| RpcManagerError::Internal(e.to_string()))
        }
    }
}

/// Background poller publishing on-chain time
pub struct TimeSource {
    rx: watch::Receiver<i64>,
    handle: JoinHandle<()>,
}

impl TimeSource {
    /// Fetch once immediately, then every `interval` until `cancel` fires
    pub fn spawn(rpc: Arc<dyn ChainRpc>, interval: Duration, cancel: CancellationToken) -> Self {
        let (tx, rx) = watch::channel(0i64);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let result = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = fetch_solana_time(rpc.as_ref()) => result,
                };
                match result {
                    Ok(time) => {
                        metrics().solana_time.set(time);
                        tx.send_replace(time);
                    }
                    // the previous value stays published
                    Err(err) => warn!(error = %err, "Failed to fetch solana time"),
                }
            }
            debug!("Time source stopped");
        });
        Self { rx, handle }
    }

    /// Latest published time, 0 before the first successful poll
    pub fn now(&self) -> i64 {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<i64> {
        self.rx.clone()
    }

    /// Wait for the poller to exit after cancellation
    pub async fn join(self) {
        if let Err(err) = self.handle.await {
            warn!(error = %err, "Time source task failed");
        }
    }
}
