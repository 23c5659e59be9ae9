//! Signing and concurrent submission of a mint batch

use futures::future::join_all;
use solana_sdk::{pubkey::Pubkey, signer::SignerError, transaction::VersionedTransaction};

use crate::metrics::metrics;
use crate::rpc::ChainRpc;
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::MintBatch;
use crate::types::{Outcome, SubmissionOutcome};
use crate::wallet::WalletManager;

/// A signed mint transaction and the asset it creates
#[derive(Debug, Clone)]
pub struct SignedMint {
    pub tx: VersionedTransaction,
    pub asset: Pubkey,
}

/// Sign every message as fee payer and with its asset keypair
pub fn sign_all(wallet: &WalletManager, batch: MintBatch) -> Result<Vec<SignedMint>, SignerError> {
    batch
        .txs
        .into_iter()
        .map(|unsigned| {
            let asset = unsigned.asset_mint();
            let tx = wallet.sign(unsigned.message, &[&unsigned.asset])?;
            Ok(SignedMint { tx, asset })
        })
        .collect()
}

/// Send all transactions concurrently
///
/// Returns one outcome per input, in input order. Individual failures are
/// recorded in the outcome and never abort the batch.
pub async fn submit_batch(
    rpc: &dyn ChainRpc,
    signed: &[SignedMint],
    logger: &StructuredLogger,
) -> Vec<SubmissionOutcome> {
    let sends = signed.iter().enumerate().map(|(idx, mint)| async move {
        let index = idx + 1;
        match rpc.send(&mint.tx).await {
            Ok(signature) => {
                metrics().sends_accepted.inc();
                logger.log_send_success(index, &signature);
                Outcome::Succeeded(signature)
            }
            Err(err) => {
                metrics().sends_rejected.inc();
                logger.log_send_failure(index, &err.to_string());
                Outcome::Failed(err.to_string())
            }
        }
    });
    join_all(sends).await
}
