//! Fetch on-chain and off-chain metadata of finalized mints

use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{cancellable, MintError};
use crate::candy::{decode_metadata, instructions::metadata_pda, DecodeError};
use crate::metrics::metrics;
use crate::notify::{Notice, Notifier};
use crate::rpc::{ChainRpc, RpcManagerError};
use crate::structured_logging::StructuredLogger;
use crate::types::{FinalizedMint, MintedAsset};

#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("Metadata account missing for {0}")]
    MissingMetadata(String),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcManagerError),

    #[error("Metadata decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("HTTP error fetching {uri}: {message}")]
    Http { uri: String, message: String },

    #[error("Invalid metadata JSON at {uri}: {message}")]
    Json { uri: String, message: String },
}

/// Source of the off-chain JSON a metadata `uri` points at
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch_json(&self, uri: &str) -> Result<serde_json::Value, MaterializeError>;
}

/// [`MetadataFetcher`] over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
}

impl HttpMetadataFetcher {
    pub fn new(timeout: Duration) -> Result<Self, MaterializeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MaterializeError::Http {
                uri: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch_json(&self, uri: &str) -> Result<serde_json::Value, MaterializeError> {
        let http_err = |e: reqwest::Error| MaterializeError::Http {
            uri: uri.to_string(),
            message: e.to_string(),
        };
        let body = self
            .client
            .get(uri)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(http_err)?
            .bytes()
            .await
            .map_err(http_err)?;
        serde_json::from_slice(&body).map_err(|e| MaterializeError::Json {
            uri: uri.to_string(),
            message: e.to_string(),
        })
    }
}

async fn fetch_asset(
    rpc: &dyn ChainRpc,
    fetcher: &dyn MetadataFetcher,
    mint: &FinalizedMint,
) -> Result<MintedAsset, MaterializeError> {
    let data = rpc
        .account_data(&metadata_pda(&mint.mint))
        .await?
        .ok_or_else(|| MaterializeError::MissingMetadata(mint.mint.to_string()))?;
    let metadata = decode_metadata(&data)?;
    let off_chain_metadata = fetcher.fetch_json(&metadata.uri).await?;
    Ok(MintedAsset {
        mint: mint.mint,
        name: metadata.name,
        uri: metadata.uri,
        off_chain_metadata,
    })
}

/// Fetch every finalized asset concurrently
///
/// Assets that cannot be fetched are skipped with a notice; the result keeps
/// the order of `finalized`.
pub async fn materialize(
    rpc: &dyn ChainRpc,
    fetcher: &dyn MetadataFetcher,
    finalized: &[FinalizedMint],
    notifier: &dyn Notifier,
    logger: &StructuredLogger,
    cancel: &CancellationToken,
) -> Result<Vec<MintedAsset>, MintError> {
    let fetches = finalized.iter().map(|mint| fetch_asset(rpc, fetcher, mint));
    let results = cancellable(cancel, join_all(fetches)).await?;

    let mut assets = Vec::with_capacity(results.len());
    for (mint, result) in finalized.iter().zip(results) {
        match result {
            Ok(asset) => {
                logger.log_asset_fetched(&asset.mint, &asset.uri);
                assets.push(asset);
            }
            Err(err) => {
                warn!(mint = %mint.mint, error = %err, "Asset could not be fetched");
                metrics().metadata_failures.inc();
                notifier.notify(
                    Notice::info("Nft could not be fetched!")
                        .with_description("Please check your Wallet instead."),
                );
            }
        }
    }
    Ok(assets)
}
