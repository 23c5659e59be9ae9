//! Candy Mint - Solana candy machine minting client
//!
//! Reads a candy machine drop, decides which sale groups the connected
//! wallet may mint from, and mints in batches against a single blockhash.

pub mod candy;
pub mod config;
pub mod countdown;
pub mod guards;
pub mod metrics;
pub mod mint;
pub mod notify;
pub mod observability;
pub mod rpc;
pub mod structured_logging;
pub mod test_utils;
pub mod time_source;
pub mod tx_builder;
pub mod types;
pub mod wallet;

// Re-export commonly used types
pub use solana_sdk::{message::VersionedMessage, pubkey::Pubkey, signature::Signature};
