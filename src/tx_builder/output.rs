//! Mint batch output
//!
//! A batch holds unsigned v0 messages, each paired with the fresh keypair of
//! the asset it mints. The asset keypair co-signs the message at signing time.

use solana_sdk::{
    message::VersionedMessage,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};

use crate::rpc::BlockhashInfo;

/// One unsigned mint transaction
pub struct UnsignedMint {
    pub message: VersionedMessage,
    pub asset: Keypair,
}

impl UnsignedMint {
    pub fn asset_mint(&self) -> Pubkey {
        self.asset.pubkey()
    }
}

impl std::fmt::Debug for UnsignedMint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsignedMint")
            .field("asset", &self.asset.pubkey())
            .field("blockhash", self.message.recent_blockhash())
            .finish()
    }
}

/// Ordered mint transactions sharing one blockhash and compute ceiling
#[derive(Debug)]
pub struct MintBatch {
    pub txs: Vec<UnsignedMint>,
    pub blockhash: BlockhashInfo,
    pub cu_limit: u32,
}

impl MintBatch {
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    pub fn asset_mints(&self) -> Vec<Pubkey> {
        self.txs.iter().map(UnsignedMint::asset_mint).collect()
    }
}
