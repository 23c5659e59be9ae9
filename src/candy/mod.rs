//! Candy machine and candy guard account codecs and instructions
//!
//! The drop's on-chain state is read straight from account data:
//! - **accounts**: candy machine, candy guard, token metadata, lookup tables
//! - **guard_set**: the guard rule set carried by the default guard and groups
//! - **instructions**: `mint_v2` and `route` for the candy guard program
//!
//! Only the fixed prefixes this client needs are decoded.

use solana_sdk::{pubkey, pubkey::Pubkey};
use thiserror::Error;

pub mod accounts;
pub mod guard_set;
pub mod instructions;

pub use accounts::{
    decode_candy_guard, decode_candy_machine, decode_clock_unix_timestamp, decode_lookup_table,
    decode_metadata, decode_mint_counter, decode_token_account, decode_token_amount, CandyGuard,
    CandyMachine, Metadata, TokenHolding,
};
pub use guard_set::{GuardSet, SaleGroup};
pub use instructions::{
    mint_args_builder, mint_v2_instruction, route_allow_list_instruction, MintArgs,
    MintV2Accounts,
};

pub const CANDY_MACHINE_PROGRAM_ID: Pubkey = pubkey!("CndyV3LdqHUfDLmE5naZjVN8rBZz4tqhdefbAnjHG3JR");
pub const CANDY_GUARD_PROGRAM_ID: Pubkey = pubkey!("Guard1JwRhJkVH6XZhzoYxeBVQe872VH6QggF4BWmS9g");
pub const TOKEN_METADATA_PROGRAM_ID: Pubkey = pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");
pub const AUTHORIZATION_RULES_PROGRAM_ID: Pubkey =
    pubkey!("auth9SigNpDKz4sJJ1DfCTuZrZNSAgh9sFD3rboVmgg");

/// Errors raised while decoding account data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Account data too short: need {needed} bytes at offset {offset}, have {len}")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("Unexpected account type for {account}")]
    WrongAccountType { account: &'static str },

    #[error("Unsupported guard (bit {0}) in guard set")]
    UnsupportedGuard(u32),

    #[error("Invalid UTF-8 in {field}")]
    InvalidString { field: &'static str },
}

/// Little-endian cursor over account bytes
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub(crate) fn at(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::UnexpectedEof {
                offset: self.offset,
                needed: n,
                len: self.data.len(),
            })?;
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.u8()? != 0)
    }

    pub(crate) fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub(crate) fn i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub(crate) fn pubkey(&mut self) -> Result<Pubkey, DecodeError> {
        Ok(Pubkey::new_from_array(self.array()?))
    }

    /// Borsh string with NUL padding trimmed
    pub(crate) fn string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidString { field })?;
        Ok(s.trim_end_matches('\0').to_string())
    }
}

/// Anchor account or instruction discriminator
pub fn discriminator(namespace: &str, name: &str) -> [u8; 8] {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(format!("{namespace}:{name}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash[..8]);
    out
}
