//! Execution context for building a mint batch
//!
//! Everything a batch shares: the fixed blockhash, the lookup tables the
//! messages compile against, the fee payer, and the drop being minted from.

use solana_sdk::{message::AddressLookupTableAccount, pubkey::Pubkey};

use crate::candy::CandyMachine;
use crate::observability::TraceContext;
use crate::rpc::BlockhashInfo;

/// The drop a batch mints from
#[derive(Debug, Clone)]
pub struct MintTarget {
    pub candy_machine: CandyMachine,
    pub candy_guard: Pubkey,
    /// Update authority of the collection metadata
    pub collection_update_authority: Pubkey,
}

/// Inputs shared by every transaction of one batch
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub blockhash: BlockhashInfo,
    pub lookup_tables: Vec<AddressLookupTableAccount>,
    /// Fee payer and minter
    pub payer: Pubkey,
    /// Priority fee in micro-lamports per compute unit
    pub cu_price: u64,
    pub target: MintTarget,
    pub trace_context: Option<TraceContext>,
}

impl ExecutionContext {
    pub fn new(
        blockhash: BlockhashInfo,
        payer: Pubkey,
        cu_price: u64,
        target: MintTarget,
    ) -> Self {
        Self {
            blockhash,
            lookup_tables: Vec::new(),
            payer,
            cu_price,
            target,
            trace_context: None,
        }
    }

    pub fn with_lookup_tables(mut self, tables: Vec<AddressLookupTableAccount>) -> Self {
        self.lookup_tables = tables;
        self
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace_context = Some(trace);
        self
    }
}
