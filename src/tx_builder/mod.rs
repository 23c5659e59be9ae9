//! Mint transaction builder
//!
//! The builder is split into focused modules:
//! - **errors**: error taxonomy with categories
//! - **context**: blockhash, lookup tables and drop shared by a batch
//! - **instructions**: instruction planning and order validation
//! - **simulate**: compute budget estimation
//! - **output**: unsigned batch with the asset keypairs
//! - **builder**: single-message building and [`TxBuilder::build_batch`]
//!
//! Every transaction of a batch compiles against the same blockhash and
//! carries the same compute unit ceiling, so the batch expires as a unit.

pub mod errors;
pub use errors::TransactionBuilderError;

mod builder;
mod context;
mod instructions;
mod output;
mod simulate;

pub use builder::{build_mint_tx, BuildMode, TxBuilder};
pub use context::{ExecutionContext, MintTarget};
pub use instructions::{plan_mint_instructions, sanity_check_ix_order, InstructionPlan};
pub use output::{MintBatch, UnsignedMint};
pub use simulate::{
    apply_margin, build_sim_tx, estimate_compute_units, DEFAULT_CU_MARGIN,
    FALLBACK_COMPUTE_UNITS, MAX_COMPUTE_UNITS,
};
