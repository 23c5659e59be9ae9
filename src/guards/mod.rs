//! Sale groups as seen by the connected wallet
//!
//! - **selector**: which rules govern a mint attempt
//! - **eligibility**: per-group allowed flag, reason and quantity cap
//! - **list**: de-duplication and button shaping for display
//! - **registry**: the single owner of the live guard list

use thiserror::Error;

use crate::candy::DecodeError;
use crate::rpc::RpcManagerError;

pub mod eligibility;
pub mod list;
pub mod registry;
pub mod selector;

pub use eligibility::{check_eligibility, owned_collection_nfts, EligibilityContext, WalletState};
pub use list::{build_button_list, clamp_mint_amount, dedupe_guards, display_guards};
pub use registry::GuardRegistry;
pub use selector::{choose_guard_to_use, ResolvedGuard};

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("No guard with label {0}")]
    UnknownLabel(String),

    #[error("A mint with {0} is already in progress")]
    InProgress(String),

    /// The entry changed since it was read
    #[error("Stale update for {label}: expected version {expected}, found {found}")]
    Stale {
        label: String,
        expected: u64,
        found: u64,
    },

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcManagerError),

    #[error("Account decode error: {0}")]
    Decode(#[from] DecodeError),
}
