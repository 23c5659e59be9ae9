//! Common types used throughout the application

use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature};

/// Label used for the candy guard's default rules
pub const DEFAULT_LABEL: &str = "default";

/// Where a guard's mint flow currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MintPhase {
    #[default]
    Idle,
    Signing,
    Sending,
    Finalizing,
    Fetching,
}

impl MintPhase {
    /// Loading text shown while the phase is active
    pub fn loading_text(&self) -> Option<&'static str> {
        match self {
            MintPhase::Idle => None,
            MintPhase::Signing => Some("Please sign"),
            MintPhase::Sending => Some("Sending transaction(s)"),
            MintPhase::Finalizing => Some("finalizing transaction(s)"),
            MintPhase::Fetching => Some("Fetching your NFT"),
        }
    }
}

/// Per-group eligibility of the connected wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityGuard {
    pub label: String,
    pub allowed: bool,
    /// Why minting is not allowed, when it is not
    pub reason: Option<String>,
    /// Client-side cap on the quantity of one mint click
    pub max_amount: u64,
    pub minting: bool,
    pub loading_text: Option<String>,
}

impl EligibilityGuard {
    pub fn allowed(label: impl Into<String>, max_amount: u64) -> Self {
        Self {
            label: label.into(),
            allowed: true,
            reason: None,
            max_amount,
            minting: false,
            loading_text: None,
        }
    }

    pub fn denied(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            allowed: false,
            reason: Some(reason.into()),
            max_amount: 0,
            minting: false,
            loading_text: None,
        }
    }

    /// Apply a phase, keeping `minting` and the loading text consistent
    pub fn enter_phase(&mut self, phase: MintPhase) {
        self.minting = phase != MintPhase::Idle;
        self.loading_text = phase.loading_text().map(str::to_string);
    }
}

/// Configured display texts of one group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintText {
    pub header: Option<String>,
    pub mint_text: Option<String>,
    pub button_label: Option<String>,
}

/// One renderable mint button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardButton {
    pub label: String,
    pub allowed: bool,
    pub reason: Option<String>,
    pub header: String,
    pub mint_text: String,
    pub button_label: String,
    /// Unix seconds, 0 when the group has no start date
    pub start_time: i64,
    /// Unix seconds, 0 when the group has no end date
    pub end_time: i64,
    pub max_amount: u64,
    pub minting: bool,
    pub loading_text: Option<String>,
}

/// Settled result of one independent operation in a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Succeeded(T),
    Failed(String),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded(_))
    }

    pub fn succeeded(&self) -> Option<&T> {
        match self {
            Outcome::Succeeded(value) => Some(value),
            Outcome::Failed(_) => None,
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Outcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Succeeded(value),
            Err(err) => Outcome::Failed(err.to_string()),
        }
    }
}

/// Outcome of sending one mint transaction
pub type SubmissionOutcome = Outcome<Signature>;

/// A mint that reached the finality commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizedMint {
    pub mint: Pubkey,
    pub signature: Signature,
}

/// A minted asset ready for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MintedAsset {
    pub mint: Pubkey,
    pub name: String,
    pub uri: String,
    pub off_chain_metadata: serde_json::Value,
}
