//! Error types for the transaction builder
//!
//! Covers the whole build lifecycle of a mint batch:
//! - Instruction construction from the resolved guard
//! - Instruction order checks
//! - Message compilation and signing

use thiserror::Error;

/// Error type for all transaction builder operations
#[derive(Error, Debug)]
pub enum TransactionBuilderError {
    /// Failed to build an instruction for a specific program
    ///
    /// Contains the program and detailed reason for failure
    #[error("Instruction build error (program={program}): {reason}")]
    InstructionBuild {
        /// The program that failed to build an instruction
        program: String,
        /// Detailed reason for the failure
        reason: String,
    },

    /// Failed to compile or sign the transaction
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Invalid instruction order or structure
    ///
    /// Mint transactions require:
    /// 1. Compute budget instructions
    /// 2. The candy guard instruction, last
    #[error("Invalid instruction order: {0}")]
    InvalidInstructionOrder(String),

    /// Configuration or validation error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TransactionBuilderError {
    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::InstructionBuild { .. } => "instruction",
            Self::Signing(_) => "signing",
            Self::InvalidInstructionOrder(_) => "validation",
            Self::Configuration(_) => "config",
        }
    }
}

// Convenience constructors for common error scenarios
impl TransactionBuilderError {
    /// Create an instruction build error for a specific program
    pub fn instruction_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InstructionBuild {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid instruction order error
    pub fn invalid_order(reason: impl Into<String>) -> Self {
        Self::InvalidInstructionOrder(reason.into())
    }
}
