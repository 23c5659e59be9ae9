//! Instruction planning and ordering validation
//!
//! Mint transactions are ordered as:
//! 1. Compute unit limit
//! 2. Compute unit price (omitted when zero)
//! 3. The candy guard instruction

use crate::tx_builder::errors::TransactionBuilderError;
use solana_sdk::{compute_budget::ComputeBudgetInstruction, instruction::Instruction};

/// `ComputeBudgetInstruction::SetComputeUnitLimit` tag
const SET_CU_LIMIT_TAG: u8 = 2;

/// Ordered instructions of one mint transaction
#[derive(Debug, Clone)]
pub struct InstructionPlan {
    pub instructions: Vec<Instruction>,
    pub cu_limit: u32,
}

/// Plan the instructions of one mint transaction
///
/// # Errors
///
/// Returns `TransactionBuilderError::Configuration` if the mint instruction
/// carries no accounts or the limit is zero.
pub fn plan_mint_instructions(
    cu_limit: u32,
    cu_price: u64,
    mint_ix: Instruction,
) -> Result<InstructionPlan, TransactionBuilderError> {
    if mint_ix.accounts.is_empty() {
        return Err(TransactionBuilderError::Configuration(
            "Mint instruction has no accounts".to_string(),
        ));
    }
    if cu_limit == 0 {
        return Err(TransactionBuilderError::Configuration(
            "Compute unit limit must be positive".to_string(),
        ));
    }

    let mut instructions = Vec::with_capacity(3);
    instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(cu_limit));
    if cu_price > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(cu_price));
    }
    instructions.push(mint_ix);

    Ok(InstructionPlan {
        instructions,
        cu_limit,
    })
}

/// Validate instruction ordering (debug/test only)
///
/// Compute budget instructions must all precede the program instructions,
/// with exactly one compute unit limit among them.
#[cfg(debug_assertions)]
pub fn sanity_check_ix_order(instructions: &[Instruction]) -> Result<(), TransactionBuilderError> {
    let is_budget = |ix: &Instruction| ix.program_id == solana_sdk::compute_budget::id();

    let budget_len = instructions.iter().take_while(|ix| is_budget(ix)).count();
    if budget_len == instructions.len() {
        return Err(TransactionBuilderError::invalid_order(
            "No program instruction after the compute budget",
        ));
    }
    if let Some(idx) = instructions[budget_len..].iter().position(is_budget) {
        return Err(TransactionBuilderError::invalid_order(format!(
            "Compute budget instruction after program instructions (at position {})",
            budget_len + idx
        )));
    }

    let limits = instructions[..budget_len]
        .iter()
        .filter(|ix| ix.data.first() == Some(&SET_CU_LIMIT_TAG))
        .count();
    if limits != 1 {
        return Err(TransactionBuilderError::invalid_order(format!(
            "Expected one compute unit limit instruction, found {limits}"
        )));
    }

    Ok(())
}

/// No-op version of sanity_check_ix_order for release builds
#[cfg(not(debug_assertions))]
#[inline]
pub fn sanity_check_ix_order(_instructions: &[Instruction]) -> Result<(), TransactionBuilderError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{instruction::AccountMeta, pubkey::Pubkey};

    fn mint_ix(program_id: Pubkey) -> Instruction {
        Instruction::new_with_bytes(
            program_id,
            &[1, 2, 3, 4],
            vec![AccountMeta::new(Pubkey::new_unique(), false)],
        )
    }

    #[test]
    fn test_plan_mint_instructions() {
        let program_id = Pubkey::new_unique();
        let plan = plan_mint_instructions(400_000, 1001, mint_ix(program_id))
            .expect("Should plan mint instructions");

        assert_eq!(plan.instructions.len(), 3);
        assert_eq!(plan.cu_limit, 400_000);
        assert_eq!(
            plan.instructions[0],
            ComputeBudgetInstruction::set_compute_unit_limit(400_000)
        );
        assert_eq!(
            plan.instructions[1],
            ComputeBudgetInstruction::set_compute_unit_price(1001)
        );
        assert_eq!(plan.instructions[2].program_id, program_id);
    }

    #[test]
    fn test_plan_skips_zero_price() {
        let plan = plan_mint_instructions(200_000, 0, mint_ix(Pubkey::new_unique()))
            .expect("Should plan without priority fee");
        assert_eq!(plan.instructions.len(), 2);
    }

    #[test]
    fn test_plan_rejects_empty_accounts() {
        let ix = Instruction::new_with_bytes(Pubkey::new_unique(), &[1], vec![]);
        let result = plan_mint_instructions(200_000, 0, ix);
        if let Err(TransactionBuilderError::Configuration(msg)) = result {
            assert!(msg.contains("no accounts"));
        } else {
            panic!("Expected Configuration error");
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_sanity_check_accepts_plan() {
        let plan = plan_mint_instructions(200_000, 5, mint_ix(Pubkey::new_unique())).unwrap();
        assert!(sanity_check_ix_order(&plan.instructions).is_ok());
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_sanity_check_budget_after_program() {
        let instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_limit(200_000),
            mint_ix(Pubkey::new_unique()),
            ComputeBudgetInstruction::set_compute_unit_price(10),
        ];
        let result = sanity_check_ix_order(&instructions);
        if let Err(TransactionBuilderError::InvalidInstructionOrder(msg)) = result {
            assert!(msg.contains("position 2"));
        } else {
            panic!("Expected InvalidInstructionOrder error");
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_sanity_check_missing_limit_or_program() {
        let no_limit = vec![
            ComputeBudgetInstruction::set_compute_unit_price(10),
            mint_ix(Pubkey::new_unique()),
        ];
        assert!(sanity_check_ix_order(&no_limit).is_err());

        let only_budget = vec![ComputeBudgetInstruction::set_compute_unit_limit(1)];
        assert!(sanity_check_ix_order(&only_budget).is_err());
        assert!(sanity_check_ix_order(&[]).is_err());
    }
}
