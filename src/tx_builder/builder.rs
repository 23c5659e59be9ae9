//! Core mint transaction building
//!
//! [`build_mint_tx`] is a pure function of its inputs. [`TxBuilder`] drives
//! it for a whole batch: one simulation for the compute ceiling, then `n`
//! messages built sequentially against the same blockhash.

use solana_sdk::{
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::sync::Arc;
use tracing::debug;

use super::context::ExecutionContext;
use super::errors::TransactionBuilderError;
use super::instructions::{plan_mint_instructions, sanity_check_ix_order};
use super::output::{MintBatch, UnsignedMint};
use super::simulate::{estimate_compute_units, DEFAULT_CU_MARGIN, MAX_COMPUTE_UNITS};
use crate::candy::{mint_v2_instruction, MintArgs, MintV2Accounts};
use crate::guards::ResolvedGuard;
use crate::metrics::metrics;
use crate::rpc::ChainRpc;

/// How the compute unit limit of a message is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// The fixed upper bound, for the estimating simulation
    Simulation,
    /// The ceiling derived from simulation
    Final { cu_limit: u32 },
}

impl BuildMode {
    fn cu_limit(&self) -> u32 {
        match self {
            BuildMode::Simulation => MAX_COMPUTE_UNITS,
            BuildMode::Final { cu_limit } => *cu_limit,
        }
    }
}

/// Build one unsigned v0 mint message for `asset`
pub fn build_mint_tx(
    ctx: &ExecutionContext,
    asset: &Pubkey,
    guard: &ResolvedGuard,
    mint_args: &MintArgs,
    mode: BuildMode,
) -> Result<VersionedMessage, TransactionBuilderError> {
    if !guard.has_rules() {
        return Err(TransactionBuilderError::Configuration(
            "no guard defined".to_string(),
        ));
    }

    let mint_ix = mint_v2_instruction(
        MintV2Accounts {
            candy_guard: ctx.target.candy_guard,
            candy_machine: &ctx.target.candy_machine,
            payer: ctx.payer,
            minter: ctx.payer,
            nft_mint: *asset,
            collection_update_authority: ctx.target.collection_update_authority,
        },
        guard.group.as_deref(),
        mint_args,
    );
    let plan = plan_mint_instructions(mode.cu_limit(), ctx.cu_price, mint_ix)?;
    sanity_check_ix_order(&plan.instructions)?;

    let message = v0::Message::try_compile(
        &ctx.payer,
        &plan.instructions,
        &ctx.lookup_tables,
        ctx.blockhash.blockhash,
    )
    .map_err(|e| TransactionBuilderError::Signing(format!("Failed to compile message: {e}")))?;

    Ok(VersionedMessage::V0(message))
}

/// Builds mint batches for one resolved guard
pub struct TxBuilder {
    rpc: Arc<dyn ChainRpc>,
    ctx: ExecutionContext,
    guard: ResolvedGuard,
    mint_args: MintArgs,
    /// Replaces `mint_args` for the transaction at the same index
    per_mint_args: Vec<MintArgs>,
    cu_margin: f64,
}

impl TxBuilder {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        ctx: ExecutionContext,
        guard: ResolvedGuard,
        mint_args: MintArgs,
    ) -> Self {
        Self {
            rpc,
            ctx,
            guard,
            mint_args,
            per_mint_args: Vec::new(),
            cu_margin: DEFAULT_CU_MARGIN,
        }
    }

    /// Give each transaction its own guard arguments, as `nftPayment` needs
    pub fn with_per_mint_args(mut self, args: Vec<MintArgs>) -> Self {
        self.per_mint_args = args;
        self
    }

    fn args_for(&self, index: usize) -> &MintArgs {
        self.per_mint_args.get(index).unwrap_or(&self.mint_args)
    }

    pub fn with_cu_margin(mut self, margin: f64) -> Self {
        self.cu_margin = margin;
        self
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Simulate once, then build `n` transactions with fresh asset keypairs
    pub async fn build_batch(&self, n: usize) -> Result<MintBatch, TransactionBuilderError> {
        if n == 0 {
            return Err(TransactionBuilderError::Configuration(
                "no mint tx built".to_string(),
            ));
        }
        if !self.per_mint_args.is_empty() && self.per_mint_args.len() < n {
            return Err(TransactionBuilderError::Configuration(format!(
                "guard arguments for {} of {n} transactions",
                self.per_mint_args.len()
            )));
        }

        let representative = Keypair::new();
        let sim_message = build_mint_tx(
            &self.ctx,
            &representative.pubkey(),
            &self.guard,
            self.args_for(0),
            BuildMode::Simulation,
        )?;
        let cu_limit = estimate_compute_units(self.rpc.as_ref(), sim_message, self.cu_margin).await;

        let (trace_id, span_id) = self
            .ctx
            .trace_context
            .as_ref()
            .map(|t| (t.trace_id().to_string(), t.span_id().to_string()))
            .unwrap_or_default();

        let mut txs = Vec::with_capacity(n);
        for index in 0..n {
            let asset = Keypair::new();
            let message = build_mint_tx(
                &self.ctx,
                &asset.pubkey(),
                &self.guard,
                self.args_for(index),
                BuildMode::Final { cu_limit },
            )?;
            debug!(
                trace_id = %trace_id,
                span_id = %span_id,
                index = index + 1,
                asset = %asset.pubkey(),
                "Mint transaction built"
            );
            txs.push(UnsignedMint { message, asset });
        }

        metrics().mints_attempted.inc_by(n as u64);
        metrics().batch_size.observe(n as f64);

        Ok(MintBatch {
            txs,
            blockhash: self.ctx.blockhash,
            cu_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candy::GuardSet;
    use crate::test_utils::{DropFixture, ScriptedRpc};
    use solana_sdk::compute_budget::ComputeBudgetInstruction;

    fn context(rpc: &ScriptedRpc, fixture: &DropFixture) -> ExecutionContext {
        ExecutionContext::new(
            rpc.blockhash(),
            Pubkey::new_unique(),
            1001,
            crate::tx_builder::MintTarget {
                candy_machine: fixture.candy_machine.clone(),
                candy_guard: fixture.candy_guard.address,
                collection_update_authority: fixture.collection_update_authority,
            },
        )
    }

    fn public_guard() -> ResolvedGuard {
        ResolvedGuard {
            label: "default".to_string(),
            group: None,
            guards: Some(GuardSet::default()),
        }
    }

    fn cu_limit_data(message: &VersionedMessage) -> Vec<u8> {
        message.instructions()[0].data.clone()
    }

    #[test]
    fn test_build_is_deterministic() {
        let rpc = ScriptedRpc::new();
        let fixture = DropFixture::new(10);
        let ctx = context(&rpc, &fixture);
        let asset = Pubkey::new_unique();
        let args = MintArgs::default();

        let a = build_mint_tx(&ctx, &asset, &public_guard(), &args, BuildMode::Simulation).unwrap();
        let b = build_mint_tx(&ctx, &asset, &public_guard(), &args, BuildMode::Simulation).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            cu_limit_data(&a),
            ComputeBudgetInstruction::set_compute_unit_limit(MAX_COMPUTE_UNITS).data
        );
        assert_eq!(*a.recent_blockhash(), ctx.blockhash.blockhash);
    }

    #[test]
    fn test_build_without_rules_fails() {
        let rpc = ScriptedRpc::new();
        let fixture = DropFixture::new(10);
        let ctx = context(&rpc, &fixture);
        let guard = ResolvedGuard {
            guards: None,
            ..public_guard()
        };

        let err = build_mint_tx(
            &ctx,
            &Pubkey::new_unique(),
            &guard,
            &MintArgs::default(),
            BuildMode::Final { cu_limit: 200_000 },
        )
        .unwrap_err();
        assert!(err.to_string().contains("no guard defined"));
    }

    #[tokio::test]
    async fn test_empty_batch_is_an_error() {
        let rpc = Arc::new(ScriptedRpc::new());
        let fixture = DropFixture::new(10);
        let builder = TxBuilder::new(
            rpc.clone(),
            context(&rpc, &fixture),
            public_guard(),
            MintArgs::default(),
        );

        let err = builder.build_batch(0).await.unwrap_err();
        assert!(err.to_string().contains("no mint tx built"));
        assert_eq!(rpc.calls().simulate, 0);
    }

    #[tokio::test]
    async fn test_batch_shares_blockhash_and_ceiling() {
        let rpc = Arc::new(ScriptedRpc::new());
        rpc.set_simulation(Some(100_000), None);
        let fixture = DropFixture::new(10);
        let builder = TxBuilder::new(
            rpc.clone(),
            context(&rpc, &fixture),
            public_guard(),
            MintArgs::default(),
        )
        .with_cu_margin(1.5);

        let batch = builder.build_batch(2).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.cu_limit, 150_000);
        assert_eq!(rpc.calls().simulate, 1);

        let assets = batch.asset_mints();
        assert_ne!(assets[0], assets[1]);
        for tx in &batch.txs {
            assert_eq!(*tx.message.recent_blockhash(), batch.blockhash.blockhash);
            assert_eq!(
                cu_limit_data(&tx.message),
                ComputeBudgetInstruction::set_compute_unit_limit(150_000).data
            );
        }
    }

    #[tokio::test]
    async fn test_simulation_error_uses_fallback() {
        let rpc = Arc::new(ScriptedRpc::new());
        rpc.set_simulation(None, Some("custom program error: 0x1"));
        let fixture = DropFixture::new(10);
        let builder = TxBuilder::new(
            rpc.clone(),
            context(&rpc, &fixture),
            public_guard(),
            MintArgs::default(),
        );

        let batch = builder.build_batch(1).await.unwrap();
        assert_eq!(batch.cu_limit, crate::tx_builder::FALLBACK_COMPUTE_UNITS);
    }

    #[tokio::test]
    async fn test_per_mint_args_follow_batch_order() {
        let rpc = Arc::new(ScriptedRpc::new());
        let fixture = DropFixture::new(10);
        let marker = |key: Pubkey| MintArgs {
            remaining_accounts: vec![solana_sdk::instruction::AccountMeta::new_readonly(
                key, false,
            )],
            data: Vec::new(),
        };
        let (first, second) = (Pubkey::new_unique(), Pubkey::new_unique());
        let builder = TxBuilder::new(
            rpc.clone(),
            context(&rpc, &fixture),
            public_guard(),
            MintArgs::default(),
        )
        .with_per_mint_args(vec![marker(first), marker(second)]);

        let batch = builder.build_batch(2).await.unwrap();
        assert!(batch.txs[0].message.static_account_keys().contains(&first));
        assert!(!batch.txs[0].message.static_account_keys().contains(&second));
        assert!(batch.txs[1].message.static_account_keys().contains(&second));

        let err = builder.build_batch(3).await.unwrap_err();
        assert_eq!(err.category(), "config");
    }
}
