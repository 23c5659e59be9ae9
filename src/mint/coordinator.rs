//! End-to-end mint flow for one guard click
//!
//! Resolve the guard, approve the allow list when needed, build and sign the
//! batch, submit it, wait for finality, then fetch the minted assets. The
//! guard's phase is published through the [`GuardRegistry`] at every step
//! and always returns to idle when the flow ends, however it ends.

use parking_lot::RwLock;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    compute_budget::ComputeBudgetInstruction,
    message::{v0, AddressLookupTableAccount, VersionedMessage},
    pubkey::Pubkey,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::finality::verify_finality;
use super::materialize::{materialize, MetadataFetcher};
use super::submit::{sign_all, submit_batch};
use super::{cancellable, AllowListPolicy, MintError};
use crate::candy::instructions::{allow_list_proof_pda, metadata_pda};
use crate::candy::{
    decode_candy_guard, decode_candy_machine, decode_lookup_table, decode_metadata,
    mint_args_builder, route_allow_list_instruction, CandyGuard, CandyMachine, GuardSet, MintArgs,
};
use crate::config::Config;
use crate::guards::{
    check_eligibility, choose_guard_to_use, clamp_mint_amount, owned_collection_nfts,
    EligibilityContext, GuardError, GuardRegistry, ResolvedGuard, WalletState,
};
use crate::metrics::metrics;
use crate::notify::{Notice, Notifier};
use crate::observability::TraceContext;
use crate::rpc::ChainRpc;
use crate::structured_logging::StructuredLogger;
use crate::time_source::fetch_solana_time;
use crate::tx_builder::{ExecutionContext, MintTarget, TransactionBuilderError, TxBuilder};
use crate::types::{
    EligibilityGuard, FinalizedMint, MintPhase, MintedAsset, SubmissionOutcome, DEFAULT_LABEL,
};
use crate::wallet::WalletManager;

/// Values of [`Config`] the mint flow needs, already parsed
#[derive(Debug, Clone)]
pub struct MintSettings {
    pub candy_machine: Pubkey,
    /// Defaults to the candy machine's mint authority
    pub candy_guard: Option<Pubkey>,
    pub lookup_table: Option<Pubkey>,
    pub cu_price: u64,
    pub cu_margin: f64,
    pub per_click_max: u64,
    pub allow_list_policy: AllowListPolicy,
    pub allow_list_proofs: HashMap<String, Vec<[u8; 32]>>,
    pub finality_poll: Duration,
    pub commitment: CommitmentConfig,
}

impl MintSettings {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            candy_machine: config.candy_machine_id()?,
            candy_guard: config.candy_guard_id()?,
            lookup_table: config.lookup_table()?,
            cu_price: config.mint.priority_fee_micro_lamports,
            cu_margin: config.mint.cu_margin,
            per_click_max: config.per_click_max(),
            allow_list_policy: config.mint.allow_list_policy,
            allow_list_proofs: config.allow_list_proofs()?,
            finality_poll: config.finality_poll_interval(),
            commitment: CommitmentConfig::finalized(),
        })
    }
}

/// On-chain state of the drop
#[derive(Debug, Clone)]
pub struct DropState {
    pub candy_machine: CandyMachine,
    /// `None` when no candy guard account exists
    pub candy_guard: Option<CandyGuard>,
    pub candy_guard_address: Pubkey,
    /// Update authority of the collection metadata
    pub collection_update_authority: Pubkey,
}

impl DropState {
    /// Default rules followed by every group merged over them
    pub fn rule_sets(&self) -> Vec<GuardSet> {
        let Some(cg) = &self.candy_guard else {
            return Vec::new();
        };
        std::iter::once(cg.guards.clone())
            .chain(cg.groups.iter().map(|g| g.guards.merged_over(&cg.guards)))
            .collect()
    }
}

/// Read the candy machine, its candy guard and the collection authority
pub async fn load_drop(
    rpc: &dyn ChainRpc,
    candy_machine: &Pubkey,
    candy_guard: Option<Pubkey>,
) -> Result<DropState, MintError> {
    let data = rpc
        .account_data(candy_machine)
        .await?
        .ok_or(MintError::MissingAccount(*candy_machine))?;
    let cm = decode_candy_machine(*candy_machine, &data)?;

    let candy_guard_address = candy_guard.unwrap_or(cm.mint_authority);
    let collection_metadata = metadata_pda(&cm.collection_mint);
    let (guard_data, collection_data) = futures::join!(
        rpc.account_data(&candy_guard_address),
        rpc.account_data(&collection_metadata)
    );

    let candy_guard = guard_data?
        .map(|data| decode_candy_guard(candy_guard_address, &data))
        .transpose()?;
    let collection = collection_data?.ok_or(MintError::MissingAccount(collection_metadata))?;
    let collection_update_authority = decode_metadata(&collection)?.update_authority;

    debug!(
        candy_machine = %cm.address,
        candy_guard = %candy_guard_address,
        items_redeemed = cm.items_redeemed,
        items_available = cm.items_available,
        groups = candy_guard.as_ref().map_or(0, |g| g.groups.len()),
        "Drop state loaded"
    );

    Ok(DropState {
        candy_machine: cm,
        candy_guard,
        candy_guard_address,
        collection_update_authority,
    })
}

/// What a mint click produced
#[derive(Debug, Clone)]
pub enum MintReport {
    /// No candy guard is loaded; nothing was built or sent
    NoGuard,
    Completed(MintSummary),
}

#[derive(Debug, Clone, Default)]
pub struct MintSummary {
    /// One outcome per built transaction, in build order
    pub submitted: Vec<SubmissionOutcome>,
    pub finalized: Vec<FinalizedMint>,
    pub minted: Vec<MintedAsset>,
}

/// Drives mint clicks against one drop for one wallet
pub struct MintCoordinator {
    rpc: Arc<dyn ChainRpc>,
    fetcher: Arc<dyn MetadataFetcher>,
    notifier: Arc<dyn Notifier>,
    wallet: WalletManager,
    registry: Arc<GuardRegistry>,
    settings: MintSettings,
    cancel: CancellationToken,
    drop: RwLock<Option<Arc<DropState>>>,
}

impl MintCoordinator {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        fetcher: Arc<dyn MetadataFetcher>,
        notifier: Arc<dyn Notifier>,
        wallet: WalletManager,
        registry: Arc<GuardRegistry>,
        settings: MintSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rpc,
            fetcher,
            notifier,
            wallet,
            registry,
            settings,
            cancel,
            drop: RwLock::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<GuardRegistry> {
        &self.registry
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Last loaded drop state, if any
    pub fn drop_state(&self) -> Option<Arc<DropState>> {
        self.drop.read().clone()
    }

    async fn current_drop(&self) -> Result<Arc<DropState>, MintError> {
        if let Some(drop) = self.drop_state() {
            return Ok(drop);
        }
        self.reload_drop().await
    }

    async fn reload_drop(&self) -> Result<Arc<DropState>, MintError> {
        let drop = cancellable(
            &self.cancel,
            load_drop(
                self.rpc.as_ref(),
                &self.settings.candy_machine,
                self.settings.candy_guard,
            ),
        )
        .await??;
        let drop = Arc::new(drop);
        *self.drop.write() = Some(Arc::clone(&drop));
        Ok(drop)
    }

    /// Reload the drop, recompute eligibility, and publish it to the registry
    ///
    /// `now` is the on-chain time; `0` means not yet known and triggers a
    /// direct read.
    ///
    /// A refresh overtaken by a finished mint is not installed; the registry
    /// keeps its recheck flag raised and the current list is returned.
    pub async fn refresh_guards(&self, now: i64) -> Result<Vec<EligibilityGuard>, MintError> {
        let generation = self.registry.recheck_generation();
        let drop = self.reload_drop().await?;
        let Some(cg) = &drop.candy_guard else {
            let guards = vec![EligibilityGuard::denied(DEFAULT_LABEL, "No candy guard")];
            return Ok(self.install(guards, generation));
        };

        let now = if now > 0 {
            now
        } else {
            cancellable(&self.cancel, fetch_solana_time(self.rpc.as_ref())).await??
        };

        let wallet = self.wallet.pubkey();
        let rule_sets = drop.rule_sets();
        let wallet_state = cancellable(
            &self.cancel,
            WalletState::fetch(
                self.rpc.as_ref(),
                &wallet,
                &drop.candy_machine.address,
                &drop.candy_guard_address,
                &rule_sets,
            ),
        )
        .await??;

        let allow_listed: HashSet<String> =
            self.settings.allow_list_proofs.keys().cloned().collect();
        let guards = check_eligibility(&EligibilityContext {
            candy_machine: &drop.candy_machine,
            candy_guard: cg,
            wallet,
            wallet_state: &wallet_state,
            now,
            allow_listed: &allow_listed,
            per_click_max: self.settings.per_click_max,
        });
        Ok(self.install(guards, generation))
    }

    fn install(&self, guards: Vec<EligibilityGuard>, generation: u64) -> Vec<EligibilityGuard> {
        if self.registry.replace_all(guards.clone(), generation) {
            guards
        } else {
            debug!("Eligibility changed while refreshing, recheck stays pending");
            self.registry.snapshot()
        }
    }

    /// Mint `requested` assets with the guard labelled `label`
    pub async fn mint(&self, label: &str, requested: u64) -> Result<MintReport, MintError> {
        let trace = TraceContext::new("mint");
        let logger = StructuredLogger::for_trace(&trace);

        let drop = self.current_drop().await?;
        let (guard, version) = self
            .registry
            .get(label)
            .ok_or_else(|| GuardError::UnknownLabel(label.to_string()))?;
        if guard.minting {
            return Err(GuardError::InProgress(label.to_string()).into());
        }
        let resolved = choose_guard_to_use(&guard, drop.candy_guard.as_ref());
        if !resolved.has_rules() {
            warn!(label, "no guard defined");
            return Ok(MintReport::NoGuard);
        }

        let amount = clamp_mint_amount(requested, guard.max_amount);
        logger.log_mint_started(&resolved.label, requested, amount);

        // the clamp above used this version of the entry
        self.registry.compare_and_swap(
            label,
            version,
            EligibilityGuard {
                minting: true,
                ..guard.clone()
            },
        )?;
        metrics().mints_in_progress.inc();
        let registry = Arc::clone(&self.registry);
        let label_owned = label.to_string();
        let _cleanup = scopeguard::guard((), move |_| {
            if let Err(err) = registry.update(&label_owned, |g| g.enter_phase(MintPhase::Idle)) {
                debug!(label = %label_owned, error = %err, "Guard gone before cleanup");
            }
            registry.request_recheck();
            metrics().mints_in_progress.dec();
        });

        let result = self
            .run(label, &drop, &resolved, amount, &trace, &logger)
            .await;

        if let Err(err) = &result {
            metrics()
                .mint_errors
                .with_label_values(&[err.category()])
                .inc();
            match err {
                MintError::Cancelled => info!(label, "Mint cancelled"),
                MintError::AllowListFailed => logger.warn("Aborted after allow list failure"),
                _ => {
                    logger.error(&err.to_string());
                    self.notifier.notify(
                        Notice::error("Your mint failed!").with_description("Please try again."),
                    );
                }
            }
        }
        result.map(MintReport::Completed)
    }

    async fn latest_blockhash(&self) -> Result<crate::rpc::BlockhashInfo, MintError> {
        let info = cancellable(&self.cancel, self.rpc.latest_blockhash(self.settings.commitment))
            .await??;
        Ok(info)
    }

    fn enter_phase(&self, label: &str, phase: MintPhase) -> Result<(), MintError> {
        self.registry.update(label, |g| g.enter_phase(phase))?;
        Ok(())
    }

    async fn run(
        &self,
        label: &str,
        drop: &DropState,
        resolved: &ResolvedGuard,
        amount: u64,
        trace: &TraceContext,
        logger: &StructuredLogger,
    ) -> Result<MintSummary, MintError> {
        let Some(rules) = &resolved.guards else {
            let err = TransactionBuilderError::Configuration("no guard defined".to_string());
            return Err(err.into());
        };
        let payer = self.wallet.pubkey();
        let cm = &drop.candy_machine;

        if let Some(root) = &rules.allow_list {
            self.approve_allow_list(drop, resolved, root).await?;
        }

        let lookup_tables = self.lookup_tables().await?;
        let blockhash = self.latest_blockhash().await?;
        let payment_nfts = match &rules.nft_payment {
            Some(payment) => self.payment_nfts(&payment.required_collection, amount).await?,
            None => Vec::new(),
        };
        let args_for = |nft: Option<&Pubkey>| {
            mint_args_builder(&cm.address, &drop.candy_guard_address, rules, &payer, nft)
        };
        let (mint_args, per_mint_args, amount) = if payment_nfts.is_empty() {
            (args_for(None)?, Vec::new(), amount)
        } else {
            let per_mint = payment_nfts
                .iter()
                .map(|nft| args_for(Some(nft)))
                .collect::<Result<Vec<_>, _>>()?;
            let amount = per_mint.len() as u64;
            (MintArgs::default(), per_mint, amount)
        };

        let ctx = ExecutionContext::new(
            blockhash,
            payer,
            self.settings.cu_price,
            MintTarget {
                candy_machine: cm.clone(),
                candy_guard: drop.candy_guard_address,
                collection_update_authority: drop.collection_update_authority,
            },
        )
        .with_lookup_tables(lookup_tables)
        .with_trace(trace.child_span("build"));

        let builder = TxBuilder::new(Arc::clone(&self.rpc), ctx, resolved.clone(), mint_args)
            .with_per_mint_args(per_mint_args)
            .with_cu_margin(self.settings.cu_margin);
        let batch = cancellable(&self.cancel, builder.build_batch(amount as usize)).await??;
        logger.log_batch_built(batch.len(), batch.cu_limit, &batch.blockhash.blockhash.to_string());
        let batch_blockhash = batch.blockhash;

        self.enter_phase(label, MintPhase::Signing)?;
        self.notifier.notify(Notice::info("Please sign"));
        let signed = sign_all(&self.wallet, batch)?;

        self.enter_phase(label, MintPhase::Sending)?;
        self.notifier.notify(Notice::info("Sending transaction(s)"));
        let submitted = cancellable(
            &self.cancel,
            submit_batch(self.rpc.as_ref(), &signed, logger),
        )
        .await?;
        let accepted: Vec<(Pubkey, _)> = signed
            .iter()
            .zip(&submitted)
            .filter_map(|(mint, outcome)| outcome.succeeded().map(|sig| (mint.asset, *sig)))
            .collect();
        self.notifier.notify(Notice::success(format!(
            "{} Transaction(s) sent!",
            accepted.len()
        )));

        self.enter_phase(label, MintPhase::Finalizing)?;
        self.notifier.notify(Notice::info("finalizing transaction(s)"));
        let started = Instant::now();
        let finalized = verify_finality(
            self.rpc.as_ref(),
            &accepted,
            &batch_blockhash,
            self.settings.commitment,
            self.settings.finality_poll,
            &self.cancel,
        )
        .await?;
        metrics().mints_finalized.inc_by(finalized.len() as u64);
        logger.log_finalized(
            finalized.len(),
            accepted.len(),
            started.elapsed().as_millis() as u64,
        );

        self.enter_phase(label, MintPhase::Fetching)?;
        self.notifier.notify(Notice::info("Fetching your NFT"));
        let minted = materialize(
            self.rpc.as_ref(),
            self.fetcher.as_ref(),
            &finalized,
            self.notifier.as_ref(),
            logger,
            &self.cancel,
        )
        .await?;

        Ok(MintSummary {
            submitted,
            finalized,
            minted,
        })
    }

    /// Up to `amount` owned NFTs of `collection`, one per mint
    async fn payment_nfts(
        &self,
        collection: &Pubkey,
        amount: u64,
    ) -> Result<Vec<Pubkey>, MintError> {
        let wallet = self.wallet.pubkey();
        let collections = HashSet::from([*collection]);
        let mut owned = cancellable(
            &self.cancel,
            owned_collection_nfts(self.rpc.as_ref(), &wallet, &collections),
        )
        .await??;
        let mut nfts = owned.remove(collection).unwrap_or_default();
        if (nfts.len() as u64) < amount {
            warn!(
                collection = %collection,
                owned = nfts.len(),
                amount,
                "Fewer payment NFTs than requested mints"
            );
        }
        nfts.truncate(amount as usize);
        Ok(nfts)
    }

    async fn lookup_tables(&self) -> Result<Vec<AddressLookupTableAccount>, MintError> {
        let Some(address) = self.settings.lookup_table else {
            self.notifier
                .notify(Notice::warning("The developer should really set a lookup table!"));
            return Ok(Vec::new());
        };
        let data = cancellable(&self.cancel, self.rpc.account_data(&address))
            .await??
            .ok_or(MintError::MissingAccount(address))?;
        Ok(vec![decode_lookup_table(address, &data)?])
    }

    /// Record the wallet's allow-list proof on chain unless already recorded
    async fn approve_allow_list(
        &self,
        drop: &DropState,
        resolved: &ResolvedGuard,
        root: &[u8; 32],
    ) -> Result<(), MintError> {
        let payer = self.wallet.pubkey();
        let cm = drop.candy_machine.address;
        let proof_pda = allow_list_proof_pda(root, &payer, &drop.candy_guard_address, &cm);
        if cancellable(&self.cancel, self.rpc.account_data(&proof_pda))
            .await??
            .is_some()
        {
            debug!(proof = %proof_pda, "Allow list already approved");
            return Ok(());
        }

        self.notifier.notify(Notice::info(
            "Allowlist detected. Please sign to be approved to mint.",
        ));
        let failure = match self.route_allow_list(drop, resolved, root).await {
            Ok(true) => {
                info!(label = %resolved.label, "Allow list approved");
                return Ok(());
            }
            Ok(false) => "route transaction did not finalize".to_string(),
            Err(MintError::Cancelled) => return Err(MintError::Cancelled),
            Err(err) => err.to_string(),
        };

        metrics().allow_list_failures.inc();
        self.notifier.notify(Notice::error("Allow List TX failed!"));
        match self.settings.allow_list_policy {
            AllowListPolicy::Advisory => {
                warn!(label = %resolved.label, reason = %failure, "Allow list approval failed, minting anyway");
                Ok(())
            }
            AllowListPolicy::Required => {
                warn!(label = %resolved.label, reason = %failure, "Allow list approval failed");
                Err(MintError::AllowListFailed)
            }
        }
    }

    /// Send the `route` transaction; `Ok(false)` when it did not finalize
    async fn route_allow_list(
        &self,
        drop: &DropState,
        resolved: &ResolvedGuard,
        root: &[u8; 32],
    ) -> Result<bool, MintError> {
        let payer = self.wallet.pubkey();
        let Some(proof) = self.settings.allow_list_proofs.get(&resolved.label) else {
            warn!(label = %resolved.label, "No allow list proof configured");
            return Ok(false);
        };

        let blockhash = self.latest_blockhash().await?;
        let mut instructions = Vec::with_capacity(2);
        if self.settings.cu_price > 0 {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
                self.settings.cu_price,
            ));
        }
        instructions.push(route_allow_list_instruction(
            &drop.candy_guard_address,
            &drop.candy_machine.address,
            &payer,
            root,
            proof,
            resolved.group.as_deref(),
        ));
        let message = v0::Message::try_compile(&payer, &instructions, &[], blockhash.blockhash)
            .map_err(|e| {
                TransactionBuilderError::Signing(format!("Failed to compile route message: {e}"))
            })?;
        let tx = self.wallet.sign(VersionedMessage::V0(message), &[])?;

        let signature = cancellable(&self.cancel, self.rpc.send(&tx)).await??;
        let finalized = verify_finality(
            self.rpc.as_ref(),
            &[(payer, signature)],
            &blockhash,
            self.settings.commitment,
            self.settings.finality_poll,
            &self.cancel,
        )
        .await?;
        Ok(!finalized.is_empty())
    }
}
