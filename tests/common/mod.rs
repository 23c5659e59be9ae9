//! Shared setup for the mint flow tests

#![allow(dead_code)]

use candy_mint::candy::guard_set::SolPayment;
use candy_mint::candy::GuardSet;
use candy_mint::guards::GuardRegistry;
use candy_mint::mint::{AllowListPolicy, MintCoordinator, MintSettings};
use candy_mint::test_utils::{DropFixture, MockMetadataFetcher, RecordingNotifier, ScriptedRpc};
use candy_mint::wallet::WalletManager;
use solana_sdk::{
    commitment_config::CommitmentConfig, native_token::LAMPORTS_PER_SOL, pubkey::Pubkey,
    signature::Keypair,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Block time reported by [`ScriptedRpc`] by default
pub const NOW: i64 = 1_700_000_000;

pub struct Harness {
    pub rpc: Arc<ScriptedRpc>,
    pub fetcher: Arc<MockMetadataFetcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub registry: Arc<GuardRegistry>,
    pub wallet: WalletManager,
    pub cancel: CancellationToken,
    pub coordinator: MintCoordinator,
}

pub fn settings(fixture: &DropFixture) -> MintSettings {
    MintSettings {
        candy_machine: fixture.candy_machine.address,
        candy_guard: None,
        lookup_table: None,
        cu_price: 1001,
        cu_margin: 1.2,
        per_click_max: 3,
        allow_list_policy: AllowListPolicy::Advisory,
        allow_list_proofs: HashMap::new(),
        finality_poll: Duration::from_millis(500),
        commitment: CommitmentConfig::finalized(),
    }
}

/// One SOL per mint, open since before [`NOW`]
pub fn public_sale() -> GuardSet {
    GuardSet {
        sol_payment: Some(SolPayment {
            lamports: LAMPORTS_PER_SOL,
            destination: Pubkey::new_unique(),
        }),
        start_date: Some(NOW - 3_600),
        ..Default::default()
    }
}

pub fn harness(fixture: &DropFixture, settings: MintSettings) -> Harness {
    let rpc = Arc::new(ScriptedRpc::new());
    fixture.install(&rpc);
    harness_with_rpc(rpc, settings)
}

pub fn harness_with_rpc(rpc: Arc<ScriptedRpc>, settings: MintSettings) -> Harness {
    let wallet = WalletManager::from_keypair(Keypair::new());
    rpc.set_balance(wallet.pubkey(), 10 * LAMPORTS_PER_SOL);

    let fetcher = Arc::new(MockMetadataFetcher::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = Arc::new(GuardRegistry::new());
    let cancel = CancellationToken::new();
    let coordinator = MintCoordinator::new(
        rpc.clone(),
        fetcher.clone(),
        notifier.clone(),
        wallet.clone(),
        registry.clone(),
        settings,
        cancel.clone(),
    );
    Harness {
        rpc,
        fetcher,
        notifier,
        registry,
        wallet,
        cancel,
        coordinator,
    }
}
