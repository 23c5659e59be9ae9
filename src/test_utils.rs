//! Test Utilities Module
//!
//! Deterministic stand-ins for the chain, the metadata host and the notice
//! sink, plus fixtures that install a drop into the scripted chain.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};
use spl_associated_token_account::get_associated_token_address;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::candy::accounts::{encode, TOKEN_ACCOUNT_SIZE};
use crate::candy::instructions::metadata_pda;
use crate::candy::{
    decode_token_account, CandyGuard, CandyMachine, GuardSet, Metadata, SaleGroup, TokenHolding,
};
use crate::mint::{MaterializeError, MetadataFetcher};
use crate::notify::{Notice, Notifier};
use crate::rpc::{
    BlockhashInfo, ChainRpc, RpcManagerError, RpcResult, SignatureStatus, SimulationReport,
};

/// How many times each [`ChainRpc`] method was called
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub latest_blockhash: usize,
    pub block_height: usize,
    pub slot: usize,
    pub block_time: usize,
    pub simulate: usize,
    pub send: usize,
    pub signature_statuses: usize,
    pub account_data: usize,
    pub balance: usize,
    pub token_accounts: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.latest_blockhash
            + self.block_height
            + self.slot
            + self.block_time
            + self.simulate
            + self.send
            + self.signature_statuses
            + self.account_data
            + self.balance
            + self.token_accounts
    }
}

struct ScriptState {
    accounts: HashMap<Pubkey, Vec<u8>>,
    balances: HashMap<Pubkey, u64>,
    /// Delay of every balance read
    balance_delay: Duration,
    blockhash: BlockhashInfo,
    block_height: u64,
    /// Added to the block height after every read
    block_height_step: u64,
    slot: u64,
    block_time: Option<i64>,
    units_consumed: Option<u64>,
    simulation_error: Option<String>,
    /// Zero-based send calls that are rejected
    failing_sends: HashSet<usize>,
    /// Status polls a sent signature needs before it reports reached
    polls_until_reached: usize,
    status_overrides: HashMap<Signature, SignatureStatus>,
    status_polls: HashMap<Signature, usize>,
    /// Created for the asset of every accepted send, when set
    metadata_uri_prefix: Option<String>,
    sent: Vec<VersionedTransaction>,
    simulated: Vec<VersionedTransaction>,
    calls: CallCounts,
}

/// In-memory chain driven by a script
///
/// Sent transactions are recorded and their signatures reach the target
/// commitment after a configurable number of status polls.
pub struct ScriptedRpc {
    state: Mutex<ScriptState>,
}

impl Default for ScriptedRpc {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRpc {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScriptState {
                accounts: HashMap::new(),
                balances: HashMap::new(),
                balance_delay: Duration::ZERO,
                blockhash: BlockhashInfo {
                    blockhash: Hash::new_unique(),
                    last_valid_block_height: 250,
                },
                block_height: 100,
                block_height_step: 0,
                slot: 1_000,
                block_time: Some(1_700_000_000),
                units_consumed: Some(150_000),
                simulation_error: None,
                failing_sends: HashSet::new(),
                polls_until_reached: 1,
                status_overrides: HashMap::new(),
                status_polls: HashMap::new(),
                metadata_uri_prefix: Some("https://arweave.test".to_string()),
                sent: Vec::new(),
                simulated: Vec::new(),
                calls: CallCounts::default(),
            }),
        }
    }

    pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
        self.state.lock().accounts.insert(address, data);
    }

    pub fn remove_account(&self, address: &Pubkey) {
        self.state.lock().accounts.remove(address);
    }

    pub fn set_balance(&self, address: Pubkey, lamports: u64) {
        self.state.lock().balances.insert(address, lamports);
    }

    /// Hold every balance read for `delay` before answering
    pub fn set_balance_delay(&self, delay: Duration) {
        self.state.lock().balance_delay = delay;
    }

    /// Give `owner` a token account holding `amount` of `mint`
    pub fn set_token_account(&self, owner: &Pubkey, mint: &Pubkey, amount: u64) {
        let holding = TokenHolding {
            mint: *mint,
            owner: *owner,
            amount,
        };
        self.set_account(
            get_associated_token_address(owner, mint),
            encode::token_account(&holding),
        );
    }

    pub fn set_blockhash(&self, blockhash: BlockhashInfo) {
        self.state.lock().blockhash = blockhash;
    }

    pub fn blockhash(&self) -> BlockhashInfo {
        self.state.lock().blockhash
    }

    pub fn set_block_height(&self, height: u64, step: u64) {
        let mut state = self.state.lock();
        state.block_height = height;
        state.block_height_step = step;
    }

    pub fn set_block_time(&self, time: Option<i64>) {
        self.state.lock().block_time = time;
    }

    pub fn set_simulation(&self, units_consumed: Option<u64>, error: Option<&str>) {
        let mut state = self.state.lock();
        state.units_consumed = units_consumed;
        state.simulation_error = error.map(str::to_string);
    }

    /// Reject the `index`-th send call, counting from zero
    pub fn fail_send(&self, index: usize) {
        self.state.lock().failing_sends.insert(index);
    }

    pub fn set_polls_until_reached(&self, polls: usize) {
        self.state.lock().polls_until_reached = polls;
    }

    pub fn override_status(&self, signature: Signature, status: SignatureStatus) {
        self.state.lock().status_overrides.insert(signature, status);
    }

    /// Stop creating metadata accounts for sent assets
    pub fn disable_asset_metadata(&self) {
        self.state.lock().metadata_uri_prefix = None;
    }

    pub fn sent(&self) -> Vec<VersionedTransaction> {
        self.state.lock().sent.clone()
    }

    pub fn simulated(&self) -> Vec<VersionedTransaction> {
        self.state.lock().simulated.clone()
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }
}

#[async_trait]
impl ChainRpc for ScriptedRpc {
    async fn latest_blockhash(&self, _commitment: CommitmentConfig) -> RpcResult<BlockhashInfo> {
        let mut state = self.state.lock();
        state.calls.latest_blockhash += 1;
        Ok(state.blockhash)
    }

    async fn block_height(&self, _commitment: CommitmentConfig) -> RpcResult<u64> {
        let mut state = self.state.lock();
        state.calls.block_height += 1;
        let height = state.block_height;
        state.block_height += state.block_height_step;
        Ok(height)
    }

    async fn slot(&self, _commitment: CommitmentConfig) -> RpcResult<u64> {
        let mut state = self.state.lock();
        state.calls.slot += 1;
        Ok(state.slot)
    }

    async fn block_time(&self, slot: u64) -> RpcResult<i64> {
        let mut state = self.state.lock();
        state.calls.block_time += 1;
        state.block_time.ok_or_else(|| RpcManagerError::RpcResponse {
            endpoint: "scripted".to_string(),
            message: format!("Block not available for slot {slot}"),
            code: Some(-32004),
        })
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> RpcResult<SimulationReport> {
        let mut state = self.state.lock();
        state.calls.simulate += 1;
        state.simulated.push(tx.clone());
        Ok(SimulationReport {
            units_consumed: state.units_consumed,
            err: state.simulation_error.clone(),
            logs: Vec::new(),
        })
    }

    async fn send(&self, tx: &VersionedTransaction) -> RpcResult<Signature> {
        let mut state = self.state.lock();
        let index = state.calls.send;
        state.calls.send += 1;
        if state.failing_sends.contains(&index) {
            return Err(RpcManagerError::RpcResponse {
                endpoint: "scripted".to_string(),
                message: format!("send {index} rejected"),
                code: Some(-32002),
            });
        }

        let signature = tx.signatures.first().copied().unwrap_or_default();
        if let (Some(prefix), Some(asset)) = (
            state.metadata_uri_prefix.clone(),
            tx.message.static_account_keys().get(1).copied(),
        ) {
            let meta = Metadata {
                update_authority: Pubkey::new_unique(),
                mint: asset,
                name: format!("Drop #{}", state.sent.len() + 1),
                symbol: "DROP".to_string(),
                uri: format!("{prefix}/{asset}.json"),
                collection: None,
            };
            state.accounts.insert(metadata_pda(&asset), encode::metadata(&meta));
        }
        state.sent.push(tx.clone());
        Ok(signature)
    }

    async fn signature_statuses(
        &self,
        signatures: &[Signature],
        _commitment: CommitmentConfig,
    ) -> RpcResult<Vec<SignatureStatus>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.calls.signature_statuses += 1;
        let sent: HashSet<Signature> = state
            .sent
            .iter()
            .filter_map(|tx| tx.signatures.first().copied())
            .collect();
        let needed = state.polls_until_reached;

        Ok(signatures
            .iter()
            .map(|sig| {
                if let Some(status) = state.status_overrides.get(sig) {
                    return status.clone();
                }
                if !sent.contains(sig) {
                    return SignatureStatus::Pending;
                }
                let polls = state.status_polls.entry(*sig).or_insert(0);
                *polls += 1;
                if *polls >= needed {
                    SignatureStatus::Reached
                } else {
                    SignatureStatus::Pending
                }
            })
            .collect())
    }

    async fn account_data(&self, address: &Pubkey) -> RpcResult<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        state.calls.account_data += 1;
        Ok(state.accounts.get(address).cloned())
    }

    async fn balance(&self, address: &Pubkey) -> RpcResult<u64> {
        let (lamports, delay) = {
            let mut state = self.state.lock();
            state.calls.balance += 1;
            let lamports = state.balances.get(address).copied().unwrap_or(0);
            (lamports, state.balance_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(lamports)
    }

    async fn token_accounts(&self, owner: &Pubkey) -> RpcResult<Vec<Vec<u8>>> {
        let mut state = self.state.lock();
        state.calls.token_accounts += 1;
        Ok(state
            .accounts
            .values()
            .filter(|data| data.len() == TOKEN_ACCOUNT_SIZE)
            .filter(|data| {
                decode_token_account(data).is_ok_and(|holding| holding.owner == *owner)
            })
            .cloned()
            .collect())
    }
}

/// A drop installed into a [`ScriptedRpc`]
#[derive(Debug, Clone)]
pub struct DropFixture {
    pub candy_machine: CandyMachine,
    pub candy_guard: CandyGuard,
    pub collection_update_authority: Pubkey,
}

impl DropFixture {
    /// A drop with `available` items and no guards
    pub fn new(available: u64) -> Self {
        let candy_guard_address = Pubkey::new_unique();
        Self {
            candy_machine: CandyMachine {
                address: Pubkey::new_unique(),
                authority: Pubkey::new_unique(),
                mint_authority: candy_guard_address,
                collection_mint: Pubkey::new_unique(),
                token_standard: 0,
                items_redeemed: 0,
                items_available: available,
            },
            candy_guard: CandyGuard {
                address: candy_guard_address,
                base: Pubkey::new_unique(),
                bump: 255,
                authority: Pubkey::new_unique(),
                guards: GuardSet::default(),
                groups: Vec::new(),
            },
            collection_update_authority: Pubkey::new_unique(),
        }
    }

    pub fn with_default_guards(mut self, guards: GuardSet) -> Self {
        self.candy_guard.guards = guards;
        self
    }

    pub fn with_group(mut self, label: &str, guards: GuardSet) -> Self {
        self.candy_guard.groups.push(SaleGroup {
            label: label.to_string(),
            guards,
        });
        self
    }

    pub fn with_redeemed(mut self, redeemed: u64) -> Self {
        self.candy_machine.items_redeemed = redeemed;
        self
    }

    /// Write the candy machine, candy guard and collection metadata
    pub fn install(&self, rpc: &ScriptedRpc) {
        self.install_without_guard(rpc);
        rpc.set_account(
            self.candy_guard.address,
            encode::candy_guard(&self.candy_guard),
        );
    }

    /// Write everything except the candy guard account
    pub fn install_without_guard(&self, rpc: &ScriptedRpc) {
        rpc.set_account(
            self.candy_machine.address,
            encode::candy_machine(&self.candy_machine),
        );
        let collection = Metadata {
            update_authority: self.collection_update_authority,
            mint: self.candy_machine.collection_mint,
            name: "Collection".to_string(),
            symbol: "DROP".to_string(),
            uri: "https://arweave.test/collection.json".to_string(),
            collection: None,
        };
        rpc.set_account(
            metadata_pda(&self.candy_machine.collection_mint),
            encode::metadata(&collection),
        );
    }
}

/// Serves a fixed JSON document for every uri except the failing ones
#[derive(Default)]
pub struct MockMetadataFetcher {
    failing: Mutex<HashSet<String>>,
    fetched: Mutex<Vec<String>>,
}

impl MockMetadataFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uri(&self, uri: impl Into<String>) {
        self.failing.lock().insert(uri.into());
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl MetadataFetcher for MockMetadataFetcher {
    async fn fetch_json(&self, uri: &str) -> Result<serde_json::Value, MaterializeError> {
        self.fetched.lock().push(uri.to_string());
        if self.failing.lock().contains(uri) {
            return Err(MaterializeError::Http {
                uri: uri.to_string(),
                message: "500 Internal Server Error".to_string(),
            });
        }
        Ok(serde_json::json!({
            "name": "Drop",
            "image": format!("{uri}.png"),
        }))
    }
}

/// Keeps every notice for later assertions
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.notices.lock().iter().map(|n| n.title.clone()).collect()
    }

    pub fn contains(&self, title: &str) -> bool {
        self.notices.lock().iter().any(|n| n.title == title)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}
