//! Eligibility of the connected wallet for each sale group

use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::GuardError;
use crate::candy::instructions::{metadata_pda, mint_counter_pda};
use crate::candy::{
    decode_metadata, decode_mint_counter, decode_token_account, decode_token_amount, CandyGuard,
    CandyMachine, GuardSet,
};
use crate::rpc::ChainRpc;
use crate::types::{EligibilityGuard, DEFAULT_LABEL};

/// Wallet balances and counters the guard rules are checked against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletState {
    pub lamports: u64,
    /// Token balance by mint
    pub token_balances: HashMap<Pubkey, u64>,
    /// Mints already counted, by mint limit id
    pub minted: HashMap<u8, u16>,
    /// Owned NFT mints by verified collection
    pub payment_nfts: HashMap<Pubkey, Vec<Pubkey>>,
}

impl WalletState {
    pub fn token_balance(&self, mint: &Pubkey) -> u64 {
        self.token_balances.get(mint).copied().unwrap_or(0)
    }

    pub fn nfts_of(&self, collection: &Pubkey) -> &[Pubkey] {
        self.payment_nfts
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Read the balances and counters every rule set in `rule_sets` refers to
    pub async fn fetch(
        rpc: &dyn ChainRpc,
        wallet: &Pubkey,
        candy_machine: &Pubkey,
        candy_guard: &Pubkey,
        rule_sets: &[GuardSet],
    ) -> Result<Self, GuardError> {
        let mints: HashSet<Pubkey> = rule_sets
            .iter()
            .flat_map(|rules| {
                rules
                    .token_payment
                    .map(|p| p.mint)
                    .into_iter()
                    .chain(rules.token_gate.map(|g| g.mint))
            })
            .collect();
        let limit_ids: HashSet<u8> = rule_sets
            .iter()
            .filter_map(|rules| rules.mint_limit.map(|limit| limit.id))
            .collect();
        let collections: HashSet<Pubkey> = rule_sets
            .iter()
            .filter_map(|rules| rules.nft_payment.map(|p| p.required_collection))
            .collect();

        let token_reads = mints.into_iter().map(|mint| async move {
            let ata = get_associated_token_address(wallet, &mint);
            let amount = match rpc.account_data(&ata).await? {
                Some(data) => decode_token_amount(&data)?,
                None => 0,
            };
            Ok::<_, GuardError>((mint, amount))
        });
        let counter_reads = limit_ids.into_iter().map(|id| async move {
            let counter = mint_counter_pda(id, wallet, candy_guard, candy_machine);
            let minted = match rpc.account_data(&counter).await? {
                Some(data) => decode_mint_counter(&data)?,
                None => 0,
            };
            Ok::<_, GuardError>((id, minted))
        });

        let nft_read = async {
            if collections.is_empty() {
                return Ok(HashMap::new());
            }
            owned_collection_nfts(rpc, wallet, &collections).await
        };

        let (lamports, tokens, counters, nfts) = futures::join!(
            rpc.balance(wallet),
            join_all(token_reads),
            join_all(counter_reads),
            nft_read
        );

        let state = WalletState {
            lamports: lamports?,
            token_balances: tokens.into_iter().collect::<Result<_, _>>()?,
            minted: counters.into_iter().collect::<Result<_, _>>()?,
            payment_nfts: nfts?,
        };
        debug!(
            lamports = state.lamports,
            tokens = state.token_balances.len(),
            counters = state.minted.len(),
            nft_collections = state.payment_nfts.len(),
            "Wallet state fetched"
        );
        Ok(state)
    }
}

/// NFTs held by `wallet` whose verified collection is one of `collections`
///
/// Mints are sorted within each collection.
pub async fn owned_collection_nfts(
    rpc: &dyn ChainRpc,
    wallet: &Pubkey,
    collections: &HashSet<Pubkey>,
) -> Result<HashMap<Pubkey, Vec<Pubkey>>, GuardError> {
    let mut held = Vec::new();
    for data in rpc.token_accounts(wallet).await? {
        let holding = decode_token_account(&data)?;
        if holding.amount > 0 {
            held.push(holding.mint);
        }
    }

    let metadata_reads = held.into_iter().map(|mint| async move {
        let data = rpc.account_data(&metadata_pda(&mint)).await?;
        let collection = match data {
            Some(data) => decode_metadata(&data)?.collection,
            None => None,
        };
        Ok::<_, GuardError>((mint, collection))
    });

    let mut by_collection: HashMap<Pubkey, Vec<Pubkey>> = HashMap::new();
    for read in join_all(metadata_reads).await {
        if let (mint, Some(collection)) = read? {
            if collections.contains(&collection) {
                by_collection.entry(collection).or_default().push(mint);
            }
        }
    }
    for mints in by_collection.values_mut() {
        mints.sort();
    }
    Ok(by_collection)
}

/// Everything needed to decide eligibility, already fetched
#[derive(Debug, Clone, Copy)]
pub struct EligibilityContext<'a> {
    pub candy_machine: &'a CandyMachine,
    pub candy_guard: &'a CandyGuard,
    pub wallet: Pubkey,
    pub wallet_state: &'a WalletState,
    /// On-chain unix time
    pub now: i64,
    /// Groups with an allow-list proof configured for this wallet
    pub allow_listed: &'a HashSet<String>,
    /// Largest quantity one click may request
    pub per_click_max: u64,
}

/// One entry per group, or a single `"default"` entry without groups
pub fn check_eligibility(ctx: &EligibilityContext<'_>) -> Vec<EligibilityGuard> {
    let cg = ctx.candy_guard;
    if cg.groups.is_empty() {
        return vec![evaluate(ctx, DEFAULT_LABEL, &cg.guards)];
    }
    cg.groups
        .iter()
        .map(|group| evaluate(ctx, &group.label, &group.guards.merged_over(&cg.guards)))
        .collect()
}

fn evaluate(ctx: &EligibilityContext<'_>, label: &str, rules: &GuardSet) -> EligibilityGuard {
    match assess(ctx, label, rules) {
        Ok(max_amount) => EligibilityGuard::allowed(label, max_amount),
        Err(reason) => EligibilityGuard::denied(label, reason),
    }
}

/// Quantity cap when allowed, the denial reason otherwise
fn assess(
    ctx: &EligibilityContext<'_>,
    label: &str,
    rules: &GuardSet,
) -> Result<u64, &'static str> {
    let cm = ctx.candy_machine;
    let state = ctx.wallet_state;

    if cm.items_remaining() == 0 {
        return Err("Sold out");
    }
    if rules.third_party_signer.is_some() {
        return Err("Third party signer is not supported");
    }
    if rules.gatekeeper.is_some() {
        return Err("Gatekeeper is not supported");
    }
    if rules.start_date.is_some_and(|start| start > ctx.now) {
        return Err("Mint time not reached");
    }
    if rules.end_date.is_some_and(|end| end <= ctx.now) {
        return Err("Mint time passed");
    }
    if let Some(address) = rules.address_gate {
        if address != ctx.wallet {
            return Err("Address not allowed");
        }
    }
    if rules.allow_list.is_some() && !ctx.allow_listed.contains(label) {
        return Err("Not in allow list");
    }
    if let Some(gate) = rules.token_gate {
        if state.token_balance(&gate.mint) < gate.amount {
            return Err("Missing required tokens");
        }
    }

    let mut max_amount = ctx.per_click_max.min(cm.items_remaining());

    if let Some(payment) = rules.sol_payment {
        if state.lamports < payment.lamports {
            return Err("Not enough SOL");
        }
        if payment.lamports > 0 {
            max_amount = max_amount.min(state.lamports / payment.lamports);
        }
    }
    if let Some(payment) = rules.token_payment {
        let balance = state.token_balance(&payment.mint);
        if balance < payment.amount {
            return Err("Not enough tokens");
        }
        if payment.amount > 0 {
            max_amount = max_amount.min(balance / payment.amount);
        }
    }
    if let Some(payment) = rules.nft_payment {
        let owned = state.nfts_of(&payment.required_collection).len() as u64;
        if owned == 0 {
            return Err("Missing required NFT");
        }
        max_amount = max_amount.min(owned);
    }
    if let Some(limit) = rules.mint_limit {
        let minted = state.minted.get(&limit.id).copied().unwrap_or(0);
        let left = u64::from(limit.limit.saturating_sub(minted));
        if left == 0 {
            return Err("Mint limit reached");
        }
        max_amount = max_amount.min(left);
    }
    if let Some(maximum) = rules.redeemed_amount {
        let left = maximum.saturating_sub(cm.items_redeemed);
        if left == 0 {
            return Err("Sold out");
        }
        max_amount = max_amount.min(left);
    }

    Ok(max_amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candy::accounts::encode;
    use crate::candy::guard_set::{MintLimit, NftPayment, SolPayment, TokenGate};
    use crate::candy::{Metadata, SaleGroup};
    use crate::test_utils::ScriptedRpc;

    struct Fixture {
        cm: CandyMachine,
        cg: CandyGuard,
        wallet: Pubkey,
        state: WalletState,
        allow_listed: HashSet<String>,
    }

    impl Fixture {
        fn new(groups: Vec<SaleGroup>) -> Self {
            Self {
                cm: CandyMachine {
                    address: Pubkey::new_unique(),
                    authority: Pubkey::new_unique(),
                    mint_authority: Pubkey::new_unique(),
                    collection_mint: Pubkey::new_unique(),
                    token_standard: 0,
                    items_redeemed: 90,
                    items_available: 100,
                },
                cg: CandyGuard {
                    address: Pubkey::new_unique(),
                    base: Pubkey::new_unique(),
                    bump: 0,
                    authority: Pubkey::new_unique(),
                    guards: GuardSet::default(),
                    groups,
                },
                wallet: Pubkey::new_unique(),
                state: WalletState {
                    lamports: 5_000_000_000,
                    ..Default::default()
                },
                allow_listed: HashSet::new(),
            }
        }

        fn check(&self, now: i64) -> Vec<EligibilityGuard> {
            check_eligibility(&EligibilityContext {
                candy_machine: &self.cm,
                candy_guard: &self.cg,
                wallet: self.wallet,
                wallet_state: &self.state,
                now,
                allow_listed: &self.allow_listed,
                per_click_max: 5,
            })
        }
    }

    fn group(label: &str, guards: GuardSet) -> SaleGroup {
        SaleGroup {
            label: label.to_string(),
            guards,
        }
    }

    #[test]
    fn test_no_groups_yields_default_entry() {
        let fx = Fixture::new(vec![]);
        let result = fx.check(0);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].label, DEFAULT_LABEL);
        assert!(result[0].allowed);
        assert_eq!(result[0].max_amount, 5);
    }

    #[test]
    fn test_sale_window_reasons() {
        let fx = Fixture::new(vec![
            group(
                "early",
                GuardSet {
                    start_date: Some(1_000),
                    ..Default::default()
                },
            ),
            group(
                "late",
                GuardSet {
                    end_date: Some(500),
                    ..Default::default()
                },
            ),
        ]);
        let result = fx.check(600);
        assert_eq!(result[0].reason.as_deref(), Some("Mint time not reached"));
        assert_eq!(result[1].reason.as_deref(), Some("Mint time passed"));
    }

    #[test]
    fn test_sold_out() {
        let mut fx = Fixture::new(vec![]);
        fx.cm.items_redeemed = 100;
        assert_eq!(fx.check(0)[0].reason.as_deref(), Some("Sold out"));
    }

    #[test]
    fn test_payment_and_gates() {
        let gate_mint = Pubkey::new_unique();
        let mut fx = Fixture::new(vec![
            group(
                "pricey",
                GuardSet {
                    sol_payment: Some(SolPayment {
                        lamports: 10_000_000_000,
                        destination: Pubkey::new_unique(),
                    }),
                    ..Default::default()
                },
            ),
            group(
                "holders",
                GuardSet {
                    token_gate: Some(TokenGate {
                        amount: 2,
                        mint: gate_mint,
                    }),
                    ..Default::default()
                },
            ),
            group(
                "vip",
                GuardSet {
                    address_gate: Some(Pubkey::new_unique()),
                    ..Default::default()
                },
            ),
            group(
                "wl",
                GuardSet {
                    allow_list: Some([1u8; 32]),
                    ..Default::default()
                },
            ),
        ]);
        fx.state.token_balances.insert(gate_mint, 1);

        let reasons: Vec<_> = fx
            .check(0)
            .into_iter()
            .map(|guard| guard.reason.unwrap_or_default())
            .collect();
        assert_eq!(
            reasons,
            vec![
                "Not enough SOL",
                "Missing required tokens",
                "Address not allowed",
                "Not in allow list"
            ]
        );

        fx.allow_listed.insert("wl".to_string());
        assert!(fx.check(0)[3].allowed);
    }

    #[test]
    fn test_max_amount_caps() {
        let mut fx = Fixture::new(vec![
            group(
                "limited",
                GuardSet {
                    mint_limit: Some(MintLimit { id: 1, limit: 3 }),
                    ..Default::default()
                },
            ),
            group(
                "spent",
                GuardSet {
                    mint_limit: Some(MintLimit { id: 2, limit: 1 }),
                    ..Default::default()
                },
            ),
            group(
                "paid",
                GuardSet {
                    sol_payment: Some(SolPayment {
                        lamports: 2_000_000_000,
                        destination: Pubkey::new_unique(),
                    }),
                    ..Default::default()
                },
            ),
            group(
                "capped",
                GuardSet {
                    redeemed_amount: Some(92),
                    ..Default::default()
                },
            ),
        ]);
        fx.state.minted.insert(1, 1);
        fx.state.minted.insert(2, 1);

        let result = fx.check(0);
        assert_eq!(result[0].max_amount, 2);
        assert_eq!(result[1].reason.as_deref(), Some("Mint limit reached"));
        // 5 SOL at 2 SOL each
        assert_eq!(result[2].max_amount, 2);
        assert_eq!(result[3].max_amount, 2);
    }

    #[test]
    fn test_items_remaining_caps_per_click_max() {
        let mut fx = Fixture::new(vec![]);
        fx.cm.items_redeemed = 98;
        assert_eq!(fx.check(0)[0].max_amount, 2);
    }

    #[test]
    fn test_nft_payment_needs_an_owned_nft() {
        let collection = Pubkey::new_unique();
        let nft_payment = Some(NftPayment {
            required_collection: collection,
            destination: Pubkey::new_unique(),
        });
        let mut fx = Fixture::new(vec![group(
            "holders",
            GuardSet {
                nft_payment,
                ..Default::default()
            },
        )]);
        assert_eq!(fx.check(0)[0].reason.as_deref(), Some("Missing required NFT"));

        fx.state.payment_nfts.insert(
            collection,
            vec![Pubkey::new_unique(), Pubkey::new_unique()],
        );
        let result = fx.check(0);
        assert!(result[0].allowed);
        // one NFT is spent per mint
        assert_eq!(result[0].max_amount, 2);
    }

    fn install_nft(rpc: &ScriptedRpc, owner: &Pubkey, collection: Option<Pubkey>) -> Pubkey {
        let mint = Pubkey::new_unique();
        rpc.set_token_account(owner, &mint, 1);
        let meta = Metadata {
            update_authority: Pubkey::new_unique(),
            mint,
            name: "Pass".to_string(),
            symbol: "PASS".to_string(),
            uri: "https://arweave.test/pass.json".to_string(),
            collection,
        };
        rpc.set_account(metadata_pda(&mint), encode::metadata(&meta));
        mint
    }

    #[tokio::test]
    async fn test_owned_nfts_are_grouped_by_verified_collection() {
        let rpc = ScriptedRpc::new();
        let wallet = Pubkey::new_unique();
        let wanted = Pubkey::new_unique();
        let first = install_nft(&rpc, &wallet, Some(wanted));
        let second = install_nft(&rpc, &wallet, Some(wanted));
        install_nft(&rpc, &wallet, Some(Pubkey::new_unique()));
        install_nft(&rpc, &wallet, None);
        // someone else's pass
        install_nft(&rpc, &Pubkey::new_unique(), Some(wanted));
        // an empty token account of the collection
        let spent = install_nft(&rpc, &wallet, Some(wanted));
        rpc.set_token_account(&wallet, &spent, 0);

        let owned = owned_collection_nfts(&rpc, &wallet, &HashSet::from([wanted]))
            .await
            .unwrap();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[&wanted], expected);
    }

    #[tokio::test]
    async fn test_fetch_skips_token_listing_without_nft_payment() {
        let rpc = ScriptedRpc::new();
        let wallet = Pubkey::new_unique();
        rpc.set_balance(wallet, 7);
        let state = WalletState::fetch(
            &rpc,
            &wallet,
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &[GuardSet::default()],
        )
        .await
        .unwrap();
        assert_eq!(state.lamports, 7);
        assert!(state.payment_nfts.is_empty());
        assert_eq!(rpc.calls().token_accounts, 0);
    }
}
