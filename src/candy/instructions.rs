//! Candy guard instructions and derived addresses

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program, sysvar,
};
use spl_associated_token_account::get_associated_token_address;

use super::accounts::{CandyMachine, TOKEN_STANDARD_PROGRAMMABLE};
use super::guard_set::{GuardSet, ALLOW_LIST_GUARD_TYPE};
use super::{
    discriminator, AUTHORIZATION_RULES_PROGRAM_ID, CANDY_GUARD_PROGRAM_ID,
    CANDY_MACHINE_PROGRAM_ID, TOKEN_METADATA_PROGRAM_ID,
};
use crate::tx_builder::TransactionBuilderError;

const PROGRAM: &str = "candy_guard";

pub fn candy_machine_authority_pda(candy_machine: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[b"candy_machine", candy_machine.as_ref()],
        &CANDY_MACHINE_PROGRAM_ID,
    )
    .0
}

pub fn metadata_pda(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[b"metadata", TOKEN_METADATA_PROGRAM_ID.as_ref(), mint.as_ref()],
        &TOKEN_METADATA_PROGRAM_ID,
    )
    .0
}

pub fn master_edition_pda(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"metadata",
            TOKEN_METADATA_PROGRAM_ID.as_ref(),
            mint.as_ref(),
            b"edition",
        ],
        &TOKEN_METADATA_PROGRAM_ID,
    )
    .0
}

pub fn token_record_pda(mint: &Pubkey, token: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"metadata",
            TOKEN_METADATA_PROGRAM_ID.as_ref(),
            mint.as_ref(),
            b"token_record",
            token.as_ref(),
        ],
        &TOKEN_METADATA_PROGRAM_ID,
    )
    .0
}

pub fn collection_delegate_record_pda(
    collection_mint: &Pubkey,
    update_authority: &Pubkey,
    delegate: &Pubkey,
) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"metadata",
            TOKEN_METADATA_PROGRAM_ID.as_ref(),
            collection_mint.as_ref(),
            b"collection_delegate",
            update_authority.as_ref(),
            delegate.as_ref(),
        ],
        &TOKEN_METADATA_PROGRAM_ID,
    )
    .0
}

pub fn mint_counter_pda(
    id: u8,
    minter: &Pubkey,
    candy_guard: &Pubkey,
    candy_machine: &Pubkey,
) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"mint_limit",
            &[id],
            minter.as_ref(),
            candy_guard.as_ref(),
            candy_machine.as_ref(),
        ],
        &CANDY_GUARD_PROGRAM_ID,
    )
    .0
}

pub fn allow_list_proof_pda(
    merkle_root: &[u8; 32],
    minter: &Pubkey,
    candy_guard: &Pubkey,
    candy_machine: &Pubkey,
) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"allow_list",
            merkle_root.as_ref(),
            minter.as_ref(),
            candy_guard.as_ref(),
            candy_machine.as_ref(),
        ],
        &CANDY_GUARD_PROGRAM_ID,
    )
    .0
}

/// Guard-specific accounts and argument bytes for `mint_v2`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MintArgs {
    pub remaining_accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// Resolve the accounts each enabled guard expects, in guard order
///
/// `payment_nft` is the owned NFT handed over by `nftPayment`; every mint
/// needs its own.
pub fn mint_args_builder(
    candy_machine: &Pubkey,
    candy_guard: &Pubkey,
    guards: &GuardSet,
    minter: &Pubkey,
    payment_nft: Option<&Pubkey>,
) -> Result<MintArgs, TransactionBuilderError> {
    if guards.third_party_signer.is_some() {
        return Err(TransactionBuilderError::instruction_failed(
            PROGRAM,
            "thirdPartySigner requires a co-signer this client cannot provide",
        ));
    }
    if guards.gatekeeper.is_some() {
        return Err(TransactionBuilderError::instruction_failed(
            PROGRAM,
            "gatekeeper tokens are not supported",
        ));
    }
    let mut accounts = Vec::new();
    if let Some(sol) = &guards.sol_payment {
        accounts.push(AccountMeta::new(sol.destination, false));
    }
    if let Some(token) = &guards.token_payment {
        accounts.push(AccountMeta::new(
            get_associated_token_address(minter, &token.mint),
            false,
        ));
        accounts.push(AccountMeta::new(token.destination_ata, false));
    }
    if let Some(gate) = &guards.token_gate {
        accounts.push(AccountMeta::new_readonly(
            get_associated_token_address(minter, &gate.mint),
            false,
        ));
    }
    if let Some(root) = &guards.allow_list {
        accounts.push(AccountMeta::new_readonly(
            allow_list_proof_pda(root, minter, candy_guard, candy_machine),
            false,
        ));
    }
    if let Some(limit) = &guards.mint_limit {
        accounts.push(AccountMeta::new(
            mint_counter_pda(limit.id, minter, candy_guard, candy_machine),
            false,
        ));
    }
    if let Some(payment) = &guards.nft_payment {
        let nft = payment_nft.ok_or_else(|| {
            TransactionBuilderError::instruction_failed(
                PROGRAM,
                "nftPayment requires an owned NFT of the required collection",
            )
        })?;
        accounts.push(AccountMeta::new(get_associated_token_address(minter, nft), false));
        accounts.push(AccountMeta::new(metadata_pda(nft), false));
        accounts.push(AccountMeta::new_readonly(*nft, false));
        accounts.push(AccountMeta::new_readonly(payment.destination, false));
        accounts.push(AccountMeta::new(
            get_associated_token_address(&payment.destination, nft),
            false,
        ));
        accounts.push(AccountMeta::new_readonly(spl_associated_token_account::id(), false));
    }

    Ok(MintArgs {
        remaining_accounts: accounts,
        data: Vec::new(),
    })
}

fn push_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn push_label(out: &mut Vec<u8>, label: Option<&str>) {
    match label {
        Some(label) => {
            out.push(1);
            push_bytes(out, label.as_bytes());
        }
        None => out.push(0),
    }
}

/// Accounts for one `mint_v2` call
#[derive(Debug, Clone, Copy)]
pub struct MintV2Accounts<'a> {
    pub candy_guard: Pubkey,
    pub candy_machine: &'a CandyMachine,
    pub payer: Pubkey,
    pub minter: Pubkey,
    pub nft_mint: Pubkey,
    pub collection_update_authority: Pubkey,
}

/// `mint_v2` of the candy guard program; `label` is `None` for the default guard
pub fn mint_v2_instruction(
    accounts: MintV2Accounts<'_>,
    label: Option<&str>,
    args: &MintArgs,
) -> Instruction {
    let cm = accounts.candy_machine;
    let authority_pda = candy_machine_authority_pda(&cm.address);
    let token = get_associated_token_address(&accounts.minter, &accounts.nft_mint);
    let programmable = cm.token_standard == TOKEN_STANDARD_PROGRAMMABLE;
    // Anchor reads the program id as "account not provided"
    let none = AccountMeta::new_readonly(CANDY_GUARD_PROGRAM_ID, false);

    let mut metas = vec![
        AccountMeta::new_readonly(accounts.candy_guard, false),
        AccountMeta::new_readonly(CANDY_MACHINE_PROGRAM_ID, false),
        AccountMeta::new(cm.address, false),
        AccountMeta::new(authority_pda, false),
        AccountMeta::new(accounts.payer, true),
        AccountMeta::new(accounts.minter, true),
        AccountMeta::new(accounts.nft_mint, true),
        AccountMeta::new_readonly(accounts.minter, true),
        AccountMeta::new(metadata_pda(&accounts.nft_mint), false),
        AccountMeta::new(master_edition_pda(&accounts.nft_mint), false),
        AccountMeta::new(token, false),
        if programmable {
            AccountMeta::new(token_record_pda(&accounts.nft_mint, &token), false)
        } else {
            none.clone()
        },
        AccountMeta::new_readonly(
            collection_delegate_record_pda(
                &cm.collection_mint,
                &accounts.collection_update_authority,
                &authority_pda,
            ),
            false,
        ),
        AccountMeta::new_readonly(cm.collection_mint, false),
        AccountMeta::new(metadata_pda(&cm.collection_mint), false),
        AccountMeta::new_readonly(master_edition_pda(&cm.collection_mint), false),
        AccountMeta::new_readonly(accounts.collection_update_authority, false),
        AccountMeta::new_readonly(TOKEN_METADATA_PROGRAM_ID, false),
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new_readonly(spl_associated_token_account::id(), false),
        AccountMeta::new_readonly(system_program::id(), false),
        AccountMeta::new_readonly(sysvar::instructions::id(), false),
        AccountMeta::new_readonly(sysvar::slot_hashes::id(), false),
        if programmable {
            AccountMeta::new_readonly(AUTHORIZATION_RULES_PROGRAM_ID, false)
        } else {
            none.clone()
        },
        none,
    ];
    metas.extend(args.remaining_accounts.iter().cloned());

    let mut data = discriminator("global", "mint_v2").to_vec();
    push_bytes(&mut data, &args.data);
    push_label(&mut data, label);

    Instruction {
        program_id: CANDY_GUARD_PROGRAM_ID,
        accounts: metas,
        data,
    }
}

/// `route` call that records the minter's allow-list proof on chain
pub fn route_allow_list_instruction(
    candy_guard: &Pubkey,
    candy_machine: &Pubkey,
    payer: &Pubkey,
    merkle_root: &[u8; 32],
    proof: &[[u8; 32]],
    label: Option<&str>,
) -> Instruction {
    let proof_pda = allow_list_proof_pda(merkle_root, payer, candy_guard, candy_machine);

    let mut proof_bytes = (proof.len() as u32).to_le_bytes().to_vec();
    for node in proof {
        proof_bytes.extend_from_slice(node);
    }

    let mut data = discriminator("global", "route").to_vec();
    data.push(ALLOW_LIST_GUARD_TYPE);
    push_bytes(&mut data, &proof_bytes);
    push_label(&mut data, label);

    Instruction {
        program_id: CANDY_GUARD_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new_readonly(*candy_guard, false),
            AccountMeta::new(*candy_machine, false),
            AccountMeta::new(*payer, true),
            AccountMeta::new(proof_pda, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(*payer, true),
        ],
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candy::guard_set::{Gatekeeper, MintLimit, NftPayment, SolPayment};

    fn machine(token_standard: u8) -> CandyMachine {
        CandyMachine {
            address: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
            mint_authority: Pubkey::new_unique(),
            collection_mint: Pubkey::new_unique(),
            token_standard,
            items_redeemed: 0,
            items_available: 10,
        }
    }

    #[test]
    fn test_mint_args_follow_guard_order() {
        let cm = Pubkey::new_unique();
        let cg = Pubkey::new_unique();
        let minter = Pubkey::new_unique();
        let destination = Pubkey::new_unique();
        let guards = GuardSet {
            sol_payment: Some(SolPayment {
                lamports: 1,
                destination,
            }),
            mint_limit: Some(MintLimit { id: 3, limit: 1 }),
            ..Default::default()
        };

        let args = mint_args_builder(&cm, &cg, &guards, &minter, None).unwrap();
        assert_eq!(args.remaining_accounts.len(), 2);
        assert_eq!(args.remaining_accounts[0].pubkey, destination);
        assert!(args.remaining_accounts[0].is_writable);
        assert_eq!(
            args.remaining_accounts[1].pubkey,
            mint_counter_pda(3, &minter, &cg, &cm)
        );
    }

    #[test]
    fn test_unsupported_guards_fail_before_build() {
        let guards = GuardSet {
            gatekeeper: Some(Gatekeeper {
                gatekeeper_network: Pubkey::new_unique(),
                expire_on_use: false,
            }),
            ..Default::default()
        };
        let err = mint_args_builder(
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &guards,
            &Pubkey::new_unique(),
            None,
        )
        .unwrap_err();
        assert_eq!(err.category(), "instruction");
    }

    #[test]
    fn test_nft_payment_accounts() {
        let cm = Pubkey::new_unique();
        let cg = Pubkey::new_unique();
        let minter = Pubkey::new_unique();
        let destination = Pubkey::new_unique();
        let nft = Pubkey::new_unique();
        let guards = GuardSet {
            mint_limit: Some(MintLimit { id: 1, limit: 2 }),
            nft_payment: Some(NftPayment {
                required_collection: Pubkey::new_unique(),
                destination,
            }),
            ..Default::default()
        };

        let args = mint_args_builder(&cm, &cg, &guards, &minter, Some(&nft)).unwrap();
        let keys: Vec<Pubkey> = args.remaining_accounts.iter().map(|m| m.pubkey).collect();
        assert_eq!(
            keys,
            vec![
                mint_counter_pda(1, &minter, &cg, &cm),
                get_associated_token_address(&minter, &nft),
                metadata_pda(&nft),
                nft,
                destination,
                get_associated_token_address(&destination, &nft),
                spl_associated_token_account::id(),
            ]
        );
        assert!(args.remaining_accounts[1].is_writable);
        assert!(!args.remaining_accounts[3].is_writable);

        let err = mint_args_builder(&cm, &cg, &guards, &minter, None).unwrap_err();
        assert!(err.to_string().contains("nftPayment"));
    }

    #[test]
    fn test_mint_v2_layout() {
        let cm = machine(0);
        let payer = Pubkey::new_unique();
        let nft_mint = Pubkey::new_unique();
        let args = MintArgs::default();
        let ix = mint_v2_instruction(
            MintV2Accounts {
                candy_guard: Pubkey::new_unique(),
                candy_machine: &cm,
                payer,
                minter: payer,
                nft_mint,
                collection_update_authority: Pubkey::new_unique(),
            },
            Some("early"),
            &args,
        );

        assert_eq!(ix.program_id, CANDY_GUARD_PROGRAM_ID);
        assert_eq!(ix.accounts.len(), 25);
        assert_eq!(ix.accounts[6].pubkey, nft_mint);
        assert!(ix.accounts[6].is_signer);
        // non-programmable machines leave the token record unset
        assert_eq!(ix.accounts[11].pubkey, CANDY_GUARD_PROGRAM_ID);

        let mut expected = discriminator("global", "mint_v2").to_vec();
        expected.extend_from_slice(&0u32.to_le_bytes());
        expected.push(1);
        expected.extend_from_slice(&5u32.to_le_bytes());
        expected.extend_from_slice(b"early");
        assert_eq!(ix.data, expected);
    }

    #[test]
    fn test_programmable_machine_sets_token_record() {
        let cm = machine(TOKEN_STANDARD_PROGRAMMABLE);
        let minter = Pubkey::new_unique();
        let nft_mint = Pubkey::new_unique();
        let ix = mint_v2_instruction(
            MintV2Accounts {
                candy_guard: Pubkey::new_unique(),
                candy_machine: &cm,
                payer: minter,
                minter,
                nft_mint,
                collection_update_authority: Pubkey::new_unique(),
            },
            None,
            &MintArgs::default(),
        );
        let token = get_associated_token_address(&minter, &nft_mint);
        assert_eq!(ix.accounts[11].pubkey, token_record_pda(&nft_mint, &token));
        assert_eq!(ix.accounts[23].pubkey, AUTHORIZATION_RULES_PROGRAM_ID);
        assert_eq!(*ix.data.last().unwrap(), 0);
    }

    #[test]
    fn test_route_encodes_proof() {
        let root = [7u8; 32];
        let proof = [[1u8; 32], [2u8; 32]];
        let payer = Pubkey::new_unique();
        let ix = route_allow_list_instruction(
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &payer,
            &root,
            &proof,
            None,
        );
        // discriminator + guard type + vec len + proof vec (4 + 64) + label tag
        assert_eq!(ix.data.len(), 8 + 1 + 4 + 68 + 1);
        assert_eq!(ix.data[8], ALLOW_LIST_GUARD_TYPE);
        assert!(ix.accounts[2].is_signer);
    }
}
