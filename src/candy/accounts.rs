//! Account decoders

use solana_sdk::{message::AddressLookupTableAccount, pubkey::Pubkey};

use super::guard_set::{GuardSet, SaleGroup};
use super::{discriminator, DecodeError, Reader};

/// Group labels are stored as fixed 6-byte fields
pub const MAX_LABEL_SIZE: usize = 6;

/// Token metadata `Key::MetadataV1`
const METADATA_V1_KEY: u8 = 4;

/// Size of the lookup table header preceding the address list
const LOOKUP_TABLE_META_SIZE: usize = 56;

/// Size of an SPL token account
pub const TOKEN_ACCOUNT_SIZE: usize = 165;

/// Size of one metadata creator entry
const CREATOR_SIZE: usize = 34;

/// The fields of a candy machine this client reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandyMachine {
    pub address: Pubkey,
    pub authority: Pubkey,
    pub mint_authority: Pubkey,
    pub collection_mint: Pubkey,
    pub token_standard: u8,
    pub items_redeemed: u64,
    pub items_available: u64,
}

/// Token standard of programmable NFTs
pub const TOKEN_STANDARD_PROGRAMMABLE: u8 = 4;

impl CandyMachine {
    pub fn items_remaining(&self) -> u64 {
        self.items_available.saturating_sub(self.items_redeemed)
    }
}

/// A candy guard with its default rules and labelled groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandyGuard {
    pub address: Pubkey,
    pub base: Pubkey,
    pub bump: u8,
    pub authority: Pubkey,
    pub guards: GuardSet,
    pub groups: Vec<SaleGroup>,
}

impl CandyGuard {
    pub fn group(&self, label: &str) -> Option<&SaleGroup> {
        self.groups.iter().find(|group| group.label == label)
    }
}

/// Token metadata fields needed to locate the off-chain document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub update_authority: Pubkey,
    pub mint: Pubkey,
    pub name: String,
    pub symbol: String,
    pub uri: String,
    /// Collection mint, only when verified
    pub collection: Option<Pubkey>,
}

/// Mint and amount of one SPL token account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenHolding {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
}

fn expect_discriminator(
    reader: &mut Reader<'_>,
    account: &'static str,
) -> Result<(), DecodeError> {
    let found: [u8; 8] = reader.array()?;
    if found != discriminator("account", account) {
        return Err(DecodeError::WrongAccountType { account });
    }
    Ok(())
}

pub fn decode_candy_machine(address: Pubkey, data: &[u8]) -> Result<CandyMachine, DecodeError> {
    let mut reader = Reader::new(data);
    expect_discriminator(&mut reader, "CandyMachine")?;
    let _version = reader.u8()?;
    let token_standard = reader.u8()?;
    // feature flags
    reader.take(6)?;
    Ok(CandyMachine {
        address,
        token_standard,
        authority: reader.pubkey()?,
        mint_authority: reader.pubkey()?,
        collection_mint: reader.pubkey()?,
        items_redeemed: reader.u64()?,
        items_available: reader.u64()?,
    })
}

pub fn decode_candy_guard(address: Pubkey, data: &[u8]) -> Result<CandyGuard, DecodeError> {
    let mut reader = Reader::new(data);
    expect_discriminator(&mut reader, "CandyGuard")?;
    let base = reader.pubkey()?;
    let bump = reader.u8()?;
    let authority = reader.pubkey()?;
    let guards = GuardSet::decode(&mut reader)?;

    let group_count = reader.u32()? as usize;
    let mut groups = Vec::with_capacity(group_count.min(64));
    for _ in 0..group_count {
        let raw = reader.take(MAX_LABEL_SIZE)?;
        let label = std::str::from_utf8(raw)
            .map_err(|_| DecodeError::InvalidString { field: "group label" })?
            .trim_end_matches('\0')
            .to_string();
        let guards = GuardSet::decode(&mut reader)?;
        groups.push(SaleGroup { label, guards });
    }

    Ok(CandyGuard {
        address,
        base,
        bump,
        authority,
        guards,
        groups,
    })
}

pub fn decode_metadata(data: &[u8]) -> Result<Metadata, DecodeError> {
    let mut reader = Reader::new(data);
    if reader.u8()? != METADATA_V1_KEY {
        return Err(DecodeError::WrongAccountType { account: "Metadata" });
    }
    let update_authority = reader.pubkey()?;
    let mint = reader.pubkey()?;
    let name = reader.string("name")?;
    let symbol = reader.string("symbol")?;
    let uri = reader.string("uri")?;

    let _seller_fee_basis_points = reader.u16()?;
    if reader.bool()? {
        let creators = reader.u32()? as usize;
        reader.take(creators.saturating_mul(CREATOR_SIZE))?;
    }
    let _primary_sale_happened = reader.bool()?;
    let _is_mutable = reader.bool()?;
    // edition nonce, token standard
    for _ in 0..2 {
        if reader.bool()? {
            reader.u8()?;
        }
    }
    let collection = if reader.bool()? {
        let verified = reader.bool()?;
        let key = reader.pubkey()?;
        verified.then_some(key)
    } else {
        None
    };

    Ok(Metadata {
        update_authority,
        mint,
        name,
        symbol,
        uri,
        collection,
    })
}

pub fn decode_lookup_table(
    key: Pubkey,
    data: &[u8],
) -> Result<AddressLookupTableAccount, DecodeError> {
    let mut reader = Reader::new(data);
    // ProgramState::LookupTable
    if reader.u32()? != 1 {
        return Err(DecodeError::WrongAccountType {
            account: "AddressLookupTable",
        });
    }
    let mut reader = Reader::at(data, LOOKUP_TABLE_META_SIZE);
    let count = data.len().saturating_sub(LOOKUP_TABLE_META_SIZE) / 32;
    let addresses = (0..count)
        .map(|_| reader.pubkey())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AddressLookupTableAccount { key, addresses })
}

/// Amount held by an SPL token account
pub fn decode_token_amount(data: &[u8]) -> Result<u64, DecodeError> {
    Reader::at(data, 64).u64()
}

pub fn decode_token_account(data: &[u8]) -> Result<TokenHolding, DecodeError> {
    let mut reader = Reader::new(data);
    Ok(TokenHolding {
        mint: reader.pubkey()?,
        owner: reader.pubkey()?,
        amount: reader.u64()?,
    })
}

/// Mints already counted against a mint limit
pub fn decode_mint_counter(data: &[u8]) -> Result<u16, DecodeError> {
    Reader::at(data, 8).u16()
}

/// `unix_timestamp` of the clock sysvar
pub fn decode_clock_unix_timestamp(data: &[u8]) -> Result<i64, DecodeError> {
    Reader::at(data, 32).i64()
}

#[cfg(any(test, feature = "test_utils"))]
pub mod encode {
    use super::*;
    use crate::candy::guard_set::encode::guard_set;

    pub fn candy_machine(cm: &CandyMachine) -> Vec<u8> {
        let mut out = discriminator("account", "CandyMachine").to_vec();
        out.extend_from_slice(&[1, cm.token_standard, 0, 0, 0, 0, 0, 0]);
        out.extend_from_slice(cm.authority.as_ref());
        out.extend_from_slice(cm.mint_authority.as_ref());
        out.extend_from_slice(cm.collection_mint.as_ref());
        out.extend_from_slice(&cm.items_redeemed.to_le_bytes());
        out.extend_from_slice(&cm.items_available.to_le_bytes());
        // symbol and the rest of the machine data
        out.extend_from_slice(&[0u8; 64]);
        out
    }

    pub fn candy_guard(guard: &CandyGuard) -> Vec<u8> {
        let mut out = discriminator("account", "CandyGuard").to_vec();
        out.extend_from_slice(guard.base.as_ref());
        out.push(guard.bump);
        out.extend_from_slice(guard.authority.as_ref());
        out.extend(guard_set(&guard.guards));
        out.extend_from_slice(&(guard.groups.len() as u32).to_le_bytes());
        for group in &guard.groups {
            let mut label = [0u8; MAX_LABEL_SIZE];
            label[..group.label.len()].copy_from_slice(group.label.as_bytes());
            out.extend_from_slice(&label);
            out.extend(guard_set(&group.guards));
        }
        out
    }

    fn padded(s: &str, max: usize) -> Vec<u8> {
        let mut out = (max as u32).to_le_bytes().to_vec();
        let mut bytes = s.as_bytes().to_vec();
        bytes.resize(max, 0);
        out.extend(bytes);
        out
    }

    pub fn metadata(meta: &Metadata) -> Vec<u8> {
        let mut out = vec![METADATA_V1_KEY];
        out.extend_from_slice(meta.update_authority.as_ref());
        out.extend_from_slice(meta.mint.as_ref());
        out.extend(padded(&meta.name, 32));
        out.extend(padded(&meta.symbol, 10));
        out.extend(padded(&meta.uri, 200));
        // seller fee, no creators, sale flags, no nonce or token standard
        out.extend_from_slice(&[0u8; 7]);
        match &meta.collection {
            Some(key) => {
                out.extend_from_slice(&[1, 1]);
                out.extend_from_slice(key.as_ref());
            }
            None => out.push(0),
        }
        // uses and collection details
        out.extend_from_slice(&[0u8; 8]);
        out
    }

    pub fn token_account(holding: &TokenHolding) -> Vec<u8> {
        let mut out = Vec::with_capacity(TOKEN_ACCOUNT_SIZE);
        out.extend_from_slice(holding.mint.as_ref());
        out.extend_from_slice(holding.owner.as_ref());
        out.extend_from_slice(&holding.amount.to_le_bytes());
        out.resize(TOKEN_ACCOUNT_SIZE, 0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candy::guard_set::MintLimit;

    #[test]
    fn test_decode_candy_machine() {
        let cm = CandyMachine {
            address: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
            mint_authority: Pubkey::new_unique(),
            collection_mint: Pubkey::new_unique(),
            token_standard: TOKEN_STANDARD_PROGRAMMABLE,
            items_redeemed: 7,
            items_available: 10,
        };
        let decoded = decode_candy_machine(cm.address, &encode::candy_machine(&cm)).unwrap();
        assert_eq!(decoded, cm);
        assert_eq!(decoded.items_remaining(), 3);
    }

    #[test]
    fn test_wrong_discriminator() {
        let data = vec![0u8; 200];
        assert_eq!(
            decode_candy_machine(Pubkey::new_unique(), &data).unwrap_err(),
            DecodeError::WrongAccountType {
                account: "CandyMachine"
            }
        );
    }

    #[test]
    fn test_decode_candy_guard_with_groups() {
        let guard = CandyGuard {
            address: Pubkey::new_unique(),
            base: Pubkey::new_unique(),
            bump: 254,
            authority: Pubkey::new_unique(),
            guards: GuardSet {
                start_date: Some(10),
                ..Default::default()
            },
            groups: vec![
                SaleGroup {
                    label: "early".to_string(),
                    guards: GuardSet {
                        mint_limit: Some(MintLimit { id: 1, limit: 2 }),
                        allow_list: Some([9u8; 32]),
                        ..Default::default()
                    },
                },
                SaleGroup {
                    label: "public".to_string(),
                    guards: GuardSet {
                        end_date: Some(99),
                        ..Default::default()
                    },
                },
            ],
        };
        let decoded = decode_candy_guard(guard.address, &encode::candy_guard(&guard)).unwrap();
        assert_eq!(decoded, guard);
        assert_eq!(decoded.group("public").unwrap().end_time(), 99);
        assert!(decoded.group("late").is_none());
    }

    #[test]
    fn test_decode_metadata_trims_padding() {
        let meta = Metadata {
            update_authority: Pubkey::new_unique(),
            mint: Pubkey::new_unique(),
            name: "Ghoul #12".to_string(),
            symbol: "GHO".to_string(),
            uri: "https://arweave.net/abc".to_string(),
            collection: None,
        };
        assert_eq!(decode_metadata(&encode::metadata(&meta)).unwrap(), meta);
    }

    #[test]
    fn test_decode_metadata_collection() {
        let collection = Pubkey::new_unique();
        let meta = Metadata {
            update_authority: Pubkey::new_unique(),
            mint: Pubkey::new_unique(),
            name: "Ghoul #13".to_string(),
            symbol: "GHO".to_string(),
            uri: "https://arweave.net/def".to_string(),
            collection: Some(collection),
        };
        assert_eq!(
            decode_metadata(&encode::metadata(&meta)).unwrap().collection,
            Some(collection)
        );

        // two creators ahead of an unverified collection
        let mut data = encode::metadata(&Metadata {
            collection: None,
            ..meta.clone()
        });
        let tail = 1 + 32 + 32 + 36 + 14 + 204;
        data.truncate(tail + 2);
        data.push(1);
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&[0u8; 2 * CREATOR_SIZE]);
        data.extend_from_slice(&[0, 0, 0, 0, 1, 0]);
        data.extend_from_slice(collection.as_ref());
        assert_eq!(decode_metadata(&data).unwrap().collection, None);
    }

    #[test]
    fn test_decode_lookup_table() {
        let key = Pubkey::new_unique();
        let addresses = vec![Pubkey::new_unique(), Pubkey::new_unique()];
        let mut data = 1u32.to_le_bytes().to_vec();
        data.resize(LOOKUP_TABLE_META_SIZE, 0);
        for address in &addresses {
            data.extend_from_slice(address.as_ref());
        }
        let table = decode_lookup_table(key, &data).unwrap();
        assert_eq!(table.key, key);
        assert_eq!(table.addresses, addresses);

        let mut closed = data.clone();
        closed[0] = 0;
        assert!(decode_lookup_table(key, &closed).is_err());
    }

    #[test]
    fn test_small_account_decoders() {
        let mut token = vec![0u8; 64];
        token.extend_from_slice(&42u64.to_le_bytes());
        token.extend_from_slice(&[0u8; 93]);
        assert_eq!(decode_token_amount(&token).unwrap(), 42);
        let holding = TokenHolding {
            mint: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            amount: 1,
        };
        assert_eq!(
            decode_token_account(&encode::token_account(&holding)).unwrap(),
            holding
        );

        let mut counter = vec![0u8; 8];
        counter.extend_from_slice(&2u16.to_le_bytes());
        assert_eq!(decode_mint_counter(&counter).unwrap(), 2);

        let mut clock = vec![0u8; 32];
        clock.extend_from_slice(&1_700_000_123i64.to_le_bytes());
        assert_eq!(decode_clock_unix_timestamp(&clock).unwrap(), 1_700_000_123);
    }
}
