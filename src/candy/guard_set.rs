//! Guard rule sets
//!
//! A guard set is stored as a `u64` feature bitmask followed by the data of
//! every enabled guard, in bit order. Bits this client does not understand
//! make decoding fail, since skipping them would misalign every later field.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use super::{DecodeError, Reader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotTax {
    pub lamports: u64,
    pub last_instruction: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolPayment {
    pub lamports: u64,
    pub destination: Pubkey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayment {
    pub amount: u64,
    pub mint: Pubkey,
    pub destination_ata: Pubkey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGate {
    pub amount: u64,
    pub mint: Pubkey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gatekeeper {
    pub gatekeeper_network: Pubkey,
    pub expire_on_use: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintLimit {
    pub id: u8,
    pub limit: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftPayment {
    pub required_collection: Pubkey,
    pub destination: Pubkey,
}

/// Rules governing one sale group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardSet {
    pub bot_tax: Option<BotTax>,
    pub sol_payment: Option<SolPayment>,
    pub token_payment: Option<TokenPayment>,
    /// Unix timestamp
    pub start_date: Option<i64>,
    pub third_party_signer: Option<Pubkey>,
    pub token_gate: Option<TokenGate>,
    pub gatekeeper: Option<Gatekeeper>,
    /// Unix timestamp
    pub end_date: Option<i64>,
    /// Merkle root
    pub allow_list: Option<[u8; 32]>,
    pub mint_limit: Option<MintLimit>,
    pub nft_payment: Option<NftPayment>,
    /// Maximum items redeemed
    pub redeemed_amount: Option<u64>,
    pub address_gate: Option<Pubkey>,
}

/// Number of guard bits understood by [`GuardSet::decode`]
const KNOWN_GUARDS: u32 = 13;

/// Guard type index used by the `route` instruction
pub const ALLOW_LIST_GUARD_TYPE: u8 = 8;

macro_rules! take_over {
    ($group:expr, $default:expr, $($field:ident),+) => {
        GuardSet {
            $($field: $group.$field.or($default.$field),)+
        }
    };
}

impl GuardSet {
    pub(crate) fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let features = reader.u64()?;
        if let Some(bit) = (KNOWN_GUARDS..64).find(|bit| features & (1u64 << bit) != 0) {
            return Err(DecodeError::UnsupportedGuard(bit));
        }
        let enabled = |bit: u32| features & (1u64 << bit) != 0;

        let mut set = GuardSet::default();
        if enabled(0) {
            set.bot_tax = Some(BotTax {
                lamports: reader.u64()?,
                last_instruction: reader.bool()?,
            });
        }
        if enabled(1) {
            set.sol_payment = Some(SolPayment {
                lamports: reader.u64()?,
                destination: reader.pubkey()?,
            });
        }
        if enabled(2) {
            set.token_payment = Some(TokenPayment {
                amount: reader.u64()?,
                mint: reader.pubkey()?,
                destination_ata: reader.pubkey()?,
            });
        }
        if enabled(3) {
            set.start_date = Some(reader.i64()?);
        }
        if enabled(4) {
            set.third_party_signer = Some(reader.pubkey()?);
        }
        if enabled(5) {
            set.token_gate = Some(TokenGate {
                amount: reader.u64()?,
                mint: reader.pubkey()?,
            });
        }
        if enabled(6) {
            set.gatekeeper = Some(Gatekeeper {
                gatekeeper_network: reader.pubkey()?,
                expire_on_use: reader.bool()?,
            });
        }
        if enabled(7) {
            set.end_date = Some(reader.i64()?);
        }
        if enabled(8) {
            set.allow_list = Some(reader.array()?);
        }
        if enabled(9) {
            set.mint_limit = Some(MintLimit {
                id: reader.u8()?,
                limit: reader.u16()?,
            });
        }
        if enabled(10) {
            set.nft_payment = Some(NftPayment {
                required_collection: reader.pubkey()?,
                destination: reader.pubkey()?,
            });
        }
        if enabled(11) {
            set.redeemed_amount = Some(reader.u64()?);
        }
        if enabled(12) {
            set.address_gate = Some(reader.pubkey()?);
        }
        Ok(set)
    }

    /// Group rules layered over the default rules, group winning per guard
    pub fn merged_over(&self, default: &GuardSet) -> GuardSet {
        take_over!(
            self,
            default,
            bot_tax,
            sol_payment,
            token_payment,
            start_date,
            third_party_signer,
            token_gate,
            gatekeeper,
            end_date,
            allow_list,
            mint_limit,
            nft_payment,
            redeemed_amount,
            address_gate
        )
    }

    pub fn is_empty(&self) -> bool {
        *self == GuardSet::default()
    }
}

/// A labelled sale group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleGroup {
    pub label: String,
    pub guards: GuardSet,
}

impl SaleGroup {
    /// Start of the sale window, 0 when unrestricted
    pub fn start_time(&self) -> i64 {
        self.guards.start_date.unwrap_or(0)
    }

    /// End of the sale window, 0 when unrestricted
    pub fn end_time(&self) -> i64 {
        self.guards.end_date.unwrap_or(0)
    }
}

#[cfg(any(test, feature = "test_utils"))]
pub mod encode {
    //! Test-side encoder mirroring the on-chain layout

    use super::*;

    pub fn guard_set(set: &GuardSet) -> Vec<u8> {
        let mut features = 0u64;
        let mut body = Vec::new();
        if let Some(g) = &set.bot_tax {
            features |= 1 << 0;
            body.extend_from_slice(&g.lamports.to_le_bytes());
            body.push(g.last_instruction as u8);
        }
        if let Some(g) = &set.sol_payment {
            features |= 1 << 1;
            body.extend_from_slice(&g.lamports.to_le_bytes());
            body.extend_from_slice(g.destination.as_ref());
        }
        if let Some(g) = &set.token_payment {
            features |= 1 << 2;
            body.extend_from_slice(&g.amount.to_le_bytes());
            body.extend_from_slice(g.mint.as_ref());
            body.extend_from_slice(g.destination_ata.as_ref());
        }
        if let Some(date) = set.start_date {
            features |= 1 << 3;
            body.extend_from_slice(&date.to_le_bytes());
        }
        if let Some(key) = &set.third_party_signer {
            features |= 1 << 4;
            body.extend_from_slice(key.as_ref());
        }
        if let Some(g) = &set.token_gate {
            features |= 1 << 5;
            body.extend_from_slice(&g.amount.to_le_bytes());
            body.extend_from_slice(g.mint.as_ref());
        }
        if let Some(g) = &set.gatekeeper {
            features |= 1 << 6;
            body.extend_from_slice(g.gatekeeper_network.as_ref());
            body.push(g.expire_on_use as u8);
        }
        if let Some(date) = set.end_date {
            features |= 1 << 7;
            body.extend_from_slice(&date.to_le_bytes());
        }
        if let Some(root) = &set.allow_list {
            features |= 1 << 8;
            body.extend_from_slice(root);
        }
        if let Some(g) = &set.mint_limit {
            features |= 1 << 9;
            body.push(g.id);
            body.extend_from_slice(&g.limit.to_le_bytes());
        }
        if let Some(g) = &set.nft_payment {
            features |= 1 << 10;
            body.extend_from_slice(g.required_collection.as_ref());
            body.extend_from_slice(g.destination.as_ref());
        }
        if let Some(max) = set.redeemed_amount {
            features |= 1 << 11;
            body.extend_from_slice(&max.to_le_bytes());
        }
        if let Some(key) = &set.address_gate {
            features |= 1 << 12;
            body.extend_from_slice(key.as_ref());
        }
        let mut out = features.to_le_bytes().to_vec();
        out.extend(body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_mixed_guard_set() {
        let set = GuardSet {
            sol_payment: Some(SolPayment {
                lamports: 1_000_000,
                destination: Pubkey::new_unique(),
            }),
            start_date: Some(1_700_000_000),
            mint_limit: Some(MintLimit { id: 1, limit: 3 }),
            address_gate: Some(Pubkey::new_unique()),
            ..Default::default()
        };
        let bytes = encode::guard_set(&set);
        let mut reader = Reader::new(&bytes);
        assert_eq!(GuardSet::decode(&mut reader).unwrap(), set);
        assert_eq!(reader.offset(), bytes.len());
    }

    #[test]
    fn test_unknown_guard_bit_is_rejected() {
        let bytes = (1u64 << 20).to_le_bytes();
        let err = GuardSet::decode(&mut Reader::new(&bytes)).unwrap_err();
        assert_eq!(err, DecodeError::UnsupportedGuard(20));
    }

    #[test]
    fn test_group_rules_win_over_default() {
        let default = GuardSet {
            start_date: Some(100),
            sol_payment: Some(SolPayment {
                lamports: 5,
                destination: Pubkey::new_unique(),
            }),
            ..Default::default()
        };
        let group = GuardSet {
            start_date: Some(200),
            ..Default::default()
        };
        let merged = group.merged_over(&default);
        assert_eq!(merged.start_date, Some(200));
        assert_eq!(merged.sol_payment, default.sol_payment);
    }

    #[test]
    fn test_sale_window_defaults_to_zero() {
        let group = SaleGroup {
            label: "early".to_string(),
            guards: GuardSet::default(),
        };
        assert_eq!(group.start_time(), 0);
        assert_eq!(group.end_time(), 0);
        assert!(group.guards.is_empty());
    }
}
