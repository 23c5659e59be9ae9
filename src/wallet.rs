//! Wallet management module

use anyhow::{Context, Result};
use solana_sdk::{
    message::VersionedMessage,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    signer::SignerError,
    transaction::VersionedTransaction,
};
use std::sync::Arc;

/// Local keypair acting as fee payer and minter
#[derive(Clone)]
pub struct WalletManager {
    keypair: Arc<Keypair>,
}

impl std::fmt::Debug for WalletManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletManager")
            .field("pubkey", &self.pubkey())
            .finish()
    }
}

impl WalletManager {
    /// Create a new wallet manager from a keypair file
    ///
    /// Accepts 64 raw bytes, the JSON byte array written by `solana-keygen`,
    /// or a base58 secret key as exported by browser wallets.
    pub fn from_file(path: &str) -> Result<Self> {
        let path = expand_home(path);
        let keypair_bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read keypair file: {}", path))?;

        let bytes = if keypair_bytes.len() == 64 {
            keypair_bytes
        } else if keypair_bytes.trim_ascii_start().starts_with(b"[") {
            serde_json::from_slice(&keypair_bytes).context("Failed to parse keypair JSON")?
        } else {
            let encoded = std::str::from_utf8(&keypair_bytes)
                .context("Keypair file is neither JSON nor base58")?;
            bs58::decode(encoded.trim())
                .into_vec()
                .context("Failed to decode base58 keypair")?
        };
        if bytes.len() != 64 {
            anyhow::bail!("Invalid keypair length: expected 64 bytes, got {}", bytes.len());
        }
        if bytes.iter().all(|&b| b == 0) {
            anyhow::bail!("Invalid keypair: all-zero key rejected");
        }
        let keypair = Keypair::try_from(bytes.as_slice()).context("Invalid keypair bytes")?;

        Ok(Self::from_keypair(keypair))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Sign `message` as fee payer together with `co_signers`
    pub fn sign(
        &self,
        message: VersionedMessage,
        co_signers: &[&Keypair],
    ) -> Result<VersionedTransaction, SignerError> {
        let mut signers: Vec<&dyn Signer> = Vec::with_capacity(co_signers.len() + 1);
        signers.push(self.keypair.as_ref());
        signers.extend(co_signers.iter().map(|k| *k as &dyn Signer));
        VersionedTransaction::try_new(message, &signers)
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{home}/{rest}"),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{hash::Hash, message::v0, system_instruction};
    use std::io::Write;

    #[test]
    fn test_from_json_file() {
        let keypair = Keypair::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let wallet = WalletManager::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_from_base58_file() {
        let keypair = Keypair::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", keypair.to_base58_string()).unwrap();

        let wallet = WalletManager::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_zero_key_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 64]).unwrap();
        let err = WalletManager::from_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("all-zero"));
    }

    #[test]
    fn test_sign_with_co_signer() {
        let wallet = WalletManager::from_keypair(Keypair::new());
        let asset = Keypair::new();
        let ix = system_instruction::create_account(
            &wallet.pubkey(),
            &asset.pubkey(),
            1,
            82,
            &spl_token::id(),
        );
        let message =
            v0::Message::try_compile(&wallet.pubkey(), &[ix], &[], Hash::new_unique()).unwrap();

        let tx = wallet
            .sign(VersionedMessage::V0(message.clone()), &[&asset])
            .unwrap();
        assert_eq!(tx.signatures.len(), 2);
        assert!(tx.verify_with_results().iter().all(|ok| *ok));

        assert!(wallet.sign(VersionedMessage::V0(message), &[]).is_err());
    }
}
