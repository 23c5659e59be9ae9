//! Configuration module for the candy machine mint client
//!
//! Configuration is loaded from a TOML file, then selected values are
//! overridden from the environment (a `.env` file is honoured).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::types::MintText;

pub const ENV_CLUSTER: &str = "CANDY_MINT_CLUSTER";
pub const ENV_LOOKUP_TABLE: &str = "CANDY_MINT_LUT";
pub const ENV_MICROLAMPORTS: &str = "CANDY_MINT_MICROLAMPORTS";
pub const ENV_MULTIMINT: &str = "CANDY_MINT_MULTIMINT";
pub const ENV_KEYPAIR: &str = "CANDY_MINT_KEYPAIR";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub wallet: WalletConfig,

    #[serde(rename = "drop")]
    pub candy: DropConfig,

    #[serde(default)]
    pub mint: MintConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Cluster name (`devnet`, `mainnet-beta`, `testnet`, `localnet`) or URL
    #[serde(default = "default_cluster")]
    pub cluster: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Max retries per read request
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Path to keypair file
    #[serde(default = "default_keypair_path")]
    pub keypair_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DropConfig {
    pub candy_machine_id: String,

    /// Defaults to the candy machine's mint authority
    #[serde(default)]
    pub candy_guard_id: Option<String>,

    #[serde(default)]
    pub lookup_table: Option<String>,

    /// Whether more than one NFT may be minted per click
    #[serde(default = "default_true")]
    pub multi_mint: bool,

    /// Largest quantity one click may request
    #[serde(default = "default_per_click_max")]
    pub per_click_max: u64,

    /// Hex-encoded merkle proofs of this wallet, by group label
    #[serde(default)]
    pub allow_list_proofs: HashMap<String, Vec<String>>,

    /// Display texts by group label
    #[serde(default)]
    pub mint_texts: HashMap<String, MintText>,
}

/// What happens when the allow-list route transaction fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowListPolicy {
    /// Notify and continue with the mint batch
    #[default]
    Advisory,
    /// Notify and abort the mint
    Required,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintConfig {
    /// Priority fee in micro-lamports per compute unit
    #[serde(default = "default_priority_fee")]
    pub priority_fee_micro_lamports: u64,

    /// Factor applied to simulated compute units
    #[serde(default = "default_cu_margin")]
    pub cu_margin: f64,

    #[serde(default)]
    pub allow_list_policy: AllowListPolicy,

    /// Signature status poll interval in milliseconds
    #[serde(default = "default_finality_poll_ms")]
    pub finality_poll_ms: u64,

    /// On-chain time poll interval in seconds
    #[serde(default = "default_time_poll_secs")]
    pub time_poll_secs: u64,
}

// Default value functions
fn default_cluster() -> String { "devnet".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_max_retries() -> usize { 3 }
fn default_keypair_path() -> String { "~/.config/solana/id.json".to_string() }
fn default_true() -> bool { true }
fn default_per_click_max() -> u64 { 10 }
fn default_priority_fee() -> u64 { 1001 }
fn default_cu_margin() -> f64 { 1.2 }
fn default_finality_poll_ms() -> u64 { 1000 }
fn default_time_poll_secs() -> u64 { 5 }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            cluster: default_cluster(),
            timeout_secs: default_rpc_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            keypair_path: default_keypair_path(),
        }
    }
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            priority_fee_micro_lamports: default_priority_fee(),
            cu_margin: default_cu_margin(),
            allow_list_policy: AllowListPolicy::default(),
            finality_poll_ms: default_finality_poll_ms(),
            time_poll_secs: default_time_poll_secs(),
        }
    }
}

/// RPC URL of a named cluster, or the value itself when it is a URL
pub fn cluster_url(cluster: &str) -> String {
    match cluster {
        "devnet" => "https://api.devnet.solana.com".to_string(),
        "mainnet-beta" | "mainnet" => "https://api.mainnet-beta.solana.com".to_string(),
        "testnet" => "https://api.testnet.solana.com".to_string(),
        "localnet" | "localhost" => "http://127.0.0.1:8899".to_string(),
        url => url.to_string(),
    }
}

fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value).with_context(|| format!("Invalid {field}: {value}"))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(cluster) = lookup(ENV_CLUSTER) {
            self.rpc.cluster = cluster;
        }
        if let Some(lut) = lookup(ENV_LOOKUP_TABLE) {
            self.candy.lookup_table = Some(lut).filter(|v| !v.is_empty());
        }
        if let Some(fee) = lookup(ENV_MICROLAMPORTS) {
            self.mint.priority_fee_micro_lamports = fee
                .trim()
                .parse()
                .with_context(|| format!("Invalid {ENV_MICROLAMPORTS}: {fee}"))?;
        }
        if let Some(flag) = lookup(ENV_MULTIMINT) {
            self.candy.multi_mint = parse_bool(&flag)
                .with_context(|| format!("Invalid {ENV_MULTIMINT}: {flag}"))?;
        }
        if let Some(path) = lookup(ENV_KEYPAIR) {
            self.wallet.keypair_path = path;
        }
        Ok(())
    }

    /// Reject settings that would only fail later at mint time
    pub fn validate(&self) -> Result<()> {
        self.candy_machine_id()?;
        self.candy_guard_id()?;
        self.lookup_table()?;
        for label in self.candy.allow_list_proofs.keys() {
            self.allow_list_proof(label)?;
        }
        if self.mint.finality_poll_ms == 0 {
            anyhow::bail!("mint.finality_poll_ms must be positive");
        }
        if self.mint.time_poll_secs == 0 {
            anyhow::bail!("mint.time_poll_secs must be positive");
        }
        if self.rpc.timeout_secs == 0 {
            anyhow::bail!("rpc.timeout_secs must be positive");
        }
        if self.mint.cu_margin.is_nan() || self.mint.cu_margin < 1.0 {
            anyhow::bail!("mint.cu_margin must be at least 1.0");
        }
        Ok(())
    }

    pub fn rpc_url(&self) -> String {
        cluster_url(&self.rpc.cluster)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_secs)
    }

    pub fn candy_machine_id(&self) -> Result<Pubkey> {
        parse_pubkey("drop.candy_machine_id", &self.candy.candy_machine_id)
    }

    pub fn candy_guard_id(&self) -> Result<Option<Pubkey>> {
        self.candy
            .candy_guard_id
            .as_deref()
            .map(|id| parse_pubkey("drop.candy_guard_id", id))
            .transpose()
    }

    pub fn lookup_table(&self) -> Result<Option<Pubkey>> {
        self.candy
            .lookup_table
            .as_deref()
            .map(|id| parse_pubkey("drop.lookup_table", id))
            .transpose()
    }

    /// Quantity cap of one click
    pub fn per_click_max(&self) -> u64 {
        if self.candy.multi_mint {
            self.candy.per_click_max.max(1)
        } else {
            1
        }
    }

    /// Decoded merkle proof configured for `label`
    pub fn allow_list_proof(&self, label: &str) -> Result<Option<Vec<[u8; 32]>>> {
        let Some(nodes) = self.candy.allow_list_proofs.get(label) else {
            return Ok(None);
        };
        nodes
            .iter()
            .map(|node| {
                let bytes = hex::decode(node.trim_start_matches("0x"))
                    .with_context(|| format!("Invalid proof node for {label}: {node}"))?;
                <[u8; 32]>::try_from(bytes.as_slice())
                    .map_err(|_| anyhow::anyhow!("Proof node for {label} is not 32 bytes"))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    pub fn allow_list_proofs(&self) -> Result<HashMap<String, Vec<[u8; 32]>>> {
        let mut proofs = HashMap::new();
        for label in self.candy.allow_list_proofs.keys() {
            if let Some(proof) = self.allow_list_proof(label)? {
                proofs.insert(label.clone(), proof);
            }
        }
        Ok(proofs)
    }

    pub fn finality_poll_interval(&self) -> Duration {
        Duration::from_millis(self.mint.finality_poll_ms)
    }

    pub fn time_poll_interval(&self) -> Duration {
        Duration::from_secs(self.mint.time_poll_secs)
    }
}
