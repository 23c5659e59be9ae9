//! Airdrop - devnet SOL for a test wallet
//!
//! Requests an airdrop and waits until it is confirmed.

use anyhow::{Context, Result};
use clap::Parser;
use solana_sdk::{
    commitment_config::CommitmentConfig, native_token::LAMPORTS_PER_SOL, pubkey::Pubkey,
};
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use candy_mint::config::cluster_url;
use candy_mint::rpc::SolanaRpc;

const DEFAULT_RECIPIENT: &str = "2tkGQV54dFDyydR61TZV3pscPx6u2ZsPmFtijjU1GJPP";

#[derive(Parser, Debug)]
#[command(author, version, about = "Request devnet SOL", long_about = None)]
struct Args {
    /// Recipient address
    #[arg(default_value = DEFAULT_RECIPIENT)]
    recipient: Pubkey,

    /// Amount in SOL
    #[arg(short, long, default_value = "2")]
    sol: u64,

    /// Seconds to wait for confirmation
    #[arg(short, long, default_value = "60")]
    timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn to_lamports(sol: u64) -> Result<u64> {
    sol.checked_mul(LAMPORTS_PER_SOL)
        .with_context(|| format!("{sol} SOL does not fit in a lamport amount"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let lamports = match to_lamports(args.sol) {
        Ok(lamports) => lamports,
        Err(err) => {
            error!(error = %err, "Invalid airdrop amount");
            std::process::exit(1);
        }
    };

    let rpc = SolanaRpc::new(&cluster_url("devnet"), Duration::from_secs(30), 3);
    info!(recipient = %args.recipient, sol = args.sol, "Requesting airdrop");

    match rpc
        .request_airdrop(
            &args.recipient,
            lamports,
            CommitmentConfig::confirmed(),
            Duration::from_secs(args.timeout),
        )
        .await
    {
        Ok(signature) => {
            println!("https://explorer.solana.com/tx/{signature}?cluster=devnet");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "Airdrop failed");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_lamports() {
        assert_eq!(to_lamports(2).unwrap(), 2 * LAMPORTS_PER_SOL);
        assert!(to_lamports(u64::MAX / 2).is_err());
    }
}
