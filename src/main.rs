//! Candy Mint
//!
//! Terminal client for minting from a Solana candy machine drop.
//!
//! ## Commands
//!
//! - **guards**: sale groups with eligibility, texts and sale windows;
//!   `--watch` keeps them live with countdowns
//! - **mint**: mint from one group, batching up to its per-click cap
//! - **time**: current on-chain time
//! - **metrics**: Prometheus text dump

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(dead_code)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use candy_mint::config::Config;
use candy_mint::countdown::{
    format_countdown, next_boundary, window_label, Boundary, Countdown, WindowLabel,
};
use candy_mint::guards::{build_button_list, GuardRegistry};
use candy_mint::metrics::metrics;
use candy_mint::mint::{HttpMetadataFetcher, MintCoordinator, MintReport, MintSettings};
use candy_mint::notify::{ChannelNotifier, Notice, NoticeLevel};
use candy_mint::rpc::{ChainRpc, SolanaRpc};
use candy_mint::time_source::{fetch_solana_time, TimeSource};
use candy_mint::types::{EligibilityGuard, GuardButton, DEFAULT_LABEL};
use candy_mint::wallet::WalletManager;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "candy-mint.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print Prometheus metrics when the command finishes
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List sale groups and the wallet's eligibility
    Guards {
        /// Keep refreshing on every on-chain time tick until interrupted
        #[arg(short, long)]
        watch: bool,
    },

    /// Mint from a sale group
    Mint {
        /// Group label
        #[arg(short, long, default_value = DEFAULT_LABEL)]
        group: String,

        /// Number of NFTs, capped by the group's allowance
        #[arg(short, long, default_value = "1")]
        amount: u64,
    },

    /// Print the current on-chain time
    Time,

    /// Print the Prometheus metric families
    Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json_logs)?;

    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if matches!(args.command, Command::Metrics) {
        print!("{}", metrics().render()?);
        return Ok(());
    }

    let config = Config::from_file_with_env(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;

    let rpc: Arc<dyn ChainRpc> = Arc::new(SolanaRpc::new(
        &config.rpc_url(),
        config.rpc_timeout(),
        config.rpc.max_retries,
    ));
    info!(endpoint = %config.rpc_url(), "RPC client ready");

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            ctrl_c.cancel();
        }
    });

    match args.command {
        Command::Metrics => {}
        Command::Time => {
            let now = fetch_solana_time(rpc.as_ref()).await?;
            let utc = chrono::DateTime::from_timestamp(now, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            println!("{now} ({utc})");
        }
        Command::Guards { watch } => {
            let (coordinator, notices) = build_coordinator(&config, rpc.clone(), cancel.clone());
            let coordinator = coordinator?;
            if watch {
                watch_guards(&coordinator, &config, rpc.clone(), &cancel).await;
            } else {
                let now = fetch_solana_time(rpc.as_ref()).await?;
                let guards = coordinator.refresh_guards(now).await?;
                render_guards(&coordinator, &config, &guards, now);
            }
            drop(coordinator);
            notices.await.ok();
        }
        Command::Mint { group, amount } => {
            let (coordinator, notices) = build_coordinator(&config, rpc.clone(), cancel.clone());
            let report = mint_and_flush(coordinator?, notices, rpc.as_ref(), &group, amount);
            match report.await? {
                MintReport::NoGuard => println!("No candy guard, nothing to mint"),
                MintReport::Completed(summary) => {
                    let sent = summary.submitted.iter().filter(|o| o.is_success()).count();
                    println!(
                        "{sent}/{} sent, {} finalized",
                        summary.submitted.len(),
                        summary.finalized.len()
                    );
                    for asset in &summary.minted {
                        println!("{} {} {}", asset.mint, asset.name, asset.uri);
                    }
                }
            }
        }
    }

    if args.print_metrics {
        print!("{}", metrics().render()?);
    }
    Ok(())
}

/// Wire the coordinator to a notice printer
///
/// The returned handle ends once the coordinator and its notifier are dropped.
fn build_coordinator(
    config: &Config,
    rpc: Arc<dyn ChainRpc>,
    cancel: CancellationToken,
) -> (Result<MintCoordinator>, JoinHandle<()>) {
    let (notifier, rx) = ChannelNotifier::new();
    let printer = spawn_printer(rx, |line| println!("{line}"));
    let coordinator = load_coordinator(config, rpc, Arc::new(notifier), cancel);
    (coordinator, printer)
}

fn notice_line(notice: &Notice) -> String {
    let marker = match notice.level {
        NoticeLevel::Info => "*",
        NoticeLevel::Success => "+",
        NoticeLevel::Warning => "!",
        NoticeLevel::Error => "x",
    };
    match &notice.description {
        Some(description) => format!("[{marker}] {} {description}", notice.title),
        None => format!("[{marker}] {}", notice.title),
    }
}

/// Hand every notice to `out` until all notifiers are dropped
fn spawn_printer<F>(mut rx: mpsc::UnboundedReceiver<Notice>, mut out: F) -> JoinHandle<()>
where
    F: FnMut(String) + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(notice) = rx.recv().await {
            out(notice_line(&notice));
        }
    })
}

fn load_coordinator(
    config: &Config,
    rpc: Arc<dyn ChainRpc>,
    notifier: Arc<ChannelNotifier>,
    cancel: CancellationToken,
) -> Result<MintCoordinator> {
    let wallet =
        WalletManager::from_file(&config.wallet.keypair_path).context("Failed to load wallet")?;
    info!(wallet = %wallet.pubkey(), "Wallet loaded");
    let fetcher = HttpMetadataFetcher::new(config.rpc_timeout())?;
    Ok(MintCoordinator::new(
        rpc,
        Arc::new(fetcher),
        notifier,
        wallet,
        Arc::new(GuardRegistry::new()),
        MintSettings::from_config(config)?,
        cancel,
    ))
}

async fn run_mint(
    coordinator: &MintCoordinator,
    rpc: &dyn ChainRpc,
    group: &str,
    amount: u64,
) -> Result<MintReport> {
    let now = fetch_solana_time(rpc).await?;
    coordinator.refresh_guards(now).await?;
    Ok(coordinator.mint(group, amount).await?)
}

/// Mint, then wait for the printer so every notice lands before the result
async fn mint_and_flush(
    coordinator: MintCoordinator,
    notices: JoinHandle<()>,
    rpc: &dyn ChainRpc,
    group: &str,
    amount: u64,
) -> Result<MintReport> {
    let report = run_mint(&coordinator, rpc, group, amount).await;
    drop(coordinator);
    notices.await.ok();
    report
}

/// Print the drop progress and one block per button
fn render_guards(
    coordinator: &MintCoordinator,
    config: &Config,
    guards: &[EligibilityGuard],
    now: i64,
) -> Vec<GuardButton> {
    let drop = coordinator.drop_state();
    let buttons = build_button_list(
        guards,
        drop.as_ref().and_then(|d| d.candy_guard.as_ref()),
        &config.candy.mint_texts,
    );
    if let Some(drop) = &drop {
        println!(
            "{} / {} minted",
            drop.candy_machine.items_redeemed, drop.candy_machine.items_available
        );
    }
    for button in &buttons {
        print_button(button, now);
    }
    buttons
}

/// Countdown to the closest window boundary, stopped on drop
struct ActiveCountdown {
    boundary: Boundary,
    countdown: Countdown,
    stop: CancellationToken,
}

impl Drop for ActiveCountdown {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Countdown for the closest boundary, reusing `current` while it still applies
fn follow_boundary(
    current: Option<ActiveCountdown>,
    buttons: &[GuardButton],
    now: i64,
    cancel: &CancellationToken,
) -> Option<ActiveCountdown> {
    let boundary = next_boundary(buttons, now)?;
    if let Some(active) = current {
        if active.boundary == boundary {
            return Some(active);
        }
    }
    let stop = cancel.child_token();
    let countdown = Countdown::start(boundary.at, now, stop.clone());
    Some(ActiveCountdown {
        boundary,
        countdown,
        stop,
    })
}

/// Refresh on every time tick and re-render on every guard list change
async fn watch_guards(
    coordinator: &MintCoordinator,
    config: &Config,
    rpc: Arc<dyn ChainRpc>,
    cancel: &CancellationToken,
) {
    let time = TimeSource::spawn(rpc, config.time_poll_interval(), cancel.child_token());
    let mut ticks = time.subscribe();
    let mut changes = coordinator.registry().subscribe();
    let mut active: Option<ActiveCountdown> = None;
    let mut remaining: Option<watch::Receiver<i64>> = None;

    loop {
        let countdown_tick = async {
            match remaining.as_mut() {
                Some(rx) => rx.changed().await.is_ok(),
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = ticks.changed() => {
                if changed.is_err() {
                    break;
                }
                let now = *ticks.borrow_and_update();
                if let Err(err) = coordinator.refresh_guards(now).await {
                    warn!(error = %err, "Failed to refresh guards");
                }
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let guards = changes.borrow_and_update().clone();
                let now = time.now();
                let buttons = render_guards(coordinator, config, &guards, now);
                active = follow_boundary(active.take(), &buttons, now, cancel);
                remaining = active.as_ref().map(|a| a.countdown.subscribe());
            }
            ticked = countdown_tick => {
                match (&active, ticked) {
                    (Some(active), true) => println!(
                        "   [{}] {} {}",
                        active.boundary.label,
                        active.boundary.kind.as_str(),
                        active.countdown.render()
                    ),
                    _ => remaining = None,
                }
            }
        }
    }

    drop(active);
    time.join().await;
}

fn print_button(button: &GuardButton, now: i64) {
    println!("== {} [{}]", button.header, button.label);
    println!("   {}", button.mint_text);
    match window_label(button.start_time, button.end_time, now) {
        Some(WindowLabel::StartsIn) => println!(
            "   {} {}",
            WindowLabel::StartsIn.as_str(),
            format_countdown(button.start_time, now)
        ),
        Some(WindowLabel::EndingIn) => println!(
            "   {} {}",
            WindowLabel::EndingIn.as_str(),
            format_countdown(button.end_time, now)
        ),
        None => {}
    }
    if button.allowed {
        println!("   {} (up to {})", button.button_label, button.max_amount);
    } else {
        println!(
            "   {}: {}",
            button.button_label,
            button.reason.as_deref().unwrap_or("not allowed")
        );
    }
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "candy_mint=debug,info"
    } else {
        "candy_mint=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}
