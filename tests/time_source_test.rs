//! On-chain time polling

use candy_mint::countdown::{format_countdown, window_label, WindowLabel, READY};
use candy_mint::test_utils::ScriptedRpc;
use candy_mint::time_source::{fetch_solana_time, TimeSource};
use solana_sdk::sysvar;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn clock_account(unix_timestamp: i64) -> Vec<u8> {
    let mut data = vec![0u8; 40];
    data[32..40].copy_from_slice(&unix_timestamp.to_le_bytes());
    data
}

#[tokio::test]
async fn test_block_time_preferred_over_clock() {
    let rpc = ScriptedRpc::new();
    rpc.set_block_time(Some(1_000));
    rpc.set_account(sysvar::clock::id(), clock_account(2_000));
    assert_eq!(fetch_solana_time(&rpc).await.unwrap(), 1_000);

    rpc.set_block_time(None);
    assert_eq!(fetch_solana_time(&rpc).await.unwrap(), 2_000);

    rpc.remove_account(&sysvar::clock::id());
    assert!(fetch_solana_time(&rpc).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_time_source_polls_and_keeps_last_value() {
    let rpc = Arc::new(ScriptedRpc::new());
    rpc.set_block_time(Some(1_000));
    let cancel = CancellationToken::new();

    let source = TimeSource::spawn(rpc.clone(), Duration::from_secs(5), cancel.clone());
    let mut rx = source.subscribe();
    rx.changed().await.unwrap();
    assert_eq!(source.now(), 1_000);

    rpc.set_block_time(Some(1_005));
    rx.changed().await.unwrap();
    assert_eq!(source.now(), 1_005);

    // both sources fail: the last value stays
    rpc.set_block_time(None);
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(source.now(), 1_005);
    assert!(rpc.calls().block_time >= 4);

    cancel.cancel();
    source.join().await;
}

#[test]
fn test_sale_window_countdown() {
    let now = 1_000;
    assert_eq!(window_label(1_100, 0, now), Some(WindowLabel::StartsIn));
    assert_eq!(window_label(900, 1_100, now), Some(WindowLabel::EndingIn));
    assert_eq!(window_label(900, 0, now), None);
    assert_eq!(format_countdown(now, now), READY);
}
