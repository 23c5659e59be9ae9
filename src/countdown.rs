//! Countdowns to sale windows

use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::types::GuardButton;

/// Shown once the target time has been reached
pub const READY: &str = "Ready!";

fn format_seconds(secs: i64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// `HH:MM:SS` until `to_time`, [`READY`] when it is not in the future
pub fn format_countdown(to_time: i64, solana_time: i64) -> String {
    let remaining = to_time.saturating_sub(solana_time);
    if remaining <= 0 {
        READY.to_string()
    } else {
        format_seconds(remaining)
    }
}

/// Which window a group's countdown refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowLabel {
    StartsIn,
    EndingIn,
}

impl WindowLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowLabel::StartsIn => "Starts in",
            WindowLabel::EndingIn => "Ending in",
        }
    }
}

/// `start` and `end` are 0 when unset
pub fn window_label(start: i64, end: i64, now: i64) -> Option<WindowLabel> {
    if start > now {
        Some(WindowLabel::StartsIn)
    } else if end > now {
        Some(WindowLabel::EndingIn)
    } else {
        None
    }
}

/// The next window boundary of one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    pub label: String,
    pub kind: WindowLabel,
    /// Unix seconds
    pub at: i64,
}

/// Closest start or end still ahead of `now` across `buttons`
pub fn next_boundary(buttons: &[GuardButton], now: i64) -> Option<Boundary> {
    buttons
        .iter()
        .filter_map(|button| {
            let kind = window_label(button.start_time, button.end_time, now)?;
            let at = match kind {
                WindowLabel::StartsIn => button.start_time,
                WindowLabel::EndingIn => button.end_time,
            };
            Some(Boundary {
                label: button.label.clone(),
                kind,
                at,
            })
        })
        .min_by_key(|boundary| boundary.at)
}

/// Locally ticking countdown, seeded once from on-chain time
#[derive(Debug)]
pub struct Countdown {
    remaining: watch::Receiver<i64>,
}

impl Countdown {
    /// Tick once per second until zero or until `cancel` fires
    pub fn start(to_time: i64, solana_time: i64, cancel: CancellationToken) -> Self {
        let initial = to_time.saturating_sub(solana_time).max(0);
        let (tx, rx) = watch::channel(initial);
        tokio::spawn(async move {
            let mut remaining = initial;
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            // the first tick completes immediately
            ticker.tick().await;
            while remaining > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                remaining -= 1;
                if tx.send(remaining).is_err() {
                    break;
                }
            }
        });
        Self { remaining: rx }
    }

    pub fn remaining(&self) -> i64 {
        *self.remaining.borrow()
    }

    pub fn render(&self) -> String {
        let remaining = self.remaining();
        if remaining <= 0 {
            READY.to_string()
        } else {
            format_seconds(remaining)
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<i64> {
        self.remaining.clone()
    }
}
