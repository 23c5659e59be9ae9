//! User-facing notices

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub description: Option<String>,
    pub level: NoticeLevel,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            level,
        }
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, title)
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, title)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, title)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        let description = notice.description.as_deref().unwrap_or("");
        match notice.level {
            NoticeLevel::Info | NoticeLevel::Success => {
                info!(level = ?notice.level, description, "{}", notice.title)
            }
            NoticeLevel::Warning => warn!(description, "{}", notice.title),
            NoticeLevel::Error => error!(description, "{}", notice.title),
        }
    }
}

/// Forwards notices to a front end
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        // a closed front end drops notices
        let _ = self.tx.send(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_notifier_forwards() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(Notice::error("Your mint failed!").with_description("Please try again."));
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.description.as_deref(), Some("Please try again."));

        drop(rx);
        notifier.notify(Notice::info("ignored"));
    }

    #[test]
    fn test_notice_builders() {
        let notice = Notice::warning("The developer should really set a lookup table!");
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert!(notice.description.is_none());
        TracingNotifier.notify(notice);
    }
}
