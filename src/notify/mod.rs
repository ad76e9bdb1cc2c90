//! Outbound notifications.
//!
//! Delivery is fire-and-forget from the rebalancer's point of view: callers use
//! [`notify`], which logs failures instead of returning them.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

pub mod telegram;

pub use telegram::TelegramNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification request failed: {0}")]
    Request(String),
    #[error("Notification API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait Notifier: Send + Sync + fmt::Debug {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;

    /// Pick up new subscribers. Returns how many were added.
    async fn poll_subscriptions(&self) -> Result<usize, NotifyError> {
        Ok(0)
    }
}

/// Send `text`, logging (not returning) any failure.
pub async fn notify(notifier: &dyn Notifier, text: &str) {
    if let Err(e) = notifier.send(text).await {
        warn!(error = %e, "Failed to send notification");
    }
}

/// Writes notifications to the log. Used when no bot is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        info!(message = %text, "Notification");
        Ok(())
    }
}

/// Keeps every message in memory; can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Request("recording notifier set to fail".to_string()));
        }
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_swallows_failures() {
        let notifier = RecordingNotifier::new();
        notifier.set_failing(true);
        notify(&notifier, "lost").await;
        assert!(notifier.messages().is_empty());

        notifier.set_failing(false);
        notify(&notifier, "kept").await;
        assert_eq!(notifier.messages(), vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        tokio_test::assert_ok!(LogNotifier.send("hello").await);
        assert_eq!(LogNotifier.poll_subscriptions().await.unwrap(), 0);
    }
}
