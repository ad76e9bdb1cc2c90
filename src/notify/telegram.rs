//! Telegram Bot API notifier.
//!
//! Messages go to the configured chats plus every chat that has sent `/start`
//! to the bot. Subscriptions are picked up by polling `getUpdates`; the update
//! cursor is persisted so restarts do not replay old updates.

use super::{Notifier, NotifyError};
use crate::db::repo::TELEGRAM_OFFSET_PROPERTY;
use crate::db::Repository;
use crate::domain::TimeMs;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug)]
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    chat_ids: Vec<i64>,
    repo: Arc<Repository>,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_ids: Vec<i64>, repo: Arc<Repository>) -> Self {
        Self::with_api_base(TELEGRAM_API, token, chat_ids, repo)
    }

    pub fn with_api_base(
        api_base: &str,
        token: &str,
        chat_ids: Vec<i64>,
        repo: Arc<Repository>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_base: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
            chat_ids,
            repo,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, NotifyError> {
        let response = self
            .client
            .post(format!("{}/{}", self.api_base, method))
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;
        into_result(status, parsed)
    }

    async fn recipients(&self) -> Result<BTreeSet<i64>, NotifyError> {
        let mut chats: BTreeSet<i64> = self.chat_ids.iter().copied().collect();
        chats.extend(self.repo.list_notification_chats().await?);
        Ok(chats)
    }
}

fn into_result<T>(status: u16, response: ApiResponse<T>) -> Result<T, NotifyError> {
    match (response.ok, response.result) {
        (true, Some(result)) => Ok(result),
        (_, _) => Err(NotifyError::Api {
            status,
            message: response
                .description
                .unwrap_or_else(|| "no description".to_string()),
        }),
    }
}

/// Chats that sent `/start`, and the next update offset.
fn start_requests(updates: &[Update]) -> (Vec<i64>, Option<i64>) {
    let chats = updates
        .iter()
        .filter_map(|u| u.message.as_ref())
        .filter(|m| {
            m.text
                .as_deref()
                .is_some_and(|t| t.trim_start().starts_with("/start"))
        })
        .map(|m| m.chat.id)
        .collect();
    let next_offset = updates.iter().map(|u| u.update_id + 1).max();
    (chats, next_offset)
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let recipients = self.recipients().await?;
        let results = join_all(recipients.iter().map(|&chat_id| async move {
            let result: Result<serde_json::Value, _> = self
                .call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
                .await;
            (chat_id, result)
        }))
        .await;

        let mut first_error = None;
        for (chat_id, result) in results {
            if let Err(e) = result {
                warn!(chat_id = chat_id, error = %e, "Telegram sendMessage failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn poll_subscriptions(&self) -> Result<usize, NotifyError> {
        let offset = self
            .repo
            .get_property(TELEGRAM_OFFSET_PROPERTY)
            .await?
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(0);

        let updates: Vec<Update> = self
            .call("getUpdates", json!({ "offset": offset, "timeout": 0 }))
            .await?;
        let (chats, next_offset) = start_requests(&updates);

        let now = TimeMs::now();
        let mut added = 0;
        for chat_id in chats {
            if self.repo.add_notification_chat(chat_id, now).await? {
                info!(chat_id = chat_id, "Subscribed chat to notifications");
                added += 1;
            }
        }
        if let Some(next) = next_offset {
            self.repo
                .upsert_property(TELEGRAM_OFFSET_PROPERTY, &next.to_string(), now)
                .await?;
        }
        Ok(added)
    }
}
