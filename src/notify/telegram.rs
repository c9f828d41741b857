//! Telegram Bot API notifier

use crate::config::NotifierConfig;
use crate::error::{SyncError, SyncResult};
use crate::notify::{NotificationMessage, Notifier};
use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request body of `sendMessage`
#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
    text: String,
}

/// Response envelope of the Bot API
#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    description: Option<String>,
}

pub struct TelegramNotifier {
    client: Client,
    config: NotifierConfig,
}

impl TelegramNotifier {
    pub fn new(config: &NotifierConfig, timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            SyncError::notification_error(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.bot_token
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn push(&self, message: &NotificationMessage) -> SyncResult<()> {
        let request = SendMessageRequest {
            chat_id: &self.config.chat_id,
            message_thread_id: self.config.thread_id,
            text: message.render(),
        };

        let response = self
            .client
            .post(self.send_message_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| SyncError::notification_error(format!("sendMessage failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<BotApiResponse> = serde_json::from_str(&body).ok();

        match parsed {
            Some(reply) if status.is_success() && reply.ok => {
                info!("Sent notification to chat {}", self.config.chat_id);
                Ok(())
            }
            Some(reply) => Err(SyncError::notification_error(format!(
                "sendMessage rejected ({}): {}",
                status,
                reply.description.unwrap_or_default()
            ))),
            None => Err(SyncError::notification_error(format!(
                "sendMessage returned status {} with unreadable body",
                status
            ))),
        }
    }
}
