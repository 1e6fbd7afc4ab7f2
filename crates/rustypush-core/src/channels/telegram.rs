//! Telegram channel using the Bot API `sendMessage` method.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::ChannelSender;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramChannel {
    name: String,
    bot_token: String,
    chat_id: String,
    api_host: Option<Url>,
    http: Client,
}

impl TelegramChannel {
    pub fn new(
        name: String,
        bot_token: String,
        chat_id: String,
        api_host: Option<Url>,
        http: Client,
    ) -> Self {
        Self {
            name,
            bot_token,
            chat_id,
            api_host,
            http,
        }
    }

    fn api_url(&self, method: &str) -> String {
        let base = self
            .api_host
            .as_ref()
            .map(|u| u.as_str().trim_end_matches('/').to_string())
            .unwrap_or_else(|| TELEGRAM_API_BASE.to_string());
        format!("{}/bot{}/{}", base, self.bot_token, method)
    }

    fn message_text(title: &str, content: &str) -> String {
        format!("{}\n\n{}", title, content)
    }
}

#[async_trait]
impl ChannelSender for TelegramChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, title: &str, content: &str) -> Result<()> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: Self::message_text(title, content),
            disable_web_page_preview: true,
        };

        // The token is part of the URL, so keep it out of error messages.
        let response = self
            .http
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("Telegram sendMessage request failed")?;

        let status = response.status();
        let result: TelegramResponse = response
            .json()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("Telegram returned HTTP {} with an unreadable body", status.as_u16()))?;

        if !result.ok {
            anyhow::bail!(
                "Telegram API error: {}",
                result.description.unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
            );
        }
        Ok(())
    }
}
