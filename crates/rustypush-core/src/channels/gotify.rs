//! Gotify channel (`POST /message` with an application token).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use super::{ChannelSender, ensure_success};

#[derive(Debug, Serialize)]
struct GotifyMessage<'a> {
    title: &'a str,
    message: &'a str,
    priority: u8,
}

pub struct GotifyChannel {
    name: String,
    url: Url,
    token: String,
    priority: u8,
    http: Client,
}

impl GotifyChannel {
    pub fn new(name: String, url: Url, token: String, priority: u8, http: Client) -> Self {
        Self {
            name,
            url,
            token,
            priority,
            http,
        }
    }

    fn message_url(&self) -> String {
        format!("{}/message", self.url.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl ChannelSender for GotifyChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "gotify"
    }

    async fn send(&self, title: &str, content: &str) -> Result<()> {
        let response = self
            .http
            .post(self.message_url())
            .header("X-Gotify-Key", &self.token)
            .json(&GotifyMessage {
                title,
                message: content,
                priority: self.priority,
            })
            .send()
            .await
            .with_context(|| format!("Gotify request to {} failed", self.url))?;
        ensure_success("gotify", response).await
    }
}
