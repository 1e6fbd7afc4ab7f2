//! Generic webhook channel.
//!
//! POSTs `{"title": ..., "content": ...}` as JSON to the configured URL,
//! with any extra headers from the channel config.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use url::Url;

use super::{ChannelSender, ensure_success};

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    content: &'a str,
}

pub struct WebhookChannel {
    name: String,
    url: Url,
    headers: BTreeMap<String, String>,
    http: Client,
}

impl WebhookChannel {
    pub fn new(name: String, url: Url, headers: BTreeMap<String, String>, http: Client) -> Self {
        Self {
            name,
            url,
            headers,
            http,
        }
    }
}

#[async_trait]
impl ChannelSender for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, title: &str, content: &str) -> Result<()> {
        let mut request = self
            .http
            .post(self.url.clone())
            .json(&WebhookPayload { title, content });
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("webhook request to {} failed", self.url))?;
        ensure_success("webhook", response).await
    }
}
