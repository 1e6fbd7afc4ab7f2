//! ntfy channel, publishing through the JSON endpoint at the server root.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use super::{ChannelSender, ensure_success};

#[derive(Debug, Serialize)]
struct NtfyMessage<'a> {
    topic: &'a str,
    title: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u8>,
    markdown: bool,
}

pub struct NtfyChannel {
    name: String,
    server: Url,
    topic: String,
    token: Option<String>,
    priority: Option<u8>,
    http: Client,
}

impl NtfyChannel {
    pub fn new(
        name: String,
        server: Url,
        topic: String,
        token: Option<String>,
        priority: Option<u8>,
        http: Client,
    ) -> Self {
        Self {
            name,
            server,
            topic,
            token,
            // ntfy accepts priorities 1 (min) through 5 (max)
            priority: priority.map(|p| p.clamp(1, 5)),
            http,
        }
    }
}

#[async_trait]
impl ChannelSender for NtfyChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "ntfy"
    }

    async fn send(&self, title: &str, content: &str) -> Result<()> {
        let body = NtfyMessage {
            topic: &self.topic,
            title,
            message: content,
            priority: self.priority,
            markdown: true,
        };

        let mut request = self.http.post(self.server.clone()).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("ntfy publish to {} failed", self.server))?;
        ensure_success("ntfy", response).await
    }
}
