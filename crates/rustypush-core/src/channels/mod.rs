//! Outbound notification channels.
//!
//! A channel is anything that can take a `(title, content)` pair and
//! deliver it somewhere: a webhook, a chat bot, a push service, or the
//! local console. The broadcaster only sees the [`ChannelSender`] trait,
//! so new targets plug in without touching the fan-out logic.
//!
//! Channels are declared in `config.toml`:
//!
//! ```toml
//! [[channels]]
//! type = "telegram"
//! bot_token = "123456:ABC..."
//! chat_id = "42"
//!
//! [[channels]]
//! type = "ntfy"
//! name = "phone"
//! topic = "my-builds"
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::PushError;

mod console;
mod gotify;
mod ntfy;
mod telegram;
mod webhook;

pub use console::ConsoleChannel;
pub use gotify::GotifyChannel;
pub use ntfy::NtfyChannel;
pub use telegram::TelegramChannel;
pub use webhook::WebhookChannel;

pub const DEFAULT_GOTIFY_PRIORITY: u8 = 5;

/// Transport-level timeout for the shared HTTP client. The broadcaster
/// enforces its own (usually equal) ceiling on top of this.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub fn default_ntfy_server() -> String {
    "https://ntfy.sh".to_string()
}

fn default_gotify_priority() -> u8 {
    DEFAULT_GOTIFY_PRIORITY
}

fn default_enabled() -> bool {
    true
}

// ── Sender trait ────────────────────────────────────────────────────────────

/// A single outbound notification target.
///
/// `send` returns `Ok(())` when the target accepted the message. Any error
/// is reported verbatim (with its context chain) as that channel's failure
/// reason in the broadcast result.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Unique channel name, used as the key in broadcast results
    fn name(&self) -> &str;

    /// Channel type (webhook, telegram, ntfy, ...)
    fn kind(&self) -> &'static str;

    /// Deliver one notification
    async fn send(&self, title: &str, content: &str) -> Result<()>;
}

// ── Configuration ───────────────────────────────────────────────────────────

/// Type-specific settings of a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelKind {
    /// Print notifications to stderr
    Console,
    /// POST `{"title", "content"}` as JSON to an arbitrary URL
    Webhook {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    /// Telegram Bot API `sendMessage`
    Telegram {
        bot_token: String,
        chat_id: String,
        #[serde(default)]
        api_host: Option<String>,
    },
    /// ntfy.sh (or self-hosted ntfy) JSON publish
    Ntfy {
        #[serde(default = "default_ntfy_server")]
        server: String,
        topic: String,
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        priority: Option<u8>,
    },
    /// Gotify `POST /message`
    Gotify {
        url: String,
        token: String,
        #[serde(default = "default_gotify_priority")]
        priority: u8,
    },
}

impl ChannelKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Webhook { .. } => "webhook",
            Self::Telegram { .. } => "telegram",
            Self::Ntfy { .. } => "ntfy",
            Self::Gotify { .. } => "gotify",
        }
    }

    fn needs_http(&self) -> bool {
        !matches!(self, Self::Console)
    }
}

/// One `[[channels]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel name (defaults to the channel type)
    #[serde(default)]
    pub name: Option<String>,

    /// Whether this channel takes part in broadcasts
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(flatten)]
    pub kind: ChannelKind,
}

impl ChannelConfig {
    pub fn named(name: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            name: Some(name.into()),
            enabled: true,
            kind,
        }
    }

    pub fn effective_name(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.kind.type_name().to_string())
    }
}

// ── Channel set ─────────────────────────────────────────────────────────────

/// An immutable, name-keyed collection of senders.
///
/// Built once per configuration load and shared behind an `Arc`; a
/// broadcast never sees the set change underneath it.
#[derive(Clone, Default)]
pub struct ChannelSet {
    senders: BTreeMap<String, Arc<dyn ChannelSender>>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build senders for every enabled channel in `configs`.
    pub fn from_configs(configs: &[ChannelConfig]) -> Result<Self, PushError> {
        let enabled: Vec<&ChannelConfig> = configs.iter().filter(|c| c.enabled).collect();

        let http = if enabled.iter().any(|c| c.kind.needs_http()) {
            Some(
                reqwest::Client::builder()
                    .timeout(HTTP_TIMEOUT)
                    .user_agent(concat!("rustypush/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .map_err(|e| PushError::HttpClient(e.to_string()))?,
            )
        } else {
            None
        };

        let mut set = Self::new();
        for config in enabled {
            let name = config.effective_name();
            if set.contains(&name) {
                return Err(PushError::DuplicateChannel(name));
            }
            let sender = build_sender(name.clone(), &config.kind, http.clone())?;
            debug!(channel = %name, kind = config.kind.type_name(), "Channel ready");
            set.senders.insert(name, sender);
        }
        Ok(set)
    }

    /// Add a sender, replacing any existing sender with the same name.
    pub fn with(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.insert(sender);
        self
    }

    pub fn insert(&mut self, sender: Arc<dyn ChannelSender>) {
        self.senders.insert(sender.name().to_string(), sender);
    }

    /// Overlay `other` on top of `self`; senders in `other` win on name clashes.
    pub fn merged(&self, other: &ChannelSet) -> ChannelSet {
        let mut senders = self.senders.clone();
        for (name, sender) in &other.senders {
            senders.insert(name.clone(), Arc::clone(sender));
        }
        ChannelSet { senders }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.senders.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.senders.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn ChannelSender>)> {
        self.senders.iter()
    }
}

impl std::fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSet")
            .field("channels", &self.senders.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn build_sender(
    name: String,
    kind: &ChannelKind,
    http: Option<reqwest::Client>,
) -> Result<Arc<dyn ChannelSender>, PushError> {
    let invalid = |reason: String| PushError::InvalidChannel {
        name: name.clone(),
        reason,
    };
    let http = || http.clone().ok_or_else(|| invalid("no HTTP client".to_string()));

    let sender: Arc<dyn ChannelSender> = match kind {
        ChannelKind::Console => Arc::new(ConsoleChannel::new(name.clone())),
        ChannelKind::Webhook { url, headers } => {
            let url = parse_url(url).map_err(invalid)?;
            Arc::new(WebhookChannel::new(name.clone(), url, headers.clone(), http()?))
        }
        ChannelKind::Telegram {
            bot_token,
            chat_id,
            api_host,
        } => {
            require("bot_token", bot_token).map_err(invalid)?;
            require("chat_id", chat_id).map_err(invalid)?;
            let api_host = api_host
                .as_deref()
                .map(parse_url)
                .transpose()
                .map_err(invalid)?;
            Arc::new(TelegramChannel::new(
                name.clone(),
                bot_token.clone(),
                chat_id.clone(),
                api_host,
                http()?,
            ))
        }
        ChannelKind::Ntfy {
            server,
            topic,
            token,
            priority,
        } => {
            require("topic", topic).map_err(invalid)?;
            let server = parse_url(server).map_err(invalid)?;
            Arc::new(NtfyChannel::new(
                name.clone(),
                server,
                topic.clone(),
                token.clone(),
                *priority,
                http()?,
            ))
        }
        ChannelKind::Gotify {
            url,
            token,
            priority,
        } => {
            require("token", token).map_err(invalid)?;
            let url = parse_url(url).map_err(invalid)?;
            Arc::new(GotifyChannel::new(
                name.clone(),
                url,
                token.clone(),
                *priority,
                http()?,
            ))
        }
    };
    Ok(sender)
}

fn parse_url(raw: &str) -> std::result::Result<url::Url, String> {
    let url = url::Url::parse(raw.trim()).map_err(|e| format!("invalid URL '{}': {}", raw, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported URL scheme '{}'", other)),
    }
}

fn require(field: &str, value: &str) -> std::result::Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("missing {}", field))
    } else {
        Ok(())
    }
}

/// Check that an HTTP response is a 2xx, turning anything else into an error
/// that carries the status and (truncated) body.
pub(crate) async fn ensure_success(service: &str, response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(200).collect();
    anyhow::bail!("{} returned HTTP {}: {}", service, status.as_u16(), body)
}
