use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::channels::{ChannelConfig, ChannelKind};
use crate::error::PushError;

/// Default wait ceiling for a single channel send.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Top-level configuration, read from `config.toml` and then overlaid
/// with environment variables.
///
/// ```toml
/// [server]
/// socket_path = "/run/user/1000/rustypush.sock"
///
/// [broadcast]
/// timeout_secs = 30
/// skip_titles = ["heartbeat"]
///
/// [[channels]]
/// type = "webhook"
/// name = "ops"
/// url = "https://hooks.example.com/notify"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub broadcast: BroadcastSettings,
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name reported in the `initialize` handshake
    pub name: String,
    /// Unix socket path for `rustypush socket` (default: $TMPDIR/rustypush-<pid>.sock)
    pub socket_path: Option<PathBuf>,
    /// File holding the guidance prompt served by `prompts/get`
    pub prompt_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "rustypush".to_string(),
            socket_path: None,
            prompt_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastSettings {
    /// Per-channel wait ceiling in seconds (0 is treated as 1)
    pub timeout_secs: u64,
    /// Titles that are never broadcast (exact match)
    pub skip_titles: Vec<String>,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            skip_titles: Vec::new(),
        }
    }
}

impl BroadcastSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Config {
    /// Default location: `~/.rustypush/config.toml`
    pub fn default_path() -> PathBuf {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_dir.join(".rustypush").join("config.toml")
    }

    /// Load configuration from file. A missing file yields the defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Self, PushError> {
        let config_path = path.unwrap_or_else(Self::default_path);

        if !config_path.exists() {
            debug!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&config_path).map_err(|source| {
            PushError::ConfigRead {
                path: config_path.clone(),
                source,
            }
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %config_path.display(), channels = config.channels.len(), "Loaded config");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, PushError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from file, then apply the process environment on top.
    pub fn resolve(path: Option<PathBuf>) -> Result<Self, PushError> {
        let mut config = Self::load(path)?;
        config.apply_env();
        Ok(config)
    }

    /// Overlay the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay environment-style variables taken from `lookup`.
    ///
    /// `SKIP_PUSH_TITLE` (newline-delimited) replaces `broadcast.skip_titles`.
    /// Channel variables produce channels with fixed names; each one replaces
    /// a file-configured channel of the same name.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = var("SKIP_PUSH_TITLE") {
            self.broadcast.skip_titles = raw
                .split('\n')
                .map(|t| t.trim_end_matches('\r').to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }

        if let Some(secs) = var("PUSH_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|&secs| secs > 0)
        {
            self.broadcast.timeout_secs = secs;
        }

        if var("CONSOLE").is_some_and(|v| is_truthy(&v)) {
            self.upsert_channel(ChannelConfig::named("console", ChannelKind::Console));
        }

        if let Some(url) = var("WEBHOOK_URL") {
            self.upsert_channel(ChannelConfig::named(
                "webhook_bot",
                ChannelKind::Webhook {
                    url,
                    headers: Default::default(),
                },
            ));
        }

        if let (Some(bot_token), Some(chat_id)) = (var("TG_BOT_TOKEN"), var("TG_USER_ID")) {
            self.upsert_channel(ChannelConfig::named(
                "telegram_bot",
                ChannelKind::Telegram {
                    bot_token,
                    chat_id,
                    api_host: var("TG_API_HOST"),
                },
            ));
        }

        if let Some(topic) = var("NTFY_TOPIC") {
            self.upsert_channel(ChannelConfig::named(
                "ntfy",
                ChannelKind::Ntfy {
                    server: var("NTFY_URL").unwrap_or_else(crate::channels::default_ntfy_server),
                    topic,
                    token: var("NTFY_TOKEN"),
                    priority: var("NTFY_PRIORITY").and_then(|p| p.trim().parse().ok()),
                },
            ));
        }

        if let (Some(url), Some(token)) = (var("GOTIFY_URL"), var("GOTIFY_TOKEN")) {
            self.upsert_channel(ChannelConfig::named(
                "gotify",
                ChannelKind::Gotify {
                    url,
                    token,
                    priority: var("GOTIFY_PRIORITY")
                        .and_then(|p| p.trim().parse().ok())
                        .unwrap_or(crate::channels::DEFAULT_GOTIFY_PRIORITY),
                },
            ));
        }
    }

    fn upsert_channel(&mut self, channel: ChannelConfig) {
        let name = channel.effective_name();
        self.channels.retain(|c| c.effective_name() != name);
        debug!(channel = %name, "Channel configured from environment");
        self.channels.push(channel);
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
