//! Concurrent broadcast of one notification to every configured channel.
//!
//! Each call takes an immutable snapshot of the configuration, spawns one
//! task per channel into a [`JoinSet`], bounds each send with a timeout and
//! waits for all of them before reporting. Failures never short-circuit the
//! fan-out; they are collected per channel.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::channels::ChannelSet;
use crate::config::Config;
use crate::error::PushError;

// ── Result types ────────────────────────────────────────────────────────────

/// Aggregate delivery status, derived from a [`DispatchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    PartialSuccess,
    Error,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one broadcast.
///
/// `errors` maps a channel name (or one of the pseudo keys `input`,
/// `skipped`, `config`) to its failure text. `channels` is the number of
/// senders that were actually launched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub errors: BTreeMap<String, String>,
    pub channels: usize,
}

impl DispatchResult {
    fn short_circuit(key: &str, reason: &str) -> Self {
        Self {
            errors: BTreeMap::from([(key.to_string(), reason.to_string())]),
            channels: 0,
        }
    }

    pub fn status(&self) -> DeliveryStatus {
        let failed = self.errors.len();
        if failed == 0 {
            DeliveryStatus::Success
        } else if failed < self.channels {
            DeliveryStatus::PartialSuccess
        } else {
            DeliveryStatus::Error
        }
    }
}

// ── Configuration snapshot ──────────────────────────────────────────────────

/// Everything a single broadcast needs. Never mutated once built.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub channels: ChannelSet,
    pub timeout: Duration,
    pub skip_titles: Vec<String>,
}

impl BroadcastConfig {
    pub fn new(channels: ChannelSet) -> Self {
        Self {
            channels,
            timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
            skip_titles: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_skip_titles(mut self, titles: Vec<String>) -> Self {
        self.skip_titles = titles;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, PushError> {
        let channels = ChannelSet::from_configs(&config.channels)?;
        Ok(Self::new(channels)
            .with_timeout(config.broadcast.timeout())
            .with_skip_titles(config.broadcast.skip_titles.clone()))
    }
}

fn describe_timeout(ceiling: Duration) -> String {
    if ceiling.subsec_nanos() == 0 {
        format!("timeout after {}s", ceiling.as_secs())
    } else {
        format!("timeout after {}ms", ceiling.as_millis())
    }
}

/// Send `(title, content)` to every channel in `config` and wait for all
/// of them.
pub async fn broadcast(config: &BroadcastConfig, title: &str, content: &str) -> DispatchResult {
    if content.is_empty() {
        return DispatchResult::short_circuit("input", "content is empty");
    }
    if config.skip_titles.iter().any(|t| t == title) {
        debug!(title = %title, "Title is on the skip list");
        return DispatchResult::short_circuit("skipped", "title skipped by SKIP_PUSH_TITLE");
    }
    if config.channels.is_empty() {
        return DispatchResult::short_circuit("config", "no notification channels configured");
    }

    let title: Arc<str> = Arc::from(title);
    let content: Arc<str> = Arc::from(content);
    let ceiling = config.timeout;

    let mut tasks = JoinSet::new();
    let mut names = HashMap::new();
    for (name, sender) in config.channels.iter() {
        let sender = Arc::clone(sender);
        let title = Arc::clone(&title);
        let content = Arc::clone(&content);
        let handle = tasks.spawn(async move {
            match tokio::time::timeout(ceiling, sender.send(&title, &content)).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{e:#}")),
                Err(_) => Some(describe_timeout(ceiling)),
            }
        });
        names.insert(handle.id(), name.clone());
    }

    let mut result = DispatchResult {
        errors: BTreeMap::new(),
        channels: names.len(),
    };

    while let Some(joined) = tasks.join_next_with_id().await {
        let (id, outcome) = match joined {
            Ok((id, outcome)) => (id, outcome),
            Err(e) => {
                let reason = if e.is_panic() {
                    "sender panicked".to_string()
                } else {
                    format!("sender task failed: {e}")
                };
                (e.id(), Some(reason))
            }
        };
        let name = names.get(&id).cloned().unwrap_or_else(|| format!("task-{id}"));
        match outcome {
            None => debug!(channel = %name, "Notification delivered"),
            Some(reason) => {
                warn!(channel = %name, error = %reason, "Notification failed");
                result.errors.insert(name, reason);
            }
        }
    }

    info!(
        channels = result.channels,
        failed = result.errors.len(),
        status = %result.status(),
        "Broadcast finished"
    );
    result
}

// ── Broadcaster ─────────────────────────────────────────────────────────────

/// Per-call options for [`Broadcaster::send`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Use only `overrides`, ignoring the configured channels
    pub ignore_default_config: bool,
    /// Extra channels for this call only
    pub overrides: Option<ChannelSet>,
}

/// Holds the current configuration snapshot and swaps it on reload.
///
/// A configuration that failed to build is kept as its error text, so the
/// server keeps running and reports the problem on every send.
pub struct Broadcaster {
    current: RwLock<Result<Arc<BroadcastConfig>, String>>,
}

impl Broadcaster {
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            current: RwLock::new(Ok(Arc::new(config))),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            current: RwLock::new(Self::build(config)),
        }
    }

    fn build(config: &Config) -> Result<Arc<BroadcastConfig>, String> {
        match BroadcastConfig::from_config(config) {
            Ok(built) => Ok(Arc::new(built)),
            Err(e) => {
                warn!(error = %e, "Notification channels unavailable");
                Err(e.to_string())
            }
        }
    }

    /// Replace the snapshot. In-flight broadcasts keep the one they started with.
    pub async fn reload(&self, config: &Config) -> Result<(), PushError> {
        let next = Self::build(config);
        let outcome = match &next {
            Ok(snapshot) => {
                info!(channels = snapshot.channels.len(), "Configuration reloaded");
                Ok(())
            }
            Err(reason) => Err(PushError::ChannelsUnavailable(reason.clone())),
        };
        *self.current.write().await = next;
        outcome
    }

    pub async fn current(&self) -> Result<Arc<BroadcastConfig>, PushError> {
        self.current
            .read()
            .await
            .clone()
            .map_err(PushError::ChannelsUnavailable)
    }

    pub async fn send(
        &self,
        title: &str,
        content: &str,
        options: &SendOptions,
    ) -> Result<DispatchResult, PushError> {
        let snapshot = match (&options.overrides, options.ignore_default_config) {
            (Some(overrides), true) => {
                let base = self.current().await.map(|c| (*c).clone());
                let base = base.unwrap_or_else(|_| BroadcastConfig::new(ChannelSet::new()));
                Arc::new(BroadcastConfig {
                    channels: overrides.clone(),
                    ..base
                })
            }
            (Some(overrides), false) => {
                let base = self.current().await?;
                Arc::new(BroadcastConfig {
                    channels: base.channels.merged(overrides),
                    timeout: base.timeout,
                    skip_titles: base.skip_titles.clone(),
                })
            }
            (None, _) => self.current().await?,
        };
        Ok(broadcast(&snapshot, title, content).await)
    }
}
