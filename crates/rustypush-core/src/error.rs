//! Crate-level error type.

use std::path::PathBuf;

/// Errors raised while loading configuration or building the channel set.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid channel '{name}': {reason}")]
    InvalidChannel { name: String, reason: String },

    #[error("duplicate channel name: {0}")]
    DuplicateChannel(String),

    #[error("failed to create HTTP client: {0}")]
    HttpClient(String),

    #[error("failed to load notification channels: {0}")]
    ChannelsUnavailable(String),
}
