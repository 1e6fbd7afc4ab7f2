//! Lifecycle events and their flattening into a `(title, content)` pair.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use strum::{Display, EnumString, VariantNames};

/// Stage of a long-running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
    Start,
    Update,
    End,
    Error,
}

impl EventKind {
    pub fn names() -> &'static [&'static str] {
        Self::VARIANTS
    }
}

/// A validated `notify_event` call.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub run_id: String,
    pub event: EventKind,
    pub message: String,
    pub data: Option<Map<String, Value>>,
    pub timestamp: String,
}

impl EventEnvelope {
    /// Flatten into a notification title and body.
    ///
    /// Title is `[EVENT] run_id`. A non-empty `data` object is appended to the
    /// body as a pretty-printed JSON block.
    pub fn to_flat(&self) -> (String, String) {
        let title = format!(
            "[{}] {}",
            self.event.to_string().to_uppercase(),
            self.run_id
        );

        let mut content = self.message.clone();
        if let Some(data) = self.data.as_ref().filter(|d| !d.is_empty()) {
            let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
            content.push_str("\n\n**Additional data:**\n```json\n");
            content.push_str(&pretty);
            content.push_str("\n```");
        }
        (title, content)
    }
}

/// Current UTC time, e.g. `2025-01-01T12:00:00.000000Z`.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
