//! Parameter definitions for the notification tools.
//!
//! Each `*_params()` function returns the parameter schema for a tool,
//! which `tools/list` turns into a JSON Schema `inputSchema`.

use super::ToolParam;
use super::event::EventKind;

pub fn notify_send_params() -> Vec<ToolParam> {
    vec![
        ToolParam::new("title", "Notification title.", "string", true),
        ToolParam::new("content", "Notification body. Must not be empty.", "string", true),
        ToolParam::new(
            "ignore_default_config",
            "Deliver only to channels supplied with this call, skipping the \
             configured defaults. Has no effect when no extra channels are given.",
            "boolean",
            false,
        ),
    ]
}

pub fn notify_event_params() -> Vec<ToolParam> {
    vec![
        ToolParam::new("run_id", "Unique identifier of the task or run.", "string", true),
        ToolParam::new("event", "Lifecycle stage of the run.", "string", true)
            .one_of(EventKind::names()),
        ToolParam::new("message", "Human-readable status line.", "string", true),
        ToolParam::new(
            "data",
            "Extra structured data (step, progress, artifact_url, ...).",
            "object",
            false,
        ),
        ToolParam::new(
            "timestamp",
            "When the event happened (RFC 3339). Defaults to now.",
            "string",
            false,
        )
        .format("date-time"),
    ]
}
