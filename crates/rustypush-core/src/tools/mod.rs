//! Tool definitions, argument validation and execution.
//!
//! Two tools are exposed: `notify_send` (flat title/content) and
//! `notify_event` (structured lifecycle event). Validation happens before
//! the broadcaster is touched, and every failure is folded into an
//! error-tagged [`ToolCallResult`] rather than a protocol error.

pub mod event;
mod params;

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::broadcast::{Broadcaster, DeliveryStatus, DispatchResult, SendOptions};
use event::{EventEnvelope, EventKind, now_timestamp};
pub use params::*;

// ── Tool schema ─────────────────────────────────────────────────────────────

/// One tool parameter, rendered into JSON Schema by [`ToolDef::input_schema`].
#[derive(Debug, Clone, Serialize)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    /// JSON Schema type: "string", "boolean", "object".
    #[serde(rename = "type")]
    pub param_type: String,
    pub required: bool,
    /// Allowed values, rendered as `enum`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl ToolParam {
    pub fn new(name: &str, description: &str, param_type: &str, required: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type: param_type.into(),
            required,
            allowed: Vec::new(),
            format: None,
        }
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn format(mut self, format: &str) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Tool identity. Both the underscore and dotted spellings resolve here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    Send,
    Event,
}

impl ToolName {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "notify_send" | "notify.send" => Some(Self::Send),
            "notify_event" | "notify.event" => Some(Self::Event),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Send => "notify_send",
            Self::Event => "notify_event",
        }
    }
}

/// Static description of a tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolDef {
    pub name: ToolName,
    pub description: &'static str,
    pub parameters: fn() -> Vec<ToolParam>,
}

pub static NOTIFY_SEND: ToolDef = ToolDef {
    name: ToolName::Send,
    description: "Broadcast a message to every configured notification channel.",
    parameters: notify_send_params,
};

pub static NOTIFY_EVENT: ToolDef = ToolDef {
    name: ToolName::Event,
    description: "Send a structured task lifecycle event (start, update, end, error) \
                  with optional progress data.",
    parameters: notify_event_params,
};

pub fn all_tools() -> [&'static ToolDef; 2] {
    [&NOTIFY_SEND, &NOTIFY_EVENT]
}

impl ToolDef {
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for p in (self.parameters)() {
            let mut prop = Map::new();
            prop.insert("type".into(), json!(p.param_type));
            prop.insert("description".into(), json!(p.description));
            if !p.allowed.is_empty() {
                prop.insert("enum".into(), json!(p.allowed));
            }
            if let Some(format) = &p.format {
                prop.insert("format".into(), json!(format));
            }
            if p.required {
                required.push(json!(p.name));
            }
            properties.insert(p.name, Value::Object(prop));
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name.as_str(),
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }
}

// ── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

/// The `tools/call` result shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallResult {
    pub content: Vec<TextContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn text(text: impl Into<String>, is_error: bool) -> Self {
        Self {
            content: vec![TextContent {
                kind: "text",
                text: text.into(),
            }],
            is_error,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::text(text, true)
    }

    /// Text of the first content block.
    pub fn first_text(&self) -> &str {
        self.content.first().map(|c| c.text.as_str()).unwrap_or("")
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({"content": [], "isError": true}))
    }
}

/// Why a tool could not produce a report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Unavailable(String),
}

/// A finished tool run: the broadcast report plus the status it implies.
#[derive(Debug, Clone)]
pub struct ToolReport {
    pub status: DeliveryStatus,
    pub body: Value,
}

// ── Validation ──────────────────────────────────────────────────────────────

fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendArgs {
    pub title: String,
    pub content: String,
    pub ignore_default_config: bool,
}

pub fn validate_send(args: &Map<String, Value>) -> Result<SendArgs, String> {
    let (Some(title), Some(content)) = (required_str(args, "title"), required_str(args, "content"))
    else {
        return Err("title and content are required".to_string());
    };
    let ignore_default_config = args
        .get("ignore_default_config")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(SendArgs {
        title: title.to_string(),
        content: content.to_string(),
        ignore_default_config,
    })
}

pub fn validate_event(args: &Map<String, Value>) -> Result<EventEnvelope, String> {
    let (Some(run_id), Some(event), Some(message)) = (
        required_str(args, "run_id"),
        required_str(args, "event"),
        required_str(args, "message"),
    ) else {
        return Err("run_id, event and message are required".to_string());
    };

    let event = EventKind::from_str(event).map_err(|_| format!("invalid event type: {}", event))?;

    let data = match args.get("data") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(_) => return Err("data must be an object".to_string()),
    };

    let timestamp = match args.get("timestamp") {
        None | Some(Value::Null) => now_timestamp(),
        Some(Value::String(ts)) => ts.clone(),
        Some(_) => return Err("timestamp must be a string".to_string()),
    };

    Ok(EventEnvelope {
        run_id: run_id.to_string(),
        event,
        message: message.to_string(),
        data,
        timestamp,
    })
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Executes tool calls against a shared [`Broadcaster`].
#[derive(Clone)]
pub struct ToolRegistry {
    broadcaster: Arc<Broadcaster>,
}

impl ToolRegistry {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self { broadcaster }
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// The `tools/list` payload.
    pub fn list(&self) -> Value {
        let tools: Vec<Value> = all_tools().iter().map(|t| t.to_json()).collect();
        json!({ "tools": tools })
    }

    /// Run a tool call. Never fails: every problem becomes `isError: true`.
    pub async fn call(&self, name: &str, arguments: &Value) -> ToolCallResult {
        let Some(tool) = ToolName::parse(name) else {
            debug!(tool = %name, "Unknown tool");
            return ToolCallResult::error(format!("Unknown tool: {}", name));
        };

        let empty = Map::new();
        let args = arguments.as_object().unwrap_or(&empty);

        match self.run(tool, args).await {
            Ok(report) => {
                let text = serde_json::to_string_pretty(&report.body)
                    .unwrap_or_else(|_| report.body.to_string());
                ToolCallResult::text(text, report.status == DeliveryStatus::Error)
            }
            Err(e) => ToolCallResult::error(e.to_string()),
        }
    }

    /// Validate, broadcast and build the report object for `tool`.
    pub async fn run(&self, tool: ToolName, args: &Map<String, Value>) -> Result<ToolReport, ToolError> {
        match tool {
            ToolName::Send => {
                let send = validate_send(args).map_err(ToolError::Invalid)?;
                let options = SendOptions {
                    ignore_default_config: send.ignore_default_config,
                    overrides: None,
                };
                let result = self.dispatch(&send.title, &send.content, &options).await?;
                let status = result.status();
                let message = if status == DeliveryStatus::Success {
                    "notification delivered"
                } else {
                    "notification not fully delivered"
                };
                Ok(ToolReport {
                    status,
                    body: json!({
                        "status": status,
                        "message": message,
                        "channels_count": result.channels,
                        "errors": result.errors,
                    }),
                })
            }
            ToolName::Event => {
                let envelope = validate_event(args).map_err(ToolError::Invalid)?;
                let (title, content) = envelope.to_flat();
                let result = self.dispatch(&title, &content, &SendOptions::default()).await?;
                let status = result.status();
                let message = if status == DeliveryStatus::Success {
                    "event delivered"
                } else {
                    "event not fully delivered"
                };
                Ok(ToolReport {
                    status,
                    body: json!({
                        "status": status,
                        "run_id": envelope.run_id,
                        "event": envelope.event.to_string(),
                        "message": message,
                        "timestamp": envelope.timestamp,
                        "channels_count": result.channels,
                        "errors": result.errors,
                    }),
                })
            }
        }
    }

    async fn dispatch(
        &self,
        title: &str,
        content: &str,
        options: &SendOptions,
    ) -> Result<DispatchResult, ToolError> {
        let result = self
            .broadcaster
            .send(title, content, options)
            .await
            .map_err(|e| ToolError::Unavailable(e.to_string()))?;
        info!(title = %title, status = %result.status(), "Notification dispatched");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastConfig;
    use crate::channels::{ChannelSender, ChannelSet};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChannelSender for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }
        fn kind(&self) -> &'static str {
            "mock"
        }
        async fn send(&self, title: &str, content: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((title.to_string(), content.to_string()));
            Ok(())
        }
    }

    fn registry_with(recorder: Arc<Recorder>) -> ToolRegistry {
        let config = BroadcastConfig::new(ChannelSet::new().with(recorder));
        ToolRegistry::new(Arc::new(Broadcaster::new(config)))
    }

    fn empty_registry() -> ToolRegistry {
        ToolRegistry::new(Arc::new(Broadcaster::new(BroadcastConfig::new(ChannelSet::new()))))
    }

    fn body(result: &ToolCallResult) -> Value {
        serde_json::from_str(result.first_text()).unwrap()
    }

    #[test]
    fn test_tool_name_aliases() {
        assert_eq!(ToolName::parse("notify_send"), Some(ToolName::Send));
        assert_eq!(ToolName::parse("notify.send"), Some(ToolName::Send));
        assert_eq!(ToolName::parse("notify.event"), Some(ToolName::Event));
        assert_eq!(ToolName::parse("notify-send"), None);
    }

    #[test]
    fn test_list_schema() {
        let list = empty_registry().list();
        let tools = list["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["name"], "notify_send");
        assert_eq!(
            tools[0]["inputSchema"]["required"],
            json!(["title", "content"])
        );
        let event = &tools[1]["inputSchema"];
        assert_eq!(event["properties"]["event"]["enum"], json!(["start", "update", "end", "error"]));
        assert_eq!(event["properties"]["timestamp"]["format"], "date-time");
        assert_eq!(event["required"], json!(["run_id", "event", "message"]));
    }

    #[test]
    fn test_validate_send() {
        let args = json!({"title": "t", "content": ""});
        assert_eq!(
            validate_send(args.as_object().unwrap()).unwrap_err(),
            "title and content are required"
        );
        let args = json!({"title": "t", "content": "c", "ignore_default_config": true});
        let send = validate_send(args.as_object().unwrap()).unwrap();
        assert!(send.ignore_default_config);
    }

    #[test]
    fn test_validate_event_rejects_bad_input() {
        let args = json!({"run_id": "r1", "event": "finish", "message": "m"});
        assert_eq!(
            validate_event(args.as_object().unwrap()).unwrap_err(),
            "invalid event type: finish"
        );

        let args = json!({"run_id": "r1", "event": "end", "message": "m", "data": [1, 2]});
        assert_eq!(
            validate_event(args.as_object().unwrap()).unwrap_err(),
            "data must be an object"
        );

        let args = json!({"run_id": "r1", "event": "end"});
        assert!(validate_event(args.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_validate_event_fills_timestamp() {
        let args = json!({"run_id": "r1", "event": "start", "message": "m", "data": null});
        let envelope = validate_event(args.as_object().unwrap()).unwrap();
        assert!(envelope.timestamp.ends_with('Z'));
        assert!(envelope.data.is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let result = empty_registry().call("notify_sms", &json!({})).await;
        assert!(result.is_error);
        assert_eq!(result.first_text(), "Unknown tool: notify_sms");
    }

    #[tokio::test]
    async fn test_invalid_event_skips_dispatch() {
        let recorder = Arc::new(Recorder::default());
        let registry = registry_with(recorder.clone());

        let result = registry
            .call("notify_event", &json!({"run_id": "r1", "event": "bogus", "message": "m"}))
            .await;
        assert!(result.is_error);
        assert_eq!(result.first_text(), "invalid event type: bogus");
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_success_report() {
        let recorder = Arc::new(Recorder::default());
        let registry = registry_with(recorder.clone());

        let result = registry
            .call("notify_send", &json!({"title": "Build", "content": "green"}))
            .await;
        assert!(!result.is_error);
        let body = body(&result);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "notification delivered");
        assert_eq!(body["channels_count"], 1);
        assert_eq!(body["errors"], json!({}));
        assert_eq!(
            recorder.sent.lock().unwrap().as_slice(),
            &[("Build".to_string(), "green".to_string())]
        );
    }

    #[tokio::test]
    async fn test_event_with_no_channels() {
        let result = empty_registry()
            .call(
                "notify_event",
                &json!({
                    "run_id": "r1",
                    "event": "end",
                    "message": "done",
                    "data": {"progress": 1},
                    "timestamp": "2025-01-01T00:00:00Z"
                }),
            )
            .await;
        assert!(result.is_error);
        let body = body(&result);
        assert_eq!(body["status"], "error");
        assert_eq!(body["run_id"], "r1");
        assert_eq!(body["event"], "end");
        assert_eq!(body["message"], "event not fully delivered");
        assert_eq!(body["timestamp"], "2025-01-01T00:00:00Z");
        assert_eq!(body["channels_count"], 0);
        assert_eq!(body["errors"]["config"], "no notification channels configured");
    }

    #[tokio::test]
    async fn test_event_flattens_for_senders() {
        let recorder = Arc::new(Recorder::default());
        let registry = registry_with(recorder.clone());

        let result = registry
            .call(
                "notify.event",
                &json!({"run_id": "r1", "event": "end", "message": "done", "data": {"progress": 1}}),
            )
            .await;
        assert!(!result.is_error);
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent[0].0, "[END] r1");
        assert!(sent[0].1.starts_with("done\n\n**Additional data:**"));
    }

    #[tokio::test]
    async fn test_unavailable_channels() {
        let mut config = crate::config::Config::default();
        config.channels.push(crate::channels::ChannelConfig::named(
            "a",
            crate::channels::ChannelKind::Console,
        ));
        config.channels.push(crate::channels::ChannelConfig::named(
            "a",
            crate::channels::ChannelKind::Console,
        ));
        let registry = ToolRegistry::new(Arc::new(Broadcaster::from_config(&config)));

        let result = registry
            .call("notify_send", &json!({"title": "t", "content": "c"}))
            .await;
        assert!(result.is_error);
        assert_eq!(
            result.first_text(),
            "failed to load notification channels: duplicate channel name: a"
        );
    }
}
