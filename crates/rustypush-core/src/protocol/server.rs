use futures_util::FutureExt;
use serde_json::{Map, Value, json};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::{
    Envelope, ErrorCode, Method, Outbound, PROTOCOL_VERSION, PromptStore, RpcError,
    parse_error, reply,
};
use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::tools::{ToolError, ToolRegistry};

/// Routes decoded messages to their handlers and shapes the replies.
///
/// Shared by every transport; holds no per-connection state.
pub struct NotifyServer {
    name: String,
    version: String,
    tools: ToolRegistry,
    prompts: PromptStore,
}

impl NotifyServer {
    pub fn new(name: impl Into<String>, tools: ToolRegistry, prompts: PromptStore) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tools,
            prompts,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let broadcaster = Arc::new(Broadcaster::from_config(config));
        Self::new(
            config.server.name.clone(),
            ToolRegistry::new(broadcaster),
            PromptStore::load(config.server.prompt_file.as_deref()),
        )
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        self.tools.broadcaster()
    }

    /// Handle one raw message body. `None` means nothing is written back.
    pub async fn handle(&self, body: &[u8]) -> Option<Outbound> {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => self.handle_value(value).await,
            Err(e) => {
                debug!(error = %e, "Undecodable message");
                Some(parse_error(e))
            }
        }
    }

    pub async fn handle_value(&self, value: Value) -> Option<Outbound> {
        let envelope = match Envelope::from_value(value) {
            Ok(envelope) => envelope,
            Err(rejected) => {
                debug!(error = %rejected.error.message, "Rejected message");
                if rejected.notification {
                    return None;
                }
                return Some(Outbound {
                    payload: reply(rejected.dialect, rejected.id.as_ref(), Err(rejected.error)),
                    fallback: false,
                });
            }
        };

        if envelope.method == Method::Initialized {
            debug!("Client initialized");
            return None;
        }

        let outcome = guarded(self.dispatch(&envelope)).await;

        if envelope.is_notification() {
            if let Err(e) = &outcome {
                debug!(method = ?envelope.method, error = %e.message, "Dropping error for notification");
            }
            return None;
        }

        Some(Outbound {
            payload: reply(envelope.dialect, envelope.id.as_ref(), outcome),
            fallback: false,
        })
    }

    async fn dispatch(&self, envelope: &Envelope) -> Result<Value, RpcError> {
        debug!(method = ?envelope.method, dialect = ?envelope.dialect, "Dispatching");
        let params = &envelope.params;

        match &envelope.method {
            Method::Initialize => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {}, "prompts": {} },
                "serverInfo": { "name": self.name, "version": self.version },
            })),
            // Answered (with silence) before dispatch
            Method::Initialized => Ok(Value::Null),
            Method::ToolsList => Ok(self.tools.list()),
            Method::PromptsList => Ok(self.prompts.list()),
            Method::PromptsGet => Ok(self.prompts.get(params.get("name").and_then(Value::as_str))),
            Method::ToolsCall => {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RpcError::new(ErrorCode::InvalidParams, "missing tool name"))?;
                let arguments = params
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new()));
                Ok(self.tools.call(name, &arguments).await.to_json())
            }
            Method::Direct(tool) => match self.tools.run(*tool, params).await {
                Ok(report) => Ok(report.body),
                Err(ToolError::Invalid(reason)) => Err(RpcError::new(ErrorCode::InvalidParams, reason)),
                Err(ToolError::Unavailable(reason)) => {
                    Err(RpcError::new(ErrorCode::InternalError, reason))
                }
            },
            Method::Unknown(name) => {
                warn!(method = %name, "Method not found");
                Err(RpcError::new(ErrorCode::MethodNotFound, name))
            }
        }
    }
}

/// Run a handler, turning a panic into an internal error.
async fn guarded<F>(handler: F) -> Result<Value, RpcError>
where
    F: Future<Output = Result<Value, RpcError>>,
{
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            error!(panic = %detail, "Handler panicked");
            Err(RpcError::new(ErrorCode::InternalError, detail))
        }
    }
}
