//! Request/response protocol.
//!
//! Messages are JSON objects with a `method`, optional `params` and an
//! optional `id`. A message carrying `id` or a `jsonrpc` tag is answered in
//! JSON-RPC 2.0 shape; anything else is a legacy bare message answered with
//! the result object itself.

mod prompts;
mod server;

pub use prompts::{DEFAULT_PROMPT_TEXT, PROMPT_NAME, PromptStore};
pub use server::NotifyServer;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::tools::ToolName;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ── Methods ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Initialize,
    /// `initialized` or `notifications/initialized`
    Initialized,
    ToolsList,
    PromptsList,
    PromptsGet,
    ToolsCall,
    /// `notify.send` / `notify.event` invoked directly as a method
    Direct(ToolName),
    Unknown(String),
}

impl Method {
    pub fn parse(name: &str) -> Self {
        match name {
            "initialize" => Self::Initialize,
            "initialized" | "notifications/initialized" => Self::Initialized,
            "tools/list" => Self::ToolsList,
            "prompts/list" => Self::PromptsList,
            "prompts/get" => Self::PromptsGet,
            "tools/call" => Self::ToolsCall,
            "notify.send" => Self::Direct(ToolName::Send),
            "notify.event" => Self::Direct(ToolName::Event),
            other => Self::Unknown(other.to_string()),
        }
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

impl ErrorCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid Request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
        }
    }
}

/// An error object as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, detail: impl std::fmt::Display) -> Self {
        Self {
            code: code.code(),
            message: format!("{}: {}", code.message(), detail),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "code": self.code, "message": self.message })
    }
}

// ── Envelope ────────────────────────────────────────────────────────────────

/// Which response shape a message expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Legacy: the reply is the result object (or `{error}`) itself
    Bare,
    /// `{jsonrpc: "2.0", id, result | error}`
    JsonRpc,
}

/// A decoded request or notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub method: Method,
    pub id: Option<Value>,
    pub params: Map<String, Value>,
    pub dialect: Dialect,
}

impl Envelope {
    /// JSON-RPC messages without an id never get a response.
    pub fn is_notification(&self) -> bool {
        self.dialect == Dialect::JsonRpc && self.id.is_none()
    }
}

/// A message that could not be turned into an [`Envelope`], with enough
/// context left to answer it.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub id: Option<Value>,
    pub dialect: Dialect,
    pub notification: bool,
    pub error: RpcError,
}

impl Envelope {
    pub fn from_value(value: Value) -> Result<Self, Rejected> {
        let Value::Object(mut obj) = value else {
            return Err(Rejected {
                id: None,
                dialect: Dialect::JsonRpc,
                notification: false,
                error: RpcError::new(ErrorCode::InvalidRequest, "message must be a JSON object"),
            });
        };

        let dialect = if obj.contains_key("id") || obj.contains_key("jsonrpc") {
            Dialect::JsonRpc
        } else {
            Dialect::Bare
        };
        let id = obj.remove("id").filter(|v| !v.is_null());
        let reject = |id: Option<Value>, detail: &str, code: ErrorCode| Rejected {
            notification: dialect == Dialect::JsonRpc && id.is_none(),
            id,
            dialect,
            error: RpcError::new(code, detail),
        };

        if let Some(bad) = id.as_ref().filter(|v| !(v.is_string() || v.is_number())) {
            tracing::debug!(id = %bad, "Rejecting request id");
            return Err(reject(None, "id must be a string or number", ErrorCode::InvalidRequest));
        }

        let method = match obj.get("method").and_then(Value::as_str) {
            Some(m) => Method::parse(m),
            None => return Err(reject(id, "missing method", ErrorCode::InvalidRequest)),
        };

        let params = match obj.remove("params") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(reject(id, "params must be an object", ErrorCode::InvalidParams)),
        };

        Ok(Self {
            method,
            id,
            params,
            dialect,
        })
    }
}

// ── Replies ─────────────────────────────────────────────────────────────────

/// A response ready for the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub payload: Value,
    /// Encode with the transport's fallback mode instead of the request's
    pub fallback: bool,
}

/// Shape `outcome` for `dialect`.
pub fn reply(dialect: Dialect, id: Option<&Value>, outcome: Result<Value, RpcError>) -> Value {
    match (dialect, outcome) {
        (Dialect::Bare, Ok(result)) => result,
        (Dialect::Bare, Err(error)) => json!({ "error": error.to_json() }),
        (Dialect::JsonRpc, Ok(result)) => json!({
            "jsonrpc": "2.0",
            "id": id.cloned().unwrap_or(Value::Null),
            "result": result,
        }),
        (Dialect::JsonRpc, Err(error)) => json!({
            "jsonrpc": "2.0",
            "id": id.cloned().unwrap_or(Value::Null),
            "error": error.to_json(),
        }),
    }
}

/// The reply to an undecodable message, sent in the fallback encoding.
pub fn parse_error(detail: impl std::fmt::Display) -> Outbound {
    Outbound {
        payload: reply(
            Dialect::JsonRpc,
            None,
            Err(RpcError::new(ErrorCode::ParseError, detail)),
        ),
        fallback: true,
    }
}
