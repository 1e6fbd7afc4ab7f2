//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use rustypush_core::broadcast::{BroadcastConfig, Broadcaster};
use rustypush_core::channels::{ChannelSender, ChannelSet};
use rustypush_core::protocol::{NotifyServer, PromptStore};
use rustypush_core::tools::ToolRegistry;
use serde_json::Value;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

pub enum Behavior {
    Ok,
    Fail(&'static str),
    Sleep(Duration),
    Panic,
}

/// A scriptable channel that records what it was asked to send.
pub struct MockChannel {
    name: String,
    behavior: Behavior,
    pub sent: Mutex<Vec<(String, String)>>,
}

impl MockChannel {
    pub fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelSender for MockChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, title: &str, content: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), content.to_string()));
        match &self.behavior {
            Behavior::Ok => Ok(()),
            Behavior::Fail(reason) => Err(anyhow::anyhow!(*reason)),
            Behavior::Sleep(d) => {
                tokio::time::sleep(*d).await;
                Ok(())
            }
            Behavior::Panic => panic!("mock channel exploded"),
        }
    }
}

pub fn server_with(config: BroadcastConfig) -> Arc<NotifyServer> {
    let broadcaster = Arc::new(Broadcaster::new(config));
    Arc::new(NotifyServer::new(
        "rustypush-test",
        ToolRegistry::new(broadcaster),
        PromptStore::default(),
    ))
}

pub fn server_with_channels(channels: ChannelSet) -> Arc<NotifyServer> {
    server_with(BroadcastConfig::new(channels))
}

/// Parse the pretty JSON report inside a `tools/call` result.
pub fn tool_report(result: &Value) -> Value {
    let text = result["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

/// Wrap a body in a Content-Length frame.
pub fn framed(body: &str) -> Vec<u8> {
    let mut out = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    out.extend_from_slice(body.as_bytes());
    out
}
