//! Console channel: prints notifications to stderr.
//!
//! Stdout carries protocol frames, so this channel must never write there.

use anyhow::Result;
use async_trait::async_trait;
use std::io::Write;

use super::ChannelSender;

pub struct ConsoleChannel {
    name: String,
}

impl ConsoleChannel {
    pub fn new(name: String) -> Self {
        Self { name }
    }

    fn render(title: &str, content: &str) -> String {
        format!("── {} ──\n{}\n", title, content)
    }
}

#[async_trait]
impl ChannelSender for ConsoleChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "console"
    }

    async fn send(&self, title: &str, content: &str) -> Result<()> {
        let text = Self::render(title, content);
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(text.as_bytes())?;
        stderr.flush()?;
        Ok(())
    }
}
