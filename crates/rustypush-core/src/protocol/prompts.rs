use serde_json::{Value, json};
use std::path::Path;
use tracing::debug;

pub const PROMPT_NAME: &str = "rustypush-guidelines";

pub const DEFAULT_PROMPT_TEXT: &str =
    "Use rustypush only for task completion (>60s) or when user confirmation is needed.";

/// The single guidance prompt served through `prompts/list` and `prompts/get`.
#[derive(Debug, Clone)]
pub struct PromptStore {
    text: String,
}

impl Default for PromptStore {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_TEXT)
    }
}

impl PromptStore {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Read the prompt text from `path`, falling back to the built-in text
    /// when the file is missing, unreadable or blank.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => Self::new(text.trim()),
            Ok(_) => Self::default(),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Prompt file unavailable, using built-in text");
                Self::default()
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn list(&self) -> Value {
        json!({
            "prompts": [{
                "name": PROMPT_NAME,
                "title": "rustypush usage guidelines",
                "description": "When to notify via rustypush",
            }]
        })
    }

    /// Unknown names yield an error-tagged result, not a protocol error.
    pub fn get(&self, name: Option<&str>) -> Value {
        if name != Some(PROMPT_NAME) {
            return json!({
                "isError": true,
                "content": [{
                    "type": "text",
                    "text": format!("Unknown prompt: {}", name.unwrap_or("")),
                }],
            });
        }
        json!({
            "description": "Guidelines for when to send notifications via rustypush.",
            "messages": [{
                "role": "user",
                "content": [{ "type": "text", "text": self.text }],
            }],
        })
    }
}
