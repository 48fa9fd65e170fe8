//! Chat backend client and transcript.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::base_url;
use super::traits::ChatApi;
use crate::error::{CoreError, Result};
use crate::plan::{parse_summary, PlanSummary};

/// First assistant turn of every conversation.
pub const GREETING: &str = "Hi, I'm your calm breathing companion. How was your day?";

/// Shown when the backend answers with an empty reply.
pub const FALLBACK_REPLY: &str = "Sorry, I could not respond.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The whole transcript, greeting included, in the order it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<ChatMessage>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// A conversation opened with the assistant's greeting.
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage::new(Role::Assistant, GREETING)],
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(role, content));
    }

    pub fn user_turns(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    /// The last `limit` turns as plain text, greeting left out.
    pub fn transcript(&self, limit: usize) -> Vec<String> {
        let opened_with_greeting = self
            .messages
            .first()
            .is_some_and(|m| m.role == Role::Assistant && m.content == GREETING);
        let turns = &self.messages[usize::from(opened_with_greeting)..];
        turns[turns.len().saturating_sub(limit)..]
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }
}

/// Response of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub reply: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<serde_json::Value>,
}

/// Add the user's `text` to the conversation, send it, and record the reply.
///
/// On failure the user turn stays in the transcript so a retry resends it.
pub async fn send_turn<A: ChatApi>(
    api: &A,
    conversation: &mut Conversation,
    text: &str,
) -> Result<ChatReply> {
    conversation.push(Role::User, text.trim());
    let mut reply = api.send(conversation).await?;
    if reply.reply.trim().is_empty() {
        reply.reply = FALLBACK_REPLY.to_string();
    }
    conversation.push(Role::Assistant, reply.reply.clone());
    Ok(reply)
}

/// HTTP client for the chat backend.
#[derive(Debug, Clone)]
pub struct ChatClient {
    base_url: Url,
    http_client: Client,
}

impl ChatClient {
    pub fn new(base: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url(base)?,
            http_client: Client::new(),
        })
    }

    pub fn with_timeout(base: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::ChatFailed(e.to_string()))?;
        Ok(Self {
            base_url: base_url(base)?,
            http_client,
        })
    }
}

impl ChatApi for ChatClient {
    async fn send(&self, conversation: &Conversation) -> Result<ChatReply> {
        let url = self.base_url.join("api/chat")?;
        tracing::debug!(%url, turns = conversation.messages.len(), "sending chat turn");
        let resp = self
            .http_client
            .post(url)
            .json(conversation)
            .send()
            .await
            .map_err(|e| CoreError::ChatFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CoreError::ChatFailed(format!(
                "chat backend error (HTTP {status}): {text}"
            )));
        }

        let reply: ChatReply = resp
            .json()
            .await
            .map_err(|e| CoreError::ChatFailed(format!("malformed reply: {e}")))?;
        if let Some(model) = &reply.model {
            tracing::debug!(model = %model, "chat reply received");
        }
        Ok(reply)
    }

    async fn summarize(&self, lines: &[String]) -> Result<PlanSummary> {
        let url = self.base_url.join("api/chatbot")?;
        tracing::debug!(%url, lines = lines.len(), "requesting plan summary");
        let resp = self
            .http_client
            .post(url)
            .json(&serde_json::json!({ "messages": lines }))
            .send()
            .await
            .map_err(|e| CoreError::ChatFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CoreError::ChatFailed(format!(
                "chat backend error (HTTP {status}): {text}"
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CoreError::ChatFailed(format!("malformed summary: {e}")))?;
        parse_summary(&body)
    }
}
