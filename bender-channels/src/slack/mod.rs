//! Slack adapter for the relay.
//!
//! Web API calls (`auth.test`, `chat.postMessage`, `apps.connections.open`)
//! go through [`SlackClient`]. Inbound events arrive over Socket Mode, see
//! [`socket::SocketModeListener`].

pub mod format;
pub mod socket;

use crate::traits::{ChannelError, ChannelResult, ChatPoster};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Default Slack Web API base URL.
pub const SLACK_API_BASE: &str = "https://slack.com/api";

/// A Slack event payload (`app_mention` or `message`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

/// Slack Web API client authenticated with the bot token.
#[derive(Debug, Clone)]
pub struct SlackClient {
    client: Client,
    base_url: String,
    bot_token: String,
}

impl SlackClient {
    /// Create a client for the public Slack API.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: SLACK_API_BASE.to_string(),
            bot_token: bot_token.into(),
        }
    }

    /// Point the client at a different API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Verify the bot token and return the bot's own user ID.
    pub async fn auth_test(&self) -> ChannelResult<String> {
        let data = self
            .call("auth.test", &self.bot_token, None, ChannelError::Auth)
            .await?;

        data.get("user_id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ChannelError::Auth("auth.test response has no user_id".into()))
    }

    /// Request a Socket Mode WebSocket URL using the app-level token.
    pub async fn open_socket_url(&self, app_token: &str) -> ChannelResult<String> {
        let data = self
            .call("apps.connections.open", app_token, None, ChannelError::Connection)
            .await?;

        data.get("url")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ChannelError::Connection("apps.connections.open returned no url".into()))
    }

    /// POST a Web API method and unwrap Slack's `{"ok": ...}` envelope.
    async fn call(
        &self,
        method: &str,
        token: &str,
        body: Option<&Value>,
        fail: fn(String) -> ChannelError,
    ) -> ChannelResult<Value> {
        let mut request = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| fail(format!("Slack {method} request error: {e}")))?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            return Err(ChannelError::RateLimited { retry_after_secs });
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let error = resp.text().await.unwrap_or_default();
            return Err(fail(format!("Slack API error ({status}): {error}")));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Internal(format!("Failed to parse {method} response: {e}")))?;

        if !data.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let error = data
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return Err(fail(format!("Slack {method} failed: {error}")));
        }

        Ok(data)
    }
}

#[async_trait]
impl ChatPoster for SlackClient {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> ChannelResult<String> {
        let mut body = json!({
            "channel": channel,
            "text": text,
        });
        if let Some(thread_ts) = thread_ts {
            body["thread_ts"] = json!(thread_ts);
        }

        let data = self
            .call("chat.postMessage", &self.bot_token, Some(&body), ChannelError::SendFailed)
            .await?;

        let ts = data
            .get("ts")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::SendFailed("chat.postMessage returned no ts".into()))?
            .to_string();

        tracing::debug!(channel = %channel, ts = %ts, thread_ts = ?thread_ts, "Slack message posted");
        Ok(ts)
    }
}
