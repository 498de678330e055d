//! Slack Web API client: post/update messages, open modals, open Socket Mode connections.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("slack request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("slack api error: {0}")]
    Api(String),
}

/// Where a posted message landed. `channel` is the conversation id Slack resolved
/// (a `D…` id when the post targeted a user), which `chat.update` requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

/// Outbound calls the bot makes. Implemented by [`SlackClient`]; tests substitute a recorder.
#[async_trait]
pub trait SlackApi: Send + Sync {
    /// Bot token, also used as the bearer credential for private file downloads.
    fn bot_token(&self) -> &str;

    /// chat.postMessage. Returns the conversation and `ts` of the new message.
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
        blocks: Option<Value>,
    ) -> Result<PostedMessage, SlackError>;

    /// chat.update on the message identified by `ts`.
    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
        blocks: Option<Value>,
    ) -> Result<(), SlackError>;

    /// views.open with the given view payload.
    async fn open_view(&self, trigger_id: &str, view: Value) -> Result<(), SlackError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Slack Web API client authenticated with the bot token.
#[derive(Clone)]
pub struct SlackClient {
    api_base: String,
    bot_token: String,
    client: reqwest::Client,
}

impl SlackClient {
    pub fn new(api_base: &str, bot_token: String) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, token: &str, body: &Value) -> Result<ApiResponse, SlackError> {
        let url = format!("{}/{}", self.api_base, method);
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SlackError::Api(format!("{} failed: {} {}", method, status, body)));
        }
        let data: ApiResponse = res.json().await?;
        if !data.ok {
            let error = data.error.unwrap_or_else(|| "unknown_error".to_string());
            return Err(SlackError::Api(format!("{}: {}", method, error)));
        }
        Ok(data)
    }

    /// apps.connections.open with the app-level token. Returns the WebSocket URL for Socket Mode.
    pub async fn open_socket_url(&self, app_token: &str) -> Result<String, SlackError> {
        let data = self
            .call("apps.connections.open", app_token, &serde_json::json!({}))
            .await?;
        data.url
            .ok_or_else(|| SlackError::Api("apps.connections.open: missing url".to_string()))
    }
}

#[async_trait]
impl SlackApi for SlackClient {
    fn bot_token(&self) -> &str {
        &self.bot_token
    }

    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
        blocks: Option<Value>,
    ) -> Result<PostedMessage, SlackError> {
        let mut body = serde_json::json!({ "channel": channel, "text": text });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = Value::String(ts.to_string());
        }
        if let Some(b) = blocks {
            body["blocks"] = b;
        }
        let data = self.call("chat.postMessage", &self.bot_token, &body).await?;
        let (Some(posted_channel), Some(ts)) = (data.channel, data.ts) else {
            return Err(SlackError::Api(
                "chat.postMessage: missing channel or ts".to_string(),
            ));
        };
        log::debug!("slack: posted message {} to {}", ts, posted_channel);
        Ok(PostedMessage {
            channel: posted_channel,
            ts,
        })
    }

    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
        blocks: Option<Value>,
    ) -> Result<(), SlackError> {
        let mut body = serde_json::json!({ "channel": channel, "ts": ts, "text": text });
        if let Some(b) = blocks {
            body["blocks"] = b;
        }
        self.call("chat.update", &self.bot_token, &body).await?;
        log::debug!("slack: updated message {} in {}", ts, channel);
        Ok(())
    }

    async fn open_view(&self, trigger_id: &str, view: Value) -> Result<(), SlackError> {
        let body = serde_json::json!({ "trigger_id": trigger_id, "view": view });
        self.call("views.open", &self.bot_token, &body).await?;
        Ok(())
    }
}
