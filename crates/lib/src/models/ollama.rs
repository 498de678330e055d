//! Ollama API client (http://127.0.0.1:11434 by default).
//! Classification and summarization are done by prompting a chat model.

use super::{Classification, ModelError, Summarizer, ZeroShotClassifier};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_MODEL: &str = "llama3.2:latest";

/// Client for Ollama HTTP API.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    classifier_model: String,
    summarizer_model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(
        base_url: Option<String>,
        classifier_model: Option<String>,
        summarizer_model: Option<String>,
    ) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            classifier_model: classifier_model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            summarizer_model: summarizer_model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client: reqwest::Client::new(),
        }
    }

    /// GET /api/tags: list available models.
    async fn list_models(&self) -> Result<Vec<OllamaModel>, ModelError> {
        let url = format!("{}/api/tags", self.base_url);
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{} {}", status, body)));
        }
        let data: TagsResponse = res.json().await?;
        Ok(data.models.unwrap_or_default())
    }

    /// POST /api/chat: non-streaming chat completion. Returns the assistant's text.
    async fn chat(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, ModelError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: model.to_string(),
            messages,
            stream: false,
        };
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{} {}", status, body)));
        }
        let data: ChatResponse = res.json().await?;
        Ok(data.message.map(|m| m.content).unwrap_or_default())
    }

    /// Fails unless `model` is listed by /api/tags.
    async fn ensure_model(&self, model: &str) -> Result<(), ModelError> {
        let models = self.list_models().await?;
        if models.iter().any(|m| m.name == model) {
            Ok(())
        } else {
            Err(ModelError::Api(format!(
                "model {} not found; pull it with `ollama pull {}`",
                model, model
            )))
        }
    }
}

fn classification_prompt(text: &str, labels: &[String]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You categorize short texts. Answer with exactly one category from this list and nothing else: {}.",
            labels.join(", ")
        )),
        ChatMessage::user(text),
    ]
}

fn summary_prompt(text: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "Summarize the user's text in two or three sentences. Reply with the summary only.",
        ),
        ChatMessage::user(text),
    ]
}

/// Rank candidates by how the reply names them: exact match first, then containment,
/// then the remaining labels in candidate order.
fn rank_labels(reply: &str, labels: &[String]) -> Classification {
    let reply = reply.trim().trim_matches(|c: char| c == '.' || c == '"' || c == '*').to_lowercase();
    let score = |label: &String| {
        let l = label.to_lowercase();
        if reply == l {
            1.0
        } else if reply.contains(&l) {
            0.5
        } else {
            0.0
        }
    };
    let mut ranked: Vec<(String, f64)> = labels.iter().map(|l| (l.clone(), score(l))).collect();
    // Stable sort keeps candidate order among equal scores.
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let (labels, scores) = ranked.into_iter().unzip();
    Classification { labels, scores }
}

#[async_trait]
impl ZeroShotClassifier for OllamaClient {
    async fn classify(&self, text: &str, labels: &[String]) -> Result<Classification, ModelError> {
        let reply = self
            .chat(&self.classifier_model, classification_prompt(text, labels))
            .await?;
        let ranked = rank_labels(&reply, labels);
        if ranked.scores.first().copied().unwrap_or(0.0) == 0.0 {
            return Err(ModelError::Response(format!(
                "reply did not name a category: {}",
                reply.trim()
            )));
        }
        Ok(ranked)
    }

    async fn warm_up(&self) -> Result<(), ModelError> {
        self.ensure_model(&self.classifier_model).await
    }
}

#[async_trait]
impl Summarizer for OllamaClient {
    async fn summarize(&self, text: &str) -> Result<String, ModelError> {
        let reply = self.chat(&self.summarizer_model, summary_prompt(text)).await?;
        Ok(reply.trim().to_string())
    }

    async fn warm_up(&self) -> Result<(), ModelError> {
        self.ensure_model(&self.summarizer_model).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Option<Vec<OllamaModel>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

impl ChatMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
}
