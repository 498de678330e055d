//! Hugging Face Inference API client for the zero-shot-classification and summarization pipelines.

use super::{Classification, ModelError, Summarizer, ZeroShotClassifier};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";
const DEFAULT_CLASSIFIER_MODEL: &str = "facebook/bart-large-mnli";
const DEFAULT_SUMMARIZER_MODEL: &str = "facebook/bart-large-cnn";

/// Client for hosted inference pipelines. One client serves both tasks.
#[derive(Clone)]
pub struct HuggingFaceClient {
    base_url: String,
    token: Option<String>,
    classifier_model: String,
    summarizer_model: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ScoredLabel {
    label: String,
    score: f64,
}

/// Zero-shot responses come either as parallel arrays or as a list of label/score pairs.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ZeroShotResponse {
    Ranked {
        labels: Vec<String>,
        scores: Vec<f64>,
    },
    Batched(Vec<ZeroShotResponse>),
    Pairs(Vec<ScoredLabel>),
}

#[derive(Debug, Deserialize)]
struct SummaryItem {
    summary_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SummaryResponse {
    List(Vec<SummaryItem>),
    Single(SummaryItem),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl HuggingFaceClient {
    pub fn new(
        base_url: Option<String>,
        token: Option<String>,
        classifier_model: Option<String>,
        summarizer_model: Option<String>,
    ) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            token,
            classifier_model: classifier_model.unwrap_or_else(|| DEFAULT_CLASSIFIER_MODEL.to_string()),
            summarizer_model: summarizer_model.unwrap_or_else(|| DEFAULT_SUMMARIZER_MODEL.to_string()),
            client: reqwest::Client::new(),
        }
    }

    /// POST /models/{model}. `wait_for_model` makes the API block while a cold model loads.
    async fn run(&self, model: &str, mut body: Value) -> Result<Value, ModelError> {
        let url = format!("{}/models/{}", self.base_url, model);
        body["options"] = serde_json::json!({ "wait_for_model": true });
        let mut req = self.client.post(&url).json(&body);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&text)
                .map(|e| e.error)
                .unwrap_or(text);
            return Err(ModelError::Api(format!("{} {}: {}", model, status, detail)));
        }
        Ok(res.json().await?)
    }
}

fn parse_zero_shot(value: Value) -> Result<Classification, ModelError> {
    let parsed: ZeroShotResponse =
        serde_json::from_value(value).map_err(|e| ModelError::Response(e.to_string()))?;
    let mut classification = flatten_zero_shot(parsed)?;
    // Pairs are not guaranteed to arrive sorted.
    let mut ranked: Vec<(String, f64)> = classification
        .labels
        .drain(..)
        .zip(classification.scores.drain(..))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let (labels, scores) = ranked.into_iter().unzip();
    Ok(Classification { labels, scores })
}

fn flatten_zero_shot(parsed: ZeroShotResponse) -> Result<Classification, ModelError> {
    match parsed {
        ZeroShotResponse::Ranked { labels, scores } => {
            if labels.len() != scores.len() {
                return Err(ModelError::Response(format!(
                    "{} labels but {} scores",
                    labels.len(),
                    scores.len()
                )));
            }
            Ok(Classification { labels, scores })
        }
        ZeroShotResponse::Pairs(pairs) => Ok(Classification {
            labels: pairs.iter().map(|p| p.label.clone()).collect(),
            scores: pairs.iter().map(|p| p.score).collect(),
        }),
        ZeroShotResponse::Batched(mut items) => {
            if items.is_empty() {
                return Err(ModelError::Response("empty zero-shot response".to_string()));
            }
            flatten_zero_shot(items.swap_remove(0))
        }
    }
}

fn parse_summary(value: Value) -> Result<String, ModelError> {
    let parsed: SummaryResponse =
        serde_json::from_value(value).map_err(|e| ModelError::Response(e.to_string()))?;
    match parsed {
        SummaryResponse::Single(item) => Ok(item.summary_text),
        SummaryResponse::List(items) => items
            .into_iter()
            .next()
            .map(|i| i.summary_text)
            .ok_or_else(|| ModelError::Response("empty summarization response".to_string())),
    }
}

#[async_trait]
impl ZeroShotClassifier for HuggingFaceClient {
    async fn classify(&self, text: &str, labels: &[String]) -> Result<Classification, ModelError> {
        let body = serde_json::json!({
            "inputs": text,
            "parameters": { "candidate_labels": labels, "multi_label": false }
        });
        let value = self.run(&self.classifier_model, body).await?;
        let classification = parse_zero_shot(value)?;
        if classification.labels.is_empty() {
            return Err(ModelError::Response("no labels returned".to_string()));
        }
        Ok(classification)
    }

    async fn warm_up(&self) -> Result<(), ModelError> {
        log::info!("loading {} (cold start may take a while)", self.classifier_model);
        self.classify("warm up", &["ready".to_string()]).await.map(|_| ())
    }
}

#[async_trait]
impl Summarizer for HuggingFaceClient {
    async fn summarize(&self, text: &str) -> Result<String, ModelError> {
        let value = self
            .run(&self.summarizer_model, serde_json::json!({ "inputs": text }))
            .await?;
        parse_summary(value)
    }

    async fn warm_up(&self) -> Result<(), ModelError> {
        log::info!("loading {} (cold start may take a while)", self.summarizer_model);
        self.summarize("The model is warming up before the first request.")
            .await
            .map(|_| ())
    }
}
