//! Zero-shot classification and summarization backends.
//!
//! Models are external services. [`Models::init`] builds the configured backend once and
//! waits for both models to answer before any request is accepted.

mod huggingface;
mod ollama;

pub use huggingface::HuggingFaceClient;
pub use ollama::OllamaClient;

use crate::config::{self, Config, ModelBackend};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("model api error: {0}")]
    Api(String),
    #[error("unexpected model response: {0}")]
    Response(String),
}

/// Candidate labels ranked best first, with scores when the backend reports them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub labels: Vec<String>,
    pub scores: Vec<f64>,
}

impl Classification {
    pub fn top_label(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }
}

#[async_trait]
pub trait ZeroShotClassifier: Send + Sync {
    /// Rank `labels` for `text`.
    async fn classify(&self, text: &str, labels: &[String]) -> Result<Classification, ModelError>;

    /// Readiness check run once at startup.
    async fn warm_up(&self) -> Result<(), ModelError> {
        Ok(())
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, ModelError>;

    async fn warm_up(&self) -> Result<(), ModelError> {
        Ok(())
    }
}

/// Initialized classifier, summarizer, and candidate labels shared by all requests.
#[derive(Clone)]
pub struct Models {
    pub classifier: Arc<dyn ZeroShotClassifier>,
    pub summarizer: Arc<dyn Summarizer>,
    pub categories: Vec<String>,
}

impl Models {
    pub fn new(
        classifier: Arc<dyn ZeroShotClassifier>,
        summarizer: Arc<dyn Summarizer>,
        categories: Vec<String>,
    ) -> Self {
        Self {
            classifier,
            summarizer,
            categories,
        }
    }

    /// Build the configured backend without contacting it.
    pub fn from_config(config: &Config) -> Self {
        let models = &config.models;
        let categories = if models.categories.is_empty() {
            config::default_categories()
        } else {
            models.categories.clone()
        };
        match models.backend {
            ModelBackend::HuggingFace => {
                let client = Arc::new(HuggingFaceClient::new(
                    models.base_url.clone(),
                    config::resolve_hf_token(config),
                    models.classifier_model.clone(),
                    models.summarizer_model.clone(),
                ));
                Self::new(client.clone(), client, categories)
            }
            ModelBackend::Ollama => {
                let client = Arc::new(OllamaClient::new(
                    models.base_url.clone(),
                    models.classifier_model.clone(),
                    models.summarizer_model.clone(),
                ));
                Self::new(client.clone(), client, categories)
            }
        }
    }

    /// Build the configured backend and wait until it answers. Call once at startup.
    pub async fn init(config: &Config) -> Result<Self, ModelError> {
        let started = std::time::Instant::now();
        let models = Self::from_config(config);
        models.classifier.warm_up().await?;
        models.summarizer.warm_up().await?;
        log::info!(
            "models ready ({:?} backend) in {:.1}s",
            config.models.backend,
            started.elapsed().as_secs_f64()
        );
        Ok(models)
    }
}
