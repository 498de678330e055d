//! Integration test: Hugging Face and Ollama backends against local axum stand-ins,
//! including the one-time `Models::init` warm-up.

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use lib::config::{Config, ModelBackend};
use lib::models::{ModelError, Models};
use serde_json::{json, Value};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

async fn fake_hf(Path((owner, name)): Path<(String, String)>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    assert_eq!(body["options"]["wait_for_model"], true);
    match (owner.as_str(), name.as_str()) {
        ("facebook", "bart-large-mnli") => {
            let labels = body["parameters"]["candidate_labels"].as_array().cloned().unwrap_or_default();
            // Rank the last candidate highest, as label/score pairs in arbitrary order.
            let n = labels.len();
            let pairs: Vec<Value> = labels
                .into_iter()
                .enumerate()
                .map(|(i, l)| json!({ "label": l, "score": (i + 1) as f64 / n as f64 }))
                .collect();
            (StatusCode::OK, Json(Value::Array(pairs)))
        }
        ("facebook", "bart-large-cnn") => {
            let words = body["inputs"].as_str().unwrap_or("").split_whitespace().count();
            (StatusCode::OK, Json(json!([{ "summary_text": format!("{} words summarized.", words) }])))
        }
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Model {}/{} does not exist", owner, name) })),
        ),
    }
}

fn hf_config(base: &str) -> Config {
    let mut config = Config::default();
    config.models.backend = ModelBackend::HuggingFace;
    config.models.base_url = Some(base.to_string());
    config.models.categories = vec!["Communication".to_string(), "Teamwork".to_string()];
    config
}

#[tokio::test]
async fn huggingface_init_classify_and_summarize() {
    let base = serve(Router::new().route("/models/:owner/:name", post(fake_hf))).await;
    let config = hf_config(&base);
    let models = Models::init(&config).await.expect("warm up succeeds");

    let c = models
        .classifier
        .classify("Ran the weekly sync", &models.categories)
        .await
        .expect("classify");
    assert_eq!(c.top_label(), Some("Teamwork"));

    let summary = models
        .summarizer
        .summarize("one two three four")
        .await
        .expect("summarize");
    assert_eq!(summary, "4 words summarized.");
}

#[tokio::test]
async fn huggingface_unknown_model_surfaces_api_error() {
    let base = serve(Router::new().route("/models/:owner/:name", post(fake_hf))).await;
    let mut config = hf_config(&base);
    config.models.classifier_model = Some("nobody/missing".to_string());
    let err = Models::init(&config).await.err().expect("init must fail");
    assert!(matches!(err, ModelError::Api(ref m) if m.contains("does not exist")), "{:?}", err);
}

async fn fake_ollama_tags() -> Json<Value> {
    Json(json!({ "models": [{ "name": "llama3.2:latest", "size": 1 }] }))
}

async fn fake_ollama_chat(Json(body): Json<Value>) -> Json<Value> {
    assert_eq!(body["stream"], false);
    let system = body["messages"][0]["content"].as_str().unwrap_or("");
    let reply = if system.contains("categorize") {
        "Teamwork."
    } else {
        "  A short summary.  "
    };
    Json(json!({ "message": { "role": "assistant", "content": reply }, "done": true }))
}

#[tokio::test]
async fn ollama_backend_maps_reply_to_label() {
    let base = serve(
        Router::new()
            .route("/api/tags", get(fake_ollama_tags))
            .route("/api/chat", post(fake_ollama_chat)),
    )
    .await;
    let mut config = Config::default();
    config.models.backend = ModelBackend::Ollama;
    config.models.base_url = Some(base);

    let models = Models::init(&config).await.expect("model is listed");
    let c = models
        .classifier
        .classify("Paired with design on onboarding", &models.categories)
        .await
        .expect("classify");
    assert_eq!(c.top_label(), Some("Teamwork"));
    let summary = models.summarizer.summarize("long text").await.expect("summarize");
    assert_eq!(summary, "A short summary.");
}

#[tokio::test]
async fn ollama_missing_model_fails_init() {
    let base = serve(Router::new().route("/api/tags", get(fake_ollama_tags))).await;
    let mut config = Config::default();
    config.models.backend = ModelBackend::Ollama;
    config.models.base_url = Some(base);
    config.models.classifier_model = Some("qwen3:8b".to_string());
    let err = Models::init(&config).await.err().expect("init must fail");
    assert!(matches!(err, ModelError::Api(ref m) if m.contains("qwen3:8b")));
}
