use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::normalize::normalize_label;
use super::types::{ClassifierLabel, ClassifierOutcome, ClassifierRequest};

/// Injectable classifier collaborator (spec §4.4, §9 orchestration shape).
/// All transport, parse, and coercion failures become `ClassifierOutcome::Error`
/// — the caller must never treat them as a Rust-level error (spec §4.4).
#[async_trait]
pub trait LlmClassifier: Send + Sync {
    async fn classify(&self, request: &ClassifierRequest) -> ClassifierOutcome;
}

/// JSON request body sent to the external model (temperature 0, JSON
/// response format, enum-restricted label — spec §4.4).
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct RawLabel {
    label: String,
    confidence: serde_json::Value,
    reason: Option<String>,
    #[serde(rename = "projectId")]
    project_id: Option<String>,
}

/// `reqwest`-backed classifier adapter. Async (unlike the teacher's
/// `reqwest::blocking`-based `OllamaClient`) because the spec's cooperative-
/// suspension/timeout requirement needs every I/O boundary to `.await`
/// (spec §5).
pub struct HttpClassifier {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP classifier client");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        }
    }

    fn prompt(request: &ClassifierRequest) -> String {
        let mut lines = vec![
            format!("Subject: {}", request.subject),
            format!("Snippet: {}", request.snippet),
        ];
        if let Some(sender) = &request.sender {
            lines.push(format!("Sender: {sender}"));
        }
        if !request.label_ids.is_empty() {
            lines.push(format!("Labels: {}", request.label_ids.join(", ")));
        }
        for (key, value) in &request.headers {
            lines.push(format!("{key}: {value}"));
        }
        lines.push(format!("Body: {}", request.body));
        lines.join("\n")
    }
}

#[async_trait]
impl LlmClassifier for HttpClassifier {
    async fn classify(&self, request: &ClassifierRequest) -> ClassifierOutcome {
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            response_format: ResponseFormat { r#type: "json_object" },
            messages: vec![ChatMessage {
                role: "user",
                content: Self::prompt(request),
            }],
        };

        let response = match self
            .client
            .post(format!("{}/classify", self.base_url))
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return ClassifierOutcome::Error {
                    message: e.to_string(),
                    project_id: None,
                }
            }
        };

        if !response.status().is_success() {
            return ClassifierOutcome::Error {
                message: format!("classifier returned status {}", response.status()),
                project_id: None,
            };
        }

        let raw: RawLabel = match response.json().await {
            Ok(r) => r,
            Err(e) => {
                return ClassifierOutcome::Error {
                    message: format!("malformed classifier response: {e}"),
                    project_id: None,
                }
            }
        };

        let confidence = raw
            .confidence
            .as_f64()
            .or_else(|| raw.confidence.as_str().and_then(|s| s.parse().ok()))
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        match normalize_label(&raw.label) {
            Some(label) => ClassifierOutcome::Label(ClassifierLabel {
                label,
                confidence,
                reason: raw.reason,
                project_id: raw.project_id,
            }),
            None => ClassifierOutcome::Error {
                message: format!("unrecognized label: {}", raw.label),
                project_id: raw.project_id,
            },
        }
    }
}

#[async_trait]
impl LlmClassifier for std::sync::Arc<dyn LlmClassifier> {
    async fn classify(&self, request: &ClassifierRequest) -> ClassifierOutcome {
        (**self).classify(request).await
    }
}

/// Test fake returning a fixed outcome, mirroring the teacher's
/// `MockLlmClient` fixed-response fake.
pub struct FixedClassifier(pub ClassifierOutcome);

#[async_trait]
impl LlmClassifier for FixedClassifier {
    async fn classify(&self, _request: &ClassifierRequest) -> ClassifierOutcome {
        self.0.clone()
    }
}
