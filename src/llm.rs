//! Chat backends and the model router.
//!
//! A [`ChatBackend`] turns prompt messages into text and reports the
//! result as a [`GenerationOutcome`] instead of an error, so the
//! [`LlmRouter`] can walk its priority list without treating failures as
//! control flow.
//!
//! Routing rules:
//! - The requested model name is checked against the allow-list (the
//!   names of the configured backends). Unknown names are silently
//!   mapped to the default model.
//! - Backends are tried in the order `[requested, default]`, skipping the
//!   duplicate when the request already names the default.
//! - If every backend fails, the caller gets [`RagError::Generation`]
//!   listing each backend's failure reason.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use docqa_core::prompt::{Message, Role};
use serde::{Deserialize, Serialize};

use crate::config::{LlmConfig, PrimaryLlmConfig, SecondaryLlmConfig};
use crate::error::{RagError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Success(String),
    Failure(String),
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Allow-list name this backend answers to (e.g. `"gemini2"`).
    fn name(&self) -> &str;

    async fn generate(&self, messages: &[Message]) -> GenerationOutcome;
}

fn describe_request_error(e: &reqwest::Error, timeout_secs: u64) -> String {
    if e.is_timeout() {
        format!("request timed out after {}s", timeout_secs)
    } else {
        format!("request failed: {}", e)
    }
}

// ============ Gemini ============

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Hosted chat completion through Gemini's `generateContent`.
///
/// The API key is read from `GEMINI_API_KEY` at construction; a missing key
/// is reported as a failure on each call rather than at startup, so the
/// other backend stays usable.
pub struct GeminiChat {
    name: String,
    model: String,
    temperature: f32,
    timeout_secs: u64,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl GeminiChat {
    pub fn new(config: &PrimaryLlmConfig) -> anyhow::Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key: std::env::var("GEMINI_API_KEY").ok(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn build_request(&self, messages: &[Message]) -> GenerateRequest {
        let system: Vec<Part> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| Part {
                text: m.content.clone(),
            })
            .collect();
        let contents = messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
            .collect();

        GenerateRequest {
            system_instruction: (!system.is_empty()).then_some(SystemInstruction { parts: system }),
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[async_trait]
impl ChatBackend for GeminiChat {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, messages: &[Message]) -> GenerationOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return GenerationOutcome::Failure("GEMINI_API_KEY environment variable not set".into());
        };

        let response = match self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&self.build_request(messages))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return GenerationOutcome::Failure(describe_request_error(&e, self.timeout_secs)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return GenerationOutcome::Failure(format!("Gemini API error {}: {}", status, body));
        }

        match response.json::<GenerateResponse>().await {
            Ok(parsed) => parse_gemini_text(parsed),
            Err(e) => GenerationOutcome::Failure(format!("Failed to parse Gemini response: {}", e)),
        }
    }
}

fn parse_gemini_text(response: GenerateResponse) -> GenerationOutcome {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();
    if text.is_empty() {
        GenerationOutcome::Failure("No text in Gemini response".into())
    } else {
        GenerationOutcome::Success(text)
    }
}

// ============ Text Generation Inference ============

/// Self-hosted HuggingFace text-generation-inference endpoint (`POST /generate`).
pub struct TextGenInference {
    name: String,
    url: String,
    max_new_tokens: u32,
    temperature: f32,
    stop: Vec<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl TextGenInference {
    pub fn new(config: &SecondaryLlmConfig) -> anyhow::Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            url: config.url.clone(),
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            stop: config.stop.clone(),
            timeout_secs: config.timeout_secs,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
        })
    }
}

/// Render chat messages as one completion prompt.
pub fn flatten_messages(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for message in messages {
        let speaker = match message.role {
            Role::System => "System",
            Role::User => "Human",
        };
        prompt.push_str(speaker);
        prompt.push_str(": ");
        prompt.push_str(&message.content);
        prompt.push('\n');
    }
    prompt.push_str("AI:");
    prompt
}

#[derive(Deserialize)]
struct TgiResponse {
    generated_text: String,
}

#[async_trait]
impl ChatBackend for TextGenInference {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, messages: &[Message]) -> GenerationOutcome {
        let url = format!("{}/generate", self.url.trim_end_matches('/'));
        let body = serde_json::json!({
            "inputs": flatten_messages(messages),
            "parameters": {
                "max_new_tokens": self.max_new_tokens,
                "temperature": self.temperature,
                "stop": self.stop,
            },
        });

        let response = match self.client.post(&url).json(&body).send().await {
            Ok(r) => r,
            Err(e) => return GenerationOutcome::Failure(describe_request_error(&e, self.timeout_secs)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return GenerationOutcome::Failure(format!("TGI error {}: {}", status, body));
        }

        match response.json::<TgiResponse>().await {
            Ok(parsed) => GenerationOutcome::Success(parsed.generated_text.trim().to_string()),
            Err(e) => GenerationOutcome::Failure(format!("Failed to parse TGI response: {}", e)),
        }
    }
}

// ============ Router ============

pub struct LlmRouter {
    default_model: String,
    backends: Vec<Arc<dyn ChatBackend>>,
}

impl LlmRouter {
    /// `default_model` must name one of `backends`.
    pub fn new(default_model: impl Into<String>, backends: Vec<Arc<dyn ChatBackend>>) -> anyhow::Result<Self> {
        let default_model = default_model.into();
        if !backends.iter().any(|b| b.name() == default_model) {
            bail!("default model '{}' has no configured backend", default_model);
        }
        Ok(Self {
            default_model,
            backends,
        })
    }

    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let mut backends: Vec<Arc<dyn ChatBackend>> = vec![Arc::new(GeminiChat::new(&config.primary)?)];
        if config.secondary.enabled {
            backends.push(Arc::new(TextGenInference::new(&config.secondary)?));
        }
        Self::new(config.default_model.clone(), backends)
    }

    /// Map `requested` onto the allow-list; unknown names become the default.
    pub fn resolve_model<'a>(&'a self, requested: &'a str) -> &'a str {
        if self.backend(requested).is_some() {
            requested
        } else {
            tracing::debug!(requested, default = %self.default_model, "unknown model, using default");
            &self.default_model
        }
    }

    fn backend(&self, name: &str) -> Option<&Arc<dyn ChatBackend>> {
        self.backends.iter().find(|b| b.name() == name)
    }

    /// Generate with `requested_model`, falling back to the default backend.
    pub async fn generate(&self, messages: &[Message], requested_model: &str) -> Result<String> {
        let resolved = self.resolve_model(requested_model);
        let mut order = vec![resolved];
        if resolved != self.default_model {
            order.push(&self.default_model);
        }

        let mut failures = Vec::new();
        for name in order {
            let Some(backend) = self.backend(name) else {
                continue;
            };
            match backend.generate(messages).await {
                GenerationOutcome::Success(text) => {
                    if !failures.is_empty() {
                        tracing::info!(backend = name, "generation succeeded after fallback");
                    }
                    return Ok(text);
                }
                GenerationOutcome::Failure(reason) => {
                    tracing::warn!(backend = name, %reason, "chat backend failed");
                    failures.push(format!("{}: {}", name, reason));
                }
            }
        }

        let detail = failures.join("; ");
        tracing::error!(%detail, "all chat backends failed");
        Err(RagError::generation(detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Fake {
        name: &'static str,
        outcome: GenerationOutcome,
        calls: Mutex<usize>,
    }

    impl Fake {
        fn new(name: &'static str, outcome: GenerationOutcome) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome,
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for Fake {
        fn name(&self) -> &str {
            self.name
        }
        async fn generate(&self, _messages: &[Message]) -> GenerationOutcome {
            *self.calls.lock().unwrap() += 1;
            self.outcome.clone()
        }
    }

    fn ok(text: &str) -> GenerationOutcome {
        GenerationOutcome::Success(text.to_string())
    }

    fn fail(reason: &str) -> GenerationOutcome {
        GenerationOutcome::Failure(reason.to_string())
    }

    fn router(primary: Arc<Fake>, secondary: Arc<Fake>) -> LlmRouter {
        let backends: Vec<Arc<dyn ChatBackend>> = vec![primary, secondary];
        LlmRouter::new("gemini2", backends).unwrap()
    }

    #[tokio::test]
    async fn unknown_model_uses_default() {
        let primary = Fake::new("gemini2", ok("from primary"));
        let secondary = Fake::new("llama4", ok("from secondary"));
        let r = router(primary.clone(), secondary.clone());

        assert_eq!(r.resolve_model("not-a-real-model"), "gemini2");
        let text = r.generate(&[Message::user("hi")], "not-a-real-model").await.unwrap();
        assert_eq!(text, "from primary");
        assert_eq!(*secondary.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn secondary_failure_falls_back_to_primary() {
        let primary = Fake::new("gemini2", ok("from primary"));
        let secondary = Fake::new("llama4", fail("connection refused"));
        let r = router(primary.clone(), secondary.clone());

        let text = r.generate(&[Message::user("hi")], "llama4").await.unwrap();
        assert_eq!(text, "from primary");
        assert_eq!(*secondary.calls.lock().unwrap(), 1);
        assert_eq!(*primary.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn primary_is_tried_once() {
        let primary = Fake::new("gemini2", fail("quota"));
        let secondary = Fake::new("llama4", ok("unused"));
        let r = router(primary.clone(), secondary.clone());

        let err = r.generate(&[Message::user("hi")], "gemini2").await.unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
        assert_eq!(*primary.calls.lock().unwrap(), 1);
        assert_eq!(*secondary.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn total_failure_lists_every_reason() {
        let r = router(Fake::new("gemini2", fail("quota")), Fake::new("llama4", fail("down")));
        let err = r.generate(&[Message::user("hi")], "llama4").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("llama4: down"));
        assert!(message.contains("gemini2: quota"));
    }

    #[test]
    fn default_must_have_backend() {
        assert!(LlmRouter::new("missing", vec![Fake::new("gemini2", ok("x")) as Arc<dyn ChatBackend>]).is_err());
    }

    #[test]
    fn flattened_prompt_labels_roles() {
        let prompt = flatten_messages(&[Message::system("be brief"), Message::user("why?")]);
        assert_eq!(prompt, "System: be brief\nHuman: why?\nAI:");
    }

    #[test]
    fn gemini_request_moves_system_turn() {
        let chat = GeminiChat::new(&PrimaryLlmConfig::default()).unwrap();
        let request = chat.build_request(&[Message::system("rules"), Message::user("q")]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "rules");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "q");
        assert_eq!(json["contents"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn empty_candidates_is_failure() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(parse_gemini_text(parsed), GenerationOutcome::Failure(_)));
    }
}
