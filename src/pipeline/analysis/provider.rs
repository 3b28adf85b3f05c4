use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use super::prompt::{build_trends_prompt, TRENDS_SYSTEM_PROMPT};
use super::resolver::{resolve_json, ResolveMode};
use super::types::{InferenceClient, ProviderFactory, ProviderSet, Stage, StageRequest};
use super::AnalysisError;
use crate::config::ProviderConfig;

/// Path appended to the analysis provider's base URL.
const ANALYZE_PATH: &str = "/analyze";

/// Top-level envelope fields checked for the answer, in priority order.
const DIRECT_ANSWER_FIELDS: &[&str] = &[
    "output", "result", "data", "json", "response", "text", "content",
];

// ═══════════════════════════════════════════════════════════
// Envelope handling
// ═══════════════════════════════════════════════════════════

/// Pull the answer out of a provider response body.
///
/// Direct fields are tried first, then chat-completion message content, then
/// legacy completion text; the whole body is the last resort.
pub fn extract_answer(body: &Value) -> Value {
    if let Some(map) = body.as_object() {
        for field in DIRECT_ANSWER_FIELDS {
            if let Some(v) = map.get(*field).filter(|v| !v.is_null()) {
                return v.clone();
            }
        }
    }

    let first_choice = body.get("choices").and_then(|c| c.get(0));
    if let Some(v) = first_choice
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .filter(|v| !v.is_null())
    {
        return v.clone();
    }
    if let Some(v) = first_choice.and_then(|c| c.get("text")).filter(|v| !v.is_null()) {
        return v.clone();
    }

    body.clone()
}

/// Turn a successful raw body into the stage's JSON answer.
///
/// Non-JSON bodies are treated as raw answer text.
pub fn answer_from_body(raw: &str, mode: ResolveMode) -> Result<Value, AnalysisError> {
    let body = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    let answer = extract_answer(&body);
    resolve_json(&answer, mode)?.ok_or(AnalysisError::EmptyProviderResponse)
}

fn build_http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client, AnalysisError> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AnalysisError::HttpClient(format!("Failed to create HTTP client: {e}")))
}

/// Send a JSON POST with bearer auth and return the raw success body.
fn post_json<B: Serialize>(
    client: &reqwest::blocking::Client,
    url: &str,
    api_key: &str,
    body: &B,
    timeout_secs: u64,
) -> Result<String, AnalysisError> {
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .map_err(|e| {
            if e.is_timeout() {
                AnalysisError::HttpClient(format!("Request timed out after {timeout_secs}s"))
            } else if e.is_connect() {
                AnalysisError::HttpClient(format!("Cannot reach provider at {url}"))
            } else {
                AnalysisError::HttpClient(e.to_string())
            }
        })?;

    let status = response.status();
    let text = response
        .text()
        .map_err(|e| AnalysisError::HttpClient(format!("Failed to read response body: {e}")))?;

    if !status.is_success() {
        return Err(AnalysisError::ProviderError {
            status: status.as_u16(),
            body: text,
        });
    }

    Ok(text)
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, AnalysisError> {
    value.ok_or_else(|| AnalysisError::Configuration(format!("{name} is not set")))
}

// ═══════════════════════════════════════════════════════════
// Analysis provider (stages A, B, C, E)
// ═══════════════════════════════════════════════════════════

/// Request body for the analysis provider.
#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    stage: Stage,
    input: &'a Value,
    shape: &'a Value,
    instruction: &'a str,
}

/// HTTP client for the segmentation/engagement/audience/synthesis provider.
pub struct AnalysisProviderClient {
    base_url: Option<String>,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
    mode: ResolveMode,
}

impl AnalysisProviderClient {
    /// Create a client. Must not be called from inside an async context.
    pub fn new(config: &ProviderConfig) -> Result<Self, AnalysisError> {
        Ok(Self {
            base_url: config
                .analysis_base_url
                .as_deref()
                .map(|u| u.trim_end_matches('/').to_string()),
            api_key: config.analysis_api_key.clone(),
            client: build_http_client(config.timeout_secs)?,
            timeout_secs: config.timeout_secs,
            mode: ResolveMode::default(),
        })
    }

    pub fn with_resolve_mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }
}

impl InferenceClient for AnalysisProviderClient {
    fn infer(&self, request: &StageRequest) -> Result<Value, AnalysisError> {
        let base_url = required(self.base_url.as_deref(), "ANALYSIS_BASE_URL")?;
        let api_key = required(self.api_key.as_deref(), "ANALYSIS_API_KEY")?;
        let url = format!("{base_url}{ANALYZE_PATH}");

        let body = AnalyzeRequest {
            stage: request.stage,
            input: &request.input,
            shape: &request.shape,
            instruction: &request.instruction,
        };

        let start = Instant::now();
        let raw = post_json(&self.client, &url, api_key, &body, self.timeout_secs)?;
        tracing::debug!(
            stage = %request.stage,
            elapsed_ms = start.elapsed().as_millis() as u64,
            response_bytes = raw.len(),
            "Analysis provider responded"
        );

        answer_from_body(&raw, self.mode)
    }
}

// ═══════════════════════════════════════════════════════════
// Trends provider (stage D)
// ═══════════════════════════════════════════════════════════

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Chat-completions request body for the trends provider.
#[derive(Serialize)]
struct TrendsChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

/// HTTP client for the trends provider (system/user chat prompt).
pub struct TrendsProviderClient {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
    mode: ResolveMode,
}

impl TrendsProviderClient {
    /// Create a client. Must not be called from inside an async context.
    pub fn new(config: &ProviderConfig) -> Result<Self, AnalysisError> {
        Ok(Self {
            endpoint: config.trends_endpoint.clone(),
            model: config.trends_model.clone(),
            api_key: config.trends_api_key.clone(),
            client: build_http_client(config.timeout_secs)?,
            timeout_secs: config.timeout_secs,
            mode: ResolveMode::default(),
        })
    }

    pub fn with_resolve_mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }
}

impl InferenceClient for TrendsProviderClient {
    fn infer(&self, request: &StageRequest) -> Result<Value, AnalysisError> {
        let api_key = required(self.api_key.as_deref(), "TRENDS_API_KEY")?;
        if self.endpoint.trim().is_empty() {
            return Err(AnalysisError::Configuration("TRENDS_ENDPOINT is empty".into()));
        }

        let user_prompt = build_trends_prompt(request);
        let body = TrendsChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: TRENDS_SYSTEM_PROMPT.trim(),
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            temperature: 0.0,
        };

        let start = Instant::now();
        let raw = post_json(&self.client, &self.endpoint, api_key, &body, self.timeout_secs)?;
        tracing::debug!(
            stage = %request.stage,
            model = %self.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            response_bytes = raw.len(),
            "Trends provider responded"
        );

        answer_from_body(&raw, self.mode)
    }
}

// ═══════════════════════════════════════════════════════════
// Factories
// ═══════════════════════════════════════════════════════════

/// Production factory: one pair of HTTP clients per run.
pub struct HttpProviderFactory {
    config: ProviderConfig,
}

impl HttpProviderFactory {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn connect(&self) -> ProviderSet {
        ProviderSet {
            analysis: client_or_failure(AnalysisProviderClient::new(&self.config)),
            trends: client_or_failure(TrendsProviderClient::new(&self.config)),
        }
    }
}

/// A client that could not be built still has to report its failure as a
/// stage error when the stage runs.
fn client_or_failure<C: InferenceClient + 'static>(
    built: Result<C, AnalysisError>,
) -> Box<dyn InferenceClient> {
    match built {
        Ok(client) => Box::new(client),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build provider client");
            Box::new(UnavailableClient {
                reason: e.to_string(),
            })
        }
    }
}

struct UnavailableClient {
    reason: String,
}

impl InferenceClient for UnavailableClient {
    fn infer(&self, _request: &StageRequest) -> Result<Value, AnalysisError> {
        Err(AnalysisError::HttpClient(self.reason.clone()))
    }
}

// ═══════════════════════════════════════════════════════════
// Mock
// ═══════════════════════════════════════════════════════════

/// Canned reply of a [`MockInferenceClient`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Raw provider body text, run through envelope extraction and resolution.
    Body(String),
    /// Provider rejected the call.
    Status { status: u16, body: String },
}

/// Mock inference client for testing. Returns configurable replies per
/// stage and counts every call.
#[derive(Clone, Default)]
pub struct MockInferenceClient {
    replies: Arc<Mutex<HashMap<Stage, MockReply>>>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<StageRequest>>>,
}

impl MockInferenceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `stage` with `value` serialized as the body.
    pub fn with_output(self, stage: Stage, value: &Value) -> Self {
        self.with_reply(stage, MockReply::Body(value.to_string()))
    }

    pub fn with_reply(self, stage: Stage, reply: MockReply) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.insert(stage, reply);
        }
        self
    }

    /// Number of `infer` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<StageRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl InferenceClient for MockInferenceClient {
    fn infer(&self, request: &StageRequest) -> Result<Value, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|r| r.get(&request.stage).cloned());

        match reply {
            Some(MockReply::Body(raw)) => answer_from_body(&raw, ResolveMode::default()),
            Some(MockReply::Status { status, body }) => {
                Err(AnalysisError::ProviderError { status, body })
            }
            None => Err(AnalysisError::EmptyProviderResponse),
        }
    }
}

/// Factory handing out clones of one mock for both providers.
#[derive(Clone, Default)]
pub struct MockProviderFactory {
    pub mock: MockInferenceClient,
}

impl MockProviderFactory {
    pub fn new(mock: MockInferenceClient) -> Self {
        Self { mock }
    }
}

impl ProviderFactory for MockProviderFactory {
    fn connect(&self) -> ProviderSet {
        ProviderSet {
            analysis: Box::new(self.mock.clone()),
            trends: Box::new(self.mock.clone()),
        }
    }
}
