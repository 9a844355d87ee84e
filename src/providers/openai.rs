//! OpenAI-compatible chat completions client.
//!
//! Works against api.openai.com and any server exposing the same
//! `/chat/completions` endpoint (OpenRouter, vLLM, LM Studio, ...).
//! Supports SSE streaming.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::http::{DEFAULT_TIMEOUT, check_status};
use super::parse::parse_response;
use super::prompt::{Prompt, build_prompt};
use super::stream::{DEFAULT_STREAM_BUFFER, LineEvent, decode_response};
use super::traits::{AssistProvider, EventStream, Pricing};
use crate::Result;
use crate::types::{AssistRequest, Generation, Usage};

/// Default base URL for the OpenAI API
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Client for an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct OpenAiProvider {
    name: String,
    api_key: String,
    model: String,
    base_url: String,
    pricing: Pricing,
    timeout: Duration,
    http: Client,
}

impl OpenAiProvider {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for compatible servers or wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: "openai".to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pricing: Pricing::new(0.15, 0.60),
            timeout: DEFAULT_TIMEOUT,
            http: Client::new(),
        }
    }

    /// Set the routing name (default: "openai").
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn body<'a>(&'a self, prompt: &'a Prompt, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: prompt.max_tokens,
            temperature: prompt.temperature,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn post(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }
}

#[async_trait]
impl AssistProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "openai.generate", skip_all, fields(provider = %self.name, model = %self.model, kind = request.kind().as_str()))]
    async fn generate(&self, request: &AssistRequest) -> Result<Generation> {
        let prompt = build_prompt(request);
        let body = self.post(&self.body(&prompt, false)).await?.text().await?;

        // A body that is not a completion is treated as the reply text itself.
        let (text, usage) = match serde_json::from_str::<ChatCompletion>(&body) {
            Ok(completion) => {
                let text = completion
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default();
                (text, completion.usage.map(Usage::from))
            }
            Err(_) => (body, None),
        };
        let usage = usage.unwrap_or_else(|| Usage::from_text(&prompt.combined(), &text));

        Ok(Generation {
            response: parse_response(request, &text),
            usage,
        })
    }

    #[instrument(name = "openai.generate_stream", skip_all, fields(provider = %self.name, model = %self.model))]
    async fn generate_stream(&self, request: &AssistRequest) -> Result<EventStream> {
        let prompt = build_prompt(request);
        let response = self.post(&self.body(&prompt, true)).await?;
        Ok(decode_response(
            response,
            request.clone(),
            prompt.combined(),
            DEFAULT_STREAM_BUFFER,
            interpret_sse_line,
        ))
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        self.pricing.cost(input_tokens, output_tokens)
    }

    /// Configured with a key. No network round trip.
    async fn is_available(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

fn interpret_sse_line(line: &str) -> Option<LineEvent> {
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(LineEvent::Done);
    }
    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content);
    match (text, chunk.usage.map(Usage::from)) {
        (Some(t), Some(u)) => Some(LineEvent::TextWithUsage(t, u)),
        (Some(t), None) => Some(LineEvent::Text(t)),
        (None, Some(u)) => Some(LineEvent::Usage(u)),
        (None, None) => None,
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage::new(u.prompt_tokens, u.completion_tokens)
    }
}
