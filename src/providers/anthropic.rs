//! Anthropic Messages API client.
//!
//! Non-streaming only; the orchestrator falls back to [`generate`] when a
//! streamed request lands here.
//!
//! [`generate`]: AssistProvider::generate

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::http::{DEFAULT_TIMEOUT, check_status};
use super::parse::parse_response;
use super::prompt::build_prompt;
use super::traits::{AssistProvider, Pricing};
use crate::Result;
use crate::types::{AssistRequest, Generation, Usage};

/// Default base URL for the Anthropic API
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";

const API_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API.
#[derive(Clone)]
pub struct AnthropicProvider {
    name: String,
    api_key: String,
    model: String,
    base_url: String,
    pricing: Pricing,
    timeout: Duration,
    http: Client,
}

impl AnthropicProvider {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: "anthropic".to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pricing: Pricing::new(0.80, 4.00),
            timeout: DEFAULT_TIMEOUT,
            http: Client::new(),
        }
    }

    /// Set the routing name (default: "anthropic").
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
}

#[async_trait]
impl AssistProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "anthropic.generate", skip_all, fields(provider = %self.name, model = %self.model, kind = request.kind().as_str()))]
    async fn generate(&self, request: &AssistRequest) -> Result<Generation> {
        let prompt = build_prompt(request);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: prompt.max_tokens,
            temperature: prompt.temperature,
            system: &prompt.system,
            messages: vec![UserMessage {
                role: "user",
                content: &prompt.user,
            }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;
        let raw = check_status(response).await?.text().await?;

        let (text, usage) = match serde_json::from_str::<MessagesResponse>(&raw) {
            Ok(parsed) => {
                let text: String = parsed
                    .content
                    .into_iter()
                    .filter(|block| block.kind == "text")
                    .filter_map(|block| block.text)
                    .collect();
                (
                    text,
                    parsed
                        .usage
                        .map(|u| Usage::new(u.input_tokens, u.output_tokens)),
                )
            }
            Err(_) => (raw, None),
        };
        let usage = usage.unwrap_or_else(|| Usage::from_text(&prompt.combined(), &text));

        Ok(Generation {
            response: parse_response(request, &text),
            usage,
        })
    }

    fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        self.pricing.cost(input_tokens, output_tokens)
    }

    /// Configured with a key. No network round trip.
    async fn is_available(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<UserMessage<'a>>,
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}
