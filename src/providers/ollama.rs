//! Ollama local model server client.
//!
//! Uses `/api/generate` with newline-delimited JSON streaming. Local
//! inference is free, so [`estimate_cost`](AssistProvider::estimate_cost)
//! is zero unless a price is configured. Liveness is probed with a short
//! `GET /api/tags`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::http::{DEFAULT_TIMEOUT, PROBE_TIMEOUT, check_status};
use super::parse::parse_response;
use super::prompt::{Prompt, build_prompt};
use super::stream::{DEFAULT_STREAM_BUFFER, LineEvent, decode_response};
use super::traits::{AssistProvider, EventStream, Pricing};
use crate::Result;
use crate::types::{AssistRequest, Generation, Usage};

/// Default Ollama URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub const DEFAULT_MODEL: &str = "llama3.2";

/// Client for an Ollama server.
#[derive(Clone)]
pub struct OllamaProvider {
    name: String,
    model: String,
    base_url: String,
    pricing: Pricing,
    timeout: Duration,
    http: Client,
}

impl OllamaProvider {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            name: "ollama".to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pricing: Pricing::FREE,
            timeout: DEFAULT_TIMEOUT,
            http: Client::new(),
        }
    }

    /// Set the routing name (default: "ollama").
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

    async fn post(&self, prompt: &Prompt, stream: bool) -> Result<reqwest::Response> {
        let body = GenerateRequest {
            model: &self.model,
            system: &prompt.system,
            prompt: &prompt.user,
            stream,
            format: "json",
            options: GenerateOptions {
                temperature: prompt.temperature,
                num_predict: prompt.max_tokens,
            },
        };
        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;
        check_status(response).await
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssistProvider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "ollama.generate", skip_all, fields(provider = %self.name, model = %self.model, kind = request.kind().as_str()))]
    async fn generate(&self, request: &AssistRequest) -> Result<Generation> {
        let prompt = build_prompt(request);
        let raw = self.post(&prompt, false).await?.text().await?;

        let (text, usage) = match serde_json::from_str::<GenerateFrame>(&raw) {
            Ok(frame) => {
                let usage = frame.usage();
                (frame.response, usage)
            }
            Err(_) => (raw, None),
        };
        let usage = usage.unwrap_or_else(|| Usage::from_text(&prompt.combined(), &text));

        Ok(Generation {
            response: parse_response(request, &text),
            usage,
        })
    }

    #[instrument(name = "ollama.generate_stream", skip_all, fields(provider = %self.name, model = %self.model))]
    async fn generate_stream(&self, request: &AssistRequest) -> Result<EventStream> {
        let prompt = build_prompt(request);
        let response = self.post(&prompt, true).await?;
        Ok(decode_response(
            response,
            request.clone(),
            prompt.combined(),
            DEFAULT_STREAM_BUFFER,
            interpret_ndjson_line,
        ))
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        self.pricing.cost(input_tokens, output_tokens)
    }

    async fn is_available(&self) -> bool {
        let probe = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        match probe {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(provider = %self.name, error = %e, "ollama probe failed");
                false
            }
        }
    }
}

fn interpret_ndjson_line(line: &str) -> Option<LineEvent> {
    let frame: GenerateFrame = serde_json::from_str(line).ok()?;
    match frame.usage() {
        Some(usage) => Some(LineEvent::TextWithUsage(frame.response, usage)),
        None => Some(LineEvent::Text(frame.response)),
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateFrame {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl GenerateFrame {
    /// Token counts, reported only on the final frame.
    fn usage(&self) -> Option<Usage> {
        if !self.done {
            return None;
        }
        Some(Usage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndjson_frames() {
        assert_eq!(
            interpret_ndjson_line(r#"{"response":"He","done":false}"#),
            Some(LineEvent::Text("He".into()))
        );
        assert_eq!(
            interpret_ndjson_line(
                r#"{"response":"","done":true,"prompt_eval_count":12,"eval_count":4}"#
            ),
            Some(LineEvent::TextWithUsage(String::new(), Usage::new(12, 4)))
        );
        assert_eq!(interpret_ndjson_line("garbage"), None);
    }
}
