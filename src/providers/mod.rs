//! Provider adapters.
//!
//! Each backend implements [`AssistProvider`]: it builds a prompt for the
//! request, issues the HTTP call and parses the answer defensively.
//! [`ProviderChain`] picks the adapter to use for a call.

#[cfg(feature = "anthropic")]
pub mod anthropic;
mod http;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;
pub mod parse;
pub mod prompt;
pub mod registry;
mod stream;
pub mod traits;

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicProvider;
#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;
#[cfg(feature = "openai")]
pub use openai::OpenAiProvider;
pub use registry::ProviderChain;
pub use stream::DEFAULT_STREAM_BUFFER;
pub use traits::{AssistProvider, EventStream, Pricing};
