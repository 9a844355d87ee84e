//! Provider output and streaming event types

use serde::{Deserialize, Serialize};

use super::result::AssistResponse;

/// Token usage for one provider call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Usage sized from prompt and completion text when the backend reports none.
    pub fn from_text(prompt: &str, completion: &str) -> Self {
        Self::new(estimate_tokens(prompt), estimate_tokens(completion))
    }

    /// Saturates instead of overflowing on absurd upstream counts.
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Rough token count: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars.div_ceil(4)
}

/// A completed provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub response: AssistResponse,
    pub usage: Usage,
}

/// Events emitted during a streamed generation.
///
/// A well-formed stream yields zero or more `Chunk`s followed by exactly
/// one `Done`.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Raw text as it arrives from the backend
    Chunk(String),

    /// Stream complete, with the parsed result
    Done(Generation),
}
