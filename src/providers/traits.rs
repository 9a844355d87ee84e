//! The provider capability contract.
//!
//! Every backend (cloud API or local model server) is wrapped in an
//! [`AssistProvider`]. The orchestrator only ever talks to this trait, so
//! backends are interchangeable and a mock is enough to test everything
//! above this layer.
//!
//! # Defensive parsing
//!
//! Backends answer in free text that is *supposed* to contain JSON. An
//! adapter must never turn a malformed answer into an error: it returns a
//! conservative fallback result instead (see [`super::parse`]). Errors are
//! reserved for transport and API failures, which the queue may retry.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::types::{AssistRequest, Generation, StreamEvent};
use crate::{NudgeError, Result};

/// Boxed stream of [`StreamEvent`]s.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// A text-generation backend.
#[async_trait]
pub trait AssistProvider: Send + Sync {
    /// Provider name for routing, logging and the usage ledger.
    fn name(&self) -> &str;

    /// Produce a structured result for the request.
    async fn generate(&self, request: &AssistRequest) -> Result<Generation>;

    /// Stream raw text chunks, ending with the parsed result.
    ///
    /// Only called when [`supports_streaming`](Self::supports_streaming)
    /// returns true.
    async fn generate_stream(&self, _request: &AssistRequest) -> Result<EventStream> {
        Err(NudgeError::Unsupported)
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    /// Cost in currency units for the given token counts.
    fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64;

    /// Cheap liveness probe. Must not run a full generation where avoidable.
    async fn is_available(&self) -> bool;
}

/// Per-million-token prices.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Pricing {
    pub const FREE: Pricing = Pricing {
        input_per_million: 0.0,
        output_per_million: 0.0,
    };

    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_million
            + output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_per_million() {
        let pricing = Pricing::new(1.0, 2.0);
        assert!((pricing.cost(1_000_000, 500_000) - 2.0).abs() < 1e-12);
        assert_eq!(Pricing::FREE.cost(10_000, 10_000), 0.0);
    }
}
