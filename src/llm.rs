//! Completion gateway
//!
//! Boundary between the turn loop and the hosted language-model service.
//! The gateway is stateless: every call carries the system instruction and
//! the full turn history.

mod anthropic;
mod error;
mod types;

#[cfg(test)]
mod proptests;

pub use anthropic::AnthropicGateway;
pub use error::{ServiceError, ServiceErrorKind};
pub use types::{Completion, CompletionRequest, DeliveryMode, FragmentStream, Reply, Usage};

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface to the completion backend
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Produce the next assistant reply for the given transcript.
    ///
    /// Returns a tagged [`Completion`]: one complete reply, or a fragment
    /// stream whose concatenation equals the reply text. A failure leaves
    /// the caller's transcript untouched.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ServiceError>;

    /// Model identifier used for logging
    fn model_id(&self) -> &str;
}

/// Logging wrapper for gateways
pub struct LoggingGateway {
    inner: Arc<dyn CompletionGateway>,
    model_id: String,
}

impl LoggingGateway {
    pub fn new(inner: Arc<dyn CompletionGateway>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl CompletionGateway for LoggingGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ServiceError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(Completion::Atomic(reply)) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    turns = request.turns.len(),
                    input_tokens = reply.usage.input_tokens,
                    output_tokens = reply.usage.output_tokens,
                    "completion finished"
                );
            }
            Ok(Completion::Stream(_)) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    turns = request.turns.len(),
                    "completion stream opened"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "completion failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
