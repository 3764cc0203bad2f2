//! Common types for completion requests

use super::error::ServiceError;
use crate::conversation::Turn;
use futures::stream::BoxStream;

/// How the reply should be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// One complete reply
    #[default]
    Atomic,
    /// Incremental text fragments
    Streaming,
}

/// A completion request: the fixed system instruction plus the full
/// transcript, oldest turn first.
///
/// The gateway is stateless between calls; the entire turn history is
/// re-sent on every request. No server-side session memory is assumed.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub turns: Vec<Turn>,
    pub max_tokens: u32,
    pub mode: DeliveryMode,
}

/// A complete assistant reply
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub usage: Usage,
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Lazy, finite, non-restartable sequence of reply fragments.
///
/// Concatenating every fragment yields the final reply text. End of stream
/// is terminal; the caller materializes one turn from the concatenation.
pub type FragmentStream = BoxStream<'static, Result<String, ServiceError>>;

/// Gateway output, tagged by delivery mode
pub enum Completion {
    Atomic(Reply),
    Stream(FragmentStream),
}
