//! Events that drive a session's turn loop

use crate::llm::{ServiceErrorKind, Usage};
use std::time::Duration;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    /// Session opened by the surface
    Opened,

    /// Inbound visitor message
    VisitorMessage { text: String },

    /// Materialized assistant reply from the gateway
    GatewayReply { text: String, usage: Usage },

    /// Gateway call failed
    GatewayError {
        message: String,
        kind: ServiceErrorKind,
        retry_after: Option<Duration>,
        attempt: u32,
    },

    /// A scheduled retry timer fired
    RetryTimeout { attempt: u32 },

    /// Session terminated by the surface
    Closed,
}
