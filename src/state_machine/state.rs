//! Session state types

use crate::instruction::SystemInstruction;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Turn-loop state for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionState {
    /// Awaiting visitor input
    #[default]
    Idle,

    /// Gateway call in flight, with retry tracking
    Requesting { attempt: u32 },

    /// Session ended; no further transitions
    Closed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

/// Immutable per-session configuration.
///
/// The instruction is process-wide and shared read-only across sessions.
#[derive(Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub instruction: Arc<SystemInstruction>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, instruction: Arc<SystemInstruction>) -> Self {
        Self {
            session_id: session_id.into(),
            instruction,
        }
    }
}
