//! Pure state transition function for the session turn loop

use super::{Effect, Event, SessionContext, SessionState};
use crate::conversation::Turn;
use std::time::Duration;
use thiserror::Error;

pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("a reply is already being generated; wait for it to finish")]
    TurnInFlight,
    #[error("session is closed")]
    SessionClosed,
}

/// Pure transition function: same inputs, same outputs, no I/O.
pub fn transition(
    state: &SessionState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // Session start: the store begins empty and the greeting is
        // synthesized locally, never model-generated.
        (SessionState::Idle, Event::Opened) => {
            let greeting = Turn::assistant(context.instruction.greeting());
            Ok(TransitionResult::new(SessionState::Idle)
                .with_effect(Effect::ResetStore)
                .with_effect(Effect::AppendTurn {
                    turn: greeting.clone(),
                })
                .with_effect(Effect::RelayTurn { turn: greeting }))
        }

        // Visitor input: append, echo, and invoke the gateway with the
        // full snapshot.
        (SessionState::Idle, Event::VisitorMessage { text }) => {
            let turn = Turn::user(text);
            Ok(TransitionResult::new(SessionState::Requesting { attempt: 1 })
                .with_effect(Effect::AppendTurn { turn: turn.clone() })
                .with_effect(Effect::RelayTurn { turn })
                .with_effect(Effect::RequestCompletion))
        }

        // At most one in-flight gateway call per session: reject
        // concurrent input.
        (SessionState::Requesting { .. }, Event::VisitorMessage { .. }) => {
            Err(TransitionError::TurnInFlight)
        }

        // Reply materialized: commit the assistant turn, return to
        // awaiting input.
        (SessionState::Requesting { .. }, Event::GatewayReply { text, .. }) => {
            let turn = Turn::assistant(text);
            Ok(TransitionResult::new(SessionState::Idle)
                .with_effect(Effect::AppendTurn { turn: turn.clone() })
                .with_effect(Effect::RelayTurn { turn }))
        }

        // Retryable failure with attempts left: back off and retry. The
        // provider's retry-after wins over the computed backoff.
        (
            SessionState::Requesting { attempt },
            Event::GatewayError {
                kind, retry_after, ..
            },
        ) if kind.is_retryable() && *attempt < MAX_RETRY_ATTEMPTS => {
            let next = attempt + 1;
            let delay = retry_after.unwrap_or_else(|| retry_delay(next));
            Ok(
                TransitionResult::new(SessionState::Requesting { attempt: next })
                    .with_effect(Effect::RelayRetrying { attempt: next })
                    .with_effect(Effect::ScheduleRetry {
                        delay,
                        attempt: next,
                    }),
            )
        }

        // Non-retryable or exhausted: surface the error and return to
        // awaiting input. The user's turn stays; no assistant turn is
        // committed.
        (SessionState::Requesting { attempt }, Event::GatewayError { message, kind, .. }) => {
            let message = if kind.is_retryable() {
                format!("failed after {attempt} attempts: {message}")
            } else {
                message
            };
            Ok(TransitionResult::new(SessionState::Idle)
                .with_effect(Effect::RelayError { message }))
        }

        // A timer for the current attempt fires the request; timers from
        // superseded attempts are dropped.
        (SessionState::Requesting { attempt }, Event::RetryTimeout { attempt: fired })
            if *attempt == fired =>
        {
            Ok(
                TransitionResult::new(SessionState::Requesting { attempt: *attempt })
                    .with_effect(Effect::RequestCompletion),
            )
        }
        (SessionState::Requesting { .. }, Event::RetryTimeout { .. }) => {
            Ok(TransitionResult::new(state.clone()))
        }

        // Close wins from any live state; the runtime discards any
        // outstanding gateway call.
        (SessionState::Closed, Event::Closed) => Ok(TransitionResult::new(SessionState::Closed)),
        (_, Event::Closed) => {
            Ok(TransitionResult::new(SessionState::Closed).with_effect(Effect::DrainToSink))
        }

        (SessionState::Closed, _) => Err(TransitionError::SessionClosed),

        // Stray events (a late timer in Idle, a reply after recovery) are
        // ignored.
        (current, _) => Ok(TransitionResult::new(current.clone())),
    }
}

fn retry_delay(attempt: u32) -> Duration {
    // Exponential backoff, doubling per attempt
    Duration::from_secs(1 << (attempt - 1))
}
