//! Session runtime
//!
//! One task per session: it owns the transcript, executes effects from the
//! turn-loop state machine, and relays output to connected clients.
//! Sessions share nothing mutable; the system instruction, gateway, and
//! sink are shared read-only.

mod executor;


pub use executor::SessionRuntime;

use crate::conversation::{Conversation, Role, Turn};
use crate::instruction::SystemInstruction;
use crate::lead::LeadSink;
use crate::llm::{CompletionGateway, DeliveryMode};
use crate::state_machine::{Event, SessionContext, SessionState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, RwLock};

/// Events relayed to connected clients
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A committed turn: the greeting, a visitor echo, or a full
    /// assistant reply
    Turn { role: Role, text: String },

    /// One fragment of an assistant reply being streamed
    ReplyDelta { text: String },

    /// The streamed reply is complete and about to be committed
    ReplyDone,

    /// The gateway call is being retried
    Retrying { attempt: u32 },

    /// Visible, non-fatal failure; the session accepts input again
    Error { message: String },

    /// The session has ended
    Closed,
}

/// Errors surfaced to the HTTP layer
#[derive(Debug, Error)]
pub enum SessionError {
    /// A message arrived for a session with no conversation store. Session
    /// lifecycle was not respected; this is an invariant violation, not a
    /// visitor-facing condition.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("a reply is already being generated")]
    TurnInFlight,

    #[error("session channel closed")]
    ChannelClosed,
}

/// Handle to a running session
#[derive(Clone)]
struct SessionHandle {
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<SessionEvent>,
    conversation: Arc<Mutex<Conversation>>,
    state: Arc<Mutex<SessionState>>,
}

/// Manager for all session runtimes
pub struct SessionManager {
    gateway: Arc<dyn CompletionGateway>,
    sink: Arc<dyn LeadSink>,
    instruction: Arc<SystemInstruction>,
    delivery: DeliveryMode,
    max_tokens: u32,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionManager {
    pub fn new(
        gateway: Arc<dyn CompletionGateway>,
        sink: Arc<dyn LeadSink>,
        instruction: Arc<SystemInstruction>,
        delivery: DeliveryMode,
        max_tokens: u32,
    ) -> Self {
        Self {
            gateway,
            sink,
            instruction,
            delivery,
            max_tokens,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a new session: spawn its runtime and seed the greeting.
    ///
    /// Returns the session id and the greeting text.
    pub async fn open(&self) -> (String, String) {
        let session_id = uuid::Uuid::new_v4().to_string();
        let context = SessionContext::new(&session_id, Arc::clone(&self.instruction));

        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(128);
        let conversation = Arc::new(Mutex::new(Conversation::new()));
        let state = Arc::new(Mutex::new(SessionState::Idle));

        let runtime = SessionRuntime::new(
            context,
            Arc::clone(&self.gateway),
            Arc::clone(&self.sink),
            Arc::clone(&conversation),
            Arc::clone(&state),
            self.delivery,
            self.max_tokens,
            event_rx,
            event_tx.clone(),
            broadcast_tx.clone(),
        );

        let id = session_id.clone();
        tokio::spawn(async move {
            runtime.run().await;
            tracing::info!(session_id = %id, "session runtime finished");
        });

        // The greeting is synthesized by the turn loop itself
        let _ = event_tx.send(Event::Opened).await;

        self.sessions.write().await.insert(
            session_id.clone(),
            SessionHandle {
                event_tx,
                broadcast_tx,
                conversation,
                state,
            },
        );

        (session_id, self.instruction.greeting().to_string())
    }

    /// Route an inbound visitor message to its session.
    pub async fn message(&self, session_id: &str, text: String) -> Result<(), SessionError> {
        let handle = self.handle(session_id).await?;

        // Fast-path rejection while a call is in flight; the state machine
        // enforces the invariant authoritatively if this races.
        if matches!(
            *handle.state.lock().expect("session state lock poisoned"),
            SessionState::Requesting { .. }
        ) {
            return Err(SessionError::TurnInFlight);
        }

        handle
            .event_tx
            .send(Event::VisitorMessage { text })
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }

    /// Subscribe to a session's relay channel.
    pub async fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<broadcast::Receiver<SessionEvent>, SessionError> {
        Ok(self.handle(session_id).await?.broadcast_tx.subscribe())
    }

    /// Read-only copy of a session's transcript.
    pub async fn transcript(&self, session_id: &str) -> Result<Vec<Turn>, SessionError> {
        let handle = self.handle(session_id).await?;
        let snapshot = handle
            .conversation
            .lock()
            .expect("conversation lock poisoned")
            .snapshot();
        Ok(snapshot)
    }

    /// End a session. The runtime drains the transcript to the lead sink,
    /// discards any outstanding gateway call, and exits.
    pub async fn close(&self, session_id: &str) -> Result<(), SessionError> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;

        let _ = handle.event_tx.send(Event::Closed).await;
        Ok(())
    }

    async fn handle(&self, session_id: &str) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))
    }
}
