//! Session runtime executor

use super::SessionEvent;
use crate::conversation::Conversation;
use crate::lead::{LeadHandoff, LeadSink};
use crate::lead_extractor;
use crate::llm::{
    Completion, CompletionGateway, CompletionRequest, DeliveryMode, ServiceError, Usage,
};
use crate::state_machine::{transition, Effect, Event, SessionContext, SessionState};
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Generic session runtime that works with any gateway and sink
pub struct SessionRuntime<G, K>
where
    G: CompletionGateway + ?Sized + 'static,
    K: LeadSink + ?Sized + 'static,
{
    context: SessionContext,
    state: SessionState,
    /// Mirror of `state` shared with the HTTP layer for fast-path checks
    shared_state: Arc<Mutex<SessionState>>,
    conversation: Arc<Mutex<Conversation>>,
    gateway: Arc<G>,
    sink: Arc<K>,
    delivery: DeliveryMode,
    max_tokens: u32,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<SessionEvent>,
    /// Token to discard an in-flight gateway call
    gateway_cancel: Option<CancellationToken>,
}

impl<G, K> SessionRuntime<G, K>
where
    G: CompletionGateway + ?Sized + 'static,
    K: LeadSink + ?Sized + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: SessionContext,
        gateway: Arc<G>,
        sink: Arc<K>,
        conversation: Arc<Mutex<Conversation>>,
        shared_state: Arc<Mutex<SessionState>>,
        delivery: DeliveryMode,
        max_tokens: u32,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
        broadcast_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            context,
            state: SessionState::Idle,
            shared_state,
            conversation,
            gateway,
            sink,
            delivery,
            max_tokens,
            event_rx,
            event_tx,
            broadcast_tx,
            gateway_cancel: None,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.context.session_id, "session runtime started");

        while let Some(event) = self.event_rx.recv().await {
            if let Err(message) = self.process_event(event).await {
                // Transition errors are visitor-facing ("a reply is already
                // being generated"); relay and keep going.
                let _ = self.broadcast_tx.send(SessionEvent::Error { message });
            }

            if self.state.is_terminal() {
                break;
            }
        }

        tracing::info!(session_id = %self.context.session_id, "session runtime stopped");
    }

    async fn process_event(&mut self, event: Event) -> Result<(), String> {
        let result =
            transition(&self.state, &self.context, event).map_err(|e| e.to_string())?;

        self.state = result.new_state;
        *self
            .shared_state
            .lock()
            .expect("session state lock poisoned") = self.state.clone();

        for effect in result.effects {
            self.execute_effect(effect).await;
        }

        Ok(())
    }

    async fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::ResetStore => {
                self.conversation
                    .lock()
                    .expect("conversation lock poisoned")
                    .reset();
            }

            Effect::AppendTurn { turn } => {
                self.conversation
                    .lock()
                    .expect("conversation lock poisoned")
                    .append(turn);
            }

            Effect::RelayTurn { turn } => {
                let _ = self.broadcast_tx.send(SessionEvent::Turn {
                    role: turn.role,
                    text: turn.text,
                });
            }

            Effect::RelayRetrying { attempt } => {
                let _ = self.broadcast_tx.send(SessionEvent::Retrying { attempt });
            }

            Effect::RelayError { message } => {
                let _ = self.broadcast_tx.send(SessionEvent::Error { message });
            }

            Effect::RequestCompletion => self.spawn_gateway_call(),

            Effect::ScheduleRetry { delay, attempt } => {
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = event_tx.send(Event::RetryTimeout { attempt }).await;
                });
            }

            Effect::DrainToSink => self.drain_to_sink().await,
        }
    }

    /// Spawn the gateway call as a background task so the runtime stays
    /// responsive to close events while a reply is being generated.
    fn spawn_gateway_call(&mut self) {
        // A superseded call (earlier retry attempt) must not race the new one
        if let Some(token) = self.gateway_cancel.take() {
            token.cancel();
        }
        let cancel = CancellationToken::new();
        self.gateway_cancel = Some(cancel.clone());

        let attempt = match &self.state {
            SessionState::Requesting { attempt } => *attempt,
            _ => 1,
        };

        let request = CompletionRequest {
            system: self.context.instruction.text().to_string(),
            turns: self
                .conversation
                .lock()
                .expect("conversation lock poisoned")
                .snapshot(),
            max_tokens: self.max_tokens,
            mode: self.delivery,
        };

        let gateway = Arc::clone(&self.gateway);
        let event_tx = self.event_tx.clone();
        let broadcast_tx = self.broadcast_tx.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                () = cancel.cancelled() => return,
                outcome = drive_completion(gateway.as_ref(), &request, &broadcast_tx) => outcome,
            };

            let event = match outcome {
                Ok((text, usage)) => Event::GatewayReply { text, usage },
                Err(err) => Event::GatewayError {
                    message: err.message.clone(),
                    kind: err.kind,
                    retry_after: err.retry_after,
                    attempt,
                },
            };
            let _ = event_tx.send(event).await;
        });
    }

    /// Hand the finished transcript to the lead sink.
    ///
    /// Runs at most once, from the close transition. Extraction is
    /// best-effort and never blocks teardown on failure.
    async fn drain_to_sink(&mut self) {
        if let Some(token) = self.gateway_cancel.take() {
            token.cancel();
        }

        let transcript = self
            .conversation
            .lock()
            .expect("conversation lock poisoned")
            .snapshot();

        let _ = self.broadcast_tx.send(SessionEvent::Closed);

        if transcript.is_empty() {
            return;
        }

        let lead = lead_extractor::extract(&transcript, self.gateway.as_ref()).await;

        let handoff = LeadHandoff {
            session_id: self.context.session_id.clone(),
            captured_at: chrono::Utc::now(),
            transcript,
            lead,
        };

        if let Err(e) = self.sink.deliver(handoff).await {
            tracing::warn!(
                session_id = %self.context.session_id,
                error = %e,
                "lead delivery failed"
            );
        }
    }
}

/// Run one gateway call to completion, relaying fragments as they arrive.
///
/// Both delivery modes reduce to one materialized reply; the turn loop
/// never sees fragments. A mid-stream failure discards the partial text.
async fn drive_completion<G>(
    gateway: &G,
    request: &CompletionRequest,
    broadcast_tx: &broadcast::Sender<SessionEvent>,
) -> Result<(String, Usage), ServiceError>
where
    G: CompletionGateway + ?Sized,
{
    match gateway.complete(request).await? {
        Completion::Atomic(reply) => Ok((reply.text, reply.usage)),
        Completion::Stream(mut fragments) => {
            let mut text = String::new();
            while let Some(fragment) = fragments.next().await {
                let fragment = fragment?;
                let _ = broadcast_tx.send(SessionEvent::ReplyDelta {
                    text: fragment.clone(),
                });
                text.push_str(&fragment);
            }
            let _ = broadcast_tx.send(SessionEvent::ReplyDone);
            Ok((text, Usage::default()))
        }
    }
}
