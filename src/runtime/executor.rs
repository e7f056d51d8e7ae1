//! Session runtime executor

use super::traits::SessionStorage;
use super::{Command, SessionHandle, SessionUpdate};

use crate::conversation::ConversationLog;
use crate::error::DivinationResult;
use crate::gateway::DivinationGateway;
use crate::session::{transition, Effect, Event, Session, SessionContext};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

const COMMAND_CAPACITY: usize = 32;
const BROADCAST_CAPACITY: usize = 128;

/// Generic session runtime that can work with any storage and gateway
pub struct SessionRuntime<S, G>
where
    S: SessionStorage + 'static,
    G: DivinationGateway + 'static,
{
    context: SessionContext,
    session: Session,
    log: ConversationLog,
    storage: S,
    gateway: Arc<G>,
    command_rx: mpsc::Receiver<Command>,
    /// Weak so the loop ends once every handle is dropped and no call is in flight
    command_tx: mpsc::WeakSender<Command>,
    broadcast_tx: broadcast::Sender<SessionUpdate>,
    /// Token for the call currently in flight, keyed by its sequence number
    call_token: Option<(u64, CancellationToken)>,
}

impl<S, G> SessionRuntime<S, G>
where
    S: SessionStorage + 'static,
    G: DivinationGateway + 'static,
{
    pub fn new(
        context: SessionContext,
        session: Session,
        log: ConversationLog,
        storage: S,
        gateway: Arc<G>,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        let handle = SessionHandle {
            session_id: context.session_id.clone(),
            command_tx: command_tx.clone(),
            broadcast_tx: broadcast_tx.clone(),
        };
        let runtime = Self {
            context,
            session,
            log,
            storage,
            gateway,
            command_rx,
            command_tx: command_tx.downgrade(),
            broadcast_tx,
            call_token: None,
        };
        (runtime, handle)
    }

    /// Create the runtime and run it on a background task
    pub fn spawn(
        context: SessionContext,
        session: Session,
        log: ConversationLog,
        storage: S,
        gateway: Arc<G>,
    ) -> SessionHandle {
        let (runtime, handle) = Self::new(context, session, log, storage, gateway);
        tokio::spawn(runtime.run());
        handle
    }

    pub async fn run(mut self) {
        tracing::info!(
            session_id = %self.context.session_id,
            step = %self.session.step,
            "Starting session runtime"
        );

        while let Some(command) = self.command_rx.recv().await {
            match command {
                Command::Event { event, reply } => {
                    let outcome = self.process_event(event).await;
                    if let Err(e) = &outcome {
                        tracing::debug!(session_id = %self.context.session_id, error = %e, "Event refused");
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(outcome);
                    }
                }
                Command::Snapshot(reply) => {
                    let _ = reply.send(self.session.clone());
                }
            }
        }

        tracing::info!(session_id = %self.context.session_id, "Session runtime stopped");
    }

    /// Apply one event. Returns the refusal from the transition, or the error
    /// the transition reported while settling a gateway call.
    pub(crate) async fn process_event(&mut self, event: Event) -> DivinationResult<()> {
        if let Event::GatewayResponded { seq, .. } | Event::GatewayFailed { seq, .. } = &event {
            if self.session.pending.map(|p| p.seq) != Some(*seq) {
                tracing::debug!(
                    session_id = %self.context.session_id,
                    seq,
                    current = self.session.sequence,
                    "Discarding stale gateway result"
                );
            }
        }

        let event_name = event.name();
        let result = match transition(&self.session, &self.context, event) {
            Ok(r) => r,
            Err(e) => {
                let _ = self.broadcast_tx.send(SessionUpdate::Error(e.clone()));
                return Err(e);
            }
        };

        let old_step = self.session.step;
        self.session = result.new_state;
        if old_step != self.session.step {
            tracing::info!(
                session_id = %self.context.session_id,
                event = event_name,
                from = %old_step,
                to = %self.session.step,
                "Step changed"
            );
        }

        let mut reported = None;
        for effect in result.effects {
            if let Err(e) = self.execute_effect(effect).await {
                reported = Some(e);
            }
        }

        if self.session.pending.is_none() {
            self.call_token = None;
        }

        reported.map_or(Ok(()), Err)
    }

    /// Execute an effect. Only `ReportError` yields an error.
    async fn execute_effect(&mut self, effect: Effect) -> DivinationResult<()> {
        match effect {
            Effect::AppendMessage(draft) => {
                let message = self.log.append(draft).clone();
                if let Err(e) = self
                    .storage
                    .append_message(&self.context.session_id, &message)
                    .await
                {
                    tracing::error!(session_id = %self.context.session_id, error = %e, "Failed to persist message");
                }
                let _ = self.broadcast_tx.send(SessionUpdate::Message(message));
                Ok(())
            }

            Effect::PersistSession => {
                if let Err(e) = self
                    .storage
                    .save_session(&self.context.session_id, &self.session)
                    .await
                {
                    tracing::error!(session_id = %self.context.session_id, error = %e, "Failed to persist session");
                }
                let _ = self.broadcast_tx.send(SessionUpdate::StateChange {
                    step: self.session.step,
                    busy: self.session.is_busy(),
                });
                Ok(())
            }

            Effect::CallGateway { seq, call } => {
                let Some(command_tx) = self.command_tx.upgrade() else {
                    // No handle left to care about the answer
                    return Ok(());
                };

                let cancel_token = CancellationToken::new();
                self.call_token = Some((seq, cancel_token.clone()));

                let gateway = self.gateway.clone();
                let session_id = self.context.session_id.clone();
                let kind = call.kind();

                tokio::spawn(async move {
                    tracing::info!(session_id = %session_id, seq, kind = ?kind, "Calling gateway (background)");

                    // Race the call against cancellation
                    let event = tokio::select! {
                        biased;

                        () = cancel_token.cancelled() => {
                            tracing::info!(session_id = %session_id, seq, "Gateway call cancelled");
                            return;
                        }

                        result = call.dispatch(gateway.as_ref()) => match result {
                            Ok(body) => Event::GatewayResponded { seq, body },
                            Err(error) => Event::GatewayFailed { seq, error },
                        },
                    };
                    let _ = command_tx.send(Command::Event { event, reply: None }).await;
                });

                Ok(())
            }

            Effect::AbortCall { seq } => {
                match self.call_token.take() {
                    Some((token_seq, token)) if token_seq == seq => token.cancel(),
                    other => self.call_token = other,
                }
                Ok(())
            }

            Effect::ReportError(error) => {
                tracing::warn!(
                    session_id = %self.context.session_id,
                    step = %self.session.step,
                    retryable = error.is_retryable(),
                    error = %error,
                    "Divination failed"
                );
                let _ = self.broadcast_tx.send(SessionUpdate::Error(error.clone()));
                Err(error)
            }
        }
    }
}
