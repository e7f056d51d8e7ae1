//! Runtime for executing sessions
//!
//! One actor task owns the session. Front-ends talk to it through a
//! `SessionHandle`: events go in over an mpsc channel, updates come back
//! over a broadcast channel.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;
pub use traits::*;

use crate::conversation::Message;
use crate::error::{DivinationError, DivinationResult};
use crate::session::{Event, Session, Step};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Updates sent to front-ends
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    Message(Message),
    StateChange { step: Step, busy: bool },
    Error(DivinationError),
}

/// Requests accepted by the runtime task
#[derive(Debug)]
pub enum Command {
    Event {
        event: Event,
        /// Receives the outcome once the transition and its effects are done.
        /// Gateway results arrive later as their own events.
        reply: Option<oneshot::Sender<DivinationResult<()>>>,
    },
    Snapshot(oneshot::Sender<Session>),
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: String,
    command_tx: mpsc::Sender<Command>,
    broadcast_tx: broadcast::Sender<SessionUpdate>,
}

impl SessionHandle {
    /// Submit an event and wait for it to be applied
    pub async fn submit(&self, event: Event) -> DivinationResult<()> {
        let (reply, outcome) = oneshot::channel();
        self.command_tx
            .send(Command::Event {
                event,
                reply: Some(reply),
            })
            .await
            .map_err(|_| stopped())?;
        outcome.await.map_err(|_| stopped())?
    }

    pub async fn snapshot(&self) -> DivinationResult<Session> {
        let (reply, snapshot) = oneshot::channel();
        self.command_tx
            .send(Command::Snapshot(reply))
            .await
            .map_err(|_| stopped())?;
        snapshot.await.map_err(|_| stopped())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.broadcast_tx.subscribe()
    }
}

fn stopped() -> DivinationError {
    DivinationError::validation("session runtime has stopped")
}
