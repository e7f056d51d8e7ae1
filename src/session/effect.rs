//! Effects produced by state transitions

use crate::conversation::{MessageDraft, Widget};
use crate::error::DivinationError;
use crate::gateway::GatewayCall;

/// Effects to be executed after state transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Append an entry to the conversation log
    AppendMessage(MessageDraft),

    /// Issue a gateway call (spawned as a background task)
    CallGateway { seq: u64, call: GatewayCall },

    /// Abort the call issued under `seq`
    AbortCall { seq: u64 },

    /// Persist the new session snapshot
    PersistSession,

    /// Surface an error to whoever submitted the event
    ReportError(DivinationError),
}

impl Effect {
    pub fn system(text: impl Into<String>) -> Self {
        Effect::AppendMessage(MessageDraft::system(text))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Effect::AppendMessage(MessageDraft::user(text))
    }

    pub fn widget(widget: Widget, text: impl Into<String>) -> Self {
        Effect::AppendMessage(MessageDraft::widget(widget).with_content(text))
    }
}
