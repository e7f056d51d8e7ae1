//! Divination session state machine
//!
//! Elm-style: `transition` is a pure function from the current session, the
//! injected context and one event to the next session plus the effects the
//! runtime must carry out.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{Intent, Method, Outcome, PendingCall, Session, SessionContext, Step};
pub use transition::transition;
