//! Trait abstractions for runtime I/O
//!
//! The executor only sees these, so tests can swap in memory-backed storage.

use crate::conversation::Message;
use crate::session::Session;
use crate::store::Store;
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence for the session snapshot and its log
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Overwrite the stored snapshot
    async fn save_session(&self, session_id: &str, session: &Session) -> Result<(), String>;

    /// Append one log entry
    async fn append_message(&self, session_id: &str, message: &Message) -> Result<(), String>;
}

#[async_trait]
impl<T: SessionStorage + ?Sized> SessionStorage for Arc<T> {
    async fn save_session(&self, session_id: &str, session: &Session) -> Result<(), String> {
        (**self).save_session(session_id, session).await
    }

    async fn append_message(&self, session_id: &str, message: &Message) -> Result<(), String> {
        (**self).append_message(session_id, message).await
    }
}

// ============================================================================
// Production implementations
// ============================================================================

/// Adapter to use the SQLite `Store` as runtime storage
#[derive(Clone)]
pub struct DatabaseStorage {
    store: Store,
}

impl DatabaseStorage {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SessionStorage for DatabaseStorage {
    async fn save_session(&self, session_id: &str, session: &Session) -> Result<(), String> {
        self.store
            .save_session(session_id, session)
            .map_err(|e| e.to_string())
    }

    async fn append_message(&self, session_id: &str, message: &Message) -> Result<(), String> {
        self.store
            .append_message(session_id, message)
            .map_err(|e| e.to_string())
    }
}
