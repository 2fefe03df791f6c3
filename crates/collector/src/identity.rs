//! Session and tab identifiers.

use flog_protocol::SESSION_ID_KEY;
use uuid::Uuid;

use crate::store::SessionStore;

/// Identifiers stamped onto every flushed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Persisted across collector lifetimes sharing a store.
    pub session_id: String,
    /// Fresh for every `init`.
    pub tab_id: String,
}

impl Identity {
    /// Resolves the session id from `store` and mints a new tab id.
    pub fn resolve(store: &dyn SessionStore) -> Self {
        Self {
            session_id: resolve_session_id(store),
            tab_id: new_id(),
        }
    }
}

/// Returns the persisted session id, creating and persisting one if absent.
///
/// A failed write still yields the new id; it just won't survive a restart.
pub fn resolve_session_id(store: &dyn SessionStore) -> String {
    if let Some(existing) = store.get(SESSION_ID_KEY).filter(|id| !id.is_empty()) {
        return existing;
    }

    let session_id = new_id();
    if let Err(e) = store.set(SESSION_ID_KEY, &session_id) {
        tracing::warn!(error = %e, "failed to persist session id");
    }
    session_id
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}
