//! Host environment hooks consumed by the collector.

use std::sync::Arc;

use crate::interceptor::ConsoleHook;
use crate::store::{FileStore, MemoryStore, SessionStore, default_store_path};
use crate::unload::UnloadHook;

/// The pieces of the surrounding process a collector plugs into.
#[derive(Clone)]
pub struct Host {
    /// Where captured `tracing` events are forwarded.
    pub console: Arc<ConsoleHook>,
    /// Teardown callback slot.
    pub unload: Arc<UnloadHook>,
    /// Persistence for the session id.
    pub store: Arc<dyn SessionStore>,
}

impl Host {
    /// Uses the process-wide console and unload hooks.
    pub fn process(store: Arc<dyn SessionStore>) -> Self {
        Self {
            console: ConsoleHook::global(),
            unload: UnloadHook::global(),
            store,
        }
    }

    /// Uses the process-wide hooks and the default on-disk store.
    ///
    /// Falls back to an in-memory store when the file cannot be opened.
    pub fn process_default() -> Self {
        let store: Arc<dyn SessionStore> = match default_store_path().map(FileStore::new) {
            Some(Ok(store)) => Arc::new(store),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "session store unavailable, using memory");
                Arc::new(MemoryStore::new())
            }
            None => Arc::new(MemoryStore::new()),
        };
        Self::process(store)
    }

    /// Uses private hooks, detached from the rest of the process.
    pub fn isolated(store: Arc<dyn SessionStore>) -> Self {
        Self {
            console: Arc::new(ConsoleHook::new()),
            unload: Arc::new(UnloadHook::new()),
            store,
        }
    }
}
