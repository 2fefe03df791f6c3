//! Teardown hook fired by the host before the process goes away.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

type Hook = Box<dyn FnOnce() + Send + 'static>;

static GLOBAL_UNLOAD: OnceLock<Arc<UnloadHook>> = OnceLock::new();

/// A single replaceable teardown callback.
///
/// There is no removal: setting a new hook replaces the old one, and
/// [`UnloadHook::fire`] consumes whatever is set.
#[derive(Default)]
pub struct UnloadHook {
    hook: Mutex<Option<Hook>>,
}

impl UnloadHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide hook.
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL_UNLOAD.get_or_init(|| Arc::new(Self::new())))
    }

    /// Replaces the current hook.
    pub fn set(&self, hook: impl FnOnce() + Send + 'static) {
        *self.hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    pub fn is_set(&self) -> bool {
        self.hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Runs the hook, if any. Returns whether one ran.
    pub fn fire(&self) -> bool {
        let hook = self
            .hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match hook {
            Some(hook) => {
                hook();
                true
            }
            None => false,
        }
    }
}
