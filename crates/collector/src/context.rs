//! Per-collector user and property context, read when records are flushed.

use flog_protocol::User;
use serde_json::{Map, Value};

/// User identity and free-form properties attached at flush time.
#[derive(Debug, Default)]
pub struct ContextStore {
    user: Option<User>,
    properties: Map<String, Value>,
}

impl ContextStore {
    pub fn set_user(&mut self, user: Option<User>) {
        self.user = user;
    }

    /// Upserts a property. Last write wins.
    pub fn set_property(&mut self, name: String, value: Value) {
        self.properties.insert(name, value);
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn clear(&mut self) {
        self.user = None;
        self.properties.clear();
    }
}
