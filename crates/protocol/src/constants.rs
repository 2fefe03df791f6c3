use std::time::Duration;

/// Key under which the session identifier is persisted.
pub const SESSION_ID_KEY: &str = "flog_session_id";

/// How often queued records are flushed to the endpoint.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(5000);
