pub mod constants;
pub mod record;

// Re-export primary types for convenience.
pub use constants::{DEFAULT_FLUSH_INTERVAL, SESSION_ID_KEY};
pub use record::{EnrichedLogRecord, Level, LogRecord, User};
