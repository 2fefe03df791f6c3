//! Log capture, enrichment and batching.
//!
//! A [`Collector`] gathers records from native `tracing` events (through
//! [`CaptureLayer`]) and from its [`Logger`], attaches session, tab and user
//! context at flush time, and hands batches to a
//! [`Transport`](flog_transport::Transport) every few seconds and on
//! teardown.

pub mod collector;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod identity;
pub mod interceptor;
pub mod logger;
pub mod queue;
pub mod scheduler;
pub mod store;
pub mod unload;

// Re-export primary types.
pub use collector::Collector;
pub use config::{Config, ConfigError};
pub use error::CollectorError;
pub use host::Host;
pub use interceptor::{CaptureLayer, CaptureSink, ConsoleHook, layer};
pub use logger::Logger;
pub use store::{FileStore, MemoryStore, SessionStore, StoreError, default_store_path};
pub use unload::UnloadHook;

pub use flog_protocol::{EnrichedLogRecord, Level, LogRecord, User};
pub use flog_transport::{HttpTransport, Transport, TransportError};
