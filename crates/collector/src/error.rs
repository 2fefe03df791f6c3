//! Error types for the collector lifecycle.

/// Errors returned by [`Collector::init`](crate::Collector::init).
///
/// Both variants are raised before any state changes.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("configuration error: endpoint is required to send logs")]
    MissingEndpoint,

    #[error("no tokio runtime: the flush timer cannot be started")]
    NoRuntime,
}
