//! Delivery of enriched log batches to a collection endpoint.
//!
//! The collector hands each drained batch to a [`Transport`] and never looks
//! at the outcome. [`HttpTransport`] is the production implementation.

mod http;

pub use http::HttpTransport;

use flog_protocol::EnrichedLogRecord;

/// Errors from batch delivery.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no async runtime available to send the batch")]
    NoRuntime,
}

/// Sends a batch of records to an endpoint.
///
/// Fire-and-forget: implementations must not block the caller on the
/// network, and failures are theirs to report.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, endpoint: &str, batch: Vec<EnrichedLogRecord>);
}

impl<F> Transport for F
where
    F: Fn(&str, Vec<EnrichedLogRecord>) + Send + Sync + 'static,
{
    fn send(&self, endpoint: &str, batch: Vec<EnrichedLogRecord>) {
        self(endpoint, batch)
    }
}
