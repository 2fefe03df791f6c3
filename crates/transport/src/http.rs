//! JSON-over-HTTP transport using `reqwest`.

use flog_protocol::EnrichedLogRecord;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;

use crate::{Transport, TransportError};

/// Posts batches as a JSON array to the endpoint.
///
/// Each [`Transport::send`] spawns a tracked task on the current tokio
/// runtime; [`HttpTransport::shutdown`] waits for the ones still running.
pub struct HttpTransport {
    http: reqwest::Client,
    tracker: TaskTracker,
}

impl HttpTransport {
    /// Creates a new transport.
    pub fn new() -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            tracker: TaskTracker::new(),
        })
    }

    /// Posts a batch and waits for the response.
    pub async fn post_batch(
        &self,
        endpoint: &str,
        batch: &[EnrichedLogRecord],
    ) -> Result<(), TransportError> {
        post(&self.http, endpoint, batch).await
    }

    /// Number of sends still in flight.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits for every in-flight send to finish.
    ///
    /// Sends issued afterwards are still accepted and tracked.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

impl Transport for HttpTransport {
    fn send(&self, endpoint: &str, batch: Vec<EnrichedLogRecord>) {
        let count = batch.len();
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!(count, error = %TransportError::NoRuntime, "log batch dropped");
            return;
        };

        let http = self.http.clone();
        let endpoint = endpoint.to_string();

        self.tracker.spawn_on(
            async move {
                match post(&http, &endpoint, &batch).await {
                    Ok(()) => tracing::debug!(count, %endpoint, "log batch delivered"),
                    Err(e) => tracing::warn!(count, %endpoint, error = %e, "log batch lost"),
                }
            },
            &handle,
        );
    }
}

async fn post(
    http: &reqwest::Client,
    endpoint: &str,
    batch: &[EnrichedLogRecord],
) -> Result<(), TransportError> {
    let resp = http.post(endpoint).json(batch).send().await?;
    let status = resp.status();

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(TransportError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(())
}
