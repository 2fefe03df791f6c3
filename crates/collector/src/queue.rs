//! Capture queue and flush-time enrichment.

use flog_protocol::{EnrichedLogRecord, LogRecord};

use crate::context::ContextStore;
use crate::identity::Identity;

/// Records captured since the last flush, in capture order.
#[derive(Debug, Default)]
pub struct CaptureQueue {
    records: Vec<LogRecord>,
}

impl CaptureQueue {
    pub fn push(&mut self, record: LogRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Empties the queue, attaching the current context to every record.
    ///
    /// Returns `None` when there is nothing to send.
    pub fn drain_enriched(
        &mut self,
        context: &ContextStore,
        identity: &Identity,
    ) -> Option<Vec<EnrichedLogRecord>> {
        if self.records.is_empty() {
            return None;
        }

        let batch = self
            .records
            .drain(..)
            .map(|record| enrich(record, context, identity))
            .collect();
        Some(batch)
    }
}

/// Attaches properties, a copy of the user and the identifiers.
fn enrich(record: LogRecord, context: &ContextStore, identity: &Identity) -> EnrichedLogRecord {
    EnrichedLogRecord {
        record,
        properties: context.properties().clone(),
        user: context.user().cloned(),
        session_id: identity.session_id.clone(),
        tab_id: identity.tab_id.clone(),
    }
}
