//! Request handlers for store endpoints.

use crate::error::StoreResult;
use crate::store::MemoryStore;
use revsync_protocol::{BulkWriteRequest, BulkWriteResponse, FetchRequest, FetchResponse, WriteOutcome};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Handler for store requests.
pub struct RequestHandler {
    store: Arc<MemoryStore>,
    bulk_requests: AtomicU64,
    fetch_requests: AtomicU64,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            bulk_requests: AtomicU64::new(0),
            fetch_requests: AtomicU64::new(0),
        }
    }

    /// Handles a bulk write request.
    pub fn handle_bulk_write(&self, request: &BulkWriteRequest) -> StoreResult<BulkWriteResponse> {
        self.bulk_requests.fetch_add(1, Ordering::SeqCst);
        let response = self.store.apply_bulk(request)?;

        let accepted = response.results.iter().filter(|r| r.outcome.is_accepted()).count();
        let conflicts = response.results.iter().filter(|r| r.outcome.is_conflict()).count();
        let rejected = response
            .results
            .iter()
            .filter(|r| matches!(r.outcome, WriteOutcome::Rejected { .. }))
            .count();
        info!(
            operations = request.len(),
            force = request.force,
            accepted,
            conflicts,
            rejected,
            "bulk write handled"
        );
        Ok(response)
    }

    /// Handles a fetch request.
    pub fn handle_fetch(&self, request: &FetchRequest) -> StoreResult<FetchResponse> {
        self.fetch_requests.fetch_add(1, Ordering::SeqCst);
        let response = match self.store.fetch(request.entity_id) {
            Some(document) => FetchResponse::found(document),
            None => FetchResponse::not_found(),
        };
        debug!(entity_id = %request.entity_id, found = response.document.is_some(), "fetch handled");
        Ok(response)
    }

    /// Number of bulk write requests handled.
    pub fn bulk_request_count(&self) -> u64 {
        self.bulk_requests.load(Ordering::SeqCst)
    }

    /// Number of fetch requests handled.
    pub fn fetch_request_count(&self) -> u64 {
        self.fetch_requests.load(Ordering::SeqCst)
    }
}
