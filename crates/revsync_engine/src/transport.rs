//! Transport layer abstraction for store operations.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use revsync_protocol::{
    BulkResultEntry, BulkWriteRequest, BulkWriteResponse, EntityId, FetchRequest, FetchResponse,
    StoredDocument, WriteOutcome,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A document store handles communication with the remote revisioned store.
///
/// This trait abstracts the network layer, allowing for different implementations
/// (HTTP, in-process, mock for testing, etc.). One call is one network operation.
pub trait DocumentStore: Send + Sync {
    /// Submits a batch of writes.
    fn bulk_write(&self, request: &BulkWriteRequest) -> SyncResult<BulkWriteResponse>;

    /// Reads the current state of one document.
    fn fetch(&self, request: &FetchRequest) -> SyncResult<FetchResponse>;

    /// Checks if the store is reachable.
    fn is_connected(&self) -> bool;

    /// Closes the connection.
    fn close(&self) -> SyncResult<()>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<S> {
    fn bulk_write(&self, request: &BulkWriteRequest) -> SyncResult<BulkWriteResponse> {
        (**self).bulk_write(request)
    }

    fn fetch(&self, request: &FetchRequest) -> SyncResult<FetchResponse> {
        (**self).fetch(request)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn close(&self) -> SyncResult<()> {
        (**self).close()
    }
}

/// A mock store for testing.
///
/// Bulk writes are answered from a queue of scripted replies. When the queue
/// is empty every operation is accepted with a fresh counter revision.
/// Every request is recorded.
#[derive(Debug)]
pub struct MockStore {
    connected: AtomicBool,
    next_revision: AtomicU64,
    replies: Mutex<VecDeque<SyncResult<BulkWriteResponse>>>,
    documents: Mutex<HashMap<EntityId, StoredDocument>>,
    bulk_requests: Mutex<Vec<BulkWriteRequest>>,
    fetch_requests: Mutex<Vec<FetchRequest>>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    /// Creates a new connected mock store.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            next_revision: AtomicU64::new(1),
            replies: Mutex::new(VecDeque::new()),
            documents: Mutex::new(HashMap::new()),
            bulk_requests: Mutex::new(Vec::new()),
            fetch_requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues the reply to the next unanswered bulk write.
    pub fn push_response(&self, response: BulkWriteResponse) {
        self.replies.lock().push_back(Ok(response));
    }

    /// Queues a failure for the next unanswered bulk write.
    pub fn push_failure(&self, error: SyncError) {
        self.replies.lock().push_back(Err(error));
    }

    /// Sets what a fetch of this document returns.
    pub fn set_document(&self, document: StoredDocument) {
        self.documents.lock().insert(document.entity_id, document);
    }

    /// Makes fetches of this document return not-found.
    pub fn remove_document(&self, entity_id: EntityId) {
        self.documents.lock().remove(&entity_id);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Bulk requests received so far.
    pub fn bulk_requests(&self) -> Vec<BulkWriteRequest> {
        self.bulk_requests.lock().clone()
    }

    /// Number of bulk requests received.
    pub fn bulk_request_count(&self) -> usize {
        self.bulk_requests.lock().len()
    }

    /// Fetch requests received so far.
    pub fn fetch_requests(&self) -> Vec<FetchRequest> {
        self.fetch_requests.lock().clone()
    }

    fn accept_all(&self, request: &BulkWriteRequest) -> BulkWriteResponse {
        BulkWriteResponse::new(
            request
                .operations
                .iter()
                .map(|op| {
                    let revision = self.next_revision.fetch_add(1, Ordering::SeqCst);
                    BulkResultEntry::new(op.entity_id, WriteOutcome::accepted(revision.to_string()))
                })
                .collect(),
        )
    }
}

impl DocumentStore for MockStore {
    fn bulk_write(&self, request: &BulkWriteRequest) -> SyncResult<BulkWriteResponse> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.bulk_requests.lock().push(request.clone());

        let scripted = self.replies.lock().pop_front();
        match scripted {
            Some(reply) => reply,
            None => Ok(self.accept_all(request)),
        }
    }

    fn fetch(&self, request: &FetchRequest) -> SyncResult<FetchResponse> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.fetch_requests.lock().push(*request);

        Ok(match self.documents.lock().get(&request.entity_id) {
            Some(document) => FetchResponse::found(document.clone()),
            None => FetchResponse::not_found(),
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
