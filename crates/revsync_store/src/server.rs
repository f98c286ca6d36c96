//! The document server.

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::handler::RequestHandler;
use crate::store::MemoryStore;
use revsync_engine::{BULK_DOCS_PATH, FETCH_PATH};
use revsync_protocol::{
    BulkWriteRequest, BulkWriteResponse, FetchRequest, FetchResponse, StoreMessage,
};
use std::sync::Arc;

/// A revisioned document server for one database.
///
/// Serves `POST /{database}/_bulk_docs` and `POST /{database}/_fetch` with
/// CBOR bodies, backed by a [`MemoryStore`].
///
/// # Example
///
/// ```
/// use revsync_store::{DocumentServer, StoreConfig};
///
/// let server = DocumentServer::new("inventory", StoreConfig::default());
/// assert_eq!(server.database(), "inventory");
/// assert!(server.store().is_empty());
/// ```
pub struct DocumentServer {
    database: String,
    handler: RequestHandler,
    store: Arc<MemoryStore>,
}

impl DocumentServer {
    /// Creates a server with an empty store.
    pub fn new(database: impl Into<String>, config: StoreConfig) -> Self {
        Self::with_store(database, Arc::new(MemoryStore::new(config)))
    }

    /// Creates a server over an existing store.
    pub fn with_store(database: impl Into<String>, store: Arc<MemoryStore>) -> Self {
        Self {
            database: database.into(),
            handler: RequestHandler::new(Arc::clone(&store)),
            store,
        }
    }

    /// Name of the database served.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Handles a bulk write request.
    pub fn handle_bulk_write(&self, request: &BulkWriteRequest) -> StoreResult<BulkWriteResponse> {
        self.handler.handle_bulk_write(request)
    }

    /// Handles a fetch request.
    pub fn handle_fetch(&self, request: &FetchRequest) -> StoreResult<FetchResponse> {
        self.handler.handle_fetch(request)
    }

    /// Handles a protocol message (dispatches to the appropriate handler).
    pub fn handle_message(&self, message: StoreMessage) -> StoreResult<StoreMessage> {
        match message {
            StoreMessage::BulkWrite(request) => self
                .handle_bulk_write(&request)
                .map(StoreMessage::BulkWriteResult),
            StoreMessage::Fetch(request) => self.handle_fetch(&request).map(StoreMessage::FetchResult),
            other => Err(StoreError::InvalidRequest(format!(
                "unexpected message type {}",
                other.type_code()
            ))),
        }
    }

    /// Handles a POST of a CBOR body to `/{database}/{endpoint}`.
    pub fn handle_post(&self, path: &str, body: &[u8]) -> StoreResult<Vec<u8>> {
        let trimmed = path.trim_start_matches('/');
        let (database, endpoint) = trimmed
            .split_once('/')
            .ok_or_else(|| StoreError::UnknownEndpoint(path.to_string()))?;
        if database != self.database {
            return Err(StoreError::UnknownDatabase(database.to_string()));
        }

        match endpoint {
            BULK_DOCS_PATH => {
                let request = BulkWriteRequest::decode(body)?;
                Ok(self.handle_bulk_write(&request)?.encode()?)
            }
            FETCH_PATH => {
                let request = FetchRequest::decode(body)?;
                Ok(self.handle_fetch(&request)?.encode()?)
            }
            _ => Err(StoreError::UnknownEndpoint(path.to_string())),
        }
    }

    /// Number of bulk write requests handled.
    pub fn bulk_request_count(&self) -> u64 {
        self.handler.bulk_request_count()
    }

    /// Number of fetch requests handled.
    pub fn fetch_request_count(&self) -> u64 {
        self.handler.fetch_request_count()
    }
}
