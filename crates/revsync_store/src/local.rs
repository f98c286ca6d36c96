//! In-process adapters so an engine session can talk to a [`DocumentServer`]
//! directly or through the CBOR loopback HTTP path.

use crate::error::StoreError;
use crate::server::DocumentServer;
use revsync_engine::{DocumentStore, HttpFailure, LoopbackServer, SyncError, SyncResult};
use revsync_protocol::{BulkWriteRequest, BulkWriteResponse, FetchRequest, FetchResponse};

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::BatchTooLarge { size, limit } => SyncError::BatchTooLarge { size, limit },
            StoreError::Codec(e) => SyncError::Codec(e),
            other if other.is_server_error() => SyncError::ServerError(other.to_string()),
            other => SyncError::transport_fatal(other.to_string()),
        }
    }
}

impl From<StoreError> for HttpFailure {
    fn from(err: StoreError) -> Self {
        HttpFailure::Status(err.status_code(), err.to_string())
    }
}

impl DocumentStore for DocumentServer {
    fn bulk_write(&self, request: &BulkWriteRequest) -> SyncResult<BulkWriteResponse> {
        Ok(self.handle_bulk_write(request)?)
    }

    fn fetch(&self, request: &FetchRequest) -> SyncResult<FetchResponse> {
        Ok(self.handle_fetch(request)?)
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn close(&self) -> SyncResult<()> {
        Ok(())
    }
}

impl LoopbackServer for DocumentServer {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, HttpFailure> {
        DocumentServer::handle_post(self, path, body).map_err(HttpFailure::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use revsync_protocol::{BulkOperation, Document, EntityId};

    #[test]
    fn store_errors_map_to_sync_errors() {
        let err = SyncError::from(StoreError::BatchTooLarge { size: 3, limit: 2 });
        assert!(matches!(err, SyncError::BatchTooLarge { size: 3, limit: 2 }));

        let err = SyncError::from(StoreError::Internal("disk".into()));
        assert!(matches!(err, SyncError::ServerError(_)));

        let err = SyncError::from(StoreError::UnknownDatabase("x".into()));
        assert!(matches!(err, SyncError::Transport { retryable: false, .. }));
    }

    #[test]
    fn store_errors_map_to_status_codes() {
        assert_eq!(
            HttpFailure::from(StoreError::UnknownEndpoint("/db/x".into())),
            HttpFailure::Status(404, "no such endpoint: /db/x".into())
        );
        assert!(matches!(
            HttpFailure::from(StoreError::BatchTooLarge { size: 3, limit: 2 }),
            HttpFailure::Status(413, _)
        ));
    }

    #[test]
    fn server_as_document_store() {
        let server = DocumentServer::new("db", StoreConfig::default());
        let id = EntityId::new();
        let request = BulkWriteRequest::new(vec![BulkOperation::create(id, Document::empty())], false);

        let response = DocumentStore::bulk_write(&server, &request).unwrap();
        assert!(response.results[0].outcome.is_accepted());

        let fetched = DocumentStore::fetch(&server, &FetchRequest::new(id)).unwrap();
        assert!(fetched.document.is_some());
        assert!(server.is_connected());
    }

    #[test]
    fn loopback_rejects_unknown_database() {
        let server = DocumentServer::new("db", StoreConfig::default());
        let result = LoopbackServer::handle_post(&server, "/other/_fetch", &[]);
        assert!(matches!(result, Err(HttpFailure::Status(404, _))));
    }
}
