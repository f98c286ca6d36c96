//! Protocol messages exchanged with the document store.

use crate::document::Document;
use crate::error::{ProtocolError, ProtocolResult};
use crate::id::EntityId;
use crate::operation::BulkOperation;
use crate::revision::Revision;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

fn encode_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| ProtocolError::encoding_failed(e.to_string()))?;
    Ok(bytes)
}

fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::decoding_failed(e.to_string()))
}

/// A store protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreMessage {
    /// Bulk write request.
    BulkWrite(BulkWriteRequest),
    /// Bulk write response.
    BulkWriteResult(BulkWriteResponse),
    /// Fetch-by-identity request.
    Fetch(FetchRequest),
    /// Fetch-by-identity response.
    FetchResult(FetchResponse),
}

impl StoreMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            StoreMessage::BulkWrite(_) => 1,
            StoreMessage::BulkWriteResult(_) => 2,
            StoreMessage::Fetch(_) => 3,
            StoreMessage::FetchResult(_) => 4,
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_cbor(bytes)
    }
}

/// A batch of writes submitted as one network operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkWriteRequest {
    /// Operations, in submission order.
    pub operations: Vec<BulkOperation>,
    /// When set, the store applies every operation regardless of revision
    /// and reports displaced revisions after the fact. When clear, each
    /// stale write is rejected individually with a conflict.
    pub force: bool,
}

impl BulkWriteRequest {
    /// Creates a new bulk write request.
    pub fn new(operations: Vec<BulkOperation>, force: bool) -> Self {
        Self { operations, force }
    }

    /// Number of operations in the batch.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the batch carries no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Validates every operation in the batch.
    pub fn validate(&self) -> ProtocolResult<()> {
        self.operations.iter().try_for_each(BulkOperation::validate)
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_cbor(bytes)
    }
}

/// Outcome of a single operation in a bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// The write was stored under a new revision.
    Accepted {
        /// The document's new revision.
        revision: Revision,
        /// Revision that a forced write replaced without matching it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        displaced: Option<Revision>,
    },
    /// The expected revision did not match the stored one.
    Conflict {
        /// The store's current revision, or none if the document is gone.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current: Option<Revision>,
    },
    /// The store refused the write for a reason other than concurrency.
    Rejected {
        /// Why the write was refused.
        reason: String,
    },
}

impl WriteOutcome {
    /// Creates an accepted outcome.
    pub fn accepted(revision: impl Into<Revision>) -> Self {
        Self::Accepted {
            revision: revision.into(),
            displaced: None,
        }
    }

    /// Creates a conflict outcome.
    pub fn conflict(current: Option<Revision>) -> Self {
        Self::Conflict { current }
    }

    /// Creates a rejected outcome.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Returns true for accepted outcomes.
    pub fn is_accepted(&self) -> bool {
        matches!(self, WriteOutcome::Accepted { .. })
    }

    /// Returns true for conflict outcomes.
    pub fn is_conflict(&self) -> bool {
        matches!(self, WriteOutcome::Conflict { .. })
    }
}

/// Per-entity result inside a bulk write response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResultEntry {
    /// Entity the result belongs to.
    pub entity_id: EntityId,
    /// What happened to the write.
    pub outcome: WriteOutcome,
}

impl BulkResultEntry {
    /// Creates a new result entry.
    pub fn new(entity_id: EntityId, outcome: WriteOutcome) -> Self {
        Self { entity_id, outcome }
    }
}

/// Response to a bulk write, one entry per submitted operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkWriteResponse {
    /// Results in submission order.
    pub results: Vec<BulkResultEntry>,
}

impl BulkWriteResponse {
    /// Creates a new response.
    pub fn new(results: Vec<BulkResultEntry>) -> Self {
        Self { results }
    }

    /// Returns the result for an entity, if present.
    pub fn result_for(&self, entity_id: EntityId) -> Option<&WriteOutcome> {
        self.results
            .iter()
            .find(|entry| entry.entity_id == entity_id)
            .map(|entry| &entry.outcome)
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_cbor(bytes)
    }
}

/// Query-by-identity request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Entity to fetch.
    pub entity_id: EntityId,
}

impl FetchRequest {
    /// Creates a new fetch request.
    pub fn new(entity_id: EntityId) -> Self {
        Self { entity_id }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_cbor(bytes)
    }
}

/// A document as currently held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Entity ID.
    pub entity_id: EntityId,
    /// Current document state.
    pub document: Document,
    /// Current revision.
    pub revision: Revision,
    /// Revisions displaced by forced writes and not yet cleared.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<Revision>,
}

/// Query-by-identity response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    /// The document, or none if the store does not hold it.
    pub document: Option<StoredDocument>,
}

impl FetchResponse {
    /// Creates a response for a document that was found.
    pub fn found(document: StoredDocument) -> Self {
        Self {
            document: Some(document),
        }
    }

    /// Creates a not-found response.
    pub fn not_found() -> Self {
        Self { document: None }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_cbor(bytes)
    }
}
