//! # revsync Protocol
//!
//! Wire types and CBOR codecs for revsync.
//!
//! This crate provides:
//! - `EntityId` and `Revision`, the identity and optimistic-concurrency token
//!   of every stored document
//! - `Document`, the serialized state of an entity
//! - `BulkOperation` and the bulk write request/response messages
//! - `Conflict` and `ConflictPolicy` for conflict resolution
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ```
//! use revsync_protocol::{BulkOperation, BulkWriteRequest, Document, EntityId};
//!
//! let doc = Document::from_entity(&std::collections::BTreeMap::from([("title", "hello")])).unwrap();
//! let request = BulkWriteRequest::new(vec![BulkOperation::create(EntityId::new(), doc)], false);
//!
//! let bytes = request.encode().unwrap();
//! assert_eq!(BulkWriteRequest::decode(&bytes).unwrap(), request);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod document;
mod error;
mod id;
mod messages;
mod operation;
mod revision;

pub use conflict::{Conflict, ConflictPolicy, ManualResolution};
pub use document::Document;
pub use error::{ProtocolError, ProtocolResult};
pub use id::EntityId;
pub use messages::{
    BulkResultEntry, BulkWriteRequest, BulkWriteResponse, FetchRequest, FetchResponse,
    StoreMessage, StoredDocument, WriteOutcome,
};
pub use operation::{BulkOperation, OperationKind};
pub use revision::Revision;
