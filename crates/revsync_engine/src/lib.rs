//! # revsync engine
//!
//! Write-behind change tracking and bulk synchronization against a
//! revisioned document store.
//!
//! This crate provides:
//! - A unit of work that tracks entity lifecycles and snapshots
//! - A revision store holding the last-known revision per entity
//! - A bulk synchronizer that writes every pending change in one request
//! - A conflict resolver applying fail, first-write-wins, last-write-wins
//!   or manual policies
//! - Store transports: a trait, a mock, and CBOR over HTTP
//!
//! ## Key Invariants
//!
//! - One flush is one bulk request; it is never split
//! - Results are applied only after the whole response is validated
//! - A write against a stale revision is reported, never overwritten
//! - A failed network operation leaves every lifecycle state and revision as it was

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod resolver;
mod revisions;
mod session;
mod synchronizer;
mod tracker;
mod transport;

pub use config::{SessionConfig, DEFAULT_MAX_BATCH_OPERATIONS, DEFAULT_REQUEST_TIMEOUT};
pub use error::{SyncError, SyncResult};
pub use http::{
    HttpClient, HttpFailure, HttpTransport, LoopbackClient, LoopbackServer, BULK_DOCS_PATH,
    FETCH_PATH,
};
pub use resolver::{ConflictResolver, ManualHandler, ResolutionAction, ResolutionOutcome};
pub use revisions::RevisionStore;
pub use session::{DocumentSession, SessionStats};
pub use synchronizer::{BulkSynchronizer, CancelHandle, FlushOutcome, FlushReport};
pub use tracker::{ApplyEffect, ChangeSet, ChangeSetEntry, LifecycleState, TrackedEntity, UnitOfWork};
pub use transport::{DocumentStore, MockStore};
