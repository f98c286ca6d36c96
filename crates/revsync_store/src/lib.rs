//! # revsync store
//!
//! A reference revisioned document store for the revsync engine.
//!
//! This crate provides:
//! - `MemoryStore`, which applies bulk writes with per-document revision
//!   checks, forced writes and tombstones
//! - `DocumentServer`, which serves the `_bulk_docs` and `_fetch` endpoints
//!   with CBOR bodies
//! - `DocumentStore` and `LoopbackServer` implementations so an engine
//!   session can use the server in-process
//!
//! ## Example
//!
//! ```
//! use revsync_engine::{DocumentSession, SessionConfig};
//! use revsync_store::{DocumentServer, StoreConfig};
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! let server = Arc::new(DocumentServer::new("default", StoreConfig::default()));
//! let mut session = DocumentSession::new(SessionConfig::default(), Arc::clone(&server));
//!
//! let id = session.persist(&BTreeMap::from([("sku", "A-1")])).unwrap();
//! session.flush().unwrap();
//! assert!(server.store().fetch(id).is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod handler;
mod local;
mod server;
mod store;

pub use config::{RevisionScheme, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use handler::RequestHandler;
pub use server::DocumentServer;
pub use store::MemoryStore;
