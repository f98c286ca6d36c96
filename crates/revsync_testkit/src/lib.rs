//! # revsync Testkit
//!
//! Test utilities for revsync.
//!
//! This crate provides:
//! - Fixtures: sample entities and sessions bound to a reference store
//! - A fault-injecting store for network failure tests
//! - Property-based test generators using proptest
//! - A model runner that replays generated steps against a session
//!
//! ## Usage
//!
//! ```rust
//! use revsync_testkit::prelude::*;
//!
//! let backend = TestBackend::new();
//! let mut session = backend.session();
//! let id = session.persist(&widget("bolt", 3)).unwrap();
//! session.flush().unwrap().ensure_clean().unwrap();
//! assert!(backend.store().fetch(id).is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod scenarios;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::scenarios::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use scenarios::*;
