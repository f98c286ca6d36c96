//! Test fixtures and session helpers.
//!
//! Provides a sample entity type and sessions bound to an in-process
//! reference store.

use revsync_engine::{DocumentSession, SessionConfig};
use revsync_protocol::EntityId;
use revsync_store::{DocumentServer, MemoryStore, StoreConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Database name used by fixtures.
pub const TEST_DATABASE: &str = "testkit";

/// A small entity used throughout the tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    /// Display name.
    pub name: String,
    /// Units in stock.
    pub count: u32,
    /// Free-form labels.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Creates a widget without tags.
pub fn widget(name: &str, count: u32) -> Widget {
    Widget {
        name: name.to_string(),
        count,
        tags: Vec::new(),
    }
}

/// A reference store shared by any number of sessions.
#[derive(Clone)]
pub struct TestBackend {
    server: Arc<DocumentServer>,
}

impl TestBackend {
    /// Creates a backend with the default store configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a backend with a custom store configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            server: Arc::new(DocumentServer::new(TEST_DATABASE, config)),
        }
    }

    /// The server.
    pub fn server(&self) -> &Arc<DocumentServer> {
        &self.server
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        self.server.store()
    }

    /// Opens a session with the default session configuration.
    pub fn session(&self) -> DocumentSession<Arc<DocumentServer>> {
        self.session_with(SessionConfig::new(TEST_DATABASE))
    }

    /// Opens a session with a custom configuration.
    pub fn session_with(&self, config: SessionConfig) -> DocumentSession<Arc<DocumentServer>> {
        DocumentSession::new(config, Arc::clone(&self.server))
    }
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a fresh backend and one session on it.
pub fn with_session<F, R>(f: F) -> R
where
    F: FnOnce(&mut DocumentSession<Arc<DocumentServer>>, &TestBackend) -> R,
{
    let backend = TestBackend::new();
    let mut session = backend.session();
    f(&mut session, &backend)
}

/// Creates a backend holding `count` widgets, written through one
/// session, and returns their identities in creation order.
pub fn populated_backend(count: usize) -> (TestBackend, Vec<EntityId>) {
    let backend = TestBackend::new();
    let mut session = backend.session();
    let ids = (0..count)
        .map(|i| {
            session
                .persist(&widget(&format!("widget-{i}"), i as u32))
                .expect("persist fixture widget")
        })
        .collect();
    session
        .flush()
        .and_then(|report| report.ensure_clean())
        .expect("flush fixture widgets");
    (backend, ids)
}
