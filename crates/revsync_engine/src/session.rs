//! Document sessions.
//!
//! A session is the explicit unit-of-work boundary: entities are persisted,
//! found and mutated in memory, written out together by [`DocumentSession::flush`],
//! and forgotten by [`DocumentSession::close`].

use crate::config::SessionConfig;
use crate::error::{SyncError, SyncResult};
use crate::resolver::ConflictResolver;
use crate::synchronizer::{BulkSynchronizer, CancelHandle, FlushReport};
use crate::tracker::{LifecycleState, TrackedEntity, UnitOfWork};
use crate::transport::DocumentStore;
use revsync_protocol::{
    BulkWriteRequest, Conflict, ConflictPolicy, Document, EntityId, FetchRequest,
    ManualResolution, Revision, StoredDocument,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

/// Counters accumulated over the life of a session.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Flushes that reached the store.
    pub flushes: u64,
    /// Operations submitted across all flushes.
    pub operations_submitted: u64,
    /// Operations the store accepted.
    pub accepted: u64,
    /// Conflicts reported by the store.
    pub conflicts: u64,
    /// Conflicts the resolver settled.
    pub conflicts_resolved: u64,
    /// Rejections reported by the store.
    pub rejections: u64,
    /// Flushes that failed before results could be applied.
    pub failed_flushes: u64,
    /// When the last flush completed.
    pub last_flush_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// A unit of work bound to a document store.
pub struct DocumentSession<S: DocumentStore> {
    config: SessionConfig,
    store: S,
    uow: UnitOfWork,
    synchronizer: BulkSynchronizer,
    resolver: ConflictResolver,
    stats: SessionStats,
    closed: bool,
}

impl<S: DocumentStore> DocumentSession<S> {
    /// Opens a session.
    pub fn new(config: SessionConfig, store: S) -> Self {
        let synchronizer =
            BulkSynchronizer::new(config.force_bulk_writes, config.max_batch_operations);
        let resolver = ConflictResolver::new(config.conflict_policy);
        Self {
            config,
            store,
            uow: UnitOfWork::new(),
            synchronizer,
            resolver,
            stats: SessionStats::default(),
            closed: false,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the unit of work.
    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.uow
    }

    /// Returns the accumulated statistics.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Returns a handle that cancels the flush in progress.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.synchronizer.cancel_handle()
    }

    /// Changes the conflict policy used by later flushes.
    pub fn set_conflict_policy(&mut self, policy: ConflictPolicy) {
        self.config.conflict_policy = policy;
        self.resolver.set_policy(policy);
    }

    /// Registers the handler consulted under [`ConflictPolicy::Manual`].
    pub fn set_conflict_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&Conflict, Option<&StoredDocument>) -> ManualResolution + Send + 'static,
    {
        self.resolver.set_handler(handler);
    }

    /// Returns true once the session is closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Tracks a document under the given identity.
    pub fn register(
        &mut self,
        id: EntityId,
        document: Document,
        revision: Option<Revision>,
    ) -> SyncResult<LifecycleState> {
        self.ensure_open()?;
        self.uow.register(id, document, revision)
    }

    /// Tracks a new entity under a freshly generated identity.
    pub fn persist<T: Serialize + ?Sized>(&mut self, entity: &T) -> SyncResult<EntityId> {
        let id = EntityId::new();
        self.persist_with_id(id, entity)?;
        Ok(id)
    }

    /// Tracks a new entity under the given identity.
    pub fn persist_with_id<T: Serialize + ?Sized>(
        &mut self,
        id: EntityId,
        entity: &T,
    ) -> SyncResult<()> {
        self.ensure_open()?;
        let document = Document::from_entity(entity)?;
        self.uow.register(id, document, None)?;
        debug!(entity_id = %id, "persisted");
        Ok(())
    }

    /// Returns the entity, from memory if tracked, otherwise from the store.
    ///
    /// A fetched entity is registered as Managed. Removed entities read as
    /// absent.
    pub fn find<T: DeserializeOwned>(&mut self, id: EntityId) -> SyncResult<Option<T>> {
        self.ensure_open()?;
        if self.uow.contains(id) {
            return self.get(id);
        }

        let Some(stored) = self.store.fetch(&FetchRequest::new(id))?.document else {
            return Ok(None);
        };
        if stored.entity_id != id {
            return Err(SyncError::Protocol(format!(
                "fetched {} while asking for {id}",
                stored.entity_id
            )));
        }
        let entity = stored.document.to_entity()?;
        self.uow.register(id, stored.document, Some(stored.revision))?;
        Ok(Some(entity))
    }

    /// Returns a tracked entity without touching the store.
    pub fn get<T: DeserializeOwned>(&self, id: EntityId) -> SyncResult<Option<T>> {
        self.ensure_open()?;
        match self.uow.get(id) {
            Some(entity) if entity.state() != LifecycleState::Removed => {
                Ok(Some(entity.document().to_entity()?))
            }
            _ => Ok(None),
        }
    }

    /// Replaces a tracked entity's state.
    pub fn update<T: Serialize + ?Sized>(
        &mut self,
        id: EntityId,
        entity: &T,
    ) -> SyncResult<LifecycleState> {
        let document = Document::from_entity(entity)?;
        self.update_document(id, document)
    }

    /// Replaces a tracked entity's document.
    pub fn update_document(&mut self, id: EntityId, document: Document) -> SyncResult<LifecycleState> {
        self.ensure_open()?;
        self.uow.update(id, document)
    }

    /// Marks a tracked entity as changed.
    pub fn mark_dirty(&mut self, id: EntityId) -> SyncResult<LifecycleState> {
        self.ensure_open()?;
        self.uow.mark_dirty(id)
    }

    /// Schedules a tracked entity for deletion.
    pub fn remove(&mut self, id: EntityId) -> SyncResult<LifecycleState> {
        self.ensure_open()?;
        self.uow.mark_removed(id)
    }

    /// Stops tracking an entity.
    pub fn detach(&mut self, id: EntityId) -> SyncResult<TrackedEntity> {
        self.ensure_open()?;
        self.uow.detach(id).map(|(entity, _)| entity)
    }

    /// Lifecycle state of an entity.
    pub fn state(&self, id: EntityId) -> LifecycleState {
        self.uow.state(id)
    }

    /// Last-known revision of an entity.
    pub fn revision(&self, id: EntityId) -> Option<&Revision> {
        self.uow.revision(id)
    }

    /// The bulk request the next flush would submit.
    pub fn plan(&self) -> SyncResult<BulkWriteRequest> {
        self.ensure_open()?;
        self.synchronizer.plan(&self.uow)
    }

    /// Writes every pending change in one bulk request and resolves the
    /// conflicts it reports according to the session's policy.
    ///
    /// Unresolved conflicts and rejections are part of the report; use
    /// [`FlushReport::ensure_clean`] to treat them as errors.
    pub fn flush(&mut self) -> SyncResult<FlushReport> {
        self.ensure_open()?;

        let outcome = match self.synchronizer.flush(&mut self.uow, &self.store) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.stats.failed_flushes += 1;
                self.stats.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let mut report = outcome.report;
        report.resolutions =
            self.resolver
                .resolve(&outcome.conflicts, &mut self.uow, &self.store, &self.synchronizer)?;
        report.network_operations += self.resolver.last_network_operations();

        if report.network_operations > 0 {
            self.stats.flushes += 1;
            self.stats.last_flush_time = Some(Instant::now());
        }
        self.stats.operations_submitted += report.submitted as u64;
        self.stats.accepted += report.accepted as u64;
        self.stats.conflicts += report.conflicted as u64;
        self.stats.rejections += report.rejected as u64;
        self.stats.conflicts_resolved += report
            .resolutions
            .iter()
            .filter(|r| r.action.is_resolved())
            .count() as u64;

        if !report.resolutions.is_empty() {
            info!(
                policy = %self.resolver.policy(),
                conflicts = report.conflicted,
                unresolved = report.unresolved().len(),
                "conflicts processed"
            );
        }
        Ok(report)
    }

    /// Closes the session, detaching every tracked entity.
    ///
    /// Returns how many entities were dropped. Pending changes are not
    /// flushed. Every later call fails with [`SyncError::SessionClosed`].
    pub fn close(&mut self) -> SyncResult<usize> {
        self.ensure_open()?;
        let dropped = self.uow.len();
        self.uow.clear();
        self.closed = true;
        debug!(dropped, "session closed");
        Ok(dropped)
    }

    fn ensure_open(&self) -> SyncResult<()> {
        if self.closed {
            Err(SyncError::SessionClosed)
        } else {
            Ok(())
        }
    }
}
