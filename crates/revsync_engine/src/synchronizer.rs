//! Bulk synchronization of a unit of work.
//!
//! A flush turns every pending entity into one operation of a single bulk
//! request. The response is checked in full before any entity is touched,
//! then applied entity by entity. Conflicts come back as data in the
//! [`FlushOutcome`] for the resolver; they are never raised mid-batch.

use crate::error::{SyncError, SyncResult};
use crate::resolver::ResolutionOutcome;
use crate::tracker::{ApplyEffect, ChangeSet, LifecycleState, UnitOfWork};
use crate::transport::DocumentStore;
use revsync_protocol::{
    BulkWriteRequest, BulkWriteResponse, Conflict, EntityId, FetchRequest, Revision,
    StoredDocument, WriteOutcome,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Cancels an in-progress flush from another thread.
///
/// A flush checks the handle before sending and again once the response has
/// arrived. A cancellation is consumed by the flush it stops.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Creates a handle that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clears a pending cancellation.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.cancelled.swap(false, Ordering::SeqCst)
    }
}

/// Summary of one flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    /// Operations submitted in the bulk request.
    pub submitted: usize,
    /// Operations the store accepted.
    pub accepted: usize,
    /// Operations that conflicted.
    pub conflicted: usize,
    /// Operations the store rejected.
    pub rejected: usize,
    /// Identities whose write conflicted.
    pub conflicts: Vec<EntityId>,
    /// Identities whose write was rejected, with the store's reason.
    pub rejections: Vec<(EntityId, String)>,
    /// Identities whose remote revision a forced write replaced, with the
    /// revision that was displaced.
    pub displaced: Vec<(EntityId, Revision)>,
    /// In-doubt identities whose earlier write was found to have landed.
    pub reconciled: Vec<EntityId>,
    /// What the conflict resolver did, one entry per conflict.
    pub resolutions: Vec<ResolutionOutcome>,
    /// Network operations the flush performed.
    pub network_operations: usize,
}

impl FlushReport {
    /// Conflicted identities the resolver did not settle.
    pub fn unresolved(&self) -> Vec<EntityId> {
        self.conflicts
            .iter()
            .copied()
            .filter(|id| {
                self.resolutions
                    .iter()
                    .find(|r| r.entity_id == *id)
                    .map_or(true, |r| !r.action.is_resolved())
            })
            .collect()
    }

    /// Returns true if every submitted write ended up stored.
    pub fn is_clean(&self) -> bool {
        self.rejections.is_empty() && self.unresolved().is_empty()
    }

    /// Converts leftover conflicts or rejections into an error.
    pub fn ensure_clean(self) -> SyncResult<Self> {
        let unresolved = self.unresolved();
        if !unresolved.is_empty() {
            return Err(SyncError::Conflicts(unresolved));
        }
        if !self.rejections.is_empty() {
            return Err(SyncError::Rejected(self.rejections));
        }
        Ok(self)
    }
}

/// Result of a flush: the report plus conflicts to hand to the resolver.
#[derive(Debug, Clone, Default)]
pub struct FlushOutcome {
    /// Per-flush summary.
    pub report: FlushReport,
    /// Conflicting writes, in submission order.
    pub conflicts: Vec<Conflict>,
}

/// Builds, submits and applies bulk writes for a unit of work.
#[derive(Debug, Clone, Default)]
pub struct BulkSynchronizer {
    force: bool,
    max_batch_operations: Option<usize>,
    cancel: CancelHandle,
}

impl BulkSynchronizer {
    /// Creates a synchronizer.
    pub fn new(force: bool, max_batch_operations: Option<usize>) -> Self {
        Self {
            force,
            max_batch_operations,
            cancel: CancelHandle::new(),
        }
    }

    /// Uses the given cancel handle.
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the cancel handle.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Returns true if writes are forced.
    pub fn is_forced(&self) -> bool {
        self.force
    }

    /// Builds the request the next flush would submit, without sending it.
    pub fn plan(&self, uow: &UnitOfWork) -> SyncResult<BulkWriteRequest> {
        let change_set = uow.compute_change_set();
        self.check_batch_size(&change_set)?;
        Ok(change_set.to_request(self.force))
    }

    /// Flushes every pending entity in one bulk request.
    pub fn flush<S: DocumentStore + ?Sized>(
        &self,
        uow: &mut UnitOfWork,
        store: &S,
    ) -> SyncResult<FlushOutcome> {
        let mut report = FlushReport::default();
        let reconciliation = self.reconcile_in_doubt(uow, store, &mut report)?;

        let change_set = uow
            .compute_change_set()
            .filter(|e| !reconciliation.adopts(e.entity_id));
        self.submit(uow, store, change_set, report, reconciliation)
    }

    /// Flushes only the listed entities, in one bulk request.
    pub fn flush_subset<S: DocumentStore + ?Sized>(
        &self,
        uow: &mut UnitOfWork,
        store: &S,
        ids: &[EntityId],
    ) -> SyncResult<FlushOutcome> {
        let wanted: HashSet<EntityId> = ids.iter().copied().collect();
        let change_set = uow.compute_change_set().filter(|e| wanted.contains(&e.entity_id));
        self.submit(
            uow,
            store,
            change_set,
            FlushReport::default(),
            Reconciliation::default(),
        )
    }

    fn submit<S: DocumentStore + ?Sized>(
        &self,
        uow: &mut UnitOfWork,
        store: &S,
        change_set: ChangeSet,
        mut report: FlushReport,
        reconciliation: Reconciliation,
    ) -> SyncResult<FlushOutcome> {
        if change_set.is_empty() {
            reconciliation.apply(uow, &mut report)?;
            debug!("nothing to flush");
            return Ok(FlushOutcome {
                report,
                conflicts: Vec::new(),
            });
        }

        self.check_batch_size(&change_set)?;
        let request = change_set.to_request(self.force);
        request.validate()?;

        if self.cancel.take() {
            warn!(operations = request.len(), "flush cancelled before sending");
            return Err(SyncError::Cancelled);
        }

        let ids = change_set.ids();
        let (creates, updates, deletes) = change_set.counts();
        debug!(
            operations = request.len(),
            creates,
            updates,
            deletes,
            force = self.force,
            "submitting bulk write"
        );

        let start = Instant::now();
        let response = match store.bulk_write(&request) {
            Ok(response) => response,
            Err(e) => {
                if e.leaves_outcome_unknown() {
                    uow.mark_in_doubt(&ids);
                }
                warn!(error = %e, operations = ids.len(), "bulk write failed");
                return Err(e);
            }
        };
        report.network_operations += 1;

        if self.cancel.take() {
            uow.mark_in_doubt(&ids);
            warn!(operations = ids.len(), "flush cancelled after sending, response discarded");
            return Err(SyncError::Cancelled);
        }

        if let Err(e) = validate_response(&change_set, &response) {
            uow.mark_in_doubt(&ids);
            warn!(error = %e, "bulk write response rejected");
            return Err(e);
        }

        reconciliation.apply(uow, &mut report)?;
        report.submitted = change_set.len();
        let mut conflicts = Vec::new();

        for result in response.results {
            let Some(entry) = change_set.entry(result.entity_id) else {
                continue;
            };
            let displaced = match &result.outcome {
                WriteOutcome::Accepted { displaced, .. } => displaced.clone(),
                _ => None,
            };

            match uow.apply_result(result.entity_id, &result.outcome)? {
                ApplyEffect::Synced(_) | ApplyEffect::Purged => {
                    report.accepted += 1;
                    if let Some(previous) = displaced {
                        warn!(entity_id = %result.entity_id, displaced = %previous, "forced write displaced a remote revision");
                        report.displaced.push((result.entity_id, previous));
                    }
                }
                ApplyEffect::Conflicted(current) => {
                    warn!(
                        entity_id = %result.entity_id,
                        kind = %entry.kind,
                        expected = ?entry.expected_revision,
                        current = ?current,
                        "write conflicted"
                    );
                    report.conflicted += 1;
                    report.conflicts.push(result.entity_id);
                    conflicts.push(Conflict::new(
                        result.entity_id,
                        entry.kind,
                        entry.expected_revision.clone(),
                        current,
                        entry.document.clone(),
                    ));
                }
                ApplyEffect::Rejected(reason) => {
                    warn!(entity_id = %result.entity_id, reason = %reason, "write rejected");
                    report.rejected += 1;
                    report.rejections.push((result.entity_id, reason));
                }
            }
        }

        info!(
            submitted = report.submitted,
            accepted = report.accepted,
            conflicted = report.conflicted,
            rejected = report.rejected,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "flush complete"
        );

        Ok(FlushOutcome { report, conflicts })
    }

    fn check_batch_size(&self, change_set: &ChangeSet) -> SyncResult<()> {
        match self.max_batch_operations {
            Some(limit) if change_set.len() > limit => Err(SyncError::BatchTooLarge {
                size: change_set.len(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    /// Re-reads entities whose last write has an unknown outcome and works
    /// out which writes landed. The tracker is left untouched; the result is
    /// applied only once the flush commits.
    fn reconcile_in_doubt<S: DocumentStore + ?Sized>(
        &self,
        uow: &UnitOfWork,
        store: &S,
        report: &mut FlushReport,
    ) -> SyncResult<Reconciliation> {
        let doubtful = uow.in_doubt_ids();
        if doubtful.is_empty() {
            return Ok(Reconciliation::default());
        }
        debug!(count = doubtful.len(), "reconciling in-doubt writes");

        let mut reconciliation = Reconciliation::default();
        for id in doubtful {
            let response = store.fetch(&FetchRequest::new(id))?;
            report.network_operations += 1;
            if landed(uow, id, response.document.as_ref()) {
                debug!(entity_id = %id, "in-doubt write had landed");
                reconciliation.adopted.push((id, response.document));
            } else {
                reconciliation.unsettled.push(id);
            }
        }
        Ok(reconciliation)
    }
}

/// What reconciling in-doubt entities found, pending application.
#[derive(Debug, Default)]
struct Reconciliation {
    /// Entities whose write landed, with the store's copy (`None` once a
    /// delete landed).
    adopted: Vec<(EntityId, Option<StoredDocument>)>,
    /// Entities whose write did not land and is submitted again.
    unsettled: Vec<EntityId>,
}

impl Reconciliation {
    fn adopts(&self, id: EntityId) -> bool {
        self.adopted.iter().any(|(adopted, _)| *adopted == id)
    }

    fn apply(self, uow: &mut UnitOfWork, report: &mut FlushReport) -> SyncResult<()> {
        for (id, stored) in self.adopted {
            match stored {
                Some(stored) => uow.reload(id, stored.document, stored.revision)?,
                None => {
                    uow.detach(id)?;
                }
            }
            report.reconciled.push(id);
        }
        for id in self.unsettled {
            uow.clear_in_doubt(id);
        }
        Ok(())
    }
}

/// Returns true if the store already holds what the entity's pending write
/// would produce.
fn landed(uow: &UnitOfWork, id: EntityId, stored: Option<&StoredDocument>) -> bool {
    let Some(entity) = uow.get(id) else {
        return false;
    };
    match (entity.state(), stored) {
        (LifecycleState::Removed, None) => true,
        (LifecycleState::New | LifecycleState::Dirty, Some(stored)) => {
            stored.document == *entity.document()
                && uow.revision(id) != Some(&stored.revision)
        }
        _ => false,
    }
}

/// Checks that the response carries exactly one result per submitted
/// operation and nothing else.
fn validate_response(change_set: &ChangeSet, response: &BulkWriteResponse) -> SyncResult<()> {
    if response.results.len() != change_set.len() {
        return Err(SyncError::Protocol(format!(
            "expected {} results, got {}",
            change_set.len(),
            response.results.len()
        )));
    }

    let mut seen = HashSet::with_capacity(response.results.len());
    for result in &response.results {
        if change_set.entry(result.entity_id).is_none() {
            return Err(SyncError::Protocol(format!(
                "result for unsubmitted entity {}",
                result.entity_id
            )));
        }
        if !seen.insert(result.entity_id) {
            return Err(SyncError::Protocol(format!(
                "duplicate result for entity {}",
                result.entity_id
            )));
        }
    }
    Ok(())
}
