//! Conflict resolution.

use crate::error::{SyncError, SyncResult};
use crate::synchronizer::BulkSynchronizer;
use crate::tracker::{LifecycleState, UnitOfWork};
use crate::transport::DocumentStore;
use revsync_protocol::{
    Conflict, ConflictPolicy, Document, EntityId, FetchRequest, ManualResolution, OperationKind,
    Revision, StoredDocument,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

/// Callback consulted for each conflict under [`ConflictPolicy::Manual`].
///
/// Receives the conflict and the store's current state of the document
/// (none if the store no longer holds it).
pub type ManualHandler =
    Box<dyn FnMut(&Conflict, Option<&StoredDocument>) -> ManualResolution + Send>;

/// What the resolver did with a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionAction {
    /// Left for the caller; the entity keeps its pending write.
    Surfaced,
    /// A manual handler deferred the decision.
    Deferred,
    /// Local changes were dropped in favour of the stored document.
    AcceptedRemote,
    /// The store no longer holds the document and the local record was detached.
    Detached,
    /// The local write was resubmitted and accepted.
    Resubmitted,
    /// The local write was resubmitted and conflicted again.
    StillConflicted,
    /// The local write was resubmitted and rejected.
    Rejected(String),
}

impl ResolutionAction {
    /// Returns true if the conflict no longer needs attention.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            ResolutionAction::AcceptedRemote
                | ResolutionAction::Detached
                | ResolutionAction::Resubmitted
        )
    }
}

impl fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionAction::Surfaced => f.write_str("surfaced"),
            ResolutionAction::Deferred => f.write_str("deferred"),
            ResolutionAction::AcceptedRemote => f.write_str("accepted-remote"),
            ResolutionAction::Detached => f.write_str("detached"),
            ResolutionAction::Resubmitted => f.write_str("resubmitted"),
            ResolutionAction::StillConflicted => f.write_str("still-conflicted"),
            ResolutionAction::Rejected(reason) => write!(f, "rejected ({reason})"),
        }
    }
}

/// Result of resolving one conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionOutcome {
    /// Entity ID.
    pub entity_id: EntityId,
    /// What was done.
    pub action: ResolutionAction,
    /// Lifecycle state afterwards.
    pub state: LifecycleState,
    /// Last-known revision afterwards.
    pub revision: Option<Revision>,
}

enum Plan {
    Leave(ResolutionAction),
    TakeRemote(Option<StoredDocument>),
    KeepLocal(Option<StoredDocument>),
    Merge(Option<StoredDocument>, Document),
}

/// Applies a [`ConflictPolicy`] to the conflicts of a flush.
pub struct ConflictResolver {
    policy: ConflictPolicy,
    handler: Option<ManualHandler>,
    network_operations: usize,
}

impl fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("policy", &self.policy)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(ConflictPolicy::default())
    }
}

impl ConflictResolver {
    /// Creates a resolver for the given policy.
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            handler: None,
            network_operations: 0,
        }
    }

    /// Returns the policy.
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Changes the policy.
    pub fn set_policy(&mut self, policy: ConflictPolicy) {
        self.policy = policy;
    }

    /// Registers the handler used by the manual policy.
    pub fn set_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&Conflict, Option<&StoredDocument>) -> ManualResolution + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    /// Returns true if a manual handler is registered.
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Network operations performed by the last call to [`resolve`](Self::resolve).
    pub fn last_network_operations(&self) -> usize {
        self.network_operations
    }

    /// Resolves every conflict, emitting one outcome per conflict in order.
    ///
    /// Every conflict must name a distinct tracked entity; otherwise the call
    /// fails before anything changes. Resubmissions of one call travel
    /// together in a single bulk request and are attempted once. Network
    /// failures while resolving leave the affected conflicts unresolved
    /// rather than failing the call.
    pub fn resolve<S: DocumentStore + ?Sized>(
        &mut self,
        conflicts: &[Conflict],
        uow: &mut UnitOfWork,
        store: &S,
        synchronizer: &BulkSynchronizer,
    ) -> SyncResult<Vec<ResolutionOutcome>> {
        self.network_operations = 0;
        if conflicts.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::with_capacity(conflicts.len());
        for conflict in conflicts {
            let id = conflict.entity_id;
            if !uow.contains(id) {
                return Err(SyncError::UnknownEntity(id));
            }
            if !seen.insert(id) {
                return Err(SyncError::DuplicateIdentity(id));
            }
        }

        let plans: Vec<Plan> = conflicts
            .iter()
            .map(|conflict| self.plan(conflict, store))
            .collect();

        let mut actions: HashMap<EntityId, ResolutionAction> = HashMap::new();
        let mut resubmit = Vec::new();

        for (conflict, plan) in conflicts.iter().zip(plans) {
            let id = conflict.entity_id;
            let action = match plan {
                Plan::Leave(action) => action,
                Plan::TakeRemote(Some(stored)) => {
                    uow.reload(id, stored.document, stored.revision)?;
                    ResolutionAction::AcceptedRemote
                }
                Plan::TakeRemote(None) => {
                    uow.detach(id)?;
                    ResolutionAction::Detached
                }
                Plan::KeepLocal(None) if conflict.kind == OperationKind::Delete => {
                    // already deleted remotely
                    uow.detach(id)?;
                    ResolutionAction::Detached
                }
                Plan::KeepLocal(remote) => {
                    uow.rebase(id, remote.map(|stored| stored.revision))?;
                    resubmit.push(id);
                    continue;
                }
                Plan::Merge(Some(stored), merged) => {
                    uow.reload(id, stored.document, stored.revision)?;
                    if uow.update(id, merged)? == LifecycleState::Managed {
                        ResolutionAction::AcceptedRemote
                    } else {
                        resubmit.push(id);
                        continue;
                    }
                }
                Plan::Merge(None, merged) => {
                    uow.detach(id)?;
                    uow.register(id, merged, None)?;
                    resubmit.push(id);
                    continue;
                }
            };
            debug!(entity_id = %id, action = %action, "conflict resolved");
            actions.insert(id, action);
        }

        if !resubmit.is_empty() {
            self.resubmit(&resubmit, uow, store, synchronizer, &mut actions);
        }

        Ok(conflicts
            .iter()
            .map(|conflict| {
                let id = conflict.entity_id;
                ResolutionOutcome {
                    entity_id: id,
                    action: actions
                        .remove(&id)
                        .unwrap_or(ResolutionAction::Surfaced),
                    state: uow.state(id),
                    revision: uow.revision(id).cloned(),
                }
            })
            .collect())
    }

    fn plan<S: DocumentStore + ?Sized>(&mut self, conflict: &Conflict, store: &S) -> Plan {
        if self.policy == ConflictPolicy::Fail {
            return Plan::Leave(ResolutionAction::Surfaced);
        }
        if self.policy == ConflictPolicy::Manual && self.handler.is_none() {
            warn!(entity_id = %conflict.entity_id, "manual conflict policy without a handler");
            return Plan::Leave(ResolutionAction::Surfaced);
        }

        self.network_operations += 1;
        let remote = match store.fetch(&FetchRequest::new(conflict.entity_id)) {
            Ok(response) => response.document,
            Err(e) => {
                warn!(entity_id = %conflict.entity_id, error = %e, "could not fetch remote state");
                return Plan::Leave(ResolutionAction::Surfaced);
            }
        };

        let decision = match (self.policy, self.handler.as_mut()) {
            (ConflictPolicy::FirstWriteWins, _) => ManualResolution::AcceptRemote,
            (ConflictPolicy::LastWriteWins, _) => ManualResolution::KeepLocal,
            (_, Some(handler)) => handler(conflict, remote.as_ref()),
            (_, None) => ManualResolution::Defer,
        };

        match decision {
            ManualResolution::AcceptRemote => Plan::TakeRemote(remote),
            ManualResolution::KeepLocal => Plan::KeepLocal(remote),
            ManualResolution::Merge(merged) => Plan::Merge(remote, merged),
            ManualResolution::Defer => Plan::Leave(ResolutionAction::Deferred),
        }
    }

    fn resubmit<S: DocumentStore + ?Sized>(
        &mut self,
        ids: &[EntityId],
        uow: &mut UnitOfWork,
        store: &S,
        synchronizer: &BulkSynchronizer,
        actions: &mut HashMap<EntityId, ResolutionAction>,
    ) {
        self.network_operations += 1;
        match synchronizer.flush_subset(uow, store, ids) {
            Ok(outcome) => {
                for id in ids {
                    let action = if outcome.report.conflicts.contains(id) {
                        ResolutionAction::StillConflicted
                    } else if let Some((_, reason)) =
                        outcome.report.rejections.iter().find(|(r, _)| r == id)
                    {
                        ResolutionAction::Rejected(reason.clone())
                    } else {
                        ResolutionAction::Resubmitted
                    };
                    if action != ResolutionAction::Resubmitted {
                        warn!(entity_id = %id, action = %action, "resubmission did not settle conflict");
                    }
                    actions.insert(*id, action);
                }
            }
            Err(e) => {
                warn!(error = %e, count = ids.len(), "resubmission failed");
                for id in ids {
                    actions.insert(*id, ResolutionAction::StillConflicted);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockStore;
    use revsync_protocol::{BulkResultEntry, BulkWriteResponse, WriteOutcome};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_entity(&value).unwrap()
    }

    fn id(n: u8) -> EntityId {
        EntityId::from_bytes([n; 16])
    }

    fn remote(n: u8, value: serde_json::Value, revision: &str) -> StoredDocument {
        StoredDocument {
            entity_id: id(n),
            document: doc(value),
            revision: revision.into(),
            conflicts: Vec::new(),
        }
    }

    /// Entity 1 is Dirty at revision "1" while the store holds revision "2".
    fn stale_update() -> (UnitOfWork, MockStore, Conflict) {
        let mut uow = UnitOfWork::new();
        uow.register(id(1), doc(json!({"v": 1})), Some("1".into())).unwrap();
        uow.update(id(1), doc(json!({"v": "local"}))).unwrap();

        let store = MockStore::new();
        store.set_document(remote(1, json!({"v": "remote"}), "2"));

        let conflict = Conflict::new(
            id(1),
            OperationKind::Update,
            Some("1".into()),
            Some("2".into()),
            Some(doc(json!({"v": "local"}))),
        );
        (uow, store, conflict)
    }

    fn resolve(
        resolver: &mut ConflictResolver,
        conflict: &Conflict,
        uow: &mut UnitOfWork,
        store: &MockStore,
    ) -> ResolutionOutcome {
        let sync = BulkSynchronizer::default();
        let mut outcomes = resolver.resolve(std::slice::from_ref(conflict), uow, store, &sync).unwrap();
        assert_eq!(outcomes.len(), 1);
        outcomes.remove(0)
    }

    #[test]
    fn fail_policy_surfaces_without_network() {
        let (mut uow, store, conflict) = stale_update();
        let outcome = resolve(&mut ConflictResolver::default(), &conflict, &mut uow, &store);

        assert_eq!(outcome.action, ResolutionAction::Surfaced);
        assert_eq!(outcome.state, LifecycleState::Dirty);
        assert_eq!(outcome.revision, Some("1".into()));
        assert!(store.fetch_requests().is_empty());
        assert_eq!(store.bulk_request_count(), 0);
    }

    #[test]
    fn first_write_wins_reloads_remote() {
        let (mut uow, store, conflict) = stale_update();
        let mut resolver = ConflictResolver::new(ConflictPolicy::FirstWriteWins);
        let outcome = resolve(&mut resolver, &conflict, &mut uow, &store);

        assert_eq!(outcome.action, ResolutionAction::AcceptedRemote);
        assert_eq!(outcome.state, LifecycleState::Managed);
        assert_eq!(outcome.revision, Some("2".into()));
        assert_eq!(uow.document(id(1)), Some(&doc(json!({"v": "remote"}))));
        assert_eq!(store.bulk_request_count(), 0);
    }

    #[test]
    fn first_write_wins_detaches_when_remote_is_gone() {
        let (mut uow, store, conflict) = stale_update();
        store.remove_document(id(1));
        let mut resolver = ConflictResolver::new(ConflictPolicy::FirstWriteWins);
        let outcome = resolve(&mut resolver, &conflict, &mut uow, &store);

        assert_eq!(outcome.action, ResolutionAction::Detached);
        assert!(!uow.contains(id(1)));
    }

    #[test]
    fn last_write_wins_resubmits_once_against_remote_revision() {
        let (mut uow, store, conflict) = stale_update();
        let mut resolver = ConflictResolver::new(ConflictPolicy::LastWriteWins);
        let outcome = resolve(&mut resolver, &conflict, &mut uow, &store);

        assert_eq!(outcome.action, ResolutionAction::Resubmitted);
        assert_eq!(outcome.state, LifecycleState::Managed);
        assert_eq!(store.bulk_request_count(), 1);
        assert_eq!(resolver.last_network_operations(), 2);

        let sent = &store.bulk_requests()[0].operations[0];
        assert_eq!(sent.kind, OperationKind::Update);
        assert_eq!(sent.expected_revision, Some("2".into()));
        assert_eq!(sent.document, Some(doc(json!({"v": "local"}))));
    }

    #[test]
    fn last_write_wins_conflicting_again_stays_conflicted() {
        let (mut uow, store, conflict) = stale_update();
        store.push_response(BulkWriteResponse::new(vec![BulkResultEntry::new(
            id(1),
            WriteOutcome::conflict(Some("3".into())),
        )]));
        let mut resolver = ConflictResolver::new(ConflictPolicy::LastWriteWins);
        let outcome = resolve(&mut resolver, &conflict, &mut uow, &store);

        assert_eq!(outcome.action, ResolutionAction::StillConflicted);
        assert_eq!(outcome.state, LifecycleState::Dirty);
        assert_eq!(store.bulk_request_count(), 1);
    }

    #[test]
    fn last_write_wins_network_failure_stays_conflicted() {
        let (mut uow, store, conflict) = stale_update();
        store.push_failure(SyncError::Timeout);
        let mut resolver = ConflictResolver::new(ConflictPolicy::LastWriteWins);
        let outcome = resolve(&mut resolver, &conflict, &mut uow, &store);

        assert_eq!(outcome.action, ResolutionAction::StillConflicted);
        assert_eq!(uow.in_doubt_ids(), vec![id(1)]);
    }

    #[test]
    fn last_write_wins_recreates_deleted_document() {
        let (mut uow, store, conflict) = stale_update();
        store.remove_document(id(1));
        let mut resolver = ConflictResolver::new(ConflictPolicy::LastWriteWins);
        let outcome = resolve(&mut resolver, &conflict, &mut uow, &store);

        assert_eq!(outcome.action, ResolutionAction::Resubmitted);
        assert_eq!(store.bulk_requests()[0].operations[0].kind, OperationKind::Create);
    }

    #[test]
    fn last_write_wins_delete_of_missing_document_is_settled() {
        let mut uow = UnitOfWork::new();
        uow.register(id(1), doc(json!({})), Some("1".into())).unwrap();
        uow.mark_removed(id(1)).unwrap();
        let store = MockStore::new();
        let conflict = Conflict::new(id(1), OperationKind::Delete, Some("1".into()), None, None);

        let mut resolver = ConflictResolver::new(ConflictPolicy::LastWriteWins);
        let outcome = resolve(&mut resolver, &conflict, &mut uow, &store);
        assert_eq!(outcome.action, ResolutionAction::Detached);
        assert_eq!(store.bulk_request_count(), 0);
    }

    #[test]
    fn manual_without_handler_surfaces() {
        let (mut uow, store, conflict) = stale_update();
        let mut resolver = ConflictResolver::new(ConflictPolicy::Manual);
        let outcome = resolve(&mut resolver, &conflict, &mut uow, &store);
        assert_eq!(outcome.action, ResolutionAction::Surfaced);
        assert_eq!(outcome.state, LifecycleState::Dirty);
    }

    #[test]
    fn manual_merge_resubmits_merged_document() {
        let (mut uow, store, conflict) = stale_update();
        let mut resolver = ConflictResolver::new(ConflictPolicy::Manual);
        resolver.set_handler(|conflict, remote| {
            assert_eq!(conflict.entity_id, EntityId::from_bytes([1; 16]));
            assert!(remote.is_some());
            ManualResolution::Merge(Document::from_entity(&json!({"v": "merged"})).unwrap())
        });
        let outcome = resolve(&mut resolver, &conflict, &mut uow, &store);

        assert_eq!(outcome.action, ResolutionAction::Resubmitted);
        let sent = &store.bulk_requests()[0].operations[0];
        assert_eq!(sent.expected_revision, Some("2".into()));
        assert_eq!(sent.document, Some(doc(json!({"v": "merged"}))));
        assert_eq!(uow.document(id(1)), Some(&doc(json!({"v": "merged"}))));
    }

    #[test]
    fn manual_defer_and_accept_remote() {
        let (mut uow, store, conflict) = stale_update();
        let mut resolver = ConflictResolver::new(ConflictPolicy::Manual);
        resolver.set_handler(|_, _| ManualResolution::Defer);
        let outcome = resolve(&mut resolver, &conflict, &mut uow, &store);
        assert_eq!(outcome.action, ResolutionAction::Deferred);
        assert!(!outcome.action.is_resolved());

        resolver.set_handler(|_, _| ManualResolution::AcceptRemote);
        let outcome = resolve(&mut resolver, &conflict, &mut uow, &store);
        assert_eq!(outcome.action, ResolutionAction::AcceptedRemote);
        assert_eq!(outcome.revision, Some("2".into()));
    }

    #[test]
    fn untracked_conflict_changes_nothing() {
        let (mut uow, store, conflict) = stale_update();
        let stray = Conflict::new(id(9), OperationKind::Update, Some("1".into()), None, None);
        let mut resolver = ConflictResolver::new(ConflictPolicy::FirstWriteWins);

        let result = resolver.resolve(
            &[conflict, stray],
            &mut uow,
            &store,
            &BulkSynchronizer::default(),
        );
        assert!(matches!(result, Err(SyncError::UnknownEntity(stray)) if stray == id(9)));
        assert_eq!(uow.state(id(1)), LifecycleState::Dirty);
        assert_eq!(uow.revision(id(1)), Some(&Revision::from("1")));
        assert!(store.fetch_requests().is_empty());
    }

    #[test]
    fn repeated_conflict_changes_nothing() {
        let (mut uow, store, conflict) = stale_update();
        let mut resolver = ConflictResolver::new(ConflictPolicy::LastWriteWins);

        let result = resolver.resolve(
            &[conflict.clone(), conflict],
            &mut uow,
            &store,
            &BulkSynchronizer::default(),
        );
        assert!(matches!(result, Err(SyncError::DuplicateIdentity(_))));
        assert_eq!(uow.revision(id(1)), Some(&Revision::from("1")));
        assert_eq!(store.bulk_request_count(), 0);
    }
}
