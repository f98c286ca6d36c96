//! Unit-of-work change tracking.
//!
//! The tracker holds every entity a session knows about together with the
//! snapshot it was last synchronized at. Nothing here talks to the store:
//! the synchronizer asks for a change set, submits it, and feeds each
//! per-entity outcome back through [`UnitOfWork::apply_result`].
//!
//! ## Lifecycle
//!
//! ```text
//! New ──accepted create──▶ Managed ──mutation──▶ Dirty
//!  │                         ▲  │                  │
//!  │                         └──┼─accepted update──┘
//!  │                            ▼
//!  └──────(purged)───────────▶ Removed ──accepted delete──▶ (purged)
//!
//! any ──detach──▶ Detached
//! ```

use crate::error::{SyncError, SyncResult};
use crate::revisions::RevisionStore;
use revsync_protocol::{
    BulkOperation, BulkWriteRequest, Document, EntityId, OperationKind, Revision, WriteOutcome,
};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle state of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Registered locally, never written to the store.
    New,
    /// In sync with the last-known revision.
    Managed,
    /// Changed since the last synchronization.
    Dirty,
    /// Scheduled for deletion at the next flush.
    Removed,
    /// No longer tracked.
    Detached,
}

impl LifecycleState {
    /// Returns true if the entity contributes an operation to the next flush.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            LifecycleState::New | LifecycleState::Dirty | LifecycleState::Removed
        )
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::New => "new",
            LifecycleState::Managed => "managed",
            LifecycleState::Dirty => "dirty",
            LifecycleState::Removed => "removed",
            LifecycleState::Detached => "detached",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity owned by a unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntity {
    id: EntityId,
    document: Document,
    snapshot: Option<Document>,
    state: LifecycleState,
    sequence: u64,
    in_doubt: bool,
}

impl TrackedEntity {
    /// Entity ID.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Current local state.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// State as of the last synchronization, absent for new entities.
    pub fn snapshot(&self) -> Option<&Document> {
        self.snapshot.as_ref()
    }

    /// Lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Registration order within the unit of work.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// True if a write for this entity was submitted but its outcome is unknown.
    pub fn is_in_doubt(&self) -> bool {
        self.in_doubt
    }
}

/// One pending write, computed at flush time.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSetEntry {
    /// Entity ID.
    pub entity_id: EntityId,
    /// Lifecycle state the entry was derived from.
    pub state: LifecycleState,
    /// Operation to submit.
    pub kind: OperationKind,
    /// Revision the write is based on. Absent for creates.
    pub expected_revision: Option<Revision>,
    /// Payload. Absent for deletes.
    pub document: Option<Document>,
    /// Top-level fields that differ from the snapshot.
    pub changed_fields: Vec<String>,
}

impl ChangeSetEntry {
    /// Converts the entry into a wire operation.
    pub fn to_operation(&self) -> BulkOperation {
        BulkOperation {
            kind: self.kind,
            entity_id: self.entity_id,
            expected_revision: self.expected_revision.clone(),
            document: self.document.clone(),
        }
    }
}

/// The ordered set of pending writes for one flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    entries: Vec<ChangeSetEntry>,
}

impl ChangeSet {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in registration order.
    pub fn entries(&self) -> &[ChangeSetEntry] {
        &self.entries
    }

    /// Iterates over the entries.
    pub fn iter(&self) -> impl Iterator<Item = &ChangeSetEntry> {
        self.entries.iter()
    }

    /// Entity IDs in submission order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.entries.iter().map(|e| e.entity_id).collect()
    }

    /// Looks up the entry for an entity.
    pub fn entry(&self, entity_id: EntityId) -> Option<&ChangeSetEntry> {
        self.entries.iter().find(|e| e.entity_id == entity_id)
    }

    /// Counts entries of each kind as (creates, updates, deletes).
    pub fn counts(&self) -> (usize, usize, usize) {
        self.entries
            .iter()
            .fold((0, 0, 0), |(c, u, d), e| match e.kind {
                OperationKind::Create => (c + 1, u, d),
                OperationKind::Update => (c, u + 1, d),
                OperationKind::Delete => (c, u, d + 1),
            })
    }

    /// Keeps only the entries matching `keep`.
    pub fn filter(mut self, keep: impl Fn(&ChangeSetEntry) -> bool) -> Self {
        self.entries.retain(|e| keep(e));
        self
    }

    /// Builds the bulk request that submits the whole change set.
    pub fn to_request(&self, force: bool) -> BulkWriteRequest {
        BulkWriteRequest::new(
            self.entries.iter().map(ChangeSetEntry::to_operation).collect(),
            force,
        )
    }
}

/// What applying a store outcome did to the tracked entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyEffect {
    /// The entity is Managed at the new revision.
    Synced(Revision),
    /// The delete landed and the entity is no longer tracked.
    Purged,
    /// The write conflicted; the entity is unchanged.
    Conflicted(Option<Revision>),
    /// The write was rejected; the entity is unchanged.
    Rejected(String),
}

/// Tracks entities between flushes.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    entities: HashMap<EntityId, TrackedEntity>,
    revisions: RevisionStore,
    next_sequence: u64,
}

impl UnitOfWork {
    /// Creates an empty unit of work.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking an entity.
    ///
    /// Without a revision the entity is New; with one it is Managed and the
    /// document becomes its snapshot.
    pub fn register(
        &mut self,
        id: EntityId,
        document: Document,
        initial_revision: Option<Revision>,
    ) -> SyncResult<LifecycleState> {
        if self.entities.contains_key(&id) {
            return Err(SyncError::DuplicateIdentity(id));
        }

        let (state, snapshot) = match initial_revision {
            Some(revision) => {
                self.revisions.set(id, revision);
                (LifecycleState::Managed, Some(document.clone()))
            }
            None => (LifecycleState::New, None),
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entities.insert(
            id,
            TrackedEntity {
                id,
                document,
                snapshot,
                state,
                sequence,
                in_doubt: false,
            },
        );
        Ok(state)
    }

    /// Replaces an entity's current state.
    pub fn update(&mut self, id: EntityId, document: Document) -> SyncResult<LifecycleState> {
        let entity = lookup(&mut self.entities, id)?;
        match entity.state {
            LifecycleState::Removed | LifecycleState::Detached => {
                return Err(SyncError::invalid_transition(
                    id,
                    entity.state,
                    LifecycleState::Dirty,
                ));
            }
            LifecycleState::Managed if entity.snapshot.as_ref() != Some(&document) => {
                entity.state = LifecycleState::Dirty;
            }
            _ => {}
        }
        entity.document = document;
        Ok(entity.state)
    }

    /// Marks a Managed entity as changed.
    pub fn mark_dirty(&mut self, id: EntityId) -> SyncResult<LifecycleState> {
        let entity = lookup(&mut self.entities, id)?;
        match entity.state {
            LifecycleState::Managed => entity.state = LifecycleState::Dirty,
            LifecycleState::New | LifecycleState::Dirty => {}
            LifecycleState::Removed | LifecycleState::Detached => {
                return Err(SyncError::invalid_transition(
                    id,
                    entity.state,
                    LifecycleState::Dirty,
                ));
            }
        }
        Ok(entity.state)
    }

    /// Schedules an entity for deletion.
    ///
    /// A New entity was never stored, so it is dropped at once and
    /// `Detached` is returned.
    pub fn mark_removed(&mut self, id: EntityId) -> SyncResult<LifecycleState> {
        let entity = lookup(&mut self.entities, id)?;
        match entity.state {
            LifecycleState::Managed | LifecycleState::Dirty => {
                entity.state = LifecycleState::Removed;
                Ok(LifecycleState::Removed)
            }
            LifecycleState::New => {
                self.entities.remove(&id);
                Ok(LifecycleState::Detached)
            }
            state => Ok(state),
        }
    }

    /// Collects every New, Dirty and Removed entity in registration order.
    pub fn compute_change_set(&self) -> ChangeSet {
        let mut pending: Vec<&TrackedEntity> = self
            .entities
            .values()
            .filter(|e| e.state.is_pending())
            .collect();
        pending.sort_by_key(|e| e.sequence);

        let entries = pending
            .into_iter()
            .filter_map(|entity| self.change_for(entity))
            .collect();
        ChangeSet { entries }
    }

    fn change_for(&self, entity: &TrackedEntity) -> Option<ChangeSetEntry> {
        let revision = self.revisions.get(&entity.id).cloned();
        let changed_fields = match &entity.snapshot {
            Some(snapshot) => entity.document.changed_fields(snapshot),
            None => entity.document.field_names().map(str::to_owned).collect(),
        };

        let (kind, expected_revision, document) = match (entity.state, revision) {
            (LifecycleState::Removed, Some(rev)) => (OperationKind::Delete, Some(rev), None),
            // never stored, nothing to delete
            (LifecycleState::Removed, None) => return None,
            (_, Some(rev)) => (OperationKind::Update, Some(rev), Some(entity.document.clone())),
            (_, None) => (OperationKind::Create, None, Some(entity.document.clone())),
        };

        Some(ChangeSetEntry {
            entity_id: entity.id,
            state: entity.state,
            kind,
            expected_revision,
            document,
            changed_fields: if kind == OperationKind::Delete {
                Vec::new()
            } else {
                changed_fields
            },
        })
    }

    /// Applies the store's outcome for one entity.
    ///
    /// Conflicts and rejections leave the entity exactly as it was.
    pub fn apply_result(&mut self, id: EntityId, outcome: &WriteOutcome) -> SyncResult<ApplyEffect> {
        let entity = lookup(&mut self.entities, id)?;
        entity.in_doubt = false;

        match outcome {
            WriteOutcome::Accepted { revision, .. } => {
                if entity.state == LifecycleState::Removed {
                    self.purge(id);
                    return Ok(ApplyEffect::Purged);
                }
                entity.snapshot = Some(entity.document.clone());
                entity.state = LifecycleState::Managed;
                self.revisions.set(id, revision.clone());
                Ok(ApplyEffect::Synced(revision.clone()))
            }
            WriteOutcome::Conflict { current } => Ok(ApplyEffect::Conflicted(current.clone())),
            WriteOutcome::Rejected { reason } => Ok(ApplyEffect::Rejected(reason.clone())),
        }
    }

    /// Stops tracking an entity, returning it with its last-known revision.
    pub fn detach(&mut self, id: EntityId) -> SyncResult<(TrackedEntity, Option<Revision>)> {
        let mut entity = self.entities.remove(&id).ok_or(SyncError::UnknownEntity(id))?;
        entity.state = LifecycleState::Detached;
        entity.in_doubt = false;
        let revision = self.revisions.remove(&id);
        Ok((entity, revision))
    }

    /// Replaces local state with the store's and marks the entity Managed.
    pub fn reload(&mut self, id: EntityId, document: Document, revision: Revision) -> SyncResult<()> {
        let entity = lookup(&mut self.entities, id)?;
        entity.snapshot = Some(document.clone());
        entity.document = document;
        entity.state = LifecycleState::Managed;
        entity.in_doubt = false;
        self.revisions.set(id, revision);
        Ok(())
    }

    /// Moves the revision a pending write is based on, keeping local state.
    ///
    /// With `None` the store no longer holds the document: a pending update
    /// becomes a create. With a revision, a pending create becomes an update
    /// of the stored document.
    pub fn rebase(&mut self, id: EntityId, revision: Option<Revision>) -> SyncResult<LifecycleState> {
        let entity = lookup(&mut self.entities, id)?;
        match revision {
            Some(revision) => {
                if entity.state == LifecycleState::New {
                    entity.state = LifecycleState::Dirty;
                }
                self.revisions.set(id, revision);
            }
            None => {
                if matches!(entity.state, LifecycleState::Managed | LifecycleState::Dirty) {
                    entity.state = LifecycleState::New;
                    entity.snapshot = None;
                }
                self.revisions.remove(&id);
            }
        }
        Ok(entity.state)
    }

    /// Flags entities whose submitted write has an unknown outcome.
    pub fn mark_in_doubt(&mut self, ids: &[EntityId]) {
        for id in ids {
            if let Some(entity) = self.entities.get_mut(id) {
                entity.in_doubt = true;
            }
        }
    }

    /// Clears the in-doubt flag of an entity.
    pub fn clear_in_doubt(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.in_doubt = false;
        }
    }

    /// Entities whose last submitted write has an unknown outcome, in
    /// registration order.
    pub fn in_doubt_ids(&self) -> Vec<EntityId> {
        let mut doubtful: Vec<&TrackedEntity> =
            self.entities.values().filter(|e| e.in_doubt).collect();
        doubtful.sort_by_key(|e| e.sequence);
        doubtful.into_iter().map(|e| e.id).collect()
    }

    /// Drops every entity and revision.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.revisions.clear();
    }

    /// Returns a tracked entity.
    pub fn get(&self, id: EntityId) -> Option<&TrackedEntity> {
        self.entities.get(&id)
    }

    /// Returns the lifecycle state, or `Detached` if the entity is not tracked.
    pub fn state(&self, id: EntityId) -> LifecycleState {
        self.entities
            .get(&id)
            .map(|e| e.state)
            .unwrap_or(LifecycleState::Detached)
    }

    /// Returns the last-known revision.
    pub fn revision(&self, id: EntityId) -> Option<&Revision> {
        self.revisions.get(&id)
    }

    /// Returns the current local document.
    pub fn document(&self, id: EntityId) -> Option<&Document> {
        self.entities.get(&id).map(|e| &e.document)
    }

    /// Returns true if the entity is tracked.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Tracked IDs in registration order.
    pub fn ids(&self) -> Vec<EntityId> {
        let mut all: Vec<&TrackedEntity> = self.entities.values().collect();
        all.sort_by_key(|e| e.sequence);
        all.into_iter().map(|e| e.id).collect()
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of entities with a pending write.
    pub fn pending_count(&self) -> usize {
        self.entities.values().filter(|e| e.state.is_pending()).count()
    }

    fn purge(&mut self, id: EntityId) {
        self.entities.remove(&id);
        self.revisions.remove(&id);
    }
}

fn lookup(
    entities: &mut HashMap<EntityId, TrackedEntity>,
    id: EntityId,
) -> SyncResult<&mut TrackedEntity> {
    entities.get_mut(&id).ok_or(SyncError::UnknownEntity(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_entity(&value).unwrap()
    }

    fn id(n: u8) -> EntityId {
        EntityId::from_bytes([n; 16])
    }

    #[test]
    fn register_new_and_managed() {
        let mut uow = UnitOfWork::new();
        assert_eq!(uow.register(id(1), doc(json!({"a": 1})), None).unwrap(), LifecycleState::New);
        assert_eq!(
            uow.register(id(2), doc(json!({"a": 2})), Some("1".into())).unwrap(),
            LifecycleState::Managed
        );

        assert!(uow.revision(id(1)).is_none());
        assert_eq!(uow.revision(id(2)), Some(&Revision::from("1")));
        assert_eq!(uow.get(id(2)).unwrap().snapshot(), Some(&doc(json!({"a": 2}))));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut uow = UnitOfWork::new();
        uow.register(id(1), doc(json!({})), None).unwrap();
        let err = uow.register(id(1), doc(json!({})), None).unwrap_err();
        assert!(matches!(err, SyncError::DuplicateIdentity(dup) if dup == id(1)));
    }

    #[test]
    fn update_marks_managed_dirty_only_on_change() {
        let mut uow = UnitOfWork::new();
        uow.register(id(1), doc(json!({"a": 1})), Some("1".into())).unwrap();

        assert_eq!(uow.update(id(1), doc(json!({"a": 1}))).unwrap(), LifecycleState::Managed);
        assert_eq!(uow.update(id(1), doc(json!({"a": 2}))).unwrap(), LifecycleState::Dirty);
    }

    #[test]
    fn mark_dirty_transitions() {
        let mut uow = UnitOfWork::new();
        uow.register(id(1), doc(json!({})), Some("1".into())).unwrap();
        uow.register(id(2), doc(json!({})), None).unwrap();

        assert_eq!(uow.mark_dirty(id(1)).unwrap(), LifecycleState::Dirty);
        assert_eq!(uow.mark_dirty(id(1)).unwrap(), LifecycleState::Dirty);
        assert_eq!(uow.mark_dirty(id(2)).unwrap(), LifecycleState::New);
        assert!(matches!(uow.mark_dirty(id(9)), Err(SyncError::UnknownEntity(_))));

        uow.mark_removed(id(1)).unwrap();
        assert!(matches!(
            uow.mark_dirty(id(1)),
            Err(SyncError::InvalidStateTransition { .. })
        ));
        assert!(uow.update(id(1), doc(json!({"x": 1}))).is_err());
    }

    #[test]
    fn removing_new_entity_drops_it() {
        let mut uow = UnitOfWork::new();
        uow.register(id(1), doc(json!({})), None).unwrap();

        assert_eq!(uow.mark_removed(id(1)).unwrap(), LifecycleState::Detached);
        assert!(!uow.contains(id(1)));
        assert!(uow.compute_change_set().is_empty());
    }

    #[test]
    fn mark_removed_is_idempotent() {
        let mut uow = UnitOfWork::new();
        uow.register(id(1), doc(json!({})), Some("3".into())).unwrap();
        assert_eq!(uow.mark_removed(id(1)).unwrap(), LifecycleState::Removed);
        assert_eq!(uow.mark_removed(id(1)).unwrap(), LifecycleState::Removed);
    }

    #[test]
    fn change_set_follows_registration_order() {
        let mut uow = UnitOfWork::new();
        for n in [5u8, 1, 9, 3] {
            uow.register(id(n), doc(json!({"n": n})), None).unwrap();
        }
        let ids = uow.compute_change_set().ids();
        assert_eq!(ids, vec![id(5), id(1), id(9), id(3)]);
    }

    #[test]
    fn change_set_kinds_and_revisions() {
        let mut uow = UnitOfWork::new();
        uow.register(id(1), doc(json!({"a": 1})), None).unwrap();
        uow.register(id(2), doc(json!({"a": 1, "b": 1})), Some("4".into())).unwrap();
        uow.register(id(3), doc(json!({"a": 1})), Some("7".into())).unwrap();
        uow.register(id(4), doc(json!({"a": 1})), Some("2".into())).unwrap();

        uow.update(id(2), doc(json!({"a": 1, "b": 2}))).unwrap();
        uow.mark_removed(id(3)).unwrap();

        let set = uow.compute_change_set();
        assert_eq!(set.len(), 3);
        assert_eq!(set.counts(), (1, 1, 1));

        let create = set.entry(id(1)).unwrap();
        assert_eq!(create.kind, OperationKind::Create);
        assert!(create.expected_revision.is_none());

        let update = set.entry(id(2)).unwrap();
        assert_eq!(update.kind, OperationKind::Update);
        assert_eq!(update.expected_revision, Some("4".into()));
        assert_eq!(update.changed_fields, vec!["b"]);

        let delete = set.entry(id(3)).unwrap();
        assert_eq!(delete.kind, OperationKind::Delete);
        assert!(delete.document.is_none());

        assert!(set.entry(id(4)).is_none());
        assert!(set.to_request(false).validate().is_ok());
    }

    #[test]
    fn accepted_result_syncs_entity() {
        let mut uow = UnitOfWork::new();
        uow.register(id(1), doc(json!({"a": 1})), None).unwrap();

        let effect = uow.apply_result(id(1), &WriteOutcome::accepted("1")).unwrap();
        assert_eq!(effect, ApplyEffect::Synced("1".into()));
        assert_eq!(uow.state(id(1)), LifecycleState::Managed);
        assert_eq!(uow.revision(id(1)), Some(&Revision::from("1")));
        assert_eq!(uow.get(id(1)).unwrap().snapshot(), Some(&doc(json!({"a": 1}))));
    }

    #[test]
    fn accepted_delete_purges() {
        let mut uow = UnitOfWork::new();
        uow.register(id(1), doc(json!({})), Some("1".into())).unwrap();
        uow.mark_removed(id(1)).unwrap();

        assert_eq!(
            uow.apply_result(id(1), &WriteOutcome::accepted("2")).unwrap(),
            ApplyEffect::Purged
        );
        assert!(!uow.contains(id(1)));
        assert!(uow.revision(id(1)).is_none());
    }

    #[test]
    fn conflict_leaves_entity_untouched() {
        let mut uow = UnitOfWork::new();
        uow.register(id(1), doc(json!({"a": 1})), Some("1".into())).unwrap();
        uow.update(id(1), doc(json!({"a": 2}))).unwrap();
        let before = uow.get(id(1)).unwrap().clone();

        let effect = uow
            .apply_result(id(1), &WriteOutcome::conflict(Some("2".into())))
            .unwrap();
        assert_eq!(effect, ApplyEffect::Conflicted(Some("2".into())));
        assert_eq!(uow.get(id(1)).unwrap(), &before);
        assert_eq!(uow.revision(id(1)), Some(&Revision::from("1")));
    }

    #[test]
    fn detach_returns_detached_record() {
        let mut uow = UnitOfWork::new();
        uow.register(id(1), doc(json!({})), Some("5".into())).unwrap();

        let (entity, revision) = uow.detach(id(1)).unwrap();
        assert_eq!(entity.state(), LifecycleState::Detached);
        assert_eq!(revision, Some("5".into()));
        assert_eq!(uow.state(id(1)), LifecycleState::Detached);
        assert!(uow.register(id(1), doc(json!({})), None).is_ok());
    }

    #[test]
    fn rebase_switches_operation_kind() {
        let mut uow = UnitOfWork::new();
        uow.register(id(1), doc(json!({"a": 1})), None).unwrap();
        uow.register(id(2), doc(json!({"a": 1})), Some("1".into())).unwrap();
        uow.mark_dirty(id(2)).unwrap();

        assert_eq!(uow.rebase(id(1), Some("3".into())).unwrap(), LifecycleState::Dirty);
        assert_eq!(uow.rebase(id(2), None).unwrap(), LifecycleState::New);

        let set = uow.compute_change_set();
        assert_eq!(set.entry(id(1)).unwrap().kind, OperationKind::Update);
        assert_eq!(set.entry(id(1)).unwrap().expected_revision, Some("3".into()));
        assert_eq!(set.entry(id(2)).unwrap().kind, OperationKind::Create);
    }

    #[test]
    fn reload_replaces_local_state() {
        let mut uow = UnitOfWork::new();
        uow.register(id(1), doc(json!({"a": 1})), Some("1".into())).unwrap();
        uow.update(id(1), doc(json!({"a": 2}))).unwrap();

        uow.reload(id(1), doc(json!({"a": 9})), "4".into()).unwrap();
        assert_eq!(uow.state(id(1)), LifecycleState::Managed);
        assert_eq!(uow.document(id(1)), Some(&doc(json!({"a": 9}))));
        assert_eq!(uow.revision(id(1)), Some(&Revision::from("4")));
    }

    #[test]
    fn in_doubt_flags() {
        let mut uow = UnitOfWork::new();
        uow.register(id(1), doc(json!({})), None).unwrap();
        uow.register(id(2), doc(json!({})), None).unwrap();

        uow.mark_in_doubt(&[id(2), id(1), id(7)]);
        assert_eq!(uow.in_doubt_ids(), vec![id(1), id(2)]);

        uow.apply_result(id(1), &WriteOutcome::accepted("1")).unwrap();
        uow.clear_in_doubt(id(2));
        assert!(uow.in_doubt_ids().is_empty());
    }
}
