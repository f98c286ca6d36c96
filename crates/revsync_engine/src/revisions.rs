//! Last-known revision per managed entity.

use revsync_protocol::{EntityId, Revision};
use std::collections::HashMap;

/// Holds the revision each managed entity was last synchronized at.
///
/// An entity without an entry has never been written to the store by this
/// session (it is New) or has been purged.
#[derive(Debug, Clone, Default)]
pub struct RevisionStore {
    revisions: HashMap<EntityId, Revision>,
}

impl RevisionStore {
    /// Creates an empty revision store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last-known revision of an entity.
    pub fn get(&self, entity_id: &EntityId) -> Option<&Revision> {
        self.revisions.get(entity_id)
    }

    /// Records a revision, returning the one it replaces.
    pub fn set(&mut self, entity_id: EntityId, revision: Revision) -> Option<Revision> {
        self.revisions.insert(entity_id, revision)
    }

    /// Forgets an entity's revision.
    pub fn remove(&mut self, entity_id: &EntityId) -> Option<Revision> {
        self.revisions.remove(entity_id)
    }

    /// Returns true if a revision is known for the entity.
    pub fn contains(&self, entity_id: &EntityId) -> bool {
        self.revisions.contains_key(entity_id)
    }

    /// Number of entities with a known revision.
    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// Returns true if no revisions are recorded.
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Drops every revision.
    pub fn clear(&mut self) {
        self.revisions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_previous_revision() {
        let mut store = RevisionStore::new();
        let id = EntityId::new();

        assert_eq!(store.set(id, "1".into()), None);
        assert_eq!(store.set(id, "2".into()), Some("1".into()));
        assert_eq!(store.get(&id), Some(&Revision::from("2")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_forgets() {
        let mut store = RevisionStore::new();
        let id = EntityId::new();
        store.set(id, "1".into());

        assert_eq!(store.remove(&id), Some("1".into()));
        assert!(!store.contains(&id));
        assert!(store.is_empty());
    }
}
