//! Model-checked session runs.
//!
//! [`ModelRunner`] applies [`Step`]s to a session while keeping a plain
//! map of what the store should hold once everything is flushed, then
//! compares the two.

use crate::fixtures::Widget;
use crate::generators::Step;
use revsync_engine::{DocumentSession, DocumentStore, FlushReport, SyncResult};
use revsync_protocol::EntityId;
use revsync_store::MemoryStore;
use std::collections::HashMap;

/// Drives a session and tracks the expected store contents.
pub struct ModelRunner<S: DocumentStore> {
    session: DocumentSession<S>,
    live: Vec<EntityId>,
    model: HashMap<EntityId, Widget>,
    flushes: usize,
}

impl<S: DocumentStore> ModelRunner<S> {
    /// Creates a runner over a session with nothing tracked.
    pub fn new(session: DocumentSession<S>) -> Self {
        Self {
            session,
            live: Vec::new(),
            model: HashMap::new(),
            flushes: 0,
        }
    }

    /// The session.
    pub fn session(&mut self) -> &mut DocumentSession<S> {
        &mut self.session
    }

    /// Expected contents once everything is flushed.
    pub fn model(&self) -> &HashMap<EntityId, Widget> {
        &self.model
    }

    /// Successful flushes so far.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Applies one step. Flush steps go through [`Self::flush`].
    pub fn apply(&mut self, step: &Step) -> SyncResult<()> {
        match step {
            Step::Create(widget) => {
                let id = self.session.persist(widget)?;
                self.live.push(id);
                self.model.insert(id, widget.clone());
            }
            Step::Update { slot, widget } => {
                if let Some(id) = self.pick(*slot) {
                    self.session.update(id, widget)?;
                    self.model.insert(id, widget.clone());
                }
            }
            Step::Remove { slot } => {
                if let Some(id) = self.pick(*slot) {
                    self.session.remove(id)?;
                    self.live.retain(|live| *live != id);
                    self.model.remove(&id);
                }
            }
            Step::Flush => {
                self.flush()?;
            }
        }
        Ok(())
    }

    /// Flushes and fails on any conflict or rejection.
    pub fn flush(&mut self) -> SyncResult<FlushReport> {
        let report = self.session.flush()?.ensure_clean()?;
        self.flushes += 1;
        Ok(report)
    }

    /// Checks that the store holds exactly the model and that the session
    /// agrees with the store on every revision.
    pub fn verify(&self, store: &MemoryStore) -> Result<(), String> {
        if store.len() != self.model.len() {
            return Err(format!(
                "store holds {} documents, model {}",
                store.len(),
                self.model.len()
            ));
        }
        for (id, expected) in &self.model {
            let stored = store
                .fetch(*id)
                .ok_or_else(|| format!("{id} missing from store"))?;
            let actual: Widget = stored.document.to_entity().map_err(|e| e.to_string())?;
            if actual != *expected {
                return Err(format!("{id}: stored {actual:?}, expected {expected:?}"));
            }
            if self.session.revision(*id) != Some(&stored.revision) {
                return Err(format!(
                    "{id}: session revision {:?}, store revision {:?}",
                    self.session.revision(*id),
                    stored.revision
                ));
            }
        }
        if self.session.unit_of_work().pending_count() != 0 {
            return Err("session still has pending changes".to_string());
        }
        Ok(())
    }

    fn pick(&self, slot: usize) -> Option<EntityId> {
        if self.live.is_empty() {
            None
        } else {
            Some(self.live[slot % self.live.len()])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{widget, TestBackend};

    #[test]
    fn scripted_run_matches_model() {
        let backend = TestBackend::new();
        let mut runner = ModelRunner::new(backend.session());

        let steps = [
            Step::Create(widget("a", 1)),
            Step::Create(widget("b", 2)),
            Step::Flush,
            Step::Update {
                slot: 0,
                widget: widget("a", 10),
            },
            Step::Remove { slot: 1 },
            Step::Create(widget("c", 3)),
            Step::Remove { slot: 1 },
        ];
        for step in &steps {
            runner.apply(step).unwrap();
        }
        runner.flush().unwrap();

        assert_eq!(runner.model().len(), 1);
        assert_eq!(runner.flushes(), 2);
        runner.verify(backend.store()).unwrap();
    }

    #[test]
    fn verify_catches_unflushed_changes() {
        let backend = TestBackend::new();
        let mut runner = ModelRunner::new(backend.session());
        runner.apply(&Step::Create(widget("x", 1))).unwrap();
        assert!(runner.verify(backend.store()).is_err());
    }
}
