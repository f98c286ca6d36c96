//! In-memory revisioned document storage.

use crate::config::{RevisionScheme, StoreConfig};
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use revsync_protocol::{
    BulkOperation, BulkResultEntry, BulkWriteRequest, BulkWriteResponse, Document, EntityId,
    OperationKind, Revision, StoredDocument, WriteOutcome,
};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// What the store keeps per document. A deleted document stays behind as a
/// tombstone so generations keep increasing.
#[derive(Debug, Clone)]
struct Record {
    document: Option<Document>,
    revision: Revision,
    generation: u64,
    conflicts: Vec<Revision>,
}

impl Record {
    fn is_live(&self) -> bool {
        self.document.is_some()
    }
}

/// Document storage enforcing the revision contract.
///
/// The store maintains:
/// - The current document and revision of every entity
/// - Tombstones for deleted entities
/// - Revisions displaced by forced writes, per document
///
/// A checked write must name the current revision of the document it
/// replaces; otherwise it is answered with a conflict and nothing changes.
pub struct MemoryStore {
    config: StoreConfig,
    records: RwLock<HashMap<EntityId, Record>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Applies a bulk write.
    ///
    /// Every operation is answered individually and in order. The request as
    /// a whole fails only if it is larger than the configured batch limit.
    pub fn apply_bulk(&self, request: &BulkWriteRequest) -> StoreResult<BulkWriteResponse> {
        if request.len() > self.config.max_batch_operations {
            return Err(StoreError::BatchTooLarge {
                size: request.len(),
                limit: self.config.max_batch_operations,
            });
        }

        let mut records = self.records.write();
        let mut seen = HashSet::with_capacity(request.len());
        let mut results = Vec::with_capacity(request.len());

        for op in &request.operations {
            let outcome = if !seen.insert(op.entity_id) {
                WriteOutcome::rejected("entity appears more than once in the batch")
            } else if let Err(e) = op.validate() {
                WriteOutcome::rejected(e.to_string())
            } else if let Some(rejection) = self.check_size(op) {
                rejection
            } else {
                self.apply_one(&mut records, op, request.force)
            };

            debug!(entity_id = %op.entity_id, kind = %op.kind, outcome = ?outcome, "bulk operation");
            results.push(BulkResultEntry::new(op.entity_id, outcome));
        }

        Ok(BulkWriteResponse::new(results))
    }

    fn check_size(&self, op: &BulkOperation) -> Option<WriteOutcome> {
        let document = op.document.as_ref()?;
        match document.encoded_len() {
            Ok(len) if len > self.config.max_document_bytes => Some(WriteOutcome::rejected(format!(
                "document of {len} bytes exceeds the limit of {}",
                self.config.max_document_bytes
            ))),
            Ok(_) => None,
            Err(e) => Some(WriteOutcome::rejected(e.to_string())),
        }
    }

    fn apply_one(
        &self,
        records: &mut HashMap<EntityId, Record>,
        op: &BulkOperation,
        force: bool,
    ) -> WriteOutcome {
        let current = records
            .get(&op.entity_id)
            .filter(|r| r.is_live())
            .map(|r| r.revision.clone());

        let displaced = match (op.kind, current) {
            (OperationKind::Create, None) => None,
            (OperationKind::Create, Some(current)) if force => Some(current),
            (OperationKind::Create, Some(current)) => return WriteOutcome::conflict(Some(current)),
            (_, None) => return WriteOutcome::conflict(None),
            (_, Some(current)) if op.expected_revision.as_ref() == Some(&current) => None,
            (_, Some(current)) if force => Some(current),
            (_, Some(current)) => return WriteOutcome::conflict(Some(current)),
        };

        let revision = self.write(records, op.entity_id, op.document.clone(), displaced.clone());
        WriteOutcome::Accepted {
            revision,
            displaced,
        }
    }

    fn write(
        &self,
        records: &mut HashMap<EntityId, Record>,
        entity_id: EntityId,
        document: Option<Document>,
        displaced: Option<Revision>,
    ) -> Revision {
        let previous = records.get(&entity_id);
        let generation = previous.map_or(0, |r| r.generation) + 1;
        let revision = self.next_revision(
            generation,
            previous.map(|r| &r.revision),
            document.as_ref(),
        );

        let record = records.entry(entity_id).or_insert_with(|| Record {
            document: None,
            revision: revision.clone(),
            generation,
            conflicts: Vec::new(),
        });
        record.document = document;
        record.revision = revision.clone();
        record.generation = generation;
        record.conflicts.extend(displaced);
        revision
    }

    fn next_revision(
        &self,
        generation: u64,
        previous: Option<&Revision>,
        document: Option<&Document>,
    ) -> Revision {
        match self.config.revision_scheme {
            RevisionScheme::Counter => Revision::new(generation.to_string()),
            RevisionScheme::ContentHash => {
                let mut hasher = Sha256::new();
                if let Some(previous) = previous {
                    hasher.update(previous.as_str().as_bytes());
                }
                match document.map(Document::to_cbor) {
                    Some(Ok(bytes)) => hasher.update(&bytes),
                    Some(Err(_)) => hasher.update(b"unencodable"),
                    None => hasher.update(b"deleted"),
                }
                let digest = hasher.finalize();
                let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
                Revision::new(format!("{generation}-{hex}"))
            }
        }
    }

    /// Returns the live document, if any.
    pub fn fetch(&self, entity_id: EntityId) -> Option<StoredDocument> {
        let records = self.records.read();
        let record = records.get(&entity_id)?;
        let document = record.document.clone()?;
        Some(StoredDocument {
            entity_id,
            document,
            revision: record.revision.clone(),
            conflicts: record.conflicts.clone(),
        })
    }

    /// Writes a document unconditionally, as a concurrent writer would.
    pub fn overwrite(&self, entity_id: EntityId, document: Document) -> Revision {
        let mut records = self.records.write();
        self.write(&mut records, entity_id, Some(document), None)
    }

    /// Deletes a document unconditionally, as a concurrent writer would.
    ///
    /// Returns the tombstone revision, or none if nothing was live.
    pub fn delete(&self, entity_id: EntityId) -> Option<Revision> {
        let mut records = self.records.write();
        if !records.get(&entity_id)?.is_live() {
            return None;
        }
        Some(self.write(&mut records, entity_id, None, None))
    }

    /// Forgets the revisions displaced from a document by forced writes.
    pub fn clear_conflicts(&self, entity_id: EntityId) -> usize {
        self.records
            .write()
            .get_mut(&entity_id)
            .map_or(0, |r| std::mem::take(&mut r.conflicts).len())
    }

    /// Current revision of a live document.
    pub fn revision(&self, entity_id: EntityId) -> Option<Revision> {
        self.records
            .read()
            .get(&entity_id)
            .filter(|r| r.is_live())
            .map(|r| r.revision.clone())
    }

    /// Returns true if the entity is deleted but remembered.
    pub fn is_tombstone(&self, entity_id: EntityId) -> bool {
        self.records
            .read()
            .get(&entity_id)
            .is_some_and(|r| !r.is_live())
    }

    /// Live documents, sorted by identity.
    pub fn documents(&self) -> Vec<StoredDocument> {
        let ids: Vec<EntityId> = {
            let records = self.records.read();
            let mut ids: Vec<EntityId> = records
                .iter()
                .filter(|(_, r)| r.is_live())
                .map(|(id, _)| *id)
                .collect();
            ids.sort_by_key(|id| *id.as_bytes());
            ids
        };
        ids.into_iter().filter_map(|id| self.fetch(id)).collect()
    }

    /// Number of live documents.
    pub fn len(&self) -> usize {
        self.records.read().values().filter(|r| r.is_live()).count()
    }

    /// Returns true if no document is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
