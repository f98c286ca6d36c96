//! Bulk write operations.

use crate::document::Document;
use crate::error::{ProtocolError, ProtocolResult};
use crate::id::EntityId;
use crate::revision::Revision;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Document does not exist in the store yet.
    Create,
    /// Document exists and is being replaced.
    Update,
    /// Document is being deleted.
    Delete,
}

impl OperationKind {
    /// Converts to a numeric code.
    pub fn to_code(&self) -> u8 {
        match self {
            OperationKind::Create => 1,
            OperationKind::Update => 2,
            OperationKind::Delete => 3,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(OperationKind::Create),
            2 => Some(OperationKind::Update),
            3 => Some(OperationKind::Delete),
            _ => None,
        }
    }

    /// Lowercase name, used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single write inside a bulk request.
///
/// # Fields
///
/// - `kind`: Create, Update or Delete
/// - `entity_id`: The document being written
/// - `expected_revision`: The revision the client last saw; absent for creates
/// - `document`: The new document state; absent for deletes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkOperation {
    /// Operation kind.
    pub kind: OperationKind,
    /// Target entity.
    pub entity_id: EntityId,
    /// Revision the write is based on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_revision: Option<Revision>,
    /// Document payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
}

impl BulkOperation {
    /// Creates a Create operation.
    pub fn create(entity_id: EntityId, document: Document) -> Self {
        Self {
            kind: OperationKind::Create,
            entity_id,
            expected_revision: None,
            document: Some(document),
        }
    }

    /// Creates an Update operation.
    pub fn update(entity_id: EntityId, expected_revision: Revision, document: Document) -> Self {
        Self {
            kind: OperationKind::Update,
            entity_id,
            expected_revision: Some(expected_revision),
            document: Some(document),
        }
    }

    /// Creates a Delete operation.
    pub fn delete(entity_id: EntityId, expected_revision: Revision) -> Self {
        Self {
            kind: OperationKind::Delete,
            entity_id,
            expected_revision: Some(expected_revision),
            document: None,
        }
    }

    /// Checks that the fields present match what the kind requires.
    pub fn validate(&self) -> ProtocolResult<()> {
        let invalid = |message: &str| ProtocolError::InvalidOperation {
            kind: self.kind.as_str(),
            entity_id: self.entity_id.to_string(),
            message: message.to_string(),
        };

        match self.kind {
            OperationKind::Create if self.expected_revision.is_some() => {
                Err(invalid("create must not carry a revision"))
            }
            OperationKind::Update | OperationKind::Delete if self.expected_revision.is_none() => {
                Err(invalid("missing expected revision"))
            }
            OperationKind::Create | OperationKind::Update if self.document.is_none() => {
                Err(invalid("missing document"))
            }
            OperationKind::Delete if self.document.is_some() => {
                Err(invalid("delete must not carry a document"))
            }
            _ => Ok(()),
        }
    }
}
