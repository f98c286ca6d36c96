//! Conflict description and resolution policy.

use crate::document::Document;
use crate::id::EntityId;
use crate::operation::OperationKind;
use crate::revision::Revision;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A write the store refused because the revision it was based on is stale.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    /// Entity ID.
    pub entity_id: EntityId,
    /// Kind of the write that conflicted.
    pub kind: OperationKind,
    /// Revision the local write was based on (none for creates).
    pub expected_revision: Option<Revision>,
    /// Revision the store holds, if it still holds the document.
    pub remote_revision: Option<Revision>,
    /// Local document that was submitted (none for deletes).
    pub local: Option<Document>,
}

impl Conflict {
    /// Creates a new conflict.
    pub fn new(
        entity_id: EntityId,
        kind: OperationKind,
        expected_revision: Option<Revision>,
        remote_revision: Option<Revision>,
        local: Option<Document>,
    ) -> Self {
        Self {
            entity_id,
            kind,
            expected_revision,
            remote_revision,
            local,
        }
    }

    /// Returns true if a create collided with an existing document.
    pub fn is_create_conflict(&self) -> bool {
        self.kind == OperationKind::Create
    }

    /// Returns true if an update raced another update.
    pub fn is_update_conflict(&self) -> bool {
        self.kind == OperationKind::Update && self.remote_revision.is_some()
    }

    /// Returns true if one side deleted while the other wrote.
    pub fn is_update_delete_conflict(&self) -> bool {
        match self.kind {
            OperationKind::Update => self.remote_revision.is_none(),
            OperationKind::Delete => self.remote_revision.is_some(),
            OperationKind::Create => false,
        }
    }
}

/// The answer a manual conflict handler gives for one conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum ManualResolution {
    /// Resubmit the local state against the current remote revision.
    KeepLocal,
    /// Drop the local change and adopt the remote state.
    AcceptRemote,
    /// Resubmit this merged document against the current remote revision.
    Merge(Document),
    /// Leave the conflict unresolved and surface it to the caller.
    Defer,
}

/// Policy for resolving conflicts reported by a flush.
///
/// The default is `Fail`: resolving automatically can throw away somebody's
/// write, so it has to be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Surface the conflict to the caller and leave the entity untouched.
    #[default]
    Fail,
    /// The write already in the store wins; local changes are discarded.
    FirstWriteWins,
    /// The local write wins; it is resubmitted once against the current revision.
    LastWriteWins,
    /// A registered handler decides per conflict.
    Manual,
}

impl ConflictPolicy {
    /// Returns true if this policy settles conflicts without asking anyone.
    pub fn auto_resolves(&self) -> bool {
        matches!(
            self,
            ConflictPolicy::FirstWriteWins | ConflictPolicy::LastWriteWins
        )
    }

    /// Converts to a code.
    pub fn to_code(&self) -> u8 {
        match self {
            ConflictPolicy::Fail => 1,
            ConflictPolicy::FirstWriteWins => 2,
            ConflictPolicy::LastWriteWins => 3,
            ConflictPolicy::Manual => 4,
        }
    }

    /// Converts from a code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ConflictPolicy::Fail),
            2 => Some(ConflictPolicy::FirstWriteWins),
            3 => Some(ConflictPolicy::LastWriteWins),
            4 => Some(ConflictPolicy::Manual),
            _ => None,
        }
    }

    /// Kebab-case name, as accepted by `FromStr`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Fail => "fail",
            ConflictPolicy::FirstWriteWins => "first-write-wins",
            ConflictPolicy::LastWriteWins => "last-write-wins",
            ConflictPolicy::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "fail" => Ok(ConflictPolicy::Fail),
            "first-write-wins" => Ok(ConflictPolicy::FirstWriteWins),
            "last-write-wins" => Ok(ConflictPolicy::LastWriteWins),
            "manual" => Ok(ConflictPolicy::Manual),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}
