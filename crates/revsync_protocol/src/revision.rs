//! Revision tokens.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, store-assigned version marker.
///
/// A revision is returned for every accepted write and must accompany every
/// later update or delete of the same document. The store rejects a write
/// whose revision is not the current one, which is how concurrent writers
/// find out about each other.
///
/// Clients never interpret revisions beyond equality. `generation` exists for
/// diagnostics only.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Creates a revision from its string form.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the leading generation number, if the token has one.
    ///
    /// Both `"3"` and `"3-9f86d081"` report generation 3.
    #[must_use]
    pub fn generation(&self) -> Option<u64> {
        let digits = self.0.split('-').next()?;
        digits.parse().ok()
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({})", self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Revision {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for Revision {
    fn from(token: String) -> Self {
        Self(token)
    }
}
