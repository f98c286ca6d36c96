//! Serialized document state.

use crate::error::{ProtocolError, ProtocolResult};
use ciborium::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The serialized state of an entity: a CBOR map of field name to value.
///
/// Documents are what the tracker snapshots, what the synchronizer diffs and
/// what travels in a bulk write. Any `Serialize` type whose serialized form
/// is a map (structs, maps, `serde_json::Value` objects) can become one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Document(Value);

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn empty() -> Self {
        Self(Value::Map(Vec::new()))
    }

    /// Serializes an entity into a document.
    pub fn from_entity<T: Serialize + ?Sized>(entity: &T) -> ProtocolResult<Self> {
        let value = Value::serialized(entity)
            .map_err(|e| ProtocolError::encoding_failed(e.to_string()))?;
        Self::try_from(value)
    }

    /// Deserializes the document back into an entity.
    pub fn to_entity<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        self.0
            .deserialized()
            .map_err(|e| ProtocolError::decoding_failed(e.to_string()))
    }

    /// Returns the underlying CBOR value.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Returns the value of a top-level field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.entries()
            .iter()
            .find(|(k, _)| k.as_text() == Some(name))
            .map(|(_, v)| v)
    }

    /// Returns the top-level field names, in document order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.entries().iter().filter_map(|(k, _)| k.as_text())
    }

    /// Returns the number of top-level fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns true if the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Names of the top-level fields whose value differs from `previous`.
    ///
    /// Fields added or removed relative to `previous` are included. The
    /// result is sorted so it can be compared and logged deterministically.
    #[must_use]
    pub fn changed_fields(&self, previous: &Document) -> Vec<String> {
        let mut changed: Vec<String> = self
            .field_names()
            .filter(|name| self.field(name) != previous.field(name))
            .map(str::to_owned)
            .collect();

        changed.extend(
            previous
                .field_names()
                .filter(|name| self.field(name).is_none())
                .map(str::to_owned),
        );

        changed.sort();
        changed.dedup();
        changed
    }

    /// Encodes the document as CBOR.
    pub fn to_cbor(&self) -> ProtocolResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(&self.0, &mut bytes)
            .map_err(|e| ProtocolError::encoding_failed(e.to_string()))?;
        Ok(bytes)
    }

    /// Size of the CBOR encoding, in bytes.
    pub fn encoded_len(&self) -> ProtocolResult<usize> {
        self.to_cbor().map(|bytes| bytes.len())
    }

    fn entries(&self) -> &[(Value, Value)] {
        match &self.0 {
            Value::Map(entries) => entries,
            _ => &[],
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::empty()
    }
}

impl TryFrom<Value> for Document {
    type Error = ProtocolError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Map(_) => Ok(Self(value)),
            other => Err(ProtocolError::NotAMap {
                found: value_kind(&other),
            }),
        }
    }
}

impl From<Document> for Value {
    fn from(document: Document) -> Self {
        document.0
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Integer(_) => "integer",
        Value::Bytes(_) => "bytes",
        Value::Float(_) => "float",
        Value::Text(_) => "text",
        Value::Bool(_) => "bool",
        Value::Null => "null",
        Value::Tag(_, _) => "tag",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Article {
        title: String,
        views: u32,
        tags: Vec<String>,
    }

    fn article(title: &str, views: u32) -> Article {
        Article {
            title: title.into(),
            views,
            tags: vec!["rust".into()],
        }
    }

    #[test]
    fn entity_roundtrip() {
        let original = article("Bulk writes", 3);
        let doc = Document::from_entity(&original).unwrap();
        assert_eq!(doc.len(), 3);
        assert_eq!(doc.to_entity::<Article>().unwrap(), original);
    }

    #[test]
    fn scalar_is_not_a_document() {
        let err = Document::from_entity(&42u32).unwrap_err();
        assert_eq!(err, ProtocolError::NotAMap { found: "integer" });
    }

    #[test]
    fn field_lookup() {
        let doc = Document::from_entity(&article("x", 9)).unwrap();
        assert_eq!(doc.field("views"), Some(&Value::Integer(9.into())));
        assert!(doc.field("missing").is_none());
    }

    #[test]
    fn changed_fields_reports_edits_additions_and_removals() {
        let before = Document::from_entity(&serde_json::json!({"a": 1, "b": 2, "c": 3})).unwrap();
        let after = Document::from_entity(&serde_json::json!({"a": 1, "b": 5, "d": 4})).unwrap();

        assert_eq!(after.changed_fields(&before), vec!["b", "c", "d"]);
        assert!(after.changed_fields(&after).is_empty());
    }

    #[test]
    fn decoding_a_non_map_fails() {
        let mut bytes = Vec::new();
        ciborium::into_writer(&Value::Array(vec![]), &mut bytes).unwrap();
        let result: Result<Document, _> = ciborium::from_reader(bytes.as_slice());
        assert!(result.is_err());
    }
}
