use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::AggregateId;

/// Version counter of a stored document, used for optimistic concurrency control.
///
/// A document is inserted at version 0 and every accepted update advances it
/// by exactly one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version a freshly inserted document carries.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A stored document: a JSON body plus the bookkeeping the store owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document identity, unique across collections.
    pub id: AggregateId,

    /// Collection the document belongs to (e.g. "orders").
    pub collection: String,

    /// Version as stored. Authoritative over any version embedded in `body`.
    pub version: Version,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// The serialized aggregate.
    pub body: serde_json::Value,
}

impl Document {
    /// Creates a new document at the initial version.
    pub fn new(id: AggregateId, collection: impl Into<String>, body: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            collection: collection.into(),
            version: Version::initial(),
            created_at: now,
            updated_at: now,
            body,
        }
    }

    /// Serializes `value` into a new document body.
    pub fn from_value<T: Serialize>(
        id: AggregateId,
        collection: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(id, collection, serde_json::to_value(value)?))
    }

    /// Deserializes the body into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }
}
