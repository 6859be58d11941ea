/// Builder for collection queries.
///
/// Matching uses JSON containment: a document matches when its body contains
/// every key/value pair of `filter` (PostgreSQL `@>` semantics). Results are
/// ordered oldest first.
#[derive(Debug, Clone)]
pub struct DocumentQuery {
    /// Collection to search.
    pub collection: String,

    /// Containment filter; `None` matches every document in the collection.
    pub filter: Option<serde_json::Value>,

    /// Maximum number of documents to return.
    pub limit: Option<usize>,

    /// Number of documents to skip.
    pub offset: Option<usize>,
}

impl DocumentQuery {
    /// Creates a query over every document in a collection.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: None,
            limit: None,
            offset: None,
        }
    }

    /// Restricts results to documents whose body contains `filter`.
    pub fn matching(mut self, filter: serde_json::Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Returns true if `haystack` contains `needle`.
///
/// Objects match key by key, arrays match when every needle element is
/// contained in some haystack element, scalars must be equal.
pub fn json_contains(haystack: &serde_json::Value, needle: &serde_json::Value) -> bool {
    use serde_json::Value;

    match (haystack, needle) {
        (Value::Object(h), Value::Object(n)) => n
            .iter()
            .all(|(key, value)| h.get(key).is_some_and(|hv| json_contains(hv, value))),
        (Value::Array(h), Value::Array(n)) => n
            .iter()
            .all(|needle_item| h.iter().any(|hay_item| json_contains(hay_item, needle_item))),
        (h, n) => h == n,
    }
}
