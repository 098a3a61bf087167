use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;
use serde_json::Value;

/// Structural identifier of one cacheable query, e.g. `["cases", {"status": "OPEN"}]`.
///
/// Equality and hashing use the serialized form: element order matters,
/// object member order does not (objects serialize with sorted members).
#[derive(Clone)]
pub struct QueryKey {
    parts: Vec<Value>,
    hash: String,
}

impl QueryKey {
    pub fn new(root: impl Into<Value>) -> Self {
        Self::from_parts(vec![root.into()])
    }

    pub fn from_parts(parts: Vec<Value>) -> Self {
        let hash = Value::Array(parts.iter().map(canonical).collect()).to_string();
        Self { parts, hash }
    }

    /// Append a scalar element (id, sub-resource name, flag)
    pub fn with(self, part: impl Into<Value>) -> Self {
        let mut parts = self.parts;
        parts.push(part.into());
        Self::from_parts(parts)
    }

    /// Append a filter object. Plain derive(Serialize) structs cannot fail to
    /// serialize; anything that does becomes `null`.
    pub fn with_params<T: Serialize>(self, params: &T) -> Self {
        self.with(serde_json::to_value(params).unwrap_or_default())
    }

    pub fn parts(&self) -> &[Value] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Serialized form used for equality
    pub fn as_str(&self) -> &str {
        &self.hash
    }

    /// True if `self` equals `other` or extends it element by element.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        prefix.parts.len() <= self.parts.len()
            && self
                .parts
                .iter()
                .zip(&prefix.parts)
                .all(|(part, expected)| part == expected)
    }
}

/// Copy of `value` with object members in sorted order at every level, so the
/// serialized form does not depend on insertion order.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut members: Vec<_> = map.iter().collect();
            members.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                members
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonical(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Debug for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash)
    }
}
