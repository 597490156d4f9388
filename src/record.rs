//! Schema-less graph records and vertex identity.
//!
//! Vertices and edges share one shape: an ordered JSON object. Field order is
//! preserved end to end (serde_json `preserve_order`), and numbers keep their
//! source text (`arbitrary_precision`), so records written to the outputs
//! look exactly like the input records.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One vertex or edge record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Canonical identifier text of `field`, or None if absent or null.
    pub fn id_text(&self, field: &str) -> Option<Cow<'_, str>> {
        self.get(field).and_then(id_text)
    }

    /// Membership key of `field`, or None if absent or null.
    pub fn key(&self, field: &str) -> Option<VertexKey> {
        self.id_text(field).map(|text| VertexKey::from_text(&text))
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Canonical text for an identifier value.
///
/// Strings are taken verbatim, everything else uses its JSON form, so the
/// number `1` and the string `"1"` name the same vertex. Numbers keep their
/// source text, so integers beyond u64 never collapse. Null is no id.
pub fn id_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        other => Some(Cow::Owned(other.to_string())),
    }
}

// ── Vertex Key ─────────────────────────────────────────────────────

/// Fixed-width vertex identity: first 16 bytes of blake3(canonical id text).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexKey(pub u128);

impl VertexKey {
    pub fn from_text(text: &str) -> Self {
        let hash = blake3::hash(text.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash.as_bytes()[0..16]);
        VertexKey(u128::from_le_bytes(bytes))
    }

    /// Key for an identifier value, None for null.
    pub fn of(value: &Value) -> Option<Self> {
        id_text(value).map(|text| Self::from_text(&text))
    }
}

impl fmt::Display for VertexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

// ── Category ───────────────────────────────────────────────────────

/// Which benchmark subset a vertex or edge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Load,
    Update,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Load, Category::Update];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Load => "load",
            Category::Update => "update",
        }
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            Category::Load => 0,
            Category::Update => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Category::Load),
            1 => Some(Category::Update),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
