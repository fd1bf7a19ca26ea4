//! Record-level types: references, entries, and serialized output.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};

use super::key::{CanonicalKey, KeyValue};
use crate::error::RebindResult;

/// Current field values of one source record, keyed by field name.
pub type RecordValues = HashMap<String, serde_json::Value>;

/// Ordered field name to value mapping.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// Identifies exactly one record in the source store.
///
/// Equality, hashing, and ordering use the model and canonical key only; the
/// raw key is carried along so the record can be read back.
#[derive(Debug, Clone)]
pub struct RecordRef {
    /// Model kind.
    pub model: String,
    /// Canonical key.
    pub key: CanonicalKey,
    /// Key as the data source expressed it.
    pub raw: KeyValue,
}

impl RecordRef {
    /// Build a reference from a raw key.
    pub fn new(model: impl Into<String>, raw: KeyValue) -> RebindResult<Self> {
        let key = CanonicalKey::from_value(&raw)?;
        Ok(Self {
            model: model.into(),
            key,
            raw,
        })
    }
}

impl PartialEq for RecordRef {
    fn eq(&self, other: &Self) -> bool {
        self.model == other.model && self.key == other.key
    }
}

impl Eq for RecordRef {}

impl Hash for RecordRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.model.hash(state);
        self.key.hash(state);
    }
}

impl PartialOrd for RecordRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.model
            .cmp(&other.model)
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.model, self.key)
    }
}

/// A top-level export request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Model kind.
    pub model: String,
    /// Explicit key; `None` exports every record of the kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyValue>,
}

impl Entry {
    /// Request every record of a model kind.
    pub fn all(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            key: None,
        }
    }

    /// Request a single record.
    pub fn record(model: impl Into<String>, key: impl Into<KeyValue>) -> Self {
        Self {
            model: model.into(),
            key: Some(key.into()),
        }
    }
}

/// Portable representation of one exported record.
///
/// Relation values hold minted identifiers, never source keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedRecord {
    /// Model kind.
    pub model: String,
    /// Minted identifier.
    pub id: String,
    /// Field values in serializer order.
    pub fields: FieldMap,
    /// Fields left null pending a corrective patch.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub delayed: BTreeSet<String>,
    /// Minted identifiers of same-kind records this record references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl SerializedRecord {
    /// Get a field value.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    /// Whether every relation field resolved in the primary pass.
    pub fn is_complete(&self) -> bool {
        self.delayed.is_empty()
    }
}

/// Late values for fields that were delayed in the primary pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    /// Model kind.
    pub model: String,
    /// Minted identifier of the patched record.
    pub id: String,
    /// Resolved field values.
    pub fields: FieldMap,
}

/// Why a field was left without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Target missing or not exportable (non-strict mode only).
    Unresolved,
    /// Field could not be patched after the corrective pass.
    PermanentlyDelayed,
    /// Field was delayed by the traversal depth guard and never patched.
    DepthLimited,
    /// A top-level record could not be read or serialized (non-strict mode
    /// only). The warning's field is empty.
    RecordFailed,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unresolved => "unresolved",
            Self::PermanentlyDelayed => "permanently delayed",
            Self::DepthLimited => "depth limited",
            Self::RecordFailed => "record failed",
        };
        write!(f, "{}", s)
    }
}

/// Non-fatal condition surfaced alongside the export output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportWarning {
    /// Model kind of the record that owns the field.
    pub model: String,
    /// Minted identifier of that record.
    pub id: String,
    /// Field name.
    pub field: String,
    /// Warning kind.
    pub kind: WarningKind,
    /// Human-readable detail.
    pub message: String,
}
