//! Lock-guarded remap table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::types::CanonicalKey;

type Links = HashMap<String, HashMap<CanonicalKey, String>>;

/// One binding in the remap table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapEntry {
    /// Model kind.
    pub model: String,
    /// Canonical source key.
    pub key: CanonicalKey,
    /// Minted identifier.
    pub id: String,
}

/// Mapping of (model kind, canonical key) to minted identifier.
///
/// Bindings are never removed. Lookups and the mint-and-store path of
/// [`RemapTable::link`] run under one exclusive lock, so concurrent sessions
/// sharing an `Arc<RemapTable>` can never mint two identifiers for the same
/// record.
#[derive(Debug, Default)]
pub struct RemapTable {
    links: Mutex<Links>,
}

impl RemapTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from previously saved bindings.
    pub fn from_entries(entries: impl IntoIterator<Item = RemapEntry>) -> Self {
        let mut links = Links::new();
        for entry in entries {
            links
                .entry(entry.model)
                .or_default()
                .insert(entry.key, entry.id);
        }
        Self {
            links: Mutex::new(links),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Links> {
        // The critical sections below never panic, so a poisoned lock still
        // holds a consistent map.
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Previously minted identifier for (model, key), if any.
    pub fn resolve(&self, model: &str, key: &CanonicalKey) -> Option<String> {
        self.lock()
            .get(model)
            .and_then(|keys| keys.get(key))
            .cloned()
    }

    /// Bind (model, key) to an identifier and return it.
    ///
    /// With `forced`, the binding is overwritten unconditionally. Without it,
    /// an existing binding is returned unchanged, otherwise a fresh UUID is
    /// minted and stored.
    pub fn link(&self, model: &str, key: &CanonicalKey, forced: Option<String>) -> String {
        let mut links = self.lock();
        let keys = links.entry(model.to_string()).or_default();

        if let Some(id) = forced {
            if let Some(previous) = keys.insert(key.clone(), id.clone()) {
                if previous != id {
                    tracing::debug!(model, %key, %previous, %id, "Rebound remap entry");
                }
            }
            return id;
        }

        keys.entry(key.clone())
            .or_insert_with(|| {
                let id = Uuid::new_v4().to_string();
                tracing::trace!(model, %key, %id, "Minted identifier");
                id
            })
            .clone()
    }

    /// Total number of bindings.
    pub fn len(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    /// Whether the table holds no bindings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every binding, sorted by model then key.
    pub fn entries(&self) -> Vec<RemapEntry> {
        let links = self.lock();
        let mut entries: Vec<RemapEntry> = links
            .iter()
            .flat_map(|(model, keys)| {
                keys.iter().map(move |(key, id)| RemapEntry {
                    model: model.clone(),
                    key: key.clone(),
                    id: id.clone(),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.model.cmp(&b.model).then_with(|| a.key.cmp(&b.key)));
        entries
    }
}
