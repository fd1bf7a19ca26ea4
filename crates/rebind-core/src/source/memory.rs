//! In-memory data source.

use std::collections::{BTreeMap, HashMap};

use crate::error::{RebindError, RebindResult};
use crate::traits::DataSource;
use crate::types::{CanonicalKey, KeyValue, ModelDescriptor, RecordValues};

#[derive(Debug, Clone)]
struct StoredRecord {
    raw: KeyValue,
    values: RecordValues,
}

/// Data source backed by plain maps.
///
/// Models enumerate in insertion order; records of a model enumerate in
/// canonical key order.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    models: Vec<ModelDescriptor>,
    records: HashMap<String, BTreeMap<CanonicalKey, StoredRecord>>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model kind.
    pub fn with_model(mut self, descriptor: ModelDescriptor) -> Self {
        self.add_model(descriptor);
        self
    }

    /// Register a model kind, replacing an existing descriptor of the same name.
    pub fn add_model(&mut self, descriptor: ModelDescriptor) {
        match self.models.iter_mut().find(|m| m.name == descriptor.name) {
            Some(existing) => *existing = descriptor,
            None => {
                self.records.entry(descriptor.name.clone()).or_default();
                self.models.push(descriptor);
            }
        }
    }

    /// Insert or replace a record. `values` must be a JSON object.
    pub fn insert(
        &mut self,
        model: &str,
        key: impl Into<KeyValue>,
        values: serde_json::Value,
    ) -> RebindResult<()> {
        let records = self
            .records
            .get_mut(model)
            .ok_or_else(|| RebindError::unknown_model(model))?;

        let raw = key.into();
        let canonical = CanonicalKey::from_value(&raw)?;
        let values = match values {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            other => {
                return Err(RebindError::data_source(format!(
                    "record values must be an object, got {}",
                    other
                )))
            }
        };

        records.insert(canonical, StoredRecord { raw, values });
        Ok(())
    }

    /// Builder form of [`MemorySource::insert`].
    pub fn with_record(
        mut self,
        model: &str,
        key: impl Into<KeyValue>,
        values: serde_json::Value,
    ) -> RebindResult<Self> {
        self.insert(model, key, values)?;
        Ok(self)
    }

    /// Remove a record, returning whether it existed.
    pub fn remove(&mut self, model: &str, key: &KeyValue) -> RebindResult<bool> {
        let canonical = CanonicalKey::from_value(key)?;
        Ok(self
            .records
            .get_mut(model)
            .map_or(false, |records| records.remove(&canonical).is_some()))
    }

    fn stored(&self, model: &str, key: &KeyValue) -> RebindResult<Option<&StoredRecord>> {
        let records = self
            .records
            .get(model)
            .ok_or_else(|| RebindError::unknown_model(model))?;
        let canonical = CanonicalKey::from_value(key)?;
        Ok(records.get(&canonical))
    }
}

impl DataSource for MemorySource {
    fn models(&self) -> RebindResult<Vec<ModelDescriptor>> {
        Ok(self.models.clone())
    }

    fn keys(&self, model: &str) -> RebindResult<Vec<KeyValue>> {
        let records = self
            .records
            .get(model)
            .ok_or_else(|| RebindError::unknown_model(model))?;
        Ok(records.values().map(|r| r.raw.clone()).collect())
    }

    fn read(&self, model: &str, key: &KeyValue) -> RebindResult<Option<RecordValues>> {
        Ok(self.stored(model, key)?.map(|r| r.values.clone()))
    }

    fn contains(&self, model: &str, key: &KeyValue) -> RebindResult<bool> {
        Ok(self.stored(model, key)?.is_some())
    }
}
