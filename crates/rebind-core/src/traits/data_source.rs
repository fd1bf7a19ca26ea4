//! Data access trait.

use crate::error::RebindResult;
use crate::types::{KeyValue, ModelDescriptor, RecordValues};

/// Read access to the source store.
///
/// Calls are blocking; the exporter drives them from a single thread.
pub trait DataSource: Send + Sync {
    /// Every model kind known to the store, in the store's enumeration order.
    fn models(&self) -> RebindResult<Vec<ModelDescriptor>>;

    /// Keys of every record of `model`.
    fn keys(&self, model: &str) -> RebindResult<Vec<KeyValue>>;

    /// Current field values of one record, or `None` if it does not exist.
    fn read(&self, model: &str, key: &KeyValue) -> RebindResult<Option<RecordValues>>;

    /// Whether a record exists.
    fn contains(&self, model: &str, key: &KeyValue) -> RebindResult<bool> {
        Ok(self.read(model, key)?.is_some())
    }
}
