//! Model serializer contract.

use std::collections::BTreeSet;

use crate::config::ModelConfig;
use crate::context::Traversal;
use crate::error::RebindResult;
use crate::types::{FieldMap, ModelDescriptor, RecordRef, RecordValues};

/// Converts one record into an ordered field mapping.
///
/// Relation fields must be routed through [`Traversal::resolve_relation`] so
/// their values are remapped and their targets visited, delayed, or reported
/// as unresolved by the traversal.
pub trait ModelSerializer: Send + Sync {
    /// Model kind this serializer handles.
    fn model(&self) -> &str;

    /// Model kinds referenced by this serializer's relation fields.
    fn relation_targets(&self) -> Vec<&str>;

    /// Serialize a whole record.
    fn serialize(
        &self,
        traversal: &mut Traversal<'_>,
        record: &RecordRef,
        values: &RecordValues,
    ) -> RebindResult<FieldMap>;

    /// Serialize only the named fields (used by the corrective pass).
    fn serialize_fields(
        &self,
        traversal: &mut Traversal<'_>,
        record: &RecordRef,
        values: &RecordValues,
        fields: &BTreeSet<String>,
    ) -> RebindResult<FieldMap>;
}

/// Builds one [`ModelSerializer`] per registered model kind.
pub trait SerializerFactory: Send + Sync {
    /// Create a serializer for `descriptor`, tuned by its optional per-kind configuration.
    fn create(
        &self,
        descriptor: &ModelDescriptor,
        config: Option<&ModelConfig>,
    ) -> Box<dyn ModelSerializer>;
}
