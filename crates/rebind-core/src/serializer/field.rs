//! Descriptor-driven field serializer.

use serde_json::Value;
use std::collections::BTreeSet;

use crate::config::ModelConfig;
use crate::context::{Resolution, Traversal};
use crate::error::RebindResult;
use crate::traits::{ModelSerializer, SerializerFactory};
use crate::types::{FieldDescriptor, FieldKind, FieldMap, ModelDescriptor, RecordRef, RecordValues};

/// Serializes a record by walking its model descriptor.
///
/// Scalars are copied unchanged. A single relation becomes the target's
/// minted identifier, or null when the source value is null, delayed, or
/// unresolved. A multi relation becomes an array of identifiers; if any
/// element is delayed the whole field is null until patched, and unresolved
/// elements are dropped.
#[derive(Debug, Clone)]
pub struct FieldSerializer {
    model: String,
    fields: Vec<FieldDescriptor>,
}

impl FieldSerializer {
    /// Build a serializer for `descriptor`, keeping only fields `config` includes.
    pub fn new(descriptor: &ModelDescriptor, config: Option<&ModelConfig>) -> Self {
        let fields = descriptor
            .fields
            .iter()
            .filter(|f| config.map_or(true, |c| c.includes(&f.name)))
            .cloned()
            .collect();
        Self {
            model: descriptor.name.clone(),
            fields,
        }
    }

    /// Fields serialized, in output order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    fn serialize_field(
        &self,
        traversal: &mut Traversal<'_>,
        field: &FieldDescriptor,
        values: &RecordValues,
    ) -> RebindResult<Value> {
        let value = values.get(&field.name).cloned().unwrap_or(Value::Null);

        let (target, many) = match &field.kind {
            FieldKind::Scalar => return Ok(value),
            FieldKind::Relation { target, many } => (target.as_str(), *many),
        };

        if !many {
            if value.is_null() {
                return Ok(Value::Null);
            }
            return Ok(match traversal.resolve_relation(&field.name, target, &value)? {
                Resolution::Resolved(id) => Value::String(id),
                Resolution::Delayed | Resolution::Unresolved => Value::Null,
            });
        }

        let elements = match value {
            Value::Null => Vec::new(),
            Value::Array(elements) => elements,
            other => vec![other],
        };

        let mut ids = Vec::with_capacity(elements.len());
        let mut delayed = false;
        for element in &elements {
            match traversal.resolve_relation(&field.name, target, element)? {
                Resolution::Resolved(id) => ids.push(Value::String(id)),
                Resolution::Delayed => delayed = true,
                Resolution::Unresolved => {}
            }
        }

        if delayed {
            Ok(Value::Null)
        } else {
            Ok(Value::Array(ids))
        }
    }
}

impl ModelSerializer for FieldSerializer {
    fn model(&self) -> &str {
        &self.model
    }

    fn relation_targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();
        for target in self.fields.iter().filter_map(FieldDescriptor::relation_target) {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }

    fn serialize(
        &self,
        traversal: &mut Traversal<'_>,
        _record: &RecordRef,
        values: &RecordValues,
    ) -> RebindResult<FieldMap> {
        let mut out = FieldMap::new();
        for field in &self.fields {
            let value = self.serialize_field(traversal, field, values)?;
            out.insert(field.name.clone(), value);
        }
        Ok(out)
    }

    fn serialize_fields(
        &self,
        traversal: &mut Traversal<'_>,
        _record: &RecordRef,
        values: &RecordValues,
        fields: &BTreeSet<String>,
    ) -> RebindResult<FieldMap> {
        let mut out = FieldMap::new();
        for field in self.fields.iter().filter(|f| fields.contains(&f.name)) {
            let value = self.serialize_field(traversal, field, values)?;
            out.insert(field.name.clone(), value);
        }
        Ok(out)
    }
}

/// Factory producing a [`FieldSerializer`] for every model kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSerializerFactory;

impl SerializerFactory for DefaultSerializerFactory {
    fn create(
        &self,
        descriptor: &ModelDescriptor,
        config: Option<&ModelConfig>,
    ) -> Box<dyn ModelSerializer> {
        Box::new(FieldSerializer::new(descriptor, config))
    }
}
