//! Built-in model serializers.

mod field;

pub use field::{DefaultSerializerFactory, FieldSerializer};
