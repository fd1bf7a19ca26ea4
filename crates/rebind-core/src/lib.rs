//! rebind-core - Core library for rebind.
//!
//! This crate exports a graph of related records from a source store into an
//! instance-agnostic form: every record gets a freshly minted identifier, and
//! every relation value is rewritten to the target's minted identifier.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rebind_core::{Entry, ExportSettings, Exporter, MemorySource, RemapTable};
//!
//! let remap = Arc::new(RemapTable::new());
//! let exporter = Exporter::new(Arc::new(source), Arc::clone(&remap), ExportSettings::default());
//!
//! let output = exporter.export(&[Entry::all("res.partner")])?;
//! for line in output.into_lines() {
//!     println!("{}", serde_json::to_string(&line)?);
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod exporter;
pub mod import;
pub mod registry;
pub mod remap;
pub mod serializer;
pub mod source;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{ExportSettings, ModelConfig};
pub use context::{DependencyReport, ExportContext, Resolution, Traversal};
pub use error::{ErrorCode, RebindError, RebindResult};
pub use export::{export_jsonl, JsonlStats};
pub use exporter::{ExportLine, ExportOutput, ExportStats, Exporter, ModelRecords};
pub use import::{import_jsonl, ImportStats};
pub use registry::ModelRegistry;
pub use remap::{RemapEntry, RemapTable};
pub use serializer::{DefaultSerializerFactory, FieldSerializer};
pub use source::MemorySource;
pub use traits::{DataSource, ModelSerializer, SerializerFactory};
pub use types::{
    CanonicalKey, Entry, ExportWarning, FieldDescriptor, FieldKind, FieldMap, KeyValue,
    ModelDescriptor, RecordPatch, RecordRef, RecordValues, SerializedRecord, WarningKind,
};
