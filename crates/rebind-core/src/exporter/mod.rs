//! Export orchestration.
//!
//! [`Exporter`] ties together a data source, a shared remap table, settings,
//! and a serializer factory. Each call to [`Exporter::export`] runs one pass:
//! every requested record is serialized at most once, delayed fields are
//! patched by a corrective pass, and the result keeps registry order.

mod output;

pub use output::{ExportLine, ExportOutput, ExportStats, ModelRecords};

use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::config::ExportSettings;
use crate::context::{DependencyReport, ExportContext, Traversal};
use crate::error::{RebindError, RebindResult};
use crate::registry::ModelRegistry;
use crate::remap::RemapTable;
use crate::serializer::DefaultSerializerFactory;
use crate::traits::{DataSource, SerializerFactory};
use crate::types::{CanonicalKey, Entry, KeyValue};

/// Export session over one data source.
pub struct Exporter {
    source: Arc<dyn DataSource>,
    remap: Arc<RemapTable>,
    settings: ExportSettings,
    factory: Box<dyn SerializerFactory>,
    registry: OnceCell<ModelRegistry>,
}

impl Exporter {
    /// Create an exporter using [`DefaultSerializerFactory`].
    pub fn new(
        source: Arc<dyn DataSource>,
        remap: Arc<RemapTable>,
        settings: ExportSettings,
    ) -> Self {
        Self {
            source,
            remap,
            settings,
            factory: Box::new(DefaultSerializerFactory),
            registry: OnceCell::new(),
        }
    }

    /// Replace the serializer factory.
    pub fn with_factory(mut self, factory: impl SerializerFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self.registry = OnceCell::new();
        self
    }

    /// Export settings.
    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Shared remap table.
    pub fn remap(&self) -> &Arc<RemapTable> {
        &self.remap
    }

    /// Model registry, built on first use.
    pub fn registry(&self) -> RebindResult<&ModelRegistry> {
        self.registry.get_or_try_init(|| {
            ModelRegistry::build(self.source.as_ref(), &self.settings, self.factory.as_ref())
        })
    }

    fn context(&self) -> RebindResult<ExportContext<'_>> {
        Ok(ExportContext::new(
            self.source.as_ref(),
            &self.remap,
            &self.settings,
            self.registry()?,
        ))
    }

    /// Export a batch of entries in one pass.
    pub fn export(&self, entries: &[Entry]) -> RebindResult<ExportOutput> {
        let mut traversal = Traversal::new(self.context()?);

        for entry in entries {
            traversal.export_entry(entry).map_err(|e| {
                tracing::error!(model = %entry.model, error = %e, "Entry export failed");
                e
            })?;
        }
        traversal.correct()?;

        let output = traversal.finish();
        tracing::info!(
            entries = output.stats.entries,
            records = output.stats.records,
            patches = output.stats.patches,
            warnings = output.warnings.len(),
            "Export finished"
        );
        Ok(output)
    }

    /// Export a single entry.
    pub fn export_entry(&self, entry: &Entry) -> RebindResult<ExportOutput> {
        self.export(std::slice::from_ref(entry))
    }

    /// Export every record of every registered model.
    pub fn export_all(&self) -> RebindResult<ExportOutput> {
        let entries: Vec<Entry> = self.registry()?.names().map(Entry::all).collect();
        self.export(&entries)
    }

    /// Run [`Exporter::export`] on the blocking thread pool.
    pub async fn export_blocking(
        self: Arc<Self>,
        entries: Vec<Entry>,
    ) -> RebindResult<ExportOutput> {
        tokio::task::spawn_blocking(move || self.export(&entries))
            .await
            .map_err(|e| RebindError::Internal(format!("export task failed: {}", e)))?
    }

    /// Model-level dependency closure of `model`.
    pub fn dependencies(&self, model: &str) -> RebindResult<DependencyReport> {
        let mut traversal = Traversal::new(self.context()?);
        traversal.resolve_dependencies(model)
    }

    /// Identifier already minted for a source record, if any.
    pub fn identifier(&self, model: &str, key: &KeyValue) -> RebindResult<Option<String>> {
        let key = CanonicalKey::from_value(key)?;
        Ok(self.remap.resolve(model, &key))
    }

    /// Bind a source record to an externally assigned identifier.
    pub fn bind(&self, model: &str, key: &KeyValue, id: impl Into<String>) -> RebindResult<String> {
        if !self.registry()?.contains(model) {
            return Err(RebindError::unknown_model(model));
        }
        let key = CanonicalKey::from_value(key)?;
        Ok(self.remap.link(model, &key, Some(id.into())))
    }
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("settings", &self.settings)
            .field("remap", &self.remap.len())
            .field("registry", &self.registry.get().map(ModelRegistry::len))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::types::{FieldDescriptor, ModelDescriptor};
    use serde_json::json;

    fn source() -> MemorySource {
        MemorySource::new()
            .with_model(ModelDescriptor::new("res.company").with_field(FieldDescriptor::scalar("name")))
            .with_model(
                ModelDescriptor::new("res.partner")
                    .with_field(FieldDescriptor::scalar("name"))
                    .with_field(FieldDescriptor::relation("company_id", "res.company"))
                    .with_field(FieldDescriptor::relation("parent_id", "res.partner")),
            )
            .with_record("res.company", 1, json!({"name": "Acme"}))
            .unwrap()
            .with_record("res.partner", 1, json!({"name": "Root", "company_id": 1, "parent_id": null}))
            .unwrap()
            .with_record("res.partner", 2, json!({"name": "Child", "company_id": 1, "parent_id": 1}))
            .unwrap()
    }

    fn exporter(settings: ExportSettings) -> Exporter {
        Exporter::new(Arc::new(source()), Arc::new(RemapTable::new()), settings)
    }

    #[test]
    fn test_export_without_link_keeps_to_requested_model() {
        let exporter = exporter(ExportSettings::default());
        let output = exporter.export_entry(&Entry::all("res.partner")).unwrap();

        assert_eq!(output.model_names(), vec!["res.partner"]);
        assert_eq!(output.record_count(), 2);

        let company_id = exporter.identifier("res.company", &json!(1)).unwrap().unwrap();
        let child_id = exporter.identifier("res.partner", &json!(2)).unwrap().unwrap();
        let root_id = exporter.identifier("res.partner", &json!(1)).unwrap().unwrap();

        let child = output.record("res.partner", &child_id).unwrap();
        assert_eq!(child.field("company_id"), Some(&json!(company_id)));
        assert_eq!(child.field("parent_id"), Some(&json!(root_id)));
        assert!(child.is_complete());
    }

    #[test]
    fn test_export_with_link_follows_relations_in_registry_order() {
        let exporter = exporter(ExportSettings::builder().link(true).build());
        let output = exporter.export_entry(&Entry::record("res.partner", 2)).unwrap();

        assert_eq!(output.model_names(), vec!["res.company", "res.partner"]);
        assert_eq!(output.record_count(), 3);
        assert_eq!(output.stats.records, 3);
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_export_unknown_model_fails() {
        let exporter = exporter(ExportSettings::default());
        let err = exporter.export_entry(&Entry::all("res.users")).unwrap_err();
        assert!(matches!(err, RebindError::UnknownModel { .. }));
    }

    #[test]
    fn test_export_missing_explicit_key() {
        let lenient = exporter(ExportSettings::default());
        let output = lenient.export_entry(&Entry::record("res.partner", 42)).unwrap();
        assert_eq!(output.record_count(), 0);

        let strict = exporter(ExportSettings::builder().strict(true).build());
        let err = strict.export_entry(&Entry::record("res.partner", 42)).unwrap_err();
        assert!(matches!(err, RebindError::RecordNotFound { .. }));
    }

    #[test]
    fn test_bind_forces_identifier() {
        let exporter = exporter(ExportSettings::default());
        let id = exporter.bind("res.company", &json!(1), "company-acme").unwrap();
        assert_eq!(id, "company-acme");

        let output = exporter.export_entry(&Entry::all("res.company")).unwrap();
        assert!(output.record("res.company", "company-acme").is_some());
        assert!(exporter.bind("res.users", &json!(1), "x").is_err());
    }

    #[test]
    fn test_export_all() {
        let exporter = exporter(ExportSettings::default());
        let output = exporter.export_all().unwrap();
        assert_eq!(output.stats.entries, 2);
        assert_eq!(output.record_count(), 3);
    }

    #[tokio::test]
    async fn test_export_blocking() {
        let exporter = Arc::new(exporter(ExportSettings::builder().link(true).build()));
        let output = Arc::clone(&exporter)
            .export_blocking(vec![Entry::all("res.partner")])
            .await
            .unwrap();
        assert_eq!(output.record_count(), 3);
    }
}
