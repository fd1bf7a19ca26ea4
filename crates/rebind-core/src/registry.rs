//! Registry of exportable model kinds.

use std::collections::HashMap;

use crate::config::ExportSettings;
use crate::error::RebindResult;
use crate::traits::{DataSource, ModelSerializer, SerializerFactory};
use crate::types::ModelDescriptor;

/// One exportable model kind and its serializer.
pub struct RegisteredModel {
    /// Descriptor reported by the data source.
    pub descriptor: ModelDescriptor,
    /// Serializer built for this kind.
    pub serializer: Box<dyn ModelSerializer>,
}

impl std::fmt::Debug for RegisteredModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredModel")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Exportable model kinds in source enumeration order.
///
/// Transient and abstract kinds, and kinds configured with `skip`, are left
/// out. The order is kept because replaying inserts in registry order respects
/// the store's foreign-key install order.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<RegisteredModel>,
    index: HashMap<String, usize>,
}

impl ModelRegistry {
    /// Enumerate the source's models and build a serializer for each exportable one.
    pub fn build(
        source: &dyn DataSource,
        settings: &ExportSettings,
        factory: &dyn SerializerFactory,
    ) -> RebindResult<Self> {
        let mut registry = Self::default();

        for descriptor in source.models()? {
            if !descriptor.is_exportable() {
                tracing::debug!(
                    model = %descriptor.name,
                    transient = descriptor.transient,
                    is_abstract = descriptor.is_abstract,
                    "Skipping non-exportable model"
                );
                continue;
            }

            let config = settings.model(&descriptor.name);
            if config.map_or(false, |c| c.skip) {
                tracing::debug!(model = %descriptor.name, "Skipping model excluded by configuration");
                continue;
            }

            let serializer = factory.create(&descriptor, config);
            registry.insert(descriptor, serializer);
        }

        tracing::debug!(models = registry.len(), "Model registry built");
        Ok(registry)
    }

    fn insert(&mut self, descriptor: ModelDescriptor, serializer: Box<dyn ModelSerializer>) {
        if let Some(&position) = self.index.get(&descriptor.name) {
            tracing::warn!(model = %descriptor.name, "Duplicate model kind reported by data source");
            self.models[position] = RegisteredModel {
                descriptor,
                serializer,
            };
            return;
        }
        self.index.insert(descriptor.name.clone(), self.models.len());
        self.models.push(RegisteredModel {
            descriptor,
            serializer,
        });
    }

    /// Look up a registered model.
    pub fn get(&self, model: &str) -> Option<&RegisteredModel> {
        self.index.get(model).map(|&i| &self.models[i])
    }

    /// Serializer for a registered model.
    pub fn serializer(&self, model: &str) -> Option<&dyn ModelSerializer> {
        self.get(model).map(|m| m.serializer.as_ref())
    }

    /// Whether a model kind is exportable.
    pub fn contains(&self, model: &str) -> bool {
        self.index.contains_key(model)
    }

    /// Position of a model in registry order.
    pub fn position(&self, model: &str) -> Option<usize> {
        self.index.get(model).copied()
    }

    /// Registered models in order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredModel> {
        self.models.iter()
    }

    /// Registered model names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.descriptor.name.as_str())
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether no model is registered.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::serializer::DefaultSerializerFactory;
    use crate::source::MemorySource;
    use crate::types::FieldDescriptor;

    fn source() -> MemorySource {
        MemorySource::new()
            .with_model(ModelDescriptor::new("res.company").with_field(FieldDescriptor::scalar("name")))
            .with_model(ModelDescriptor::new("base.wizard").transient())
            .with_model(
                ModelDescriptor::new("res.partner")
                    .with_field(FieldDescriptor::relation("company_id", "res.company")),
            )
            .with_model(ModelDescriptor::new("mail.thread").abstract_kind())
            .with_model(ModelDescriptor::new("mail.message"))
    }

    #[test]
    fn test_build_filters_transient_and_abstract() {
        let registry =
            ModelRegistry::build(&source(), &ExportSettings::default(), &DefaultSerializerFactory)
                .unwrap();

        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["res.company", "res.partner", "mail.message"]);
        assert!(!registry.contains("base.wizard"));
        assert!(!registry.contains("mail.thread"));
        assert_eq!(registry.position("res.partner"), Some(1));
    }

    #[test]
    fn test_build_honors_skip_config() {
        let settings = ExportSettings::builder()
            .model(
                "mail.message",
                ModelConfig {
                    skip: true,
                    ..Default::default()
                },
            )
            .build();
        let registry =
            ModelRegistry::build(&source(), &settings, &DefaultSerializerFactory).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get("mail.message").is_none());
    }

    #[test]
    fn test_serializer_lookup() {
        let registry =
            ModelRegistry::build(&source(), &ExportSettings::default(), &DefaultSerializerFactory)
                .unwrap();

        let serializer = registry.serializer("res.partner").unwrap();
        assert_eq!(serializer.model(), "res.partner");
        assert_eq!(serializer.relation_targets(), vec!["res.company"]);
    }
}
