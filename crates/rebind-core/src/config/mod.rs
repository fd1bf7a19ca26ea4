//! Configuration system for rebind.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{RebindError, RebindResult};

/// Default recursion depth before relation targets are queued instead of visited.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Per-model serializer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Allow-list of field names. `None` keeps every field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    /// Fields removed from the output.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    /// Leave this model kind out of the registry entirely.
    pub skip: bool,
    /// Override the session's strict flag for this kind's relation fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl ModelConfig {
    /// Whether `field` is serialized under this configuration.
    pub fn includes(&self, field: &str) -> bool {
        let allowed = self
            .fields
            .as_ref()
            .map_or(true, |fields| fields.iter().any(|f| f == field));
        allowed && !self.exclude.iter().any(|f| f == field)
    }
}

/// Main export configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Abort the entry when a relation target cannot be resolved.
    pub strict: bool,
    /// Recursively serialize relation targets instead of only remapping them.
    pub link: bool,
    /// Traversal depth guard.
    pub max_depth: usize,
    /// Per-model configuration keyed by model kind name.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub models: HashMap<String, ModelConfig>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            strict: false,
            link: false,
            max_depth: DEFAULT_MAX_DEPTH,
            models: HashMap::new(),
        }
    }
}

impl ExportSettings {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> RebindResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let settings: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| RebindError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| RebindError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| RebindError::Configuration(e.to_string()))?,
            _ => {
                return Err(RebindError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env();
        settings
    }

    /// Override fields from `REBIND_STRICT`, `REBIND_LINK`, and `REBIND_MAX_DEPTH`.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("REBIND_STRICT") {
            self.strict = parse_flag(&value);
        }
        if let Ok(value) = std::env::var("REBIND_LINK") {
            self.link = parse_flag(&value);
        }
        if let Ok(value) = std::env::var("REBIND_MAX_DEPTH") {
            match value.parse::<usize>() {
                Ok(depth) if depth > 0 => self.max_depth = depth,
                _ => tracing::warn!("Ignoring invalid REBIND_MAX_DEPTH value '{}'", value),
            }
        }
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> ExportSettingsBuilder {
        ExportSettingsBuilder::default()
    }

    /// Per-model configuration, if any.
    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }

    /// Effective strict flag for relation fields of `model`.
    pub fn is_strict(&self, model: &str) -> bool {
        self.model(model)
            .and_then(|config| config.strict)
            .unwrap_or(self.strict)
    }

    fn validate(&self) -> RebindResult<()> {
        if self.max_depth == 0 {
            return Err(RebindError::Configuration(
                "max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Builder for ExportSettings.
#[derive(Default)]
pub struct ExportSettingsBuilder {
    settings: ExportSettings,
}

impl ExportSettingsBuilder {
    /// Set strict mode.
    pub fn strict(mut self, strict: bool) -> Self {
        self.settings.strict = strict;
        self
    }

    /// Set the link flag.
    pub fn link(mut self, link: bool) -> Self {
        self.settings.link = link;
        self
    }

    /// Set the traversal depth guard.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.settings.max_depth = max_depth.max(1);
        self
    }

    /// Add a per-model configuration.
    pub fn model(mut self, name: impl Into<String>, config: ModelConfig) -> Self {
        self.settings.models.insert(name.into(), config);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ExportSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = ExportSettings::default();
        assert!(!settings.strict);
        assert!(!settings.link);
        assert_eq!(settings.max_depth, DEFAULT_MAX_DEPTH);
        assert!(settings.models.is_empty());
    }

    #[test]
    fn test_builder_and_strict_override() {
        let settings = ExportSettings::builder()
            .strict(true)
            .link(true)
            .model(
                "res.partner",
                ModelConfig {
                    strict: Some(false),
                    ..Default::default()
                },
            )
            .build();

        assert!(settings.is_strict("res.users"));
        assert!(!settings.is_strict("res.partner"));
        assert!(settings.link);
    }

    #[test]
    fn test_model_config_includes() {
        let config = ModelConfig {
            fields: Some(vec!["name".to_string(), "email".to_string()]),
            exclude: vec!["email".to_string()],
            ..Default::default()
        };
        assert!(config.includes("name"));
        assert!(!config.includes("email"));
        assert!(!config.includes("phone"));
        assert!(ModelConfig::default().includes("anything"));
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rebind.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
strict = true
max_depth = 8

[models."res.partner"]
exclude = ["image"]

[models."mail.message"]
skip = true
"#
        )
        .unwrap();

        let settings = ExportSettings::from_file(&path).unwrap();
        assert!(settings.strict);
        assert!(!settings.link);
        assert_eq!(settings.max_depth, 8);
        assert!(!settings.model("res.partner").unwrap().includes("image"));
        assert!(settings.model("mail.message").unwrap().skip);
    }

    #[test]
    fn test_from_yaml_and_json_files() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("rebind.yaml");
        std::fs::write(&yaml, "link: true\nmodels:\n  res.users:\n    fields: [login]\n").unwrap();
        let settings = ExportSettings::from_file(&yaml).unwrap();
        assert!(settings.link);
        assert!(settings.model("res.users").unwrap().includes("login"));

        let json = dir.path().join("rebind.json");
        std::fs::write(&json, r#"{"strict": true}"#).unwrap();
        assert!(ExportSettings::from_file(&json).unwrap().strict);
    }

    #[test]
    fn test_unsupported_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();

        let ini = dir.path().join("rebind.ini");
        std::fs::write(&ini, "strict=1").unwrap();
        assert!(matches!(
            ExportSettings::from_file(&ini),
            Err(RebindError::Configuration(_))
        ));

        let zero = dir.path().join("zero.json");
        std::fs::write(&zero, r#"{"max_depth": 0}"#).unwrap();
        assert!(ExportSettings::from_file(&zero).is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" yes "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("off"));
    }
}
