//! Export results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{ExportWarning, RecordPatch, SerializedRecord};

/// Records of one model kind, keyed by minted identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecords {
    /// Model kind.
    pub model: String,
    /// Serialized records.
    pub records: BTreeMap<String, SerializedRecord>,
}

/// Counters collected during an export pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStats {
    /// Entries exported.
    pub entries: usize,
    /// Records emitted.
    pub records: usize,
    /// Records emitted with delayed fields.
    pub deferred: usize,
    /// Patches produced by the corrective pass.
    pub patches: usize,
    /// Fields filled in by those patches.
    pub patched_fields: usize,
    /// Relation values left unresolved.
    pub unresolved: usize,
    /// Fields still delayed after the corrective pass.
    pub permanently_delayed: usize,
    /// Of those, fields delayed by the depth guard.
    pub depth_limited: usize,
    /// Top-level records skipped because they failed to serialize.
    pub failed: usize,
}

/// Everything produced by one export.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportOutput {
    /// Emitted records grouped by model kind, in registry order.
    pub models: Vec<ModelRecords>,
    /// Late values for delayed fields, in the order they were resolved.
    pub patches: Vec<RecordPatch>,
    /// Non-fatal conditions.
    pub warnings: Vec<ExportWarning>,
    /// Counters.
    pub stats: ExportStats,
}

impl ExportOutput {
    /// Records of a model kind.
    pub fn records(&self, model: &str) -> Option<&BTreeMap<String, SerializedRecord>> {
        self.models
            .iter()
            .find(|m| m.model == model)
            .map(|m| &m.records)
    }

    /// One record by model kind and minted identifier.
    pub fn record(&self, model: &str, id: &str) -> Option<&SerializedRecord> {
        self.records(model).and_then(|records| records.get(id))
    }

    /// Total number of emitted records.
    pub fn record_count(&self) -> usize {
        self.models.iter().map(|m| m.records.len()).sum()
    }

    /// Model kinds present, in output order.
    pub fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.model.as_str()).collect()
    }

    /// Flatten into JSONL lines: records in registry order, then patches, then warnings.
    pub fn into_lines(self) -> Vec<ExportLine> {
        let mut lines = Vec::with_capacity(
            self.record_count() + self.patches.len() + self.warnings.len(),
        );
        for model in self.models {
            lines.extend(model.records.into_values().map(ExportLine::Record));
        }
        lines.extend(self.patches.into_iter().map(ExportLine::Patch));
        lines.extend(self.warnings.into_iter().map(ExportLine::Warning));
        lines
    }
}

/// One line of JSONL output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExportLine {
    /// A serialized record.
    Record(SerializedRecord),
    /// A corrective patch.
    Patch(RecordPatch),
    /// A warning.
    Warning(ExportWarning),
}

impl ExportLine {
    /// Model kind the line belongs to.
    pub fn model(&self) -> &str {
        match self {
            Self::Record(r) => &r.model,
            Self::Patch(p) => &p.model,
            Self::Warning(w) => &w.model,
        }
    }

    /// Minted identifier the line refers to.
    pub fn id(&self) -> &str {
        match self {
            Self::Record(r) => &r.id,
            Self::Patch(p) => &p.id,
            Self::Warning(w) => &w.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldMap, WarningKind};
    use serde_json::json;
    use std::collections::BTreeSet;

    fn record(model: &str, id: &str) -> SerializedRecord {
        SerializedRecord {
            model: model.to_string(),
            id: id.to_string(),
            fields: FieldMap::new(),
            delayed: BTreeSet::new(),
            dependencies: Vec::new(),
        }
    }

    fn output() -> ExportOutput {
        let mut companies = BTreeMap::new();
        companies.insert("c1".to_string(), record("res.company", "c1"));
        let mut partners = BTreeMap::new();
        partners.insert("p2".to_string(), record("res.partner", "p2"));
        partners.insert("p1".to_string(), record("res.partner", "p1"));

        let mut patch_fields = FieldMap::new();
        patch_fields.insert("parent_id".to_string(), json!("p2"));

        ExportOutput {
            models: vec![
                ModelRecords {
                    model: "res.company".to_string(),
                    records: companies,
                },
                ModelRecords {
                    model: "res.partner".to_string(),
                    records: partners,
                },
            ],
            patches: vec![RecordPatch {
                model: "res.partner".to_string(),
                id: "p1".to_string(),
                fields: patch_fields,
            }],
            warnings: vec![ExportWarning {
                model: "res.partner".to_string(),
                id: "p2".to_string(),
                field: "user_id".to_string(),
                kind: WarningKind::Unresolved,
                message: "missing".to_string(),
            }],
            stats: ExportStats::default(),
        }
    }

    #[test]
    fn test_lookup_helpers() {
        let output = output();
        assert_eq!(output.record_count(), 3);
        assert_eq!(output.model_names(), vec!["res.company", "res.partner"]);
        assert!(output.record("res.partner", "p1").is_some());
        assert!(output.record("res.partner", "c1").is_none());
        assert!(output.records("res.users").is_none());
    }

    #[test]
    fn test_into_lines_order() {
        let lines = output().into_lines();
        let ids: Vec<&str> = lines.iter().map(ExportLine::id).collect();
        assert_eq!(ids, vec!["c1", "p1", "p2", "p1", "p2"]);
        assert!(matches!(lines[3], ExportLine::Patch(_)));
        assert!(matches!(lines[4], ExportLine::Warning(_)));
    }

    #[test]
    fn test_line_tagging() {
        let line = ExportLine::Record(record("res.company", "c1"));
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["type"], "record");
        assert_eq!(json["model"], "res.company");

        let back: ExportLine = serde_json::from_value(json).unwrap();
        assert_eq!(back, line);
    }
}
