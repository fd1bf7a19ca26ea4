//! JSON Lines output for export results.
//!
//! Each line is one tagged JSON object: a `record`, a `patch`, or a
//! `warning`. The format suits:
//! - replaying inserts line by line in registry order
//! - piping through `jq` or `grep`
//! - appending the output of several runs

use crate::exporter::ExportLine;
use crate::RebindResult;
use futures::Stream;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Statistics from a JSONL write.
#[derive(Debug, Default, Clone)]
pub struct JsonlStats {
    /// Total lines processed.
    pub total: u64,
    /// Lines written.
    pub written: u64,
    /// Error messages for lines that failed.
    pub errors: Vec<String>,
}

impl JsonlStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if every line was written.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.total == self.written
    }
}

/// Write export lines as JSON Lines.
///
/// Uses a buffered writer. A line that fails to serialize or write is
/// counted in the returned errors and the rest are still written.
///
/// # Example
///
/// ```ignore
/// use futures::stream;
/// use tokio::fs::File;
///
/// let file = File::create("export.jsonl").await?;
/// let lines = output.into_lines();
/// let stats = export_jsonl(stream::iter(lines), file).await?;
/// ```
pub async fn export_jsonl<W, S>(lines: S, writer: W) -> RebindResult<JsonlStats>
where
    W: AsyncWrite + Unpin,
    S: Stream<Item = ExportLine>,
{
    use futures::StreamExt;

    let mut stats = JsonlStats::new();
    let mut writer = BufWriter::new(writer);
    let mut lines = std::pin::pin!(lines);

    while let Some(line) = lines.next().await {
        stats.total += 1;

        let mut json = match serde_json::to_string(&line) {
            Ok(json) => json,
            Err(e) => {
                stats.errors.push(format!(
                    "Serialization error for {} {}: {}",
                    line.model(),
                    line.id(),
                    e
                ));
                continue;
            }
        };
        json.push('\n');

        if let Err(e) = writer.write_all(json.as_bytes()).await {
            stats
                .errors
                .push(format!("Write error for {} {}: {}", line.model(), line.id(), e));
            continue;
        }
        stats.written += 1;
    }

    if let Err(e) = writer.flush().await {
        stats.errors.push(format!("Final flush error: {}", e));
    }

    tracing::debug!(total = stats.total, written = stats.written, "JSONL export written");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExportWarning, FieldMap, RecordPatch, SerializedRecord, WarningKind};
    use futures::stream;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn record(id: &str) -> ExportLine {
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), json!("Acme"));
        ExportLine::Record(SerializedRecord {
            model: "res.partner".to_string(),
            id: id.to_string(),
            fields,
            delayed: BTreeSet::new(),
            dependencies: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_export_jsonl_basic() {
        let mut output = Vec::new();
        let stats = export_jsonl(stream::iter(vec![record("a"), record("b")]), &mut output)
            .await
            .unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.written, 2);
        assert!(stats.is_success());

        let content = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: ExportLine = serde_json::from_str(line).unwrap();
            assert!(matches!(parsed, ExportLine::Record(_)));
        }
    }

    #[tokio::test]
    async fn test_export_jsonl_mixed_lines() {
        let mut fields = FieldMap::new();
        fields.insert("parent_id".to_string(), json!("b"));
        let lines = vec![
            record("a"),
            ExportLine::Patch(RecordPatch {
                model: "res.partner".to_string(),
                id: "a".to_string(),
                fields,
            }),
            ExportLine::Warning(ExportWarning {
                model: "res.partner".to_string(),
                id: "a".to_string(),
                field: "user_id".to_string(),
                kind: WarningKind::PermanentlyDelayed,
                message: "cycle".to_string(),
            }),
        ];

        let mut output = Vec::new();
        let stats = export_jsonl(stream::iter(lines), &mut output).await.unwrap();
        assert_eq!(stats.written, 3);

        let content = String::from_utf8(output).unwrap();
        let types: Vec<String> = content
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["type"].to_string())
            .collect();
        assert_eq!(types, vec!["\"record\"", "\"patch\"", "\"warning\""]);
        assert!(content.contains("\"kind\":\"permanently_delayed\""));
    }

    #[tokio::test]
    async fn test_export_jsonl_empty_stream() {
        let mut output = Vec::new();
        let stats = export_jsonl(stream::iter(Vec::<ExportLine>::new()), &mut output)
            .await
            .unwrap();

        assert_eq!(stats.total, 0);
        assert!(stats.is_success());
        assert!(output.is_empty());
    }
}
