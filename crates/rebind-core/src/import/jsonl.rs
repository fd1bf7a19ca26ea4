//! JSON Lines input for replaying consumers.
//!
//! Reads export lines back in batches without loading the whole file.

use crate::exporter::ExportLine;
use crate::RebindResult;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Statistics from a JSONL read.
#[derive(Debug, Default, Clone)]
pub struct ImportStats {
    /// Non-empty lines processed.
    pub total: u64,
    /// Lines accepted by the batch callback.
    pub imported: u64,
    /// Lines the callback declined.
    pub skipped: u64,
    /// Error messages for failed lines or batches.
    pub errors: Vec<String>,
}

impl ImportStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if import completed without errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get the error rate as a percentage.
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.errors.len() as f64 / self.total as f64) * 100.0
        }
    }

    fn record_batch(&mut self, submitted: usize, result: RebindResult<usize>) {
        match result {
            Ok(count) => {
                self.imported += count as u64;
                self.skipped += submitted.saturating_sub(count) as u64;
            }
            Err(e) => self.errors.push(format!("Batch import error: {}", e)),
        }
    }
}

/// Read export lines and hand them to `import_batch` in batches.
///
/// Malformed lines are counted as errors but do not abort the read. The
/// callback returns how many lines of the batch it accepted.
///
/// # Example
///
/// ```ignore
/// use tokio::fs::File;
/// use tokio::io::BufReader;
///
/// let reader = BufReader::new(File::open("export.jsonl").await?);
/// let stats = import_jsonl(reader, 100, |batch| async move {
///     Ok(batch.len())
/// }).await?;
/// ```
pub async fn import_jsonl<R, F, Fut>(
    reader: R,
    batch_size: usize,
    mut import_batch: F,
) -> RebindResult<ImportStats>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(Vec<ExportLine>) -> Fut,
    Fut: Future<Output = RebindResult<usize>>,
{
    let batch_size = batch_size.max(1);
    let mut stats = ImportStats::new();
    let mut batch = Vec::with_capacity(batch_size);
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        stats.total += 1;

        match serde_json::from_str::<ExportLine>(line) {
            Ok(parsed) => {
                batch.push(parsed);
                if batch.len() >= batch_size {
                    let submitted = batch.len();
                    let result = import_batch(std::mem::take(&mut batch)).await;
                    stats.record_batch(submitted, result);
                    batch = Vec::with_capacity(batch_size);
                }
            }
            Err(e) => {
                tracing::warn!(line = stats.total, error = %e, "Skipping malformed line");
                stats
                    .errors
                    .push(format!("Parse error at line {}: {}", stats.total, e));
            }
        }
    }

    if !batch.is_empty() {
        let submitted = batch.len();
        let result = import_batch(batch).await;
        stats.record_batch(submitted, result);
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    fn record_line(id: u32) -> String {
        format!(
            r#"{{"type":"record","model":"res.partner","id":"p{}","fields":{{"name":"P{}"}}}}"#,
            id, id
        )
    }

    #[tokio::test]
    async fn test_import_jsonl_basic() {
        let jsonl = [
            record_line(1),
            r#"{"type":"patch","model":"res.partner","id":"p1","fields":{"parent_id":"p2"}}"#
                .to_string(),
            r#"{"type":"warning","model":"res.partner","id":"p1","field":"user_id","kind":"unresolved","message":"missing"}"#
                .to_string(),
        ]
        .join("\n");

        let mut captured = Vec::new();
        let stats = import_jsonl(BufReader::new(Cursor::new(jsonl)), 100, |batch| {
            let count = batch.len();
            captured.extend(batch);
            async move { Ok(count) }
        })
        .await
        .unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.imported, 3);
        assert!(stats.is_success());
        assert!(matches!(captured[0], ExportLine::Record(_)));
        assert!(matches!(captured[1], ExportLine::Patch(_)));
        assert!(matches!(captured[2], ExportLine::Warning(_)));
    }

    #[tokio::test]
    async fn test_import_jsonl_with_batching() {
        let jsonl = (0..25).map(record_line).collect::<Vec<_>>().join("\n");
        let mut batch_counts = Vec::new();

        let stats = import_jsonl(BufReader::new(Cursor::new(jsonl)), 10, |batch| {
            let count = batch.len();
            batch_counts.push(count);
            async move { Ok(count) }
        })
        .await
        .unwrap();

        assert_eq!(stats.total, 25);
        assert_eq!(stats.imported, 25);
        assert_eq!(batch_counts, vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_import_jsonl_with_errors() {
        let jsonl = format!("{}\nnot json\n{}\n{{\"type\":\"unknown\"}}", record_line(1), record_line(2));

        let stats = import_jsonl(BufReader::new(Cursor::new(jsonl)), 100, |batch| async move {
            Ok(batch.len())
        })
        .await
        .unwrap();

        assert_eq!(stats.total, 4);
        assert_eq!(stats.imported, 2);
        assert_eq!(stats.errors.len(), 2);
        assert!(stats.errors[0].contains("Parse error at line 2"));
        assert!((stats.error_rate() - 50.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_import_jsonl_skipped_and_empty_lines() {
        let jsonl = format!("{}\n\n{}\n\n", record_line(1), record_line(2));

        let stats = import_jsonl(BufReader::new(Cursor::new(jsonl)), 100, |_batch| async move {
            Ok(1)
        })
        .await
        .unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.imported, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn test_import_jsonl_empty_input() {
        let stats = import_jsonl(BufReader::new(Cursor::new("")), 100, |batch| async move {
            Ok(batch.len())
        })
        .await
        .unwrap();

        assert_eq!(stats.total, 0);
        assert!(stats.is_success());
    }
}
