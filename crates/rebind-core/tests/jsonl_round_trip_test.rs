//! Integration tests for JSONL output of export results.
//!
//! Exports a small record graph, writes it as JSON Lines, and reads it back.

use futures::stream;
use rebind_core::{
    export_jsonl, import_jsonl, Entry, ExportLine, ExportSettings, Exporter, FieldDescriptor,
    MemorySource, ModelDescriptor, RemapTable,
};
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::BufReader;

fn exporter() -> Exporter {
    let source = MemorySource::new()
        .with_model(ModelDescriptor::new("res.company").with_field(FieldDescriptor::scalar("name")))
        .with_model(
            ModelDescriptor::new("res.partner")
                .with_field(FieldDescriptor::scalar("name"))
                .with_field(FieldDescriptor::relation("company_id", "res.company"))
                .with_field(FieldDescriptor::relation("parent_id", "res.partner"))
                .with_field(FieldDescriptor::relation("user_id", "res.users")),
        )
        .with_record("res.company", 1, json!({"name": "Acme"}))
        .unwrap()
        .with_record("res.partner", 1, json!({"name": "Loop", "company_id": 1, "parent_id": 1}))
        .unwrap()
        .with_record("res.partner", 2, json!({"name": "Ghost user", "user_id": 5}))
        .unwrap();

    Exporter::new(
        Arc::new(source),
        Arc::new(RemapTable::new()),
        ExportSettings::builder().link(true).build(),
    )
}

/// Records, patches, and warnings survive a write and read back in order.
#[tokio::test]
async fn test_jsonl_round_trip() {
    let exporter = exporter();
    let output = exporter.export(&[Entry::all("res.partner")]).unwrap();

    assert_eq!(output.record_count(), 3);
    assert_eq!(output.patches.len(), 1);
    assert_eq!(output.warnings.len(), 1);

    let lines = output.clone().into_lines();
    let mut buffer = Vec::new();
    let stats = export_jsonl(stream::iter(lines.clone()), &mut buffer)
        .await
        .unwrap();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.written, 5);
    assert!(stats.is_success());

    let content = String::from_utf8(buffer.clone()).unwrap();
    assert_eq!(content.lines().count(), 5, "Should have 5 lines of JSON");

    let mut imported: Vec<ExportLine> = Vec::new();
    let import_stats = import_jsonl(BufReader::new(Cursor::new(buffer)), 2, |batch| {
        let count = batch.len();
        imported.extend(batch);
        async move { Ok(count) }
    })
    .await
    .unwrap();

    assert_eq!(import_stats.total, 5);
    assert_eq!(import_stats.imported, 5);
    assert!(import_stats.is_success());
    assert_eq!(imported, lines);
}

/// Replay order: every record of a model precedes records of later models,
/// and patches only refer to records already seen.
#[tokio::test]
async fn test_jsonl_replay_order() {
    let exporter = exporter();
    let output = exporter.export(&[Entry::all("res.partner")]).unwrap();

    let mut buffer = Vec::new();
    export_jsonl(stream::iter(output.into_lines()), &mut buffer)
        .await
        .unwrap();

    let mut seen = Vec::new();
    let mut kinds = Vec::new();
    let stats = import_jsonl(BufReader::new(Cursor::new(buffer)), 100, |batch| {
        let count = batch.len();
        for line in batch {
            match &line {
                ExportLine::Record(record) => {
                    kinds.push(record.model.clone());
                    seen.push(record.id.clone());
                }
                ExportLine::Patch(patch) => assert!(seen.contains(&patch.id)),
                ExportLine::Warning(warning) => assert!(seen.contains(&warning.id)),
            }
        }
        async move { Ok(count) }
    })
    .await
    .unwrap();

    assert_eq!(stats.imported, 5);
    assert_eq!(kinds, vec!["res.company", "res.partner", "res.partner"]);
}
