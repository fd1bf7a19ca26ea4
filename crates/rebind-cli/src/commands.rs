//! Subcommand implementations.

use anyhow::{bail, Context, Result};
use futures::stream;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use rebind_core::{
    export_jsonl, CanonicalKey, DataSource, Entry, ExportSettings, Exporter, JsonlStats,
    RemapTable,
};
use rebind_sqlite::{SqliteRemapStore, SqliteSource};

use crate::cli::Cli;

/// Options of `rebind export`.
pub struct ExportArgs {
    pub models: Vec<String>,
    pub key: Option<String>,
    pub strict: bool,
    pub link: bool,
    pub max_depth: Option<usize>,
    pub config: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

fn database_path(cli: &Cli) -> Result<PathBuf> {
    let url = cli
        .database_url
        .as_deref()
        .context("no database given: pass --database-url or set DATABASE_URL")?;
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    Ok(PathBuf::from(path))
}

fn remap_path(cli: &Cli) -> PathBuf {
    cli.remap_db.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rebind")
            .join("remap.db")
    })
}

fn open_source(cli: &Cli) -> Result<Arc<SqliteSource>> {
    let path = database_path(cli)?;
    let source = SqliteSource::open(&path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(Arc::new(source))
}

fn open_store(cli: &Cli) -> Result<SqliteRemapStore> {
    let path = remap_path(cli);
    tracing::debug!(path = %path.display(), "Opening remap store");
    SqliteRemapStore::open(&path)
        .with_context(|| format!("failed to open remap store {}", path.display()))
}

/// Parse a key argument; anything that is not JSON is taken as a string key.
fn parse_key(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn settings(args: &ExportArgs) -> Result<ExportSettings> {
    let mut settings = match &args.config {
        Some(path) => ExportSettings::from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => ExportSettings::default(),
    };
    settings.apply_env();

    if args.strict {
        settings.strict = true;
    }
    if args.link {
        settings.link = true;
    }
    if let Some(max_depth) = args.max_depth {
        if max_depth == 0 {
            bail!("--max-depth must be at least 1");
        }
        settings.max_depth = max_depth;
    }
    Ok(settings)
}

pub async fn export(cli: &Cli, args: ExportArgs) -> Result<()> {
    let entries: Vec<Entry> = match &args.key {
        Some(key) => {
            if args.models.len() != 1 {
                bail!("--key needs exactly one --model");
            }
            vec![Entry::record(args.models[0].clone(), parse_key(key))]
        }
        None => args.models.iter().map(|m| Entry::all(m.as_str())).collect(),
    };

    let settings = settings(&args)?;
    let store = open_store(cli)?;
    let remap = Arc::new(store.load()?);
    let exporter = Arc::new(Exporter::new(open_source(cli)?, Arc::clone(&remap), settings));

    let output = exporter.export_blocking(entries).await?;
    let warnings = output.warnings.len();
    let records = output.record_count();
    let lines = output.into_lines();

    let stats = match &args.output {
        Some(path) => {
            let file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?;
            export_jsonl(stream::iter(lines), file).await?
        }
        None => export_jsonl(stream::iter(lines), tokio::io::stdout()).await?,
    };
    report_write(&stats)?;

    let saved = store.save(&remap)?;
    tracing::info!(records, warnings, new_bindings = saved, "Export complete");
    Ok(())
}

fn report_write(stats: &JsonlStats) -> Result<()> {
    for error in &stats.errors {
        tracing::error!("{}", error);
    }
    if !stats.is_success() {
        bail!(
            "{} of {} lines could not be written",
            stats.total - stats.written,
            stats.total
        );
    }
    Ok(())
}

pub fn deps(cli: &Cli, model: &str, json: bool) -> Result<()> {
    let exporter = Exporter::new(
        open_source(cli)?,
        Arc::new(RemapTable::new()),
        ExportSettings::default(),
    );
    let report = exporter.dependencies(model)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Dependency order for {}:", report.root);
    for (i, model) in report.order.iter().enumerate() {
        println!("  {}. {}", i + 1, model);
    }
    for cycle in &report.cycles {
        println!("Cycle: {}", cycle.join(" -> "));
    }
    for missing in &report.missing {
        println!("Not exportable: {}", missing);
    }
    Ok(())
}

pub fn models(cli: &Cli, all: bool) -> Result<()> {
    let source = open_source(cli)?;

    if all {
        for descriptor in source.models()? {
            let mut flags = Vec::new();
            if descriptor.transient {
                flags.push("transient");
            }
            if descriptor.is_abstract {
                flags.push("abstract");
            }
            if flags.is_empty() {
                println!("{}", descriptor.name);
            } else {
                println!("{} ({})", descriptor.name, flags.join(", "));
            }
        }
        return Ok(());
    }

    let exporter = Exporter::new(source, Arc::new(RemapTable::new()), ExportSettings::default());
    for model in exporter.registry()?.iter() {
        let relations = model
            .descriptor
            .fields
            .iter()
            .filter(|f| f.relation_target().is_some())
            .count();
        println!(
            "{}\t{} fields\t{} relations",
            model.descriptor.name,
            model.descriptor.fields.len(),
            relations
        );
    }
    Ok(())
}

pub fn remap_list(cli: &Cli, model: Option<&str>) -> Result<()> {
    let store = open_store(cli)?;
    for link in store.list(model)? {
        println!(
            "{}\t{}\t{}\t{}",
            link.model,
            link.key,
            link.id,
            link.linked_at.to_rfc3339()
        );
    }
    Ok(())
}

pub fn remap_bind(cli: &Cli, model: &str, key: &str, id: &str) -> Result<()> {
    let key = CanonicalKey::from_value(&parse_key(key))?;
    let store = open_store(cli)?;
    let table = store.load()?;

    let previous = table.resolve(model, &key);
    table.link(model, &key, Some(id.to_string()));
    store.save(&table)?;

    match previous {
        Some(previous) if previous != id => {
            println!("{}({}) rebound {} -> {}", model, key, previous, id)
        }
        _ => println!("{}({}) bound to {}", model, key, id),
    }
    Ok(())
}
