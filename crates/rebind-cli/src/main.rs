//! rebind - export related records with remapped identifiers.
//!
//! # Configuration
//!
//! Read from the environment (a `.env` file is loaded first):
//!
//! - `DATABASE_URL` - SQLite database to export from
//! - `REBIND_REMAP_DB` - Optional, defaults to `~/.rebind/remap.db`
//! - `REBIND_STRICT`, `REBIND_LINK`, `REBIND_MAX_DEPTH` - export settings
//! - `RUST_LOG` - log filter
//!
//! JSON Lines go to stdout (or `--output`); logs go to stderr.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commands;

use cli::{Cli, Commands, RemapCommands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the export
    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let result = match &cli.command {
        Commands::Export {
            models,
            key,
            strict,
            link,
            max_depth,
            config,
            output,
        } => {
            commands::export(
                &cli,
                commands::ExportArgs {
                    models: models.clone(),
                    key: key.clone(),
                    strict: *strict,
                    link: *link,
                    max_depth: *max_depth,
                    config: config.clone(),
                    output: output.clone(),
                },
            )
            .await
        }
        Commands::Deps { model, json } => commands::deps(&cli, model, *json),
        Commands::Models { all } => commands::models(&cli, *all),
        Commands::Remap { command } => match command {
            RemapCommands::List { model } => commands::remap_list(&cli, model.as_deref()),
            RemapCommands::Bind { model, key, id } => commands::remap_bind(&cli, model, key, id),
        },
    };

    result.inspect_err(|e| {
        tracing::error!("{:#}", e);
    })
}
