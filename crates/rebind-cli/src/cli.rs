use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rebind",
    about = "Export related records with instance-independent identifiers",
    version
)]
pub struct Cli {
    /// SQLite database to export from (`sqlite://` prefix optional)
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Remap store keeping minted identifiers between runs
    #[arg(long, env = "REBIND_REMAP_DB", global = true)]
    pub remap_db: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export records of one or more models as JSON Lines
    Export {
        /// Model kind to export (repeatable)
        #[arg(long = "model", required = true)]
        models: Vec<String>,

        /// Key of a single record, as JSON (only with one --model)
        #[arg(long)]
        key: Option<String>,

        /// Fail on unresolved relations
        #[arg(long)]
        strict: bool,

        /// Serialize relation targets as well
        #[arg(long)]
        link: bool,

        /// Maximum recursion depth when following relations
        #[arg(long)]
        max_depth: Option<usize>,

        /// Settings file (.toml, .json, .yaml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show the model-level dependency closure of a model
    Deps {
        /// Model kind
        #[arg(long)]
        model: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List exportable models in registry order
    Models {
        /// Include transient and abstract models
        #[arg(long)]
        all: bool,
    },

    /// Inspect or edit persisted identifiers
    Remap {
        #[command(subcommand)]
        command: RemapCommands,
    },
}

#[derive(Subcommand)]
pub enum RemapCommands {
    /// Print stored bindings
    List {
        /// Restrict to one model kind
        #[arg(long)]
        model: Option<String>,
    },

    /// Bind a source record to an externally assigned identifier
    Bind {
        /// Model kind
        #[arg(long)]
        model: String,

        /// Source key, as JSON
        #[arg(long)]
        key: String,

        /// Identifier to bind
        #[arg(long)]
        id: String,
    },
}
