//! Traversal contexts.
//!
//! An [`ExportContext`] carries everything that stays fixed for an export
//! session: the data source, the remap table, the settings, and the model
//! registry. Each phase of the traversal gets its own freshly built state,
//! tagged by [`Phase`]:
//!
//! - [`DependencyState`] while computing the model-level dependency closure;
//! - [`RecordState`] while exactly one record is being serialized;
//! - [`EntryState`] while one top-level request is being exported.
//!
//! The [`Traversal`] keeps open phases on a stack and pops them on every exit
//! path, so phase-local sets never leak into sibling traversals.

mod state;
mod traversal;

pub use state::{DependencyReport, DependencyState, EntryState, RecordState};
pub use traversal::{RecordStatus, Resolution, Traversal};

use crate::config::ExportSettings;
use crate::registry::ModelRegistry;
use crate::remap::RemapTable;
use crate::traits::DataSource;
use crate::types::{CanonicalKey, Entry, RecordRef};

/// Session-wide, read-only context shared by every phase.
#[derive(Clone, Copy)]
pub struct ExportContext<'a> {
    /// Source store.
    pub source: &'a dyn DataSource,
    /// Identity remap table.
    pub remap: &'a RemapTable,
    /// Export settings.
    pub settings: &'a ExportSettings,
    /// Exportable models and their serializers.
    pub registry: &'a ModelRegistry,
}

impl<'a> ExportContext<'a> {
    /// Create a context.
    pub fn new(
        source: &'a dyn DataSource,
        remap: &'a RemapTable,
        settings: &'a ExportSettings,
        registry: &'a ModelRegistry,
    ) -> Self {
        Self {
            source,
            remap,
            settings,
            registry,
        }
    }

    /// Session-wide strict flag.
    pub fn strict(&self) -> bool {
        self.settings.strict
    }

    /// Whether relation targets are serialized recursively.
    pub fn link(&self) -> bool {
        self.settings.link
    }

    /// State for a dependency-closure phase rooted at `model`.
    pub fn resolve_dependencies(&self, model: &str) -> Phase {
        Phase::Dependency(DependencyState::new(model))
    }

    /// State for a top-level entry phase.
    pub fn new_entry(&self, entry: &Entry) -> Phase {
        Phase::Entry(EntryState::new(entry.clone()))
    }

    /// State for a record phase.
    pub fn new_record(&self, record: RecordRef) -> Phase {
        Phase::Record(RecordState::new(record))
    }

    /// Previously minted identifier for a source key.
    pub fn resolve_key(&self, model: &str, key: &CanonicalKey) -> Option<String> {
        self.remap.resolve(model, key)
    }

    /// Minted identifier for a source key, binding one if needed.
    pub fn link_key(&self, model: &str, key: &CanonicalKey, forced: Option<String>) -> String {
        self.remap.link(model, key, forced)
    }
}

impl std::fmt::Debug for ExportContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportContext")
            .field("settings", self.settings)
            .field("models", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Phase-specific traversal state.
#[derive(Debug)]
pub enum Phase {
    /// Model-level dependency closure.
    Dependency(DependencyState),
    /// Serialization of one record.
    Record(RecordState),
    /// Export of one top-level entry.
    Entry(EntryState),
}

impl Phase {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dependency(_) => "dependency",
            Self::Record(_) => "record",
            Self::Entry(_) => "entry",
        }
    }

    /// Unwrap record-phase state.
    pub fn into_record(self) -> Option<RecordState> {
        match self {
            Self::Record(state) => Some(state),
            _ => None,
        }
    }

    /// Unwrap dependency-phase state.
    pub fn into_dependency(self) -> Option<DependencyState> {
        match self {
            Self::Dependency(state) => Some(state),
            _ => None,
        }
    }
}
