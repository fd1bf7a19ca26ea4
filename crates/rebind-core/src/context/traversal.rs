//! Record graph traversal.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use super::{DependencyReport, DependencyState, ExportContext, Phase, RecordState};
use crate::error::{RebindError, RebindResult};
use crate::exporter::{ExportOutput, ExportStats, ModelRecords};
use crate::types::{
    CanonicalKey, Entry, ExportWarning, FieldMap, KeyValue, RecordPatch, RecordRef,
    SerializedRecord, WarningKind,
};

/// Progress of one record within an export pass.
///
/// A record absent from the status map has not been started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// Currently being serialized somewhere up the call stack.
    InProgress,
    /// Emitted with every relation field resolved.
    Completed,
    /// Emitted with at least one delayed field.
    Deferred,
}

/// Outcome of resolving one relation value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Minted identifier of the target.
    Resolved(String),
    /// Field was delayed; emit null for now.
    Delayed,
    /// Target cannot be exported; a warning was recorded.
    Unresolved,
}

impl Resolution {
    /// Minted identifier, if resolved.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Resolved(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct DeferredRecord {
    id: String,
    fields: BTreeSet<String>,
    dependencies: BTreeSet<CanonicalKey>,
    depth_limited: BTreeSet<String>,
}

/// State of one export pass.
///
/// Guarantees each record is serialized at most once per pass. Phases are
/// kept on a stack; the innermost open [`Phase::Record`] is the record whose
/// relation fields are currently being resolved.
pub struct Traversal<'a> {
    ctx: ExportContext<'a>,
    phases: Vec<Phase>,
    status: HashMap<RecordRef, RecordStatus>,
    emitted: HashMap<String, BTreeMap<String, SerializedRecord>>,
    deferred: BTreeMap<RecordRef, DeferredRecord>,
    pending: VecDeque<RecordRef>,
    patches: Vec<RecordPatch>,
    warnings: Vec<ExportWarning>,
    correcting: bool,
    stats: ExportStats,
}

impl<'a> Traversal<'a> {
    /// Start a pass over `ctx`.
    pub fn new(ctx: ExportContext<'a>) -> Self {
        Self {
            ctx,
            phases: Vec::new(),
            status: HashMap::new(),
            emitted: HashMap::new(),
            deferred: BTreeMap::new(),
            pending: VecDeque::new(),
            patches: Vec::new(),
            warnings: Vec::new(),
            correcting: false,
            stats: ExportStats::default(),
        }
    }

    /// Session context.
    pub fn context(&self) -> ExportContext<'a> {
        self.ctx
    }

    /// Status of a record in this pass.
    pub fn status(&self, record: &RecordRef) -> Option<RecordStatus> {
        self.status.get(record).copied()
    }

    /// Record currently being serialized.
    pub fn current_record(&self) -> Option<&RecordState> {
        match self.phases.last() {
            Some(Phase::Record(state)) => Some(state),
            _ => None,
        }
    }

    /// Whether the pass is re-serializing delayed fields.
    pub fn is_correcting(&self) -> bool {
        self.correcting
    }

    /// Number of records on the serialization stack.
    pub fn depth(&self) -> usize {
        self.phases
            .iter()
            .filter(|p| matches!(p, Phase::Record(_)))
            .count()
    }

    fn record_state_mut(&mut self) -> RebindResult<&mut RecordState> {
        match self.phases.last_mut() {
            Some(Phase::Record(state)) => Ok(state),
            Some(other) => Err(RebindError::Internal(format!(
                "relation resolved during {} phase",
                other.name()
            ))),
            None => Err(RebindError::Internal(
                "relation resolved outside any phase".to_string(),
            )),
        }
    }

    fn dependency_state_mut(&mut self) -> RebindResult<&mut DependencyState> {
        match self.phases.last_mut() {
            Some(Phase::Dependency(state)) => Ok(state),
            _ => Err(RebindError::Internal(
                "dependency walk outside dependency phase".to_string(),
            )),
        }
    }

    /// Run `f` with `phase` pushed, popping it again on every exit path.
    ///
    /// Returns the popped phase alongside the closure's own result.
    fn scoped<T>(
        &mut self,
        phase: Phase,
        f: impl FnOnce(&mut Self) -> RebindResult<T>,
    ) -> RebindResult<(Phase, RebindResult<T>)> {
        let depth = self.phases.len();
        self.phases.push(phase);
        let result = f(self);
        self.phases.truncate(depth + 1);
        let phase = self
            .phases
            .pop()
            .ok_or_else(|| RebindError::Internal("phase stack underflow".to_string()))?;
        Ok((phase, result))
    }

    /// Resolve one relation value of the current record.
    ///
    /// `raw` is the target's key as stored in the field. Depending on the
    /// target's status the value resolves to its minted identifier, the field
    /// is delayed, or (in non-strict mode) it is reported as unresolved.
    pub fn resolve_relation(
        &mut self,
        field: &str,
        target: &str,
        raw: &KeyValue,
    ) -> RebindResult<Resolution> {
        let owner = self.record_state_mut()?.record().model.clone();

        if !self.ctx.registry.contains(target) {
            return self.unresolved(field, RebindError::unknown_target(&owner, field, target));
        }

        let target_ref = match RecordRef::new(target, raw.clone()) {
            Ok(target_ref) => target_ref,
            Err(e) => {
                let err = RebindError::invalid_relation(&owner, field, e.to_string());
                return self.unresolved(field, err);
            }
        };
        self.record_state_mut()?.add_relation(&target_ref);

        if self.correcting {
            return self.resolve_for_patch(field, &target_ref);
        }

        match self.status(&target_ref) {
            Some(RecordStatus::InProgress) => {
                tracing::debug!(field, target = %target_ref, "Delaying field on cycle");
                self.record_state_mut()?.delay_field(field);
                Ok(Resolution::Delayed)
            }
            Some(_) => Ok(Resolution::Resolved(self.link(&target_ref))),
            None => self.resolve_unvisited(field, target_ref),
        }
    }

    fn resolve_unvisited(&mut self, field: &str, target: RecordRef) -> RebindResult<Resolution> {
        let owner = self.record_state_mut()?.record().model.clone();
        match self.ctx.source.contains(&target.model, &target.raw) {
            Ok(true) => {}
            Ok(false) => {
                let err = RebindError::missing_target(&owner, field, target.to_string());
                return self.unresolved(field, err);
            }
            Err(e) if self.ctx.settings.is_strict(&owner) => return Err(e),
            Err(e) => {
                let err = RebindError::invalid_relation(&owner, field, e.to_string());
                return self.unresolved(field, err);
            }
        }

        if !self.ctx.link() {
            return Ok(Resolution::Resolved(self.link(&target)));
        }

        if self.depth() >= self.ctx.settings.max_depth {
            tracing::debug!(
                field,
                target = %target,
                max_depth = self.ctx.settings.max_depth,
                "Depth limit reached, queueing target"
            );
            self.record_state_mut()?.delay_field_at_depth_limit(field);
            if !self.pending.contains(&target) {
                self.pending.push_back(target);
            }
            return Ok(Resolution::Delayed);
        }

        match self.visit(target.clone()) {
            Ok(_) => Ok(Resolution::Resolved(self.link(&target))),
            Err(e) => {
                if self.ctx.settings.is_strict(&owner) {
                    return Err(e);
                }
                let err = RebindError::missing_target(
                    &owner,
                    field,
                    format!("{} could not be serialized: {}", target, e),
                );
                self.unresolved(field, err)
            }
        }
    }

    fn resolve_for_patch(&mut self, field: &str, target: &RecordRef) -> RebindResult<Resolution> {
        let resolved = match self.status(target) {
            Some(RecordStatus::Completed) => true,
            Some(RecordStatus::Deferred) => self.record_state_mut()?.depends_on(&target.key),
            Some(RecordStatus::InProgress) => false,
            None => !self.ctx.link(),
        };

        if resolved {
            Ok(Resolution::Resolved(self.link(target)))
        } else {
            self.record_state_mut()?.delay_field(field);
            Ok(Resolution::Delayed)
        }
    }

    /// Fail in strict mode, otherwise record a warning and leave the value out.
    fn unresolved(&mut self, field: &str, err: RebindError) -> RebindResult<Resolution> {
        let record = self.record_state_mut()?.record().clone();
        if self.ctx.settings.is_strict(&record.model) {
            return Err(err);
        }

        // Already reported during the primary pass.
        if self.correcting {
            return Ok(Resolution::Unresolved);
        }

        tracing::warn!(record = %record, field, error = %err, "Relation left unresolved");
        let id = self.link(&record);
        self.warnings.push(ExportWarning {
            model: record.model,
            id,
            field: field.to_string(),
            kind: WarningKind::Unresolved,
            message: err.to_string(),
        });
        self.stats.unresolved += 1;
        Ok(Resolution::Unresolved)
    }

    fn link(&self, record: &RecordRef) -> String {
        self.ctx.link_key(&record.model, &record.key, None)
    }

    /// Serialize one record and emit it.
    fn visit(&mut self, record: RecordRef) -> RebindResult<RecordStatus> {
        let registry = self.ctx.registry;
        let serializer = registry
            .serializer(&record.model)
            .ok_or_else(|| RebindError::unknown_model(&record.model))?;

        let values = self
            .ctx
            .source
            .read(&record.model, &record.raw)?
            .ok_or_else(|| RebindError::not_found(&record.model, &record.key))?;

        let id = self.link(&record);
        self.status.insert(record.clone(), RecordStatus::InProgress);
        tracing::trace!(record = %record, %id, depth = self.depth(), "Serializing record");

        let phase = self.ctx.new_record(record.clone());
        let (phase, result) = self.scoped(phase, |t| serializer.serialize(t, &record, &values))?;

        let fields = match result {
            Ok(fields) => fields,
            Err(e) => {
                self.status.remove(&record);
                return Err(e);
            }
        };

        let state = phase
            .into_record()
            .ok_or_else(|| RebindError::Internal("record phase mismatch".to_string()))?;
        let (record, dependencies, delayed, depth_limited) = state.into_parts();

        let status = if delayed.is_empty() {
            RecordStatus::Completed
        } else {
            RecordStatus::Deferred
        };

        let dependency_ids = dependencies
            .iter()
            .map(|key| self.ctx.link_key(&record.model, key, None))
            .collect();

        if status == RecordStatus::Deferred {
            self.stats.deferred += 1;
            self.deferred.insert(
                record.clone(),
                DeferredRecord {
                    id: id.clone(),
                    fields: delayed.clone(),
                    dependencies,
                    depth_limited,
                },
            );
        }

        self.emitted
            .entry(record.model.clone())
            .or_default()
            .insert(
                id.clone(),
                SerializedRecord {
                    model: record.model.clone(),
                    id,
                    fields,
                    delayed,
                    dependencies: dependency_ids,
                },
            );
        self.stats.records += 1;
        self.status.insert(record, status);
        Ok(status)
    }

    /// Serialize a top-level record unless this pass already did.
    fn visit_root(&mut self, record: RecordRef) -> RebindResult<()> {
        if self.status.contains_key(&record) {
            return Ok(());
        }
        let err = match self.visit(record.clone()) {
            Ok(_) => return Ok(()),
            Err(e) if self.ctx.settings.is_strict(&record.model) => return Err(e),
            Err(e) => e,
        };

        match err {
            RebindError::RecordNotFound { .. } => {
                tracing::warn!(record = %record, error = %err, "Skipping missing record");
                Ok(())
            }
            RebindError::Serializer { .. }
            | RebindError::DataSource { .. }
            | RebindError::Database { .. }
            | RebindError::InvalidKey { .. } => {
                tracing::warn!(record = %record, error = %err, "Skipping record that failed to serialize");
                let id = self.link(&record);
                self.warnings.push(ExportWarning {
                    model: record.model,
                    id,
                    field: String::new(),
                    kind: WarningKind::RecordFailed,
                    message: err.to_string(),
                });
                self.stats.failed += 1;
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Export one entry within this pass.
    pub fn export_entry(&mut self, entry: &Entry) -> RebindResult<()> {
        if !self.ctx.registry.contains(&entry.model) {
            return Err(RebindError::unknown_model(&entry.model));
        }

        let phase = self.ctx.new_entry(entry);
        let (_, result) = self.scoped(phase, |t| t.run_entry(entry))?;
        result?;
        self.stats.entries += 1;
        Ok(())
    }

    fn run_entry(&mut self, entry: &Entry) -> RebindResult<()> {
        let keys = match &entry.key {
            Some(key) => vec![key.clone()],
            None => self.ctx.source.keys(&entry.model)?,
        };
        tracing::debug!(model = %entry.model, keys = keys.len(), "Exporting entry");

        for raw in keys {
            let record = match RecordRef::new(entry.model.as_str(), raw.clone()) {
                Ok(record) => record,
                Err(e) if self.ctx.settings.is_strict(&entry.model) => return Err(e),
                Err(e) => {
                    tracing::warn!(model = %entry.model, key = %raw, error = %e, "Skipping unusable key");
                    continue;
                }
            };
            self.visit_root(record)?;
        }

        // Targets queued by the depth guard start again from the top.
        while let Some(record) = self.pending.pop_front() {
            self.visit_root(record)?;
        }
        Ok(())
    }

    /// Patch delayed fields until a pass makes no further progress.
    ///
    /// Fields that are still delayed afterwards are reported as warnings.
    pub fn correct(&mut self) -> RebindResult<()> {
        self.correcting = true;
        let result = self.run_corrections();
        self.correcting = false;
        result?;

        for (record, deferred) in &self.deferred {
            for field in &deferred.fields {
                let kind = if deferred.depth_limited.contains(field) {
                    self.stats.depth_limited += 1;
                    WarningKind::DepthLimited
                } else {
                    self.stats.permanently_delayed += 1;
                    WarningKind::PermanentlyDelayed
                };
                tracing::warn!(record = %record, field = %field, %kind, "Field left delayed");
                self.warnings.push(ExportWarning {
                    model: record.model.clone(),
                    id: deferred.id.clone(),
                    field: field.clone(),
                    kind,
                    message: format!("{}.{} could not be resolved", record, field),
                });
            }
        }
        Ok(())
    }

    fn run_corrections(&mut self) -> RebindResult<()> {
        let registry = self.ctx.registry;
        let mut round = 0usize;

        loop {
            round += 1;
            let mut progress = false;
            let candidates: Vec<RecordRef> = self.deferred.keys().cloned().collect();

            for record in candidates {
                let deferred = match self.deferred.get(&record) {
                    Some(deferred) => deferred.clone(),
                    None => continue,
                };
                let serializer = registry
                    .serializer(&record.model)
                    .ok_or_else(|| RebindError::unknown_model(&record.model))?;
                let values = match self.ctx.source.read(&record.model, &record.raw)? {
                    Some(values) => values,
                    None => continue,
                };

                let state = RecordState::with_dependencies(record.clone(), deferred.dependencies);
                let (phase, result) = self.scoped(Phase::Record(state), |t| {
                    serializer.serialize_fields(t, &record, &values, &deferred.fields)
                })?;
                let fields = result?;
                let state = phase
                    .into_record()
                    .ok_or_else(|| RebindError::Internal("record phase mismatch".to_string()))?;
                let still_delayed = state.delayed().clone();

                let patched: FieldMap = fields
                    .into_iter()
                    .filter(|(name, _)| {
                        deferred.fields.contains(name) && !still_delayed.contains(name)
                    })
                    .collect();

                if !patched.is_empty() {
                    progress = true;
                    self.stats.patched_fields += patched.len();
                    self.patches.push(RecordPatch {
                        model: record.model.clone(),
                        id: deferred.id.clone(),
                        fields: patched,
                    });
                }

                if still_delayed.is_empty() {
                    self.deferred.remove(&record);
                    self.status.insert(record, RecordStatus::Completed);
                } else if let Some(entry) = self.deferred.get_mut(&record) {
                    entry.fields = still_delayed;
                }
            }

            tracing::debug!(round, remaining = self.deferred.len(), "Corrective round finished");
            if !progress || self.deferred.is_empty() {
                break;
            }
        }
        Ok(())
    }

    /// Compute the model-level dependency closure of `model`.
    pub fn resolve_dependencies(&mut self, model: &str) -> RebindResult<DependencyReport> {
        if !self.ctx.registry.contains(model) {
            return Err(RebindError::unknown_model(model));
        }

        let phase = self.ctx.resolve_dependencies(model);
        let (phase, result) = self.scoped(phase, |t| t.walk_dependencies(model))?;
        result?;
        phase
            .into_dependency()
            .map(DependencyState::into_report)
            .ok_or_else(|| RebindError::Internal("dependency phase mismatch".to_string()))
    }

    fn walk_dependencies(&mut self, model: &str) -> RebindResult<()> {
        if !self.dependency_state_mut()?.enter(model) {
            return Ok(());
        }

        let registry = self.ctx.registry;
        let serializer = registry
            .serializer(model)
            .ok_or_else(|| RebindError::unknown_model(model))?;

        for target in serializer.relation_targets() {
            if registry.contains(target) {
                self.walk_dependencies(target)?;
            } else {
                self.dependency_state_mut()?.add_missing(target);
            }
        }

        self.dependency_state_mut()?.leave();
        Ok(())
    }

    /// Consume the pass and assemble its output in registry order.
    pub fn finish(mut self) -> ExportOutput {
        let mut models = Vec::new();
        for name in self.ctx.registry.names() {
            if let Some(records) = self.emitted.remove(name) {
                models.push(ModelRecords {
                    model: name.to_string(),
                    records,
                });
            }
        }

        self.stats.patches = self.patches.len();
        ExportOutput {
            models,
            patches: self.patches,
            warnings: self.warnings,
            stats: self.stats,
        }
    }
}

impl std::fmt::Debug for Traversal<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Traversal")
            .field("phases", &self.phases.iter().map(Phase::name).collect::<Vec<_>>())
            .field("records", &self.status.len())
            .field("deferred", &self.deferred.len())
            .field("correcting", &self.correcting)
            .finish_non_exhaustive()
    }
}
