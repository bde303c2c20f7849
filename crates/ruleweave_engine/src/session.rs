//! Stateful sessions and the fire loop.
//!
//! A [`Session`] owns working memory, the action buffer, and the per-rule
//! state of every join tree. Facts are staged through the buffer and only
//! reach the network when [`Session::fire`] runs. Each fire cycle:
//!
//! 1. drains the buffer into type memory and buckets, retracts first;
//! 2. computes join deltas for every tree fed by a changed bucket;
//! 3. materializes new activations and builds the agenda by salience;
//! 4. runs the admitted rules' actions;
//! 5. commits buckets and merges node deltas.
//!
//! Cycles repeat while actions or activations are pending.

use std::collections::{BTreeMap, HashSet};
use std::mem;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use ruleweave_foundation::{
    Error, ErrorContext, Fact, FactHandle, Mask, MemoryAddressBits, Result, SemanticLimit, TypeId,
    Value,
};
use ruleweave_storage::{Action, ActionBuffer, ActionCounts, FactEntry, WorkingMemory};

use crate::agenda::{self, Activation, ActivationManager, DefaultActivationManager};
use crate::condition::Predicate;
use crate::config::{AgendaMode, SessionConfig};
use crate::index::TypeIndex;
use crate::node::{DeltaMode, TreeMemory};
use crate::rhs::{RhsContext, Staging};
use crate::rule::{self, CompiledRule, RuleCompiler, RuleDefinition, RuleInfo};
use crate::scheduler::{DeltaTask, Scheduler};

// =============================================================================
// Fire Report
// =============================================================================

/// Outcome of one [`Session::fire`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FireReport {
    /// Cycles run.
    pub cycles: u64,
    /// Activations fired across all rules.
    pub activations: usize,
    /// Activations fired per rule name.
    pub rule_activations: BTreeMap<String, usize>,
    /// Fact operations applied to memory.
    pub actions: ActionCounts,
    /// Group combinations built while materializing activations.
    pub combinations: usize,
}

impl FireReport {
    /// Activations fired by one rule.
    #[must_use]
    pub fn activations_of(&self, rule: &str) -> usize {
        self.rule_activations.get(rule).copied().unwrap_or(0)
    }
}

// =============================================================================
// Rule Slots
// =============================================================================

struct RuleSlot {
    rule: Arc<CompiledRule>,
    salience: i32,
    enabled: bool,
    trees: Vec<TreeMemory>,
    pending: Vec<Activation>,
}

impl RuleSlot {
    fn new(rule: Arc<CompiledRule>) -> Self {
        let trees = rule.network().trees().iter().map(TreeMemory::new).collect();
        Self {
            salience: rule.salience(),
            rule,
            enabled: true,
            trees,
            pending: Vec::new(),
        }
    }

    fn info(&self, index: usize) -> RuleInfo {
        RuleInfo {
            name: Arc::clone(self.rule.name()),
            salience: self.salience,
            index,
            enabled: self.enabled,
        }
    }
}

/// Memory changes applied by one cycle.
#[derive(Default)]
struct Applied {
    inserted: Mask<MemoryAddressBits>,
    deleted: Mask<MemoryAddressBits>,
    counts: ActionCounts,
}

// =============================================================================
// Session
// =============================================================================

/// A working memory with rules attached.
pub struct Session {
    config: SessionConfig,
    index: TypeIndex,
    memory: WorkingMemory,
    rules: Vec<RuleSlot>,
    buffer: ActionBuffer,
    next_id: u64,
    manager: Box<dyn ActivationManager>,
    scheduler: Scheduler,
}

impl Session {
    /// Creates an empty session. Rules are deployed with [`Session::add_rule`].
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            scheduler: Scheduler::new(config.worker_threads),
            config,
            index: TypeIndex::new(),
            memory: WorkingMemory::new(),
            rules: Vec::new(),
            buffer: ActionBuffer::new(),
            next_id: 0,
            manager: Box::new(DefaultActivationManager),
        }
    }

    /// Creates a session over a compiled rule set.
    pub(crate) fn from_parts(
        index: TypeIndex,
        rules: &[Arc<CompiledRule>],
        config: SessionConfig,
    ) -> Result<Self> {
        let mut session = Self::new(config);
        session.index = index;
        for ty in session.index.types() {
            session.memory.ensure_type(ty.id(), ty.name());
        }
        for address in session.index.memory_addresses() {
            session
                .memory
                .allocate_bucket(address.index, address.type_id, &address.key_fields)?;
        }
        session.rules = rules.iter().cloned().map(RuleSlot::new).collect();
        Ok(session)
    }

    /// The session's configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Replaces the agenda policy.
    pub fn set_activation_manager(&mut self, manager: Box<dyn ActivationManager>) {
        self.manager = manager;
    }

    fn staging(&mut self) -> Staging<'_> {
        Staging {
            index: &self.index,
            memory: &self.memory,
            buffer: &mut self.buffer,
            next_id: &mut self.next_id,
            strict: self.config.strict_types,
        }
    }

    // =========================================================================
    // Facts
    // =========================================================================

    /// Buffers an insert and returns the new fact's handle.
    ///
    /// A fact of a type no rule references is skipped with a warning and
    /// yields `None`, unless the session is strict.
    ///
    /// # Errors
    /// Returns `UnknownType` in strict mode.
    pub fn insert(&mut self, fact: Fact) -> Result<Option<FactHandle>> {
        self.staging().insert(fact)
    }

    /// Inserts a fact and fires.
    pub fn insert_and_fire(&mut self, fact: Fact) -> Result<(Option<FactHandle>, FireReport)> {
        let handle = self.insert(fact)?;
        let report = self.fire()?;
        Ok((handle, report))
    }

    /// Buffers an update. Updating a deleted fact is skipped with a warning.
    ///
    /// # Errors
    /// Returns `UnknownFactHandle` for a handle this session never issued and
    /// `TypeMismatch` if the fact's type differs from the handle's.
    pub fn update(&mut self, handle: FactHandle, fact: Fact) -> Result<()> {
        self.staging().update(handle, fact)
    }

    /// Buffers a delete. Deleting twice is a no-op.
    ///
    /// # Errors
    /// Returns `UnknownFactHandle` for a handle this session never issued.
    pub fn delete(&mut self, handle: FactHandle) -> Result<()> {
        self.staging().delete(handle)
    }

    /// The latest value of a fact, pending writes included.
    #[must_use]
    pub fn get_fact(&self, handle: FactHandle) -> Option<Fact> {
        match self.buffer.get(handle) {
            Some(Action::Insert(record) | Action::Update(record)) => Some(record.fact.clone()),
            Some(Action::Retract | Action::Cancelled) => None,
            None => self.memory.record(handle).map(|r| r.fact.clone()),
        }
    }

    /// Stored facts of a type, by handle id.
    #[must_use]
    pub fn facts(&self, type_name: &str) -> Vec<(FactHandle, Fact)> {
        let Some(memory) = self
            .index
            .type_id(type_name)
            .and_then(|id| self.memory.type_memory(id))
        else {
            return Vec::new();
        };
        let mut facts: Vec<(FactHandle, Fact)> = memory
            .iter()
            .map(|(handle, record)| (handle, record.fact.clone()))
            .collect();
        facts.sort_by_key(|(handle, _)| handle.id);
        facts
    }

    /// Number of stored facts.
    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.memory.fact_count()
    }

    /// Drops every fact, pending action, and activation.
    pub fn clear(&mut self) {
        self.memory.clear();
        self.buffer.clear();
        for slot in &mut self.rules {
            for tree in &mut slot.trees {
                tree.clear();
            }
            slot.pending.clear();
        }
    }

    // =========================================================================
    // Rules
    // =========================================================================

    /// Deployed rules, in deployment order.
    #[must_use]
    pub fn rules(&self) -> Vec<RuleInfo> {
        self.rules
            .iter()
            .enumerate()
            .map(|(i, slot)| slot.info(i))
            .collect()
    }

    /// A deployed rule by name.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<RuleInfo> {
        let i = self.rule_position(name)?;
        Some(self.rules[i].info(i))
    }

    fn rule_position(&self, name: &str) -> Option<usize> {
        self.rules.iter().position(|s| &**s.rule.name() == name)
    }

    /// Enables or disables a rule. Disabling drops its pending activations.
    ///
    /// Returns false if no rule has that name.
    pub fn set_rule_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let Some(i) = self.rule_position(name) else {
            return false;
        };
        let slot = &mut self.rules[i];
        slot.enabled = enabled;
        if !enabled {
            slot.pending.clear();
        }
        true
    }

    /// Changes a rule's salience. Returns false if no rule has that name.
    pub fn set_rule_salience(&mut self, name: &str, salience: i32) -> bool {
        let Some(i) = self.rule_position(name) else {
            return false;
        };
        self.rules[i].salience = salience;
        true
    }

    /// Replaces the logic of every condition with this signature.
    ///
    /// Later alpha classifications and join evaluations call `func`. Facts
    /// classified and tuples joined before the call are kept as they are.
    ///
    /// # Errors
    /// Returns `InvalidCondition` if no deployed condition has the signature.
    pub fn replace_condition(
        &mut self,
        signature: &str,
        func: impl Fn(&[&Value]) -> bool + Send + Sync + 'static,
    ) -> Result<usize> {
        let predicate = Predicate::new(signature, func);
        rule::replace_predicate(
            &mut self.index,
            self.rules.iter_mut().map(|slot| &mut slot.rule),
            &predicate,
        )
    }

    /// Deploys a rule into the live session.
    ///
    /// The rule starts from the facts already in memory: existing matches are
    /// primed without firing, and only later changes activate it.
    ///
    /// # Errors
    /// Returns `DuplicateRule` if the name is taken, or any compile error.
    #[instrument(skip_all, fields(rule = definition.name()))]
    pub fn add_rule(&mut self, definition: &RuleDefinition) -> Result<()> {
        if self.rule_position(definition.name()).is_some() {
            return Err(Error::duplicate_rule(definition.name()));
        }
        let rule = Arc::new(RuleCompiler::compile(&mut self.index, definition)?);

        for ty in self.index.types() {
            self.memory.ensure_type(ty.id(), ty.name());
        }

        // fields and alpha conditions may have grown
        let types: HashSet<TypeId> = rule.fact_types().iter().map(|ft| ft.type_id).collect();
        for &type_id in &types {
            let Some(ty) = self.index.active_type(type_id) else {
                continue;
            };
            if let Some(memory) = self.memory.type_memory_mut(type_id) {
                memory.reindex(|fact| {
                    let values = ty.resolve_values(fact);
                    let bits = ty.alpha().classify(&values);
                    (values, bits)
                });
            }
        }
        for record in self.buffer.records_mut() {
            let Some(ty) = self
                .index
                .type_id(record.fact.type_name())
                .filter(|id| types.contains(id))
                .and_then(|id| self.index.active_type(id))
            else {
                continue;
            };
            record.values = ty.resolve_values(&record.fact);
            record.alpha_bits = ty.alpha().classify(&record.values);
        }

        for ft in rule.fact_types() {
            if self.memory.bucket(ft.memory).is_ok() {
                continue;
            }
            self.memory
                .allocate_bucket(ft.memory, ft.type_id, &ft.key_fields)?;
            let existing: Vec<(Box<[_]>, FactEntry)> = self
                .memory
                .type_memory(ft.type_id)
                .into_iter()
                .flat_map(|m| m.iter())
                .filter(|(_, record)| {
                    self.index
                        .routes(ft.type_id, &record.alpha_bits)
                        .any(|a| a.index == ft.memory)
                })
                .map(|(handle, record)| {
                    (record.values.clone(), FactEntry::new(handle, record.version))
                })
                .collect();
            let bucket = self.memory.bucket_mut(ft.memory)?;
            for (values, entry) in &existing {
                bucket.insert(values, *entry);
            }
            bucket.commit();
        }

        let mut slot = RuleSlot::new(Arc::clone(&rule));
        let tasks = rule
            .network()
            .trees()
            .iter()
            .zip(slot.trees.iter_mut())
            .map(|(tree, state)| DeltaTask { tree, state })
            .collect();
        self.scheduler
            .run(tasks, &self.memory, DeltaMode::HotDeployment)?;

        debug!(
            trees = rule.network().trees().len(),
            fact_types = rule.fact_types().len(),
            "rule deployed"
        );
        self.rules.push(slot);
        Ok(())
    }

    // =========================================================================
    // Fire Loop
    // =========================================================================

    /// Runs cycles until no action or activation is pending.
    ///
    /// # Errors
    /// Returns `LimitExceeded` when the cycle ceiling is hit, or the first
    /// error an action or the network raised. Changes applied before the
    /// error are kept.
    #[instrument(skip_all, fields(rules = self.rules.len(), buffered = self.buffer.len()))]
    pub fn fire(&mut self) -> Result<FireReport> {
        let mut report = FireReport::default();
        let mut deleted = Mask::new();
        let outcome = self.run_cycles(&mut report, &mut deleted);

        let purged = self.memory.purge_buckets(deleted.iter());
        if purged > 0 {
            for slot in &mut self.rules {
                for tree in &mut slot.trees {
                    tree.purge();
                }
            }
        }
        debug!(
            cycles = report.cycles,
            activations = report.activations,
            purged,
            "fire finished"
        );
        outcome.map(|()| report)
    }

    fn run_cycles(
        &mut self,
        report: &mut FireReport,
        deleted: &mut Mask<MemoryAddressBits>,
    ) -> Result<()> {
        loop {
            if !self.buffer.has_data() {
                self.buffer.clear();
                if self.rules.iter().all(|s| s.pending.is_empty()) {
                    return Ok(());
                }
            }

            let cycle = report.cycles + 1;
            if cycle > self.config.max_fire_cycles {
                return Err(self.ceiling_error(cycle));
            }
            report.cycles = cycle;

            let outcome = self.run_cycle(cycle, report, deleted);
            self.memory.commit_buckets();
            for slot in &mut self.rules {
                for tree in &mut slot.trees {
                    tree.merge_delta();
                }
            }
            outcome.map_err(|e| {
                let context = e.context.clone().unwrap_or_else(ErrorContext::new);
                e.with_context(context.with_cycle(cycle))
            })?;
        }
    }

    fn ceiling_error(&self, cycle: u64) -> Error {
        let pending: Vec<&str> = self
            .rules
            .iter()
            .filter(|s| !s.pending.is_empty())
            .map(|s| &**s.rule.name())
            .collect();
        let context = if pending.is_empty() {
            format!("{} actions pending", self.buffer.len())
        } else {
            format!("pending rules: {}", pending.join(", "))
        };
        Error::limit_exceeded(SemanticLimit::MaxFireCycles {
            limit: self.config.max_fire_cycles,
            context: Some(context),
        })
        .with_context(ErrorContext::new().with_cycle(cycle))
    }

    fn run_cycle(
        &mut self,
        cycle: u64,
        report: &mut FireReport,
        deleted: &mut Mask<MemoryAddressBits>,
    ) -> Result<()> {
        let applied = self.apply_buffer()?;
        report.actions.merge(&applied.counts);
        deleted.union_with(&applied.deleted);

        let mut tasks = Vec::new();
        for slot in &mut self.rules {
            let rule = &slot.rule;
            for (tree, state) in rule.network().trees().iter().zip(slot.trees.iter_mut()) {
                if tree.memory_mask().intersects(&applied.inserted) {
                    tasks.push(DeltaTask { tree, state });
                }
            }
        }
        self.scheduler
            .run(tasks, &self.memory, DeltaMode::Incremental)?;

        for slot in &mut self.rules {
            if !slot.enabled {
                continue;
            }
            let fresh =
                agenda::new_activations(&slot.rule, &slot.trees, &self.memory, &applied.inserted)?;
            report.combinations += fresh.combinations;
            slot.pending.extend(fresh.activations);
        }

        let mut agenda: Vec<RuleInfo> = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, s)| s.enabled && !s.pending.is_empty())
            .map(|(i, s)| s.info(i))
            .collect();
        agenda.sort_by(|a, b| b.salience.cmp(&a.salience));
        debug!(
            cycle,
            inserted = applied.counts.inserts,
            updated = applied.counts.updates,
            retracted = applied.counts.retracts,
            agenda = agenda.len(),
            "cycle"
        );
        if agenda.is_empty() {
            return Ok(());
        }
        self.manager.on_agenda(cycle, &agenda);

        for info in &agenda {
            if !self.manager.test(info) {
                self.rules[info.index].pending.clear();
                continue;
            }
            let fired = self.fire_rule(info.index)?;
            self.manager.on_activation(info, fired);
            report.activations += fired;
            *report
                .rule_activations
                .entry(info.name.to_string())
                .or_default() += fired;

            if self.config.agenda_mode == AgendaMode::Default
                && self.buffer.counts().additions() > 0
            {
                break;
            }
        }
        Ok(())
    }

    /// Runs a rule's pending activations that are still live.
    fn fire_rule(&mut self, index: usize) -> Result<usize> {
        let slot = &mut self.rules[index];
        let rule = Arc::clone(&slot.rule);
        let pending = mem::take(&mut slot.pending);

        let mut fired = 0;
        for activation in &pending {
            if !activation.is_live(&self.memory) {
                continue;
            }
            let staging = Staging {
                index: &self.index,
                memory: &self.memory,
                buffer: &mut self.buffer,
                next_id: &mut self.next_id,
                strict: self.config.strict_types,
            };
            let mut ctx = RhsContext::new(rule.name(), rule.fact_types(), activation.entries(), staging);
            rule.execute(&mut ctx).map_err(|e| {
                let context = e.context.clone().unwrap_or_else(ErrorContext::new);
                e.with_context(context.with_rule(&**rule.name()))
            })?;
            fired += 1;
        }
        Ok(fired)
    }

    /// Drains the buffer into memory, retracts first.
    fn apply_buffer(&mut self) -> Result<Applied> {
        let mut applied = Applied::default();
        let actions: Vec<(FactHandle, Action)> = self.buffer.drain().collect();

        for (handle, action) in &actions {
            if !matches!(action, Action::Retract) {
                continue;
            }
            let Some(memory) = self.memory.type_memory_mut(handle.type_id) else {
                continue;
            };
            if let Some(old) = memory.remove(*handle, &mut applied.counts) {
                for address in self.index.routes(handle.type_id, &old.alpha_bits) {
                    applied.deleted.set(address.index);
                }
            }
        }

        for (handle, action) in actions {
            let type_id = handle.type_id;
            let Some(ty) = self.index.active_type(type_id) else {
                return Err(Error::unknown_handle(handle));
            };
            self.memory.ensure_type(type_id, ty.name());
            let Some(memory) = self.memory.type_memory_mut(type_id) else {
                return Err(Error::internal(format!("no memory for {type_id:?}")));
            };

            let (values, bits) = match action {
                Action::Insert(record) => {
                    let staged = (record.values.clone(), record.alpha_bits.clone());
                    memory.insert(handle, record, &mut applied.counts);
                    staged
                }
                Action::Update(record) => {
                    let staged = (record.values.clone(), record.alpha_bits.clone());
                    let Some(old) = memory.replace(handle, record, &mut applied.counts) else {
                        warn!(%handle, "update of a fact no longer in memory, skipping");
                        continue;
                    };
                    for address in self.index.routes(type_id, &old.alpha_bits) {
                        applied.deleted.set(address.index);
                    }
                    staged
                }
                Action::Retract | Action::Cancelled => continue,
            };

            let version = self
                .memory
                .record(handle)
                .map(|r| r.version)
                .ok_or_else(|| Error::unknown_handle(handle))?;
            let entry = FactEntry::new(handle, version);
            for address in self.index.routes(type_id, &bits) {
                self.memory
                    .bucket_mut(address.index)?
                    .insert(&values, entry);
                applied.inserted.set(address.index);
            }
        }
        Ok(applied)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("rules", &self.rules.len())
            .field("facts", &self.memory.fact_count())
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Stateless Session
// =============================================================================

/// A session that fires once and is gone.
///
/// Facts are buffered with [`StatelessSession::insert`]. Firing consumes the
/// session, so its memory never outlives one evaluation.
#[derive(Debug)]
pub struct StatelessSession {
    inner: Session,
}

impl StatelessSession {
    pub(crate) fn new(inner: Session) -> Self {
        Self { inner }
    }

    /// Buffers an insert. See [`Session::insert`].
    pub fn insert(&mut self, fact: Fact) -> Result<Option<FactHandle>> {
        self.inner.insert(fact)
    }

    /// Buffers every fact and returns how many were accepted.
    pub fn insert_all(&mut self, facts: impl IntoIterator<Item = Fact>) -> Result<usize> {
        let mut accepted = 0;
        for fact in facts {
            if self.inner.insert(fact)?.is_some() {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    /// Replaces the agenda policy.
    pub fn set_activation_manager(&mut self, manager: Box<dyn ActivationManager>) {
        self.inner.set_activation_manager(manager);
    }

    /// Fires and drops the session.
    pub fn fire(mut self) -> Result<FireReport> {
        self.inner.fire()
    }

    /// Fires, then hands every remaining fact to `visit` in handle order
    /// before the session is dropped.
    pub fn fire_and_visit(mut self, mut visit: impl FnMut(FactHandle, &Fact)) -> Result<FireReport> {
        let report = self.inner.fire()?;
        let mut facts: Vec<(FactHandle, &Fact)> = self
            .inner
            .memory
            .types()
            .flat_map(|m| m.iter())
            .map(|(handle, record)| (handle, &record.fact))
            .collect();
        facts.sort_by_key(|(handle, _)| handle.id);
        for (handle, fact) in facts {
            visit(handle, fact);
        }
        Ok(report)
    }
}
