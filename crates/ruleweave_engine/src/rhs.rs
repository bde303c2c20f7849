//! Staging of fact operations and the context handed to rule actions.
//!
//! Nothing written here is visible to joins until the next fire cycle
//! drains the action buffer. Reads go through the buffer first, so an action
//! sees its own pending writes.

use std::sync::Arc;

use tracing::warn;

use ruleweave_foundation::{Error, Fact, FactHandle, Result};
use ruleweave_storage::{Action, ActionBuffer, FactEntry, FactRecord, WorkingMemory};

use crate::condition::strip_sigil;
use crate::index::TypeIndex;
use crate::rule::FactType;

// =============================================================================
// Staging
// =============================================================================

/// Validates fact operations and files them into the action buffer.
pub(crate) struct Staging<'a> {
    pub index: &'a TypeIndex,
    pub memory: &'a WorkingMemory,
    pub buffer: &'a mut ActionBuffer,
    pub next_id: &'a mut u64,
    pub strict: bool,
}

impl Staging<'_> {
    pub fn insert(&mut self, fact: Fact) -> Result<Option<FactHandle>> {
        let Some(type_id) = self.index.type_id(fact.type_name()) else {
            if self.strict {
                return Err(Error::unknown_type(fact.type_name()));
            }
            warn!(fact_type = fact.type_name(), "insert of a type no rule uses, skipping");
            return Ok(None);
        };
        let (values, alpha_bits) = self.index.prepare(type_id, &fact)?;
        let handle = FactHandle::new(*self.next_id, type_id);
        *self.next_id += 1;
        self.buffer
            .insert(handle, FactRecord::new(fact, values, alpha_bits));
        Ok(Some(handle))
    }

    pub fn update(&mut self, handle: FactHandle, fact: Fact) -> Result<()> {
        let expected = self.issued_type(handle)?;
        if &**expected != fact.type_name() {
            return Err(Error::type_mismatch(&**expected, fact.type_name()));
        }
        if !self.is_live(handle) {
            warn!(%handle, "update of a deleted fact, skipping");
            return Ok(());
        }
        let (values, alpha_bits) = self.index.prepare(handle.type_id, &fact)?;
        self.buffer
            .update(handle, FactRecord::new(fact, values, alpha_bits));
        Ok(())
    }

    pub fn delete(&mut self, handle: FactHandle) -> Result<()> {
        self.issued_type(handle)?;
        if !self.is_live(handle) {
            warn!(%handle, "delete of a deleted fact, skipping");
            return Ok(());
        }
        self.buffer.retract(handle);
        Ok(())
    }

    /// The current fact, pending writes included.
    pub fn get(&self, handle: FactHandle) -> Option<&Fact> {
        match self.buffer.get(handle) {
            Some(Action::Insert(record) | Action::Update(record)) => Some(&record.fact),
            Some(Action::Retract | Action::Cancelled) => None,
            None => self.memory.record(handle).map(|r| &r.fact),
        }
    }

    pub fn is_live(&self, handle: FactHandle) -> bool {
        match self.buffer.get(handle) {
            Some(Action::Insert(_) | Action::Update(_)) => true,
            Some(Action::Retract | Action::Cancelled) => false,
            None => self.memory.record(handle).is_some(),
        }
    }

    /// Type name of an issued handle.
    ///
    /// The type comes from the handle's record. A handle without a record
    /// is accepted as deleted unless its id is held by another type.
    fn issued_type(&self, handle: FactHandle) -> Result<&Arc<str>> {
        if handle.id >= *self.next_id {
            return Err(Error::unknown_handle(handle));
        }
        let name = self
            .index
            .active_type(handle.type_id)
            .map(|t| t.name())
            .ok_or_else(|| Error::unknown_handle(handle))?;
        if self.has_record(handle) {
            return Ok(name);
        }
        let claimed = self
            .index
            .types()
            .map(|t| t.id())
            .filter(|&t| t != handle.type_id)
            .any(|t| self.has_record(FactHandle::new(handle.id, t)));
        if claimed {
            return Err(Error::unknown_handle(handle));
        }
        Ok(name)
    }

    fn has_record(&self, handle: FactHandle) -> bool {
        self.buffer.get(handle).is_some() || self.memory.record(handle).is_some()
    }
}

// =============================================================================
// RHS Context
// =============================================================================

/// What a rule action sees: the matched facts and the session's buffer.
pub struct RhsContext<'a> {
    rule_name: &'a str,
    vars: &'a [FactType],
    entries: &'a [FactEntry],
    staging: Staging<'a>,
}

impl<'a> RhsContext<'a> {
    pub(crate) fn new(
        rule_name: &'a str,
        vars: &'a [FactType],
        entries: &'a [FactEntry],
        staging: Staging<'a>,
    ) -> Self {
        Self {
            rule_name,
            vars,
            entries,
            staging,
        }
    }

    /// Name of the firing rule.
    #[must_use]
    pub fn rule_name(&self) -> &str {
        self.rule_name
    }

    /// Handle bound to a variable (`"$p"` or `"p"`).
    ///
    /// # Errors
    /// Returns `UnknownVariable` if the rule does not declare the variable.
    pub fn handle(&self, var: &str) -> Result<FactHandle> {
        let var = strip_sigil(var);
        self.vars
            .iter()
            .position(|ft| &*ft.var == var)
            .and_then(|i| self.entries.get(i))
            .map(|e| e.handle)
            .ok_or_else(|| Error::unknown_variable(format!("${var}")))
    }

    /// The fact bound to a variable, pending writes included.
    ///
    /// # Errors
    /// Returns `UnknownVariable` for an undeclared variable and
    /// `UnknownFactHandle` if the fact was deleted by an earlier action.
    pub fn get(&self, var: &str) -> Result<&Fact> {
        let handle = self.handle(var)?;
        self.fact(handle).ok_or_else(|| Error::unknown_handle(handle))
    }

    /// Any fact by handle, pending writes included.
    #[must_use]
    pub fn fact(&self, handle: FactHandle) -> Option<&Fact> {
        self.staging.get(handle)
    }

    /// Buffers an insert. Returns `None` for a skipped unknown type.
    pub fn insert(&mut self, fact: Fact) -> Result<Option<FactHandle>> {
        self.staging.insert(fact)
    }

    /// Buffers an update.
    pub fn update(&mut self, handle: FactHandle, fact: Fact) -> Result<()> {
        self.staging.update(handle, fact)
    }

    /// Buffers a delete.
    pub fn delete(&mut self, handle: FactHandle) -> Result<()> {
        self.staging.delete(handle)
    }

    /// Buffers an update of the fact bound to a variable.
    pub fn update_fact(&mut self, var: &str, fact: Fact) -> Result<()> {
        let handle = self.handle(var)?;
        self.staging.update(handle, fact)
    }

    /// Buffers a delete of the fact bound to a variable.
    pub fn delete_fact(&mut self, var: &str) -> Result<()> {
        let handle = self.handle(var)?;
        self.staging.delete(handle)
    }
}
