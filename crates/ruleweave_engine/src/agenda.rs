//! Activations and agenda policy.
//!
//! An [`Activation`] is one combination of facts, one per declared variable,
//! that satisfies a rule. Activations are materialized from the rule's join
//! trees and buckets right after the cycle's deltas were computed, and only
//! combinations that did not exist in an earlier cycle are produced: either
//! a tuple paired for the first time, or a known tuple in which at least one
//! fact is fresh.
//!
//! What runs, and in which order, is decided by an [`ActivationManager`].

use ruleweave_foundation::{Error, Mask, MemoryAddressBits, Result};
use ruleweave_storage::{FactEntry, FactScope, KeyRow, KeyScope, WorkingMemory};

use crate::network::GroupKind;
use crate::node::{KeyTuple, TreeMemory};
use crate::rule::{CompiledRule, RuleInfo};

// =============================================================================
// Activation Manager
// =============================================================================

/// Policy hooks consulted by the fire loop.
///
/// Every method has a default, so a manager only overrides what it needs.
pub trait ActivationManager: Send {
    /// Called once per cycle with the agenda, sorted by salience.
    fn on_agenda(&mut self, _cycle: u64, _agenda: &[RuleInfo]) {}

    /// Decides whether a rule on the agenda may fire this cycle. A rule that
    /// is rejected loses its pending activations.
    fn test(&mut self, _rule: &RuleInfo) -> bool {
        true
    }

    /// Called after a rule fired `count` activations.
    fn on_activation(&mut self, _rule: &RuleInfo, _count: usize) {}
}

/// Fires every rule on the agenda.
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultActivationManager;

impl ActivationManager for DefaultActivationManager {}

// =============================================================================
// Activation
// =============================================================================

/// One fact combination that satisfies a rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Activation {
    entries: Box<[FactEntry]>,
}

impl Activation {
    /// Creates an activation from one entry per declared variable.
    #[must_use]
    pub fn new(entries: impl Into<Box<[FactEntry]>>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    /// Entries, indexed like the rule's declarations.
    #[must_use]
    pub fn entries(&self) -> &[FactEntry] {
        &self.entries
    }

    /// Returns true if every fact still carries the matched version.
    #[must_use]
    pub fn is_live(&self, memory: &WorkingMemory) -> bool {
        self.entries.iter().all(|e| memory.is_live(e))
    }
}

// =============================================================================
// Materialization
// =============================================================================

type Combo = Vec<FactEntry>;

/// Combinations of one fact group, in the group's column order.
#[derive(Default)]
struct GroupMatches {
    new: Vec<Combo>,
    old: Vec<Combo>,
    /// Committed facts per column; only kept for loose groups.
    committed: Vec<Vec<FactEntry>>,
}

/// Activations a rule gained in one cycle.
#[derive(Debug, Default)]
pub(crate) struct Materialized {
    pub activations: Vec<Activation>,
    /// Group combinations built on the way, new and unchanged.
    pub combinations: usize,
}

/// Materializes the activations a rule gained this cycle.
///
/// `trees` is the rule's tree state after delta computation; `changed` is the
/// cycle's insert mask. Unchanged combinations of a group are only built
/// when another group gained new ones, so a cycle without new combinations
/// does no work proportional to what the rule already matched.
pub(crate) fn new_activations(
    rule: &CompiledRule,
    trees: &[TreeMemory],
    memory: &WorkingMemory,
    changed: &Mask<MemoryAddressBits>,
) -> Result<Materialized> {
    let network = rule.network();
    if !network.memory_mask().intersects(changed) {
        return Ok(Materialized::default());
    }

    let groups = network.groups();
    let buckets: Vec<Vec<usize>> = groups
        .iter()
        .map(|group| {
            group
                .fact_types()
                .iter()
                .map(|&ft| rule.fact_types()[ft].memory)
                .collect()
        })
        .collect();

    let mut matches = Vec::with_capacity(groups.len());
    for (group, buckets) in groups.iter().zip(&buckets) {
        let columns = Columns { buckets, memory };
        matches.push(match group.kind() {
            GroupKind::Joined { tree } => columns.joined(tree_state(trees, tree)?)?,
            GroupKind::Loose => columns.loose()?,
        });
    }

    let has_new: Vec<bool> = matches.iter().map(|m| !m.new.is_empty()).collect();
    if !has_new.contains(&true) {
        return Ok(Materialized::default());
    }

    // old combinations of a group only pair with another group's new ones
    for (g, (group, m)) in groups.iter().zip(matches.iter_mut()).enumerate() {
        if !has_new.iter().enumerate().any(|(h, &n)| n && h != g) {
            continue;
        }
        m.old = match group.kind() {
            GroupKind::Joined { tree } => {
                let columns = Columns {
                    buckets: &buckets[g],
                    memory,
                };
                columns.joined_old(tree_state(trees, tree)?)?
            }
            GroupKind::Loose => {
                let mut old = Vec::new();
                extend_cartesian(&mut old, &m.committed);
                old
            }
        };
    }

    let width = rule.fact_types().len();
    let mut out = Materialized {
        activations: Vec::new(),
        combinations: matches.iter().map(|m| m.new.len() + m.old.len()).sum(),
    };
    let mut lists: Vec<&[Combo]> = Vec::with_capacity(groups.len());
    // at least one group contributes a new combination
    for choice in 1..1u64 << groups.len() {
        if (0..groups.len()).any(|g| choice & (1 << g) != 0 && !has_new[g]) {
            continue;
        }
        lists.clear();
        for (g, m) in matches.iter().enumerate() {
            lists.push(if choice & (1 << g) == 0 { &m.old } else { &m.new });
        }
        cartesian(&lists, |picked| {
            let mut placed: Vec<(usize, FactEntry)> = Vec::with_capacity(width);
            for (group, combo) in groups.iter().zip(picked) {
                placed.extend(group.fact_types().iter().copied().zip(combo.iter().copied()));
            }
            placed.sort_unstable_by_key(|&(ft, _)| ft);
            let entries: Vec<FactEntry> = placed.into_iter().map(|(_, e)| e).collect();
            out.activations.push(Activation::new(entries));
        });
    }
    Ok(out)
}

fn tree_state(trees: &[TreeMemory], tree: usize) -> Result<&TreeMemory> {
    trees
        .get(tree)
        .ok_or_else(|| Error::internal(format!("missing state of tree {tree}")))
}

struct Columns<'a> {
    buckets: &'a [usize],
    memory: &'a WorkingMemory,
}

impl Columns<'_> {
    fn entries(&self, column: usize, row: &KeyRow, scope: FactScope) -> Result<Vec<FactEntry>> {
        Ok(self
            .memory
            .bucket(self.buckets[column])?
            .facts(row, scope)
            .filter(|e| self.memory.is_live(e))
            .copied()
            .collect())
    }

    fn joined(&self, state: &TreeMemory) -> Result<GroupMatches> {
        let end = state
            .end()
            .ok_or_else(|| Error::internal("join tree without an end node"))?;
        let mut new = Vec::new();

        for tuple in end.delta().iter() {
            let lists = self.tuple_entries(tuple, FactScope::All)?;
            extend_cartesian(&mut new, &lists);
        }

        let mut touched = false;
        for &b in self.buckets {
            touched |= self
                .memory
                .bucket(b)?
                .iterate(KeyScope::KnownWithFreshFacts)
                .next()
                .is_some();
        }
        if touched {
            for tuple in end.main().iter() {
                let mut any_fresh = false;
                for (column, row) in tuple.rows().iter().enumerate() {
                    any_fresh |= self.memory.bucket(self.buckets[column])?.has_fresh_facts(row);
                }
                if any_fresh {
                    let committed = self.tuple_entries(tuple, FactScope::Committed)?;
                    let fresh = self.tuple_entries(tuple, FactScope::Fresh)?;
                    with_fresh(&mut new, &committed, &fresh);
                }
            }
        }
        Ok(GroupMatches {
            new,
            ..GroupMatches::default()
        })
    }

    fn joined_old(&self, state: &TreeMemory) -> Result<Vec<Combo>> {
        let end = state
            .end()
            .ok_or_else(|| Error::internal("join tree without an end node"))?;
        let mut old = Vec::new();
        for tuple in end.main().iter() {
            let lists = self.tuple_entries(tuple, FactScope::Committed)?;
            extend_cartesian(&mut old, &lists);
        }
        Ok(old)
    }

    fn tuple_entries(&self, tuple: &KeyTuple, scope: FactScope) -> Result<Vec<Vec<FactEntry>>> {
        tuple
            .rows()
            .iter()
            .enumerate()
            .map(|(column, row)| self.entries(column, row, scope))
            .collect()
    }

    fn loose(&self) -> Result<GroupMatches> {
        let mut committed = Vec::with_capacity(self.buckets.len());
        let mut fresh = Vec::with_capacity(self.buckets.len());
        for (column, &b) in self.buckets.iter().enumerate() {
            let bucket = self.memory.bucket(b)?;
            let mut c = Vec::new();
            let mut f = Vec::new();
            for row in bucket.iterate(KeyScope::Known).chain(bucket.iterate(KeyScope::Fresh)) {
                c.extend(self.entries(column, row, FactScope::Committed)?);
                f.extend(self.entries(column, row, FactScope::Fresh)?);
            }
            committed.push(c);
            fresh.push(f);
        }

        let mut new = Vec::new();
        with_fresh(&mut new, &committed, &fresh);
        Ok(GroupMatches {
            new,
            old: Vec::new(),
            committed,
        })
    }
}

/// Cross product of `lists`, first list outermost.
fn cartesian<T>(lists: &[&[T]], mut emit: impl FnMut(&[&T])) {
    if lists.is_empty() || lists.iter().any(|l| l.is_empty()) {
        return;
    }
    let n = lists.len();
    let mut cursor = vec![0usize; n];
    let mut picked: Vec<&T> = Vec::with_capacity(n);
    loop {
        picked.clear();
        picked.extend(lists.iter().zip(&cursor).map(|(l, &i)| &l[i]));
        emit(&picked);

        let mut s = n;
        loop {
            if s == 0 {
                return;
            }
            s -= 1;
            cursor[s] += 1;
            if cursor[s] < lists[s].len() {
                break;
            }
            cursor[s] = 0;
        }
    }
}

fn extend_cartesian(out: &mut Vec<Combo>, lists: &[Vec<FactEntry>]) {
    let slices: Vec<&[FactEntry]> = lists.iter().map(Vec::as_slice).collect();
    cartesian(&slices, |picked| out.push(picked.iter().map(|e| **e).collect()));
}

/// Combinations drawing at least one column from `fresh`.
fn with_fresh(out: &mut Vec<Combo>, committed: &[Vec<FactEntry>], fresh: &[Vec<FactEntry>]) {
    let n = committed.len();
    let mut slices: Vec<&[FactEntry]> = Vec::with_capacity(n);
    for choice in 1..1u64 << n {
        slices.clear();
        for column in 0..n {
            slices.push(if choice & (1 << column) == 0 {
                &committed[column]
            } else {
                &fresh[column]
            });
        }
        cartesian(&slices, |picked| out.push(picked.iter().map(|e| **e).collect()));
    }
}
