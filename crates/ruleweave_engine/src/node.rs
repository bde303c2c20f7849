//! Condition node memory and delta evaluation.
//!
//! Every condition node keeps two stores of matched key tuples: `main`
//! (tuples from earlier cycles) and `delta` (tuples found this cycle).
//! Computing a node's delta only evaluates combinations in which at least
//! one source contributes something new, so known pairings are never
//! re-joined.
//!
//! Tuples are made of key rows. A fact filed under a known row changes no
//! key values and so adds no tuple here; activations pick it up from the
//! `main` tuples its row belongs to.

use std::slice;

use tracing::trace;

use ruleweave_foundation::{Error, Result, Value};
use ruleweave_storage::{KeyRow, KeyScope, WorkingMemory};

use crate::network::{ConditionNode, JoinTree, Source};

/// Whether a delta tuple is made of fresh rows only.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PairingMode {
    /// Every row of the tuple is fresh.
    BrandNew,
    /// At least one row was already known; the pairing itself is new.
    NewPairing,
}

/// How a node delta is computed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeltaMode {
    /// Evaluate combinations with at least one fresh source into `delta`.
    Incremental,
    /// Evaluate known sources only, straight into `main`. Used to prime a
    /// rule deployed into a session that already holds facts.
    HotDeployment,
}

/// A matched tuple: one key row per joined fact type.
#[derive(Clone, Debug)]
pub struct KeyTuple {
    rows: Box<[KeyRow]>,
    mode: PairingMode,
}

impl KeyTuple {
    /// Rows, in the node's column order.
    #[must_use]
    pub fn rows(&self) -> &[KeyRow] {
        &self.rows
    }

    /// How the tuple was formed.
    #[must_use]
    pub fn mode(&self) -> PairingMode {
        self.mode
    }

    fn is_live(&self) -> bool {
        self.rows.iter().all(|r| !r.is_deleted())
    }
}

/// A collection of key tuples.
#[derive(Clone, Debug, Default)]
pub struct KeysStore {
    tuples: Vec<KeyTuple>,
}

impl KeysStore {
    /// Iterates over the tuples.
    pub fn iter(&self) -> slice::Iter<'_, KeyTuple> {
        self.tuples.iter()
    }

    /// Number of tuples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    fn retain_live(&mut self) -> usize {
        let before = self.tuples.len();
        self.tuples.retain(KeyTuple::is_live);
        before - self.tuples.len()
    }
}

/// Main and delta stores of one condition node.
#[derive(Clone, Debug, Default)]
pub struct NodeMemory {
    main: KeysStore,
    delta: KeysStore,
}

impl NodeMemory {
    /// Tuples from earlier cycles.
    #[must_use]
    pub fn main(&self) -> &KeysStore {
        &self.main
    }

    /// Tuples found this cycle.
    #[must_use]
    pub fn delta(&self) -> &KeysStore {
        &self.delta
    }

    /// Appends delta to main and clears delta.
    pub fn merge_delta(&mut self) {
        self.main.tuples.append(&mut self.delta.tuples);
    }
}

/// Per-session state of one join tree, parallel to its node arena.
#[derive(Clone, Debug, Default)]
pub struct TreeMemory {
    nodes: Vec<NodeMemory>,
}

impl TreeMemory {
    /// Creates empty stores for every node of a tree.
    #[must_use]
    pub fn new(tree: &JoinTree) -> Self {
        Self {
            nodes: vec![NodeMemory::default(); tree.nodes().len()],
        }
    }

    /// Memory of a node by arena index.
    #[must_use]
    pub fn node(&self, index: usize) -> Option<&NodeMemory> {
        self.nodes.get(index)
    }

    /// Memory of the end node.
    #[must_use]
    pub fn end(&self) -> Option<&NodeMemory> {
        self.nodes.last()
    }

    /// Computes the delta of every node, sources first.
    pub fn compute(&mut self, tree: &JoinTree, memory: &WorkingMemory, mode: DeltaMode) -> Result<()> {
        if tree.nodes().len() != self.nodes.len() {
            return Err(Error::internal("tree memory does not match its tree"));
        }
        for (index, node) in tree.nodes().iter().enumerate() {
            let (done, rest) = self.nodes.split_at_mut(index);
            let target = &mut rest[0];
            compute_node(node, done, target, memory, mode)?;
            trace!(
                node = index,
                delta = target.delta.len(),
                main = target.main.len(),
                "computed node"
            );
        }
        Ok(())
    }

    /// Merges the delta of every node into main.
    pub fn merge_delta(&mut self) {
        for node in &mut self.nodes {
            node.merge_delta();
        }
    }

    /// Drops tuples that reference purged key rows. Returns how many.
    pub fn purge(&mut self) -> usize {
        self.nodes
            .iter_mut()
            .map(|n| n.main.retain_live() + n.delta.retain_live())
            .sum()
    }

    /// Drops every tuple.
    pub fn clear(&mut self) {
        for node in &mut self.nodes {
            node.main.tuples.clear();
            node.delta.tuples.clear();
        }
    }
}

// =============================================================================
// Delta Evaluation
// =============================================================================

#[derive(Copy, Clone)]
struct View<'a> {
    rows: &'a [KeyRow],
    fresh: bool,
}

fn views<'a>(
    source: &Source,
    done: &'a [NodeMemory],
    memory: &'a WorkingMemory,
    known: bool,
) -> Result<Vec<View<'a>>> {
    Ok(match *source {
        Source::Entry { memory: address, .. } => {
            let scope = if known { KeyScope::Known } else { KeyScope::Fresh };
            memory
                .bucket(address)?
                .iterate(scope)
                .map(|row| View {
                    rows: slice::from_ref(row),
                    fresh: !known,
                })
                .collect()
        }
        Source::Node(index) => {
            let node = done
                .get(index)
                .ok_or_else(|| Error::internal(format!("source node {index} out of order")))?;
            let store = if known { &node.main } else { &node.delta };
            store
                .iter()
                .map(|t| View {
                    rows: &t.rows,
                    fresh: !known && t.mode == PairingMode::BrandNew,
                })
                .collect()
        }
    })
}

fn compute_node(
    node: &ConditionNode,
    done: &[NodeMemory],
    target: &mut NodeMemory,
    memory: &WorkingMemory,
    mode: DeltaMode,
) -> Result<()> {
    target.delta.tuples.clear();

    let sources = node.sources();
    let n = sources.len();
    if n >= 32 {
        return Err(Error::internal(format!("condition node with {n} sources")));
    }

    let mut known = Vec::with_capacity(n);
    let mut fresh = Vec::with_capacity(n);
    for source in sources {
        known.push(views(source, done, memory, true)?);
        fresh.push(if mode == DeltaMode::HotDeployment {
            Vec::new()
        } else {
            views(source, done, memory, false)?
        });
    }

    let combinations: Vec<u32> = match mode {
        DeltaMode::Incremental => (1..1u32 << n).collect(),
        DeltaMode::HotDeployment => vec![0],
    };

    let mut output = Vec::new();
    let mut lists: Vec<&[View<'_>]> = Vec::with_capacity(n);
    for combination in combinations {
        lists.clear();
        for s in 0..n {
            let pick = if combination & (1 << s) == 0 {
                &known[s]
            } else {
                &fresh[s]
            };
            lists.push(pick);
        }
        scan(node, &lists, mode, &mut output);
    }

    match mode {
        DeltaMode::Incremental => target.delta.tuples = output,
        DeltaMode::HotDeployment => target.main.tuples.extend(output),
    }
    Ok(())
}

/// Cross product of the chosen views, source 0 outermost.
fn scan(node: &ConditionNode, lists: &[&[View<'_>]], mode: DeltaMode, output: &mut Vec<KeyTuple>) {
    if lists.iter().any(|l| l.is_empty()) {
        return;
    }
    let n = lists.len();
    let mut cursor = vec![0usize; n];
    let mut tuples: Vec<&[KeyRow]> = Vec::with_capacity(n);
    let mut args: Vec<&Value> = Vec::new();

    loop {
        tuples.clear();
        let mut all_fresh = true;
        for (list, &i) in lists.iter().zip(&cursor) {
            tuples.push(list[i].rows);
            all_fresh &= list[i].fresh;
        }

        if node
            .evaluators()
            .iter()
            .all(|e| e.test(&tuples, &mut args))
        {
            let rows: Box<[KeyRow]> = tuples.iter().flat_map(|t| t.iter().cloned()).collect();
            let pairing = if all_fresh && mode == DeltaMode::Incremental {
                PairingMode::BrandNew
            } else {
                PairingMode::NewPairing
            };
            output.push(KeyTuple {
                rows,
                mode: pairing,
            });
        }

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
