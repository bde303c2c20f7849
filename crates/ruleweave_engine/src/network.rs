//! Beta network construction.
//!
//! The builder turns a rule's beta conditions into join trees:
//!
//! 1. Conditions over the same set of fact types merge into one evaluator
//!    group.
//! 2. Groups are ordered by normalized complexity times arity, cheapest
//!    first, ties broken by the group's text form.
//! 3. Starting from one entry node per joined fact type, each group takes
//!    every open node whose fact types it touches and replaces them with a
//!    condition node sourced from them.
//! 4. Nodes still open at the end are the end nodes, one per connected
//!    component. Fact types no beta condition touches form one loose group.
//!
//! Each end node becomes a [`JoinTree`] with its own arena of condition
//! nodes in post order, so sources always precede the nodes they feed.

use ruleweave_foundation::{Error, ErrorKind, FactTypeBits, Mask, MemoryAddressBits, Result, Value};
use ruleweave_storage::KeyRow;

use crate::condition::Predicate;

// =============================================================================
// Beta Conditions
// =============================================================================

/// An argument of a beta condition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BetaArg {
    /// In-rule fact type index.
    pub fact_type: usize,
    /// Position within that fact type's join key.
    pub key_pos: usize,
}

/// A compiled condition over two or more fact types.
#[derive(Clone, Debug)]
pub struct BetaCondition {
    /// The predicate.
    pub predicate: Predicate,
    /// Required outcome.
    pub expected: bool,
    /// Arguments in predicate order.
    pub args: Vec<BetaArg>,
    /// Cost hint, positive.
    pub complexity: f64,
}

impl BetaCondition {
    fn mask(&self) -> Mask<FactTypeBits> {
        self.args.iter().map(|a| a.fact_type).collect()
    }
}

/// Where an evaluator argument lives in a condition node's input.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArgSlot {
    /// Source index.
    pub source: usize,
    /// Row position within the source tuple.
    pub column: usize,
    /// Value position within the key row.
    pub key_pos: usize,
}

/// A beta condition resolved against a node's sources.
#[derive(Clone, Debug)]
pub struct Evaluator {
    predicate: Predicate,
    expected: bool,
    slots: Box<[ArgSlot]>,
}

impl Evaluator {
    /// The predicate's signature.
    #[must_use]
    pub fn signature(&self) -> &str {
        self.predicate.signature()
    }

    /// Argument coordinates.
    #[must_use]
    pub fn slots(&self) -> &[ArgSlot] {
        &self.slots
    }

    /// Evaluates the condition on one tuple per source.
    ///
    /// `args` is scratch space reused across calls.
    pub fn test<'a>(&self, tuples: &[&'a [KeyRow]], args: &mut Vec<&'a Value>) -> bool {
        args.clear();
        for slot in &self.slots {
            args.push(tuples[slot.source][slot.column].value(slot.key_pos));
        }
        self.predicate.test(args) == self.expected
    }
}

// =============================================================================
// Join Trees
// =============================================================================

/// Input of a condition node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// Key rows of a memory bucket.
    Entry {
        /// In-rule fact type index.
        fact_type: usize,
        /// Bucket address.
        memory: usize,
    },
    /// Tuples of an earlier node in the same tree.
    Node(usize),
}

/// A join over one or more sources.
#[derive(Clone, Debug)]
pub struct ConditionNode {
    sources: Box<[Source]>,
    fact_types: Box<[usize]>,
    evaluators: Box<[Evaluator]>,
    mask: Mask<FactTypeBits>,
}

impl ConditionNode {
    /// The node's inputs, source 0 outermost.
    #[must_use]
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// In-rule fact types of each tuple column.
    #[must_use]
    pub fn fact_types(&self) -> &[usize] {
        &self.fact_types
    }

    /// Conditions every output tuple satisfies.
    #[must_use]
    pub fn evaluators(&self) -> &[Evaluator] {
        &self.evaluators
    }

    /// Fact types covered by the node.
    #[must_use]
    pub fn mask(&self) -> &Mask<FactTypeBits> {
        &self.mask
    }
}

/// One connected component of a rule's joins.
#[derive(Clone, Debug)]
pub struct JoinTree {
    nodes: Vec<ConditionNode>,
    memory_mask: Mask<MemoryAddressBits>,
}

impl JoinTree {
    /// Condition nodes in post order; the last one is the end node.
    #[must_use]
    pub fn nodes(&self) -> &[ConditionNode] {
        &self.nodes
    }

    /// The end node.
    #[must_use]
    pub fn end(&self) -> Option<&ConditionNode> {
        self.nodes.last()
    }

    /// Buckets feeding the tree.
    #[must_use]
    pub fn memory_mask(&self) -> &Mask<MemoryAddressBits> {
        &self.memory_mask
    }
}

// =============================================================================
// Fact Groups
// =============================================================================

/// How a group of fact types is matched.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GroupKind {
    /// Matched by a join tree.
    Joined {
        /// Tree index within the rule network.
        tree: usize,
    },
    /// Unconstrained cross product of the types' facts.
    Loose,
}

/// Fact types that are matched together.
#[derive(Clone, Debug)]
pub struct FactGroup {
    kind: GroupKind,
    fact_types: Box<[usize]>,
    memory_mask: Mask<MemoryAddressBits>,
}

impl FactGroup {
    /// How the group is matched.
    #[must_use]
    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    /// In-rule fact types, in the group's column order.
    #[must_use]
    pub fn fact_types(&self) -> &[usize] {
        &self.fact_types
    }

    /// Buckets holding the group's facts.
    #[must_use]
    pub fn memory_mask(&self) -> &Mask<MemoryAddressBits> {
        &self.memory_mask
    }
}

/// The compiled network of one rule.
#[derive(Clone, Debug)]
pub struct RuleNetwork {
    trees: Vec<JoinTree>,
    groups: Vec<FactGroup>,
    memory_mask: Mask<MemoryAddressBits>,
}

impl RuleNetwork {
    /// Returns true if a join evaluates a predicate with this signature.
    #[must_use]
    pub fn evaluates(&self, signature: &str) -> bool {
        self.evaluators().any(|e| e.signature() == signature)
    }

    fn evaluators(&self) -> impl Iterator<Item = &Evaluator> {
        self.trees
            .iter()
            .flat_map(|t| t.nodes.iter())
            .flat_map(|n| n.evaluators.iter())
    }

    /// Swaps the predicate of every join evaluator with the same signature.
    pub(crate) fn replace_predicate(&mut self, predicate: &Predicate) -> usize {
        let mut replaced = 0;
        for node in self.trees.iter_mut().flat_map(|t| t.nodes.iter_mut()) {
            for evaluator in node.evaluators.iter_mut() {
                if evaluator.signature() == predicate.signature() {
                    evaluator.predicate = predicate.clone();
                    replaced += 1;
                }
            }
        }
        replaced
    }

    /// Join trees.
    #[must_use]
    pub fn trees(&self) -> &[JoinTree] {
        &self.trees
    }

    /// Fact groups: one per tree, plus the loose group if any.
    #[must_use]
    pub fn groups(&self) -> &[FactGroup] {
        &self.groups
    }

    /// Every bucket the rule reads.
    #[must_use]
    pub fn memory_mask(&self) -> &Mask<MemoryAddressBits> {
        &self.memory_mask
    }
}

// =============================================================================
// Builder
// =============================================================================

struct EvaluatorGroup {
    mask: Mask<FactTypeBits>,
    conditions: Vec<BetaCondition>,
    complexity: f64,
    label: String,
}

enum DraftKind {
    Entry(usize),
    Condition {
        sources: Vec<usize>,
        conditions: Vec<BetaCondition>,
    },
}

struct Draft {
    mask: Mask<FactTypeBits>,
    fact_types: Vec<usize>,
    kind: DraftKind,
}

/// Builds a [`RuleNetwork`] from a rule's beta conditions.
pub struct NetworkBuilder<'a> {
    memory: &'a [usize],
}

impl<'a> NetworkBuilder<'a> {
    /// Creates a builder for a rule whose fact type `i` reads bucket
    /// `memory[i]`.
    #[must_use]
    pub fn new(memory: &'a [usize]) -> Self {
        Self { memory }
    }

    /// Builds the network.
    pub fn build(&self, conditions: Vec<BetaCondition>) -> Result<RuleNetwork> {
        for condition in &conditions {
            if !(condition.complexity.is_finite() && condition.complexity > 0.0) {
                return Err(Error::new(ErrorKind::InvalidComplexity(
                    condition.complexity,
                )));
            }
            if let Some(arg) = condition.args.iter().find(|a| a.fact_type >= self.memory.len()) {
                return Err(Error::internal(format!(
                    "condition references fact type {} of {}",
                    arg.fact_type,
                    self.memory.len()
                )));
            }
        }

        let groups = sort_groups(merge_groups(conditions));
        let beta_mask = groups
            .iter()
            .fold(Mask::new(), |acc: Mask<FactTypeBits>, g| acc.union(&g.mask));

        let mut arena: Vec<Draft> = beta_mask
            .iter()
            .map(|ft| Draft {
                mask: Mask::from_bits([ft]),
                fact_types: vec![ft],
                kind: DraftKind::Entry(ft),
            })
            .collect();
        let mut open: Vec<usize> = (0..arena.len()).collect();

        for group in groups {
            // built nodes first in allocation order, then entries by fact-type index
            let mut picked: Vec<usize> = open
                .iter()
                .copied()
                .filter(|&d| arena[d].mask.intersects(&group.mask))
                .collect();
            picked.sort_by_key(|&d| (matches!(arena[d].kind, DraftKind::Entry(_)), d));
            for (i, &a) in picked.iter().enumerate() {
                for &b in &picked[i + 1..] {
                    if arena[a].mask.intersects(&arena[b].mask) {
                        return Err(Error::invalid_join(format!(
                            "overlapping sources for `{}`",
                            group.label
                        )));
                    }
                }
            }

            let mut mask = Mask::new();
            let mut fact_types = Vec::new();
            for &d in &picked {
                mask.union_with(&arena[d].mask);
                fact_types.extend_from_slice(&arena[d].fact_types);
            }
            if !mask.contains_all(&group.mask) {
                return Err(Error::invalid_join(format!(
                    "no sources cover `{}`",
                    group.label
                )));
            }

            open.retain(|d| !picked.contains(d));
            open.push(arena.len());
            arena.push(Draft {
                mask,
                fact_types,
                kind: DraftKind::Condition {
                    sources: picked,
                    conditions: group.conditions,
                },
            });
        }

        let mut trees = Vec::new();
        let mut fact_groups = Vec::new();
        let mut memory_mask = Mask::new();
        for &end in &open {
            let mut nodes = Vec::new();
            if !matches!(self.lower(&arena, end, &mut nodes)?, Source::Node(_)) {
                return Err(Error::internal("join tree without a condition node"));
            }
            let fact_types: Box<[usize]> = arena[end].fact_types.clone().into();
            let tree_mask = self.memory_mask(&fact_types);
            memory_mask.union_with(&tree_mask);
            fact_groups.push(FactGroup {
                kind: GroupKind::Joined { tree: trees.len() },
                fact_types,
                memory_mask: tree_mask.clone(),
            });
            trees.push(JoinTree {
                nodes,
                memory_mask: tree_mask,
            });
        }

        let loose: Box<[usize]> = (0..self.memory.len())
            .filter(|ft| !beta_mask.get(*ft))
            .collect();
        if !loose.is_empty() {
            let loose_mask = self.memory_mask(&loose);
            memory_mask.union_with(&loose_mask);
            fact_groups.push(FactGroup {
                kind: GroupKind::Loose,
                fact_types: loose,
                memory_mask: loose_mask,
            });
        }

        Ok(RuleNetwork {
            trees,
            groups: fact_groups,
            memory_mask,
        })
    }

    fn memory_mask(&self, fact_types: &[usize]) -> Mask<MemoryAddressBits> {
        fact_types.iter().map(|&ft| self.memory[ft]).collect()
    }

    /// Appends the condition nodes under `draft` in post order and returns
    /// the source that refers to it.
    fn lower(&self, arena: &[Draft], draft: usize, nodes: &mut Vec<ConditionNode>) -> Result<Source> {
        let (sources, conditions) = match &arena[draft].kind {
            DraftKind::Entry(ft) => {
                return Ok(Source::Entry {
                    fact_type: *ft,
                    memory: self.memory[*ft],
                });
            }
            DraftKind::Condition {
                sources,
                conditions,
            } => (sources, conditions),
        };

        let mut lowered = Vec::with_capacity(sources.len());
        for &source in sources {
            lowered.push(self.lower(arena, source, nodes)?);
        }

        let evaluators = conditions
            .iter()
            .map(|c| resolve(c, arena, sources))
            .collect::<Result<Box<[Evaluator]>>>()?;

        nodes.push(ConditionNode {
            sources: lowered.into(),
            fact_types: arena[draft].fact_types.clone().into(),
            evaluators,
            mask: arena[draft].mask.clone(),
        });
        Ok(Source::Node(nodes.len() - 1))
    }
}

fn resolve(condition: &BetaCondition, arena: &[Draft], sources: &[usize]) -> Result<Evaluator> {
    let slots = condition
        .args
        .iter()
        .map(|arg| {
            sources
                .iter()
                .enumerate()
                .find_map(|(source, &d)| {
                    arena[d]
                        .fact_types
                        .iter()
                        .position(|&ft| ft == arg.fact_type)
                        .map(|column| ArgSlot {
                            source,
                            column,
                            key_pos: arg.key_pos,
                        })
                })
                .ok_or_else(|| {
                    Error::invalid_join(format!(
                        "fact type {} is not joined under `{}`",
                        arg.fact_type,
                        condition.predicate.signature()
                    ))
                })
        })
        .collect::<Result<Box<[ArgSlot]>>>()?;
    Ok(Evaluator {
        predicate: condition.predicate.clone(),
        expected: condition.expected,
        slots,
    })
}

fn merge_groups(conditions: Vec<BetaCondition>) -> Vec<EvaluatorGroup> {
    let mut groups: Vec<EvaluatorGroup> = Vec::new();
    for condition in conditions {
        let mask = condition.mask();
        let complexity = condition.complexity;
        match groups.iter_mut().find(|g| g.mask == mask) {
            Some(group) => {
                group.complexity += complexity;
                group.conditions.push(condition);
            }
            None => groups.push(EvaluatorGroup {
                mask,
                conditions: vec![condition],
                complexity,
                label: String::new(),
            }),
        }
    }
    for group in &mut groups {
        let mut signatures: Vec<String> = group
            .conditions
            .iter()
            .map(|c| {
                let prefix = if c.expected { "" } else { "!" };
                format!("{prefix}{}", c.predicate.signature())
            })
            .collect();
        signatures.sort();
        let types: Vec<String> = group.mask.iter().map(|ft| ft.to_string()).collect();
        group.label = format!("[{}] {}", types.join(","), signatures.join(" && "));
    }
    groups
}

#[allow(clippy::cast_precision_loss)]
fn sort_groups(mut groups: Vec<EvaluatorGroup>) -> Vec<EvaluatorGroup> {
    let min = groups.iter().map(|g| g.complexity).fold(f64::INFINITY, f64::min);
    let max = groups
        .iter()
        .map(|g| g.complexity)
        .fold(f64::NEG_INFINITY, f64::max);
    let weight = |g: &EvaluatorGroup| {
        let factor = if max > min {
            1.0 + (g.complexity - min) / (max - min)
        } else {
            1.0
        };
        factor * g.mask.cardinality() as f64
    };
    groups.sort_by(|a, b| {
        weight(a)
            .total_cmp(&weight(b))
            .then_with(|| a.label.cmp(&b.label))
    });
    groups
}
