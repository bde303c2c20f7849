//! Rule definitions.
//!
//! A rule is built with [`RuleBuilder`]: declare fact variables with
//! [`RuleBuilder::for_each`], constrain them with [`RuleBuilder::when`], and
//! finish with an action via [`RuleBuilder::execute`]. The resulting
//! [`RuleDefinition`] is compiled into the network when it is added to a
//! knowledge base or a live session.

pub mod compiler;

pub use compiler::RuleCompiler;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use ruleweave_foundation::{Error, Result, TypeId};

use crate::condition::{Condition, Predicate, strip_sigil};
use crate::index::TypeIndex;
use crate::network::RuleNetwork;
use crate::rhs::RhsContext;

/// A rule action.
pub type RhsFn = Arc<dyn Fn(&mut RhsContext<'_>) -> Result<()> + Send + Sync>;

// =============================================================================
// Definition
// =============================================================================

/// Builder for [`RuleDefinition`].
#[derive(Clone, Debug)]
pub struct RuleBuilder {
    name: Arc<str>,
    salience: i32,
    declarations: Vec<(Arc<str>, Arc<str>)>,
    conditions: Vec<Condition>,
}

impl RuleBuilder {
    /// Starts a rule.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            salience: 0,
            declarations: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Sets the salience (higher fires first).
    #[must_use]
    pub fn with_salience(mut self, salience: i32) -> Self {
        self.salience = salience;
        self
    }

    /// Declares a variable ranging over facts of a type.
    #[must_use]
    pub fn for_each(mut self, var: &str, type_name: &str) -> Self {
        self.declarations
            .push((strip_sigil(var).into(), type_name.into()));
        self
    }

    /// Adds a condition.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Finishes the rule with its action.
    #[must_use]
    pub fn execute(
        self,
        rhs: impl Fn(&mut RhsContext<'_>) -> Result<()> + Send + Sync + 'static,
    ) -> RuleDefinition {
        RuleDefinition {
            name: self.name,
            salience: self.salience,
            declarations: self.declarations,
            conditions: self.conditions,
            rhs: Arc::new(rhs),
        }
    }
}

/// A rule ready to be compiled.
#[derive(Clone)]
pub struct RuleDefinition {
    name: Arc<str>,
    salience: i32,
    declarations: Vec<(Arc<str>, Arc<str>)>,
    conditions: Vec<Condition>,
    rhs: RhsFn,
}

impl RuleDefinition {
    /// The rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The salience.
    #[must_use]
    pub fn salience(&self) -> i32 {
        self.salience
    }

    /// `(variable, type name)` declarations in order.
    #[must_use]
    pub fn declarations(&self) -> &[(Arc<str>, Arc<str>)] {
        &self.declarations
    }

    /// Conditions in order.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
}

impl fmt::Debug for RuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDefinition")
            .field("name", &self.name)
            .field("salience", &self.salience)
            .field("declarations", &self.declarations)
            .field("conditions", &self.conditions.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Compiled Rule
// =============================================================================

/// A declared fact variable, resolved against the type index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FactType {
    /// Variable name without the sigil.
    pub var: Arc<str>,
    /// Position among the rule's declarations.
    pub index: usize,
    /// The fact type.
    pub type_id: TypeId,
    /// Value indices the rule joins this variable on, ascending.
    pub key_fields: Arc<[usize]>,
    /// Alpha address of the variable's single-fact conditions.
    pub alpha_address: usize,
    /// Memory address (bucket) feeding the variable.
    pub memory: usize,
}

/// A rule compiled into the network.
#[derive(Clone)]
pub struct CompiledRule {
    name: Arc<str>,
    salience: i32,
    fact_types: Vec<FactType>,
    network: RuleNetwork,
    rhs: RhsFn,
}

impl CompiledRule {
    /// The rule name.
    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Salience at compile time.
    #[must_use]
    pub fn salience(&self) -> i32 {
        self.salience
    }

    /// Declared fact variables.
    #[must_use]
    pub fn fact_types(&self) -> &[FactType] {
        &self.fact_types
    }

    /// The rule's join network.
    #[must_use]
    pub fn network(&self) -> &RuleNetwork {
        &self.network
    }

    /// Runs the action.
    pub fn execute(&self, ctx: &mut RhsContext<'_>) -> Result<()> {
        (self.rhs)(ctx)
    }
}

/// Swaps the logic of every condition with the predicate's signature, in
/// alpha routing and in joins. Rules that never evaluate the signature are
/// not cloned.
///
/// # Errors
/// Returns `InvalidCondition` if nothing carries the signature.
pub(crate) fn replace_predicate<'a>(
    index: &mut TypeIndex,
    rules: impl IntoIterator<Item = &'a mut Arc<CompiledRule>>,
    predicate: &Predicate,
) -> Result<usize> {
    let mut replaced = index.replace_predicate(predicate);
    for rule in rules {
        if rule.network().evaluates(predicate.signature()) {
            replaced += Arc::make_mut(rule).network.replace_predicate(predicate);
        }
    }
    if replaced == 0 {
        return Err(Error::invalid_condition(format!(
            "no condition `{}`",
            predicate.signature()
        )));
    }
    debug!(signature = predicate.signature(), replaced, "condition replaced");
    Ok(replaced)
}

impl fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRule")
            .field("name", &self.name)
            .field("salience", &self.salience)
            .field("fact_types", &self.fact_types)
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

/// Snapshot of a deployed rule, as seen by activation managers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleInfo {
    /// The rule name.
    pub name: Arc<str>,
    /// Current salience.
    pub salience: i32,
    /// Deployment position.
    pub index: usize,
    /// Whether the rule may fire.
    pub enabled: bool,
}
