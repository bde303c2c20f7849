//! Condition predicates.
//!
//! A [`Predicate`] is a boolean function over positional arguments plus a
//! normalized text signature that identifies what it computes. A
//! [`Condition`] binds a predicate to field references such as `"$p.age"`.
//! The rule compiler decides, from the variables a condition references,
//! whether it becomes an alpha (single fact) or a beta (join) condition.

use std::fmt;
use std::sync::Arc;

use ruleweave_foundation::{Error, Result, Value};

/// Boolean function over a condition's arguments, in reference order.
pub type PredicateFn = dyn Fn(&[&Value]) -> bool + Send + Sync;

// =============================================================================
// Predicate
// =============================================================================

/// A named, shareable boolean function.
///
/// Two predicates with the same signature are assumed to compute the same
/// thing; the network relies on that to share alpha conditions across rules.
#[derive(Clone)]
pub struct Predicate {
    signature: Arc<str>,
    func: Arc<PredicateFn>,
}

impl Predicate {
    /// Creates a predicate. Runs of whitespace in the signature collapse to
    /// one space.
    pub fn new(
        signature: impl AsRef<str>,
        func: impl Fn(&[&Value]) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            signature: normalize(signature.as_ref()).into(),
            func: Arc::new(func),
        }
    }

    /// The normalized signature.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Evaluates the predicate.
    #[must_use]
    pub fn test(&self, args: &[&Value]) -> bool {
        (self.func)(args)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({})", self.signature)
    }
}

fn normalize(signature: &str) -> String {
    signature.split_whitespace().collect::<Vec<_>>().join(" ")
}

// =============================================================================
// Field References
// =============================================================================

/// A parsed `"$var.field"` reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Variable name without the `$` sigil.
    pub var: Arc<str>,
    /// Field name.
    pub field: Arc<str>,
}

impl FieldRef {
    /// Parses `"$var.field"` (the sigil is optional).
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let (var, field) = trimmed
            .split_once('.')
            .ok_or_else(|| Error::invalid_condition(format!("bad field reference: {text}")))?;
        let var = strip_sigil(var);
        if var.is_empty() || field.is_empty() {
            return Err(Error::invalid_condition(format!(
                "bad field reference: {text}"
            )));
        }
        Ok(Self {
            var: var.into(),
            field: field.into(),
        })
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{}", self.var, self.field)
    }
}

/// Strips a leading `$` from a variable name.
pub(crate) fn strip_sigil(var: &str) -> &str {
    var.trim().strip_prefix('$').unwrap_or(var.trim())
}

// =============================================================================
// Condition
// =============================================================================

/// Comparison operators for the built-in condition constructors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    fn apply(self, a: &Value, b: &Value) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
            Self::Lt => a < b,
            Self::Le => a <= b,
        }
    }
}

/// A predicate bound to field references.
#[derive(Clone, Debug)]
pub struct Condition {
    predicate: Predicate,
    refs: Vec<Arc<str>>,
    complexity: f64,
    expected: bool,
}

impl Condition {
    /// Binds a predicate to field references.
    pub fn new<S: AsRef<str>>(predicate: Predicate, refs: impl IntoIterator<Item = S>) -> Self {
        Self {
            predicate,
            refs: refs.into_iter().map(|r| Arc::from(r.as_ref())).collect(),
            complexity: 1.0,
            expected: true,
        }
    }

    /// A condition from a custom function.
    pub fn custom<S: AsRef<str>>(
        signature: impl AsRef<str>,
        refs: impl IntoIterator<Item = S>,
        func: impl Fn(&[&Value]) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::new(Predicate::new(signature, func), refs)
    }

    fn compare(lhs: &str, op: CompareOp, rhs: &str) -> Self {
        let predicate = Predicate::new(format!("{{0}} {} {{1}}", op.symbol()), move |args| {
            op.apply(args[0], args[1])
        });
        Self::new(predicate, [lhs, rhs])
    }

    fn compare_value(lhs: &str, op: CompareOp, value: Value) -> Self {
        let signature = format!("{{0}} {} {value:?}", op.symbol());
        let predicate = Predicate::new(signature, move |args| op.apply(args[0], &value));
        Self::new(predicate, [lhs])
    }

    /// `lhs == rhs` over two field references.
    #[must_use]
    pub fn eq(lhs: &str, rhs: &str) -> Self {
        Self::compare(lhs, CompareOp::Eq, rhs)
    }

    /// `lhs != rhs` over two field references.
    #[must_use]
    pub fn ne(lhs: &str, rhs: &str) -> Self {
        Self::compare(lhs, CompareOp::Ne, rhs)
    }

    /// `lhs > rhs` over two field references.
    #[must_use]
    pub fn gt(lhs: &str, rhs: &str) -> Self {
        Self::compare(lhs, CompareOp::Gt, rhs)
    }

    /// `lhs >= rhs` over two field references.
    #[must_use]
    pub fn ge(lhs: &str, rhs: &str) -> Self {
        Self::compare(lhs, CompareOp::Ge, rhs)
    }

    /// `lhs < rhs` over two field references.
    #[must_use]
    pub fn lt(lhs: &str, rhs: &str) -> Self {
        Self::compare(lhs, CompareOp::Lt, rhs)
    }

    /// `lhs <= rhs` over two field references.
    #[must_use]
    pub fn le(lhs: &str, rhs: &str) -> Self {
        Self::compare(lhs, CompareOp::Le, rhs)
    }

    /// `field == value`.
    #[must_use]
    pub fn eq_value(field: &str, value: impl Into<Value>) -> Self {
        Self::compare_value(field, CompareOp::Eq, value.into())
    }

    /// `field != value`.
    #[must_use]
    pub fn ne_value(field: &str, value: impl Into<Value>) -> Self {
        Self::compare_value(field, CompareOp::Ne, value.into())
    }

    /// `field > value`.
    #[must_use]
    pub fn gt_value(field: &str, value: impl Into<Value>) -> Self {
        Self::compare_value(field, CompareOp::Gt, value.into())
    }

    /// `field >= value`.
    #[must_use]
    pub fn ge_value(field: &str, value: impl Into<Value>) -> Self {
        Self::compare_value(field, CompareOp::Ge, value.into())
    }

    /// `field < value`.
    #[must_use]
    pub fn lt_value(field: &str, value: impl Into<Value>) -> Self {
        Self::compare_value(field, CompareOp::Lt, value.into())
    }

    /// `field <= value`.
    #[must_use]
    pub fn le_value(field: &str, value: impl Into<Value>) -> Self {
        Self::compare_value(field, CompareOp::Le, value.into())
    }

    /// The field holds a truthy value.
    #[must_use]
    pub fn is_true(field: &str) -> Self {
        Self::custom("truthy({0})", [field], |args| args[0].is_truthy())
    }

    /// The field is nil or missing.
    #[must_use]
    pub fn is_nil(field: &str) -> Self {
        Self::custom("nil({0})", [field], |args| args[0].is_nil())
    }

    /// Negates the condition.
    #[must_use]
    pub fn not(mut self) -> Self {
        self.expected = !self.expected;
        self
    }

    /// Sets the evaluation cost hint used to order joins. Must be positive.
    #[must_use]
    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = complexity;
        self
    }

    /// The bound predicate.
    #[must_use]
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Raw field references, in argument order.
    #[must_use]
    pub fn refs(&self) -> &[Arc<str>] {
        &self.refs
    }

    /// The complexity hint.
    #[must_use]
    pub fn complexity(&self) -> f64 {
        self.complexity
    }

    /// The outcome the predicate must produce for the condition to pass.
    #[must_use]
    pub fn expected(&self) -> bool {
        self.expected
    }

    /// Parses every field reference.
    pub fn field_refs(&self) -> Result<Vec<FieldRef>> {
        self.refs.iter().map(|r| FieldRef::parse(r)).collect()
    }
}
