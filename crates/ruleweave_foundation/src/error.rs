//! Error types for the Ruleweave system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

use crate::fact::FactHandle;

/// The main error type for Ruleweave operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates an unknown fact handle error.
    #[must_use]
    pub fn unknown_handle(handle: FactHandle) -> Self {
        Self::new(ErrorKind::UnknownFactHandle(handle))
    }

    /// Creates an unknown fact type error.
    #[must_use]
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownType(name.into()))
    }

    /// Creates an unallocated memory bucket error.
    #[must_use]
    pub fn unallocated_bucket(address: usize) -> Self {
        Self::new(ErrorKind::UnallocatedBucket(address))
    }

    /// Creates a duplicate rule name error.
    #[must_use]
    pub fn duplicate_rule(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::DuplicateRule(name.into()))
    }

    /// Creates a fact type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        })
    }

    /// Creates an unknown variable error.
    #[must_use]
    pub fn unknown_variable(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownVariable(name.into()))
    }

    /// Creates an invalid condition error.
    #[must_use]
    pub fn invalid_condition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidCondition(message.into()))
    }

    /// Creates an invalid join error.
    #[must_use]
    pub fn invalid_join(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidJoin(message.into()))
    }

    /// Creates an error raised by a rule's action.
    #[must_use]
    pub fn rhs(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Rhs(message.into()))
    }

    /// Creates a semantic limit exceeded error.
    #[must_use]
    pub fn limit_exceeded(limit: SemanticLimit) -> Self {
        Self::new(ErrorKind::LimitExceeded(limit))
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The handle was never issued by this session.
    #[error("unknown fact handle: {0:?}")]
    UnknownFactHandle(FactHandle),

    /// The fact type is not known to the runtime.
    #[error("unknown fact type: {0}")]
    UnknownType(String),

    /// A memory bucket was requested before the network allocated it.
    #[error("memory bucket {0} was never allocated")]
    UnallocatedBucket(usize),

    /// A rule with the same name is already deployed.
    #[error("duplicate rule name: {0}")]
    DuplicateRule(String),

    /// A fact's type does not match the handle it was paired with.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The type recorded on the handle.
        expected: String,
        /// The type of the supplied fact.
        actual: String,
    },

    /// A condition referenced an undeclared variable.
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// A condition could not be compiled into the network.
    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    /// The network builder found an ambiguous or overlapping join.
    #[error("invalid join: {0}")]
    InvalidJoin(String),

    /// A condition declared a non-positive complexity.
    #[error("condition complexity must be positive, got {0}")]
    InvalidComplexity(f64),

    /// A rule's action returned an error.
    #[error("rule action failed: {0}")]
    Rhs(String),

    /// Semantic limit exceeded (kill switch triggered).
    #[error("limit exceeded: {0}")]
    LimitExceeded(SemanticLimit),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Semantic limits (kill switches) that can be exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticLimit {
    /// Maximum fire cycles per `fire()` call exceeded.
    MaxFireCycles {
        /// The configured limit.
        limit: u64,
        /// Rules on the agenda when the limit was hit.
        context: Option<String>,
    },
}

impl fmt::Display for SemanticLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxFireCycles { limit, context } => {
                write!(f, "max fire cycles ({limit}) exceeded")?;
                if let Some(ctx) = context {
                    write!(f, ": {ctx}")?;
                }
                Ok(())
            }
        }
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Rule being compiled or fired.
    pub rule: Option<String>,
    /// Fact type involved.
    pub fact_type: Option<String>,
    /// Fire cycle number.
    pub cycle: Option<u64>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rule name.
    #[must_use]
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Sets the fact type.
    #[must_use]
    pub fn with_fact_type(mut self, fact_type: impl Into<String>) -> Self {
        self.fact_type = Some(fact_type.into());
        self
    }

    /// Sets the fire cycle.
    #[must_use]
    pub fn with_cycle(mut self, cycle: u64) -> Self {
        self.cycle = Some(cycle);
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        if let Some(rule) = &self.rule {
            write!(f, "in rule {rule}")?;
            sep = ", ";
        }
        if let Some(fact_type) = &self.fact_type {
            write!(f, "{sep}for type {fact_type}")?;
            sep = ", ";
        }
        if let Some(cycle) = self.cycle {
            write!(f, "{sep}at cycle {cycle}")?;
        }
        Ok(())
    }
}

/// Result type alias for Ruleweave operations.
pub type Result<T> = std::result::Result<T, Error>;
