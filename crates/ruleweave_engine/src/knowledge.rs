//! Compiled rule sets shared by sessions.

use std::sync::Arc;

use tracing::debug;

use ruleweave_foundation::{Error, Result, TypeId, Value};

use crate::condition::Predicate;
use crate::config::SessionConfig;
use crate::index::TypeIndex;
use crate::rule::{self, CompiledRule, RuleCompiler, RuleDefinition, RuleInfo};
use crate::session::{Session, StatelessSession};

/// A set of compiled rules and the type index they were compiled against.
///
/// Sessions fork the index on creation, so rules added to the knowledge
/// afterwards do not reach existing sessions.
#[derive(Clone, Debug, Default)]
pub struct Knowledge {
    index: TypeIndex,
    rules: Vec<Arc<CompiledRule>>,
    config: SessionConfig,
}

impl Knowledge {
    /// Creates an empty knowledge base.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration of sessions created by [`Knowledge::new_session`].
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Declares a fact type that no rule references, so its facts are kept
    /// instead of skipped.
    pub fn declare_type(&mut self, name: &str) -> Result<TypeId> {
        self.index.get_or_create_type(name)
    }

    /// Compiles and appends a rule.
    ///
    /// # Errors
    /// Returns `DuplicateRule` if the name is taken, or any compile error.
    pub fn add_rule(&mut self, definition: &RuleDefinition) -> Result<()> {
        if self.rules.iter().any(|r| &**r.name() == definition.name()) {
            return Err(Error::duplicate_rule(definition.name()));
        }
        let rule = RuleCompiler::compile(&mut self.index, definition)?;
        debug!(
            rule = definition.name(),
            trees = rule.network().trees().len(),
            "rule compiled"
        );
        self.rules.push(Arc::new(rule));
        Ok(())
    }

    /// Replaces the logic of every condition with this signature in the
    /// compiled rules. Sessions created earlier keep the old logic.
    ///
    /// # Errors
    /// Returns `InvalidCondition` if no compiled condition has the signature.
    pub fn replace_condition(
        &mut self,
        signature: &str,
        func: impl Fn(&[&Value]) -> bool + Send + Sync + 'static,
    ) -> Result<usize> {
        let predicate = Predicate::new(signature, func);
        rule::replace_predicate(&mut self.index, self.rules.iter_mut(), &predicate)
    }

    /// Compiled rules, in insertion order.
    #[must_use]
    pub fn rules(&self) -> Vec<RuleInfo> {
        self.rules
            .iter()
            .enumerate()
            .map(|(index, r)| RuleInfo {
                name: Arc::clone(r.name()),
                salience: r.salience(),
                index,
                enabled: true,
            })
            .collect()
    }

    /// The type index.
    #[must_use]
    pub fn index(&self) -> &TypeIndex {
        &self.index
    }

    /// Creates a session with the knowledge's configuration.
    pub fn new_session(&self) -> Result<Session> {
        self.new_session_with(self.config.clone())
    }

    /// Creates a session with a specific configuration.
    pub fn new_session_with(&self, config: SessionConfig) -> Result<Session> {
        Session::from_parts(self.index.clone(), &self.rules, config)
    }

    /// Creates a one-shot session: insert facts, then fire once.
    pub fn new_stateless_session(&self) -> Result<StatelessSession> {
        self.new_session().map(StatelessSession::new)
    }
}
