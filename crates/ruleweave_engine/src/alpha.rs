//! Alpha routing.
//!
//! Each fact type owns an [`AlphaRouter`] holding the single-fact conditions
//! rules placed on it. Classifying a fact evaluates every condition once and
//! yields a bitmask; an [`AlphaAddress`] is a conjunction of required bit
//! values, and a fact belongs to every address its bitmask satisfies.
//!
//! Conditions are deduplicated by (signature, fields) and addresses by their
//! set of (condition, expected) requirements, so rules that filter a type the
//! same way share one address and therefore one memory bucket.

use std::sync::Arc;

use ruleweave_foundation::{AlphaConditionBits, Error, Mask, Result, Value};

use crate::condition::Predicate;

/// A registered single-fact condition.
#[derive(Clone, Debug)]
pub struct AlphaCondition {
    index: usize,
    predicate: Predicate,
    fields: Arc<[usize]>,
}

impl AlphaCondition {
    /// Bit index of the condition within its type.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The predicate's signature.
    #[must_use]
    pub fn signature(&self) -> &str {
        self.predicate.signature()
    }

    /// Value indices of the arguments, in argument order.
    #[must_use]
    pub fn fields(&self) -> &[usize] {
        &self.fields
    }

    /// Evaluates the raw predicate on a value array. Missing values are nil.
    #[must_use]
    pub fn test(&self, values: &[Value]) -> bool {
        const NIL: &Value = &Value::Nil;
        let args: Vec<&Value> = self
            .fields
            .iter()
            .map(|&i| values.get(i).unwrap_or(NIL))
            .collect();
        self.predicate.test(&args)
    }
}

/// A deduplicated conjunction of alpha requirements.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AlphaAddress {
    index: usize,
    scope: Mask<AlphaConditionBits>,
    expected: Mask<AlphaConditionBits>,
}

impl AlphaAddress {
    /// Index of the address within its type.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Conditions the address constrains.
    #[must_use]
    pub fn scope(&self) -> &Mask<AlphaConditionBits> {
        &self.scope
    }

    /// Required outcome per constrained condition.
    #[must_use]
    pub fn expected(&self) -> &Mask<AlphaConditionBits> {
        &self.expected
    }

    /// Returns true if a fact with these condition bits belongs here.
    #[must_use]
    pub fn matches(&self, bits: &Mask<AlphaConditionBits>) -> bool {
        bits.agrees_on(&self.scope, &self.expected)
    }
}

type ConditionKey = (Arc<str>, Arc<[usize]>);
type AddressKey = (Mask<AlphaConditionBits>, Mask<AlphaConditionBits>);

/// Alpha conditions and addresses of one fact type.
#[derive(Clone, Debug, Default)]
pub struct AlphaRouter {
    conditions: im::Vector<AlphaCondition>,
    condition_index: im::HashMap<ConditionKey, usize>,
    addresses: im::Vector<AlphaAddress>,
    address_index: im::HashMap<AddressKey, usize>,
}

impl AlphaRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a condition, returning the index of an identical one if it
    /// already exists.
    pub fn register_condition(&mut self, predicate: &Predicate, fields: &[usize]) -> usize {
        let key: ConditionKey = (predicate.signature().into(), fields.into());
        if let Some(&index) = self.condition_index.get(&key) {
            return index;
        }
        let index = self.conditions.len();
        self.conditions.push_back(AlphaCondition {
            index,
            predicate: predicate.clone(),
            fields: Arc::clone(&key.1),
        });
        self.condition_index.insert(key, index);
        index
    }

    /// Registers an address from `(condition, expected)` requirements.
    ///
    /// Order and duplicates do not matter. Requiring one condition to be
    /// both true and false is an error.
    pub fn register_address(&mut self, requirements: &[(usize, bool)]) -> Result<usize> {
        let mut scope = Mask::new();
        let mut expected = Mask::new();
        for &(condition, outcome) in requirements {
            if condition >= self.conditions.len() {
                return Err(Error::internal(format!(
                    "alpha condition {condition} is not registered"
                )));
            }
            if scope.get(condition) && expected.get(condition) != outcome {
                return Err(Error::invalid_condition(format!(
                    "contradictory requirements on alpha condition `{}`",
                    self.conditions[condition].signature()
                )));
            }
            scope.set(condition);
            expected.assign(condition, outcome);
        }

        let key = (scope, expected);
        if let Some(&index) = self.address_index.get(&key) {
            return Ok(index);
        }
        let index = self.addresses.len();
        self.addresses.push_back(AlphaAddress {
            index,
            scope: key.0.clone(),
            expected: key.1.clone(),
        });
        self.address_index.insert(key, index);
        Ok(index)
    }

    /// Evaluates every condition against a value array.
    #[must_use]
    pub fn classify(&self, values: &[Value]) -> Mask<AlphaConditionBits> {
        let mut bits = Mask::new();
        for condition in &self.conditions {
            if condition.test(values) {
                bits.set(condition.index);
            }
        }
        bits
    }

    /// Swaps the predicate of every condition with the same signature.
    ///
    /// Facts classified earlier keep their bits until they are updated.
    pub fn replace_predicate(&mut self, predicate: &Predicate) -> usize {
        let mut replaced = 0;
        for condition in self.conditions.iter_mut() {
            if condition.signature() == predicate.signature() {
                condition.predicate = predicate.clone();
                replaced += 1;
            }
        }
        replaced
    }

    /// Returns the addresses in `scope` that a fact with `bits` belongs to.
    pub fn matching_addresses<'a>(
        &'a self,
        bits: &'a Mask<AlphaConditionBits>,
        scope: impl IntoIterator<Item = usize> + 'a,
    ) -> impl Iterator<Item = &'a AlphaAddress> + 'a {
        scope
            .into_iter()
            .filter_map(|i| self.addresses.get(i))
            .filter(move |a| a.matches(bits))
    }

    /// Returns an address by index.
    #[must_use]
    pub fn address(&self, index: usize) -> Option<&AlphaAddress> {
        self.addresses.get(index)
    }

    /// Returns a condition by index.
    #[must_use]
    pub fn condition(&self, index: usize) -> Option<&AlphaCondition> {
        self.conditions.get(index)
    }

    /// Number of registered conditions.
    #[must_use]
    pub fn condition_count(&self) -> usize {
        self.conditions.len()
    }

    /// Number of registered addresses.
    #[must_use]
    pub fn address_count(&self) -> usize {
        self.addresses.len()
    }
}
