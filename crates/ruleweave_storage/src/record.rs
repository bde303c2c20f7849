//! Versioned fact records.

use ruleweave_foundation::{AlphaConditionBits, Fact, Mask, Value};

/// A stored fact plus the data the network reads from it.
///
/// `values` holds only the fields some rule uses, in value-index order, so
/// the network reads them by position instead of by name. `version` starts
/// at zero and increments on every update of the same handle.
#[derive(Clone, Debug)]
pub struct FactRecord {
    /// The fact instance.
    pub fact: Fact,
    /// In-use field values, indexed by active field value index.
    pub values: Box<[Value]>,
    /// Update counter; stale references carry an older version.
    pub version: u32,
    /// Pass/fail bit per alpha condition of the fact's type.
    pub alpha_bits: Mask<AlphaConditionBits>,
}

impl FactRecord {
    /// Creates a record at version zero.
    #[must_use]
    pub fn new(fact: Fact, values: Box<[Value]>, alpha_bits: Mask<AlphaConditionBits>) -> Self {
        Self {
            fact,
            values,
            version: 0,
            alpha_bits,
        }
    }

    /// Sets the version.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Returns the value at the given value index, or nil when out of range.
    #[must_use]
    pub fn value(&self, index: usize) -> &Value {
        const NIL: &Value = &Value::Nil;
        self.values.get(index).unwrap_or(NIL)
    }
}
