//! Facts, fact handles, and type identifiers.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Stable index of a fact type inside a runtime context.
///
/// Assigned lazily on first reference and never reused.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TypeId(u32);

impl TypeId {
    /// Creates a type id from a raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index of this type.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Returns the raw index as a `usize`, for slice access.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Identity of a fact in working memory.
///
/// Handles are globally unique within a session, allocated monotonically,
/// and never reused, even after the fact is deleted.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactHandle {
    /// Monotonic identifier.
    pub id: u64,
    /// Type the fact was inserted as.
    pub type_id: TypeId,
}

impl FactHandle {
    /// Creates a handle from its parts.
    #[must_use]
    pub const fn new(id: u64, type_id: TypeId) -> Self {
        Self { id, type_id }
    }
}

impl fmt::Debug for FactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FactHandle({}:{})", self.id, self.type_id.0)
    }
}

impl fmt::Display for FactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id)
    }
}

/// A fact: a type name plus named field values.
///
/// Fields live in a persistent ordered map, so cloning a fact is O(1) and
/// `with` shares structure with the original.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fact {
    type_name: Arc<str>,
    fields: im::OrdMap<Arc<str>, Value>,
}

impl Fact {
    /// Creates an empty fact of the given type.
    #[must_use]
    pub fn new(type_name: impl Into<Arc<str>>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: im::OrdMap::new(),
        }
    }

    /// Returns a copy of this fact with `field` set to `value`.
    #[must_use]
    pub fn with(mut self, field: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Sets a field in place.
    pub fn set(&mut self, field: impl Into<Arc<str>>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Returns the fact's type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns a field value, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns a field value, reading absent fields as nil.
    #[must_use]
    pub fn value(&self, field: &str) -> Value {
        self.fields.get(field).cloned().unwrap_or_default()
    }

    /// Iterates over `(field, value)` pairs in field-name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_ref(), v))
    }

    /// Returns the number of fields set on this fact.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no fields are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Debug for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.type_name)?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v:?}")?;
        }
        write!(f, "}}")
    }
}
