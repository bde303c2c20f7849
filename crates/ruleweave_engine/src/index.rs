//! Type and field indexing.
//!
//! The [`TypeIndex`] assigns stable ids to fact types, value-array positions
//! to the fields rules actually read, and indices to memory addresses. It is
//! built from persistent collections: a session clones the knowledge's index
//! in constant time, and hot deployment into the session mutates only the
//! session's copy.

use std::sync::Arc;

use ruleweave_foundation::{AlphaConditionBits, Error, Fact, Mask, Result, TypeId, Value};

use crate::alpha::AlphaRouter;
use crate::condition::Predicate;

// =============================================================================
// Active Types and Fields
// =============================================================================

/// A field some rule reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveField {
    /// Owning type.
    pub type_id: TypeId,
    /// Field name.
    pub name: Arc<str>,
    /// Position in a record's value array.
    pub index: usize,
}

/// A fact type referenced by at least one rule or declaration.
#[derive(Clone, Debug)]
pub struct ActiveType {
    id: TypeId,
    name: Arc<str>,
    fields: im::Vector<ActiveField>,
    field_index: im::HashMap<Arc<str>, usize>,
    alpha: AlphaRouter,
    memory: im::Vector<usize>,
}

impl ActiveType {
    fn new(id: TypeId, name: Arc<str>) -> Self {
        Self {
            id,
            name,
            fields: im::Vector::new(),
            field_index: im::HashMap::new(),
            alpha: AlphaRouter::new(),
            memory: im::Vector::new(),
        }
    }

    /// The type id.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The type name.
    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Fields in value-index order.
    pub fn fields(&self) -> impl Iterator<Item = &ActiveField> {
        self.fields.iter()
    }

    /// Looks up an indexed field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&ActiveField> {
        self.field_index.get(name).and_then(|&i| self.fields.get(i))
    }

    /// The type's alpha conditions and addresses.
    #[must_use]
    pub fn alpha(&self) -> &AlphaRouter {
        &self.alpha
    }

    /// Memory addresses holding facts of this type.
    pub fn memory_addresses(&self) -> impl Iterator<Item = usize> + '_ {
        self.memory.iter().copied()
    }

    /// Reads the indexed fields of a fact into a value array.
    #[must_use]
    pub fn resolve_values(&self, fact: &Fact) -> Box<[Value]> {
        self.fields.iter().map(|f| fact.value(&f.name)).collect()
    }
}

// =============================================================================
// Memory Addresses
// =============================================================================

/// A `(type, key fields, alpha address)` triple; one bucket per address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemoryAddress {
    /// Global index, also the bucket address.
    pub index: usize,
    /// The fact type.
    pub type_id: TypeId,
    /// Value indices the bucket keys on, ascending.
    pub key_fields: Arc<[usize]>,
    /// Alpha address within the type.
    pub alpha_address: usize,
}

type MemoryKey = (TypeId, Arc<[usize]>, usize);

// =============================================================================
// Type Index
// =============================================================================

/// Registry of types, fields, alpha routing, and memory addresses.
#[derive(Clone, Debug, Default)]
pub struct TypeIndex {
    types: im::Vector<ActiveType>,
    by_name: im::HashMap<Arc<str>, TypeId>,
    memory: im::Vector<MemoryAddress>,
    memory_index: im::HashMap<MemoryKey, usize>,
}

impl TypeIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of a type, creating it on first use.
    pub fn get_or_create_type(&mut self, name: &str) -> Result<TypeId> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        let raw = u32::try_from(self.types.len())
            .map_err(|_| Error::internal("fact type id space exhausted"))?;
        let id = TypeId::new(raw);
        let name: Arc<str> = name.into();
        self.types.push_back(ActiveType::new(id, Arc::clone(&name)));
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Returns the id of a known type.
    #[must_use]
    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Returns a known type.
    #[must_use]
    pub fn active_type(&self, id: TypeId) -> Option<&ActiveType> {
        self.types.get(id.as_usize())
    }

    fn active_type_mut(&mut self, id: TypeId) -> Result<&mut ActiveType> {
        self.types
            .get_mut(id.as_usize())
            .ok_or_else(|| Error::internal(format!("{id:?} is not indexed")))
    }

    /// Iterates over all types in id order.
    pub fn types(&self) -> impl Iterator<Item = &ActiveType> {
        self.types.iter()
    }

    /// Swaps the predicate of every alpha condition with the same signature,
    /// across all types. Returns the number of conditions replaced.
    pub fn replace_predicate(&mut self, predicate: &Predicate) -> usize {
        self.types
            .iter_mut()
            .map(|ty| ty.alpha.replace_predicate(predicate))
            .sum()
    }

    /// Number of indexed types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Returns a field of a type, indexing it on first use.
    ///
    /// A field's value index never changes once assigned.
    pub fn get_or_create_field(&mut self, type_id: TypeId, name: &str) -> Result<ActiveField> {
        let ty = self.active_type_mut(type_id)?;
        if let Some(field) = ty.field(name) {
            return Ok(field.clone());
        }
        let field = ActiveField {
            type_id,
            name: name.into(),
            index: ty.fields.len(),
        };
        ty.field_index.insert(Arc::clone(&field.name), field.index);
        ty.fields.push_back(field.clone());
        Ok(field)
    }

    /// Registers an alpha condition on a type.
    pub fn register_alpha_condition(
        &mut self,
        type_id: TypeId,
        predicate: &Predicate,
        fields: &[usize],
    ) -> Result<usize> {
        Ok(self
            .active_type_mut(type_id)?
            .alpha
            .register_condition(predicate, fields))
    }

    /// Registers an alpha address on a type.
    pub fn register_alpha_address(
        &mut self,
        type_id: TypeId,
        requirements: &[(usize, bool)],
    ) -> Result<usize> {
        self.active_type_mut(type_id)?
            .alpha
            .register_address(requirements)
    }

    /// Returns the memory address for a triple, creating it on first use.
    pub fn get_or_create_memory(
        &mut self,
        type_id: TypeId,
        key_fields: &[usize],
        alpha_address: usize,
    ) -> Result<&MemoryAddress> {
        let key: MemoryKey = (type_id, key_fields.into(), alpha_address);
        let existing = self.memory_index.get(&key).copied();
        let index = match existing {
            Some(index) => index,
            None => {
                let index = self.memory.len();
                self.active_type_mut(type_id)?.memory.push_back(index);
                self.memory.push_back(MemoryAddress {
                    index,
                    type_id,
                    key_fields: Arc::clone(&key.1),
                    alpha_address,
                });
                self.memory_index.insert(key, index);
                index
            }
        };
        self.memory
            .get(index)
            .ok_or_else(|| Error::internal(format!("memory address {index} vanished")))
    }

    /// Returns a memory address by index.
    #[must_use]
    pub fn memory_address(&self, index: usize) -> Option<&MemoryAddress> {
        self.memory.get(index)
    }

    /// Iterates over all memory addresses.
    pub fn memory_addresses(&self) -> impl Iterator<Item = &MemoryAddress> {
        self.memory.iter()
    }

    /// Computes a fact's value array and alpha bits.
    pub fn prepare(
        &self,
        type_id: TypeId,
        fact: &Fact,
    ) -> Result<(Box<[Value]>, Mask<AlphaConditionBits>)> {
        let ty = self
            .active_type(type_id)
            .ok_or_else(|| Error::internal(format!("{type_id:?} is not indexed")))?;
        let values = ty.resolve_values(fact);
        let bits = ty.alpha.classify(&values);
        Ok((values, bits))
    }

    /// Memory addresses of a type that a fact with `bits` belongs to.
    pub fn routes<'a>(
        &'a self,
        type_id: TypeId,
        bits: &'a Mask<AlphaConditionBits>,
    ) -> impl Iterator<Item = &'a MemoryAddress> + 'a {
        self.active_type(type_id)
            .into_iter()
            .flat_map(move |ty| {
                ty.memory.iter().filter_map(move |&index| {
                    let address = self.memory.get(index)?;
                    ty.alpha
                        .address(address.alpha_address)
                        .filter(|a| a.matches(bits))
                        .map(|_| address)
                })
            })
    }
}
