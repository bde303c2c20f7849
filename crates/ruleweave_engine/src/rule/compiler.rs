//! Rule compiler: turns a [`RuleDefinition`] into a [`CompiledRule`].
//!
//! Compilation runs in stages, each feeding the next: variables are resolved
//! to types, conditions are split into alpha and beta conditions, memory
//! addresses are allocated per variable, and the beta network is built.
//! Everything is registered on a staged copy of the type index that replaces
//! the original only when every stage succeeded.

use std::collections::BTreeSet;
use std::sync::Arc;

use ruleweave_foundation::{Error, ErrorContext, ErrorKind, Result, TypeId};

use super::{CompiledRule, FactType, RuleDefinition};
use crate::condition::Condition;
use crate::index::{ActiveField, TypeIndex};
use crate::network::{BetaArg, BetaCondition, NetworkBuilder};

// =============================================================================
// Condition Classification
// =============================================================================

struct BoundCondition<'a> {
    condition: &'a Condition,
    args: Vec<(usize, ActiveField)>,
    vars: BTreeSet<usize>,
}

// =============================================================================
// Rule Compiler
// =============================================================================

/// Compiles rule definitions against a type index.
pub struct RuleCompiler;

impl RuleCompiler {
    /// Compiles a rule, registering its types, fields, alpha conditions, and
    /// memory addresses on `index`.
    ///
    /// # Errors
    /// Returns an error for undeclared variables, malformed or contradictory
    /// conditions, non-positive complexities, or an unbuildable join. On
    /// error `index` is left untouched.
    pub fn compile(index: &mut TypeIndex, definition: &RuleDefinition) -> Result<CompiledRule> {
        let mut staged = index.clone();
        let rule = Self::compile_staged(&mut staged, definition).map_err(|e| {
            let context = e.context.clone().unwrap_or_else(ErrorContext::new);
            e.with_context(context.with_rule(definition.name()))
        })?;
        *index = staged;
        Ok(rule)
    }

    fn compile_staged(index: &mut TypeIndex, definition: &RuleDefinition) -> Result<CompiledRule> {
        let type_ids = Self::resolve_declarations(index, definition)?;

        let bound = definition
            .conditions()
            .iter()
            .map(|c| Self::bind(index, definition, &type_ids, c))
            .collect::<Result<Vec<_>>>()?;

        // alpha requirements and join keys per variable
        let mut alpha: Vec<Vec<(usize, bool)>> = vec![Vec::new(); type_ids.len()];
        let mut keys: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); type_ids.len()];
        for b in &bound {
            match b.vars.len() {
                0 => {
                    return Err(Error::invalid_condition(format!(
                        "`{}` references no variable",
                        b.condition.predicate().signature()
                    )));
                }
                1 => {
                    let var = b.args[0].0;
                    let fields: Vec<usize> = b.args.iter().map(|(_, f)| f.index).collect();
                    let condition = index.register_alpha_condition(
                        type_ids[var],
                        b.condition.predicate(),
                        &fields,
                    )?;
                    alpha[var].push((condition, b.condition.expected()));
                }
                _ => {
                    for (var, field) in &b.args {
                        keys[*var].insert(field.index);
                    }
                }
            }
        }

        let mut fact_types = Vec::with_capacity(type_ids.len());
        for (i, ((var, _), &type_id)) in definition.declarations().iter().zip(&type_ids).enumerate() {
            let alpha_address = index.register_alpha_address(type_id, &alpha[i])?;
            let key_fields: Vec<usize> = keys[i].iter().copied().collect();
            let memory = index
                .get_or_create_memory(type_id, &key_fields, alpha_address)?
                .index;
            fact_types.push(FactType {
                var: Arc::clone(var),
                index: i,
                type_id,
                key_fields: key_fields.into(),
                alpha_address,
                memory,
            });
        }

        let beta = bound
            .iter()
            .filter(|b| b.vars.len() > 1)
            .map(|b| Self::beta(b, &fact_types))
            .collect::<Result<Vec<_>>>()?;
        let memory: Vec<usize> = fact_types.iter().map(|f| f.memory).collect();
        let network = NetworkBuilder::new(&memory).build(beta)?;

        Ok(CompiledRule {
            name: Arc::from(definition.name()),
            salience: definition.salience(),
            fact_types,
            network,
            rhs: Arc::clone(&definition.rhs),
        })
    }

    fn resolve_declarations(index: &mut TypeIndex, definition: &RuleDefinition) -> Result<Vec<TypeId>> {
        let declarations = definition.declarations();
        if declarations.is_empty() {
            return Err(Error::invalid_condition("rule declares no fact variables"));
        }
        let mut seen = BTreeSet::new();
        let mut type_ids = Vec::with_capacity(declarations.len());
        for (var, type_name) in declarations {
            if !seen.insert(var) {
                return Err(Error::invalid_condition(format!(
                    "variable ${var} is declared twice"
                )));
            }
            type_ids.push(index.get_or_create_type(type_name)?);
        }
        Ok(type_ids)
    }

    fn bind<'a>(
        index: &mut TypeIndex,
        definition: &RuleDefinition,
        type_ids: &[TypeId],
        condition: &'a Condition,
    ) -> Result<BoundCondition<'a>> {
        let complexity = condition.complexity();
        if !(complexity.is_finite() && complexity > 0.0) {
            return Err(Error::new(ErrorKind::InvalidComplexity(complexity)));
        }

        let mut args = Vec::new();
        let mut vars = BTreeSet::new();
        for field_ref in condition.field_refs()? {
            let var = definition
                .declarations()
                .iter()
                .position(|(v, _)| *v == field_ref.var)
                .ok_or_else(|| Error::unknown_variable(format!("${}", field_ref.var)))?;
            let field = index.get_or_create_field(type_ids[var], &field_ref.field)?;
            vars.insert(var);
            args.push((var, field));
        }
        Ok(BoundCondition {
            condition,
            args,
            vars,
        })
    }

    fn beta(bound: &BoundCondition<'_>, fact_types: &[FactType]) -> Result<BetaCondition> {
        let args = bound
            .args
            .iter()
            .map(|(var, field)| {
                fact_types[*var]
                    .key_fields
                    .iter()
                    .position(|&k| k == field.index)
                    .map(|key_pos| BetaArg {
                        fact_type: *var,
                        key_pos,
                    })
                    .ok_or_else(|| {
                        Error::internal(format!("field {} is not part of the join key", field.name))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BetaCondition {
            predicate: bound.condition.predicate().clone(),
            expected: bound.condition.expected(),
            args,
            complexity: bound.condition.complexity(),
        })
    }
}
