//! Variable definition workflows: create, edit, rename and delete variables
//! while keeping the stored trades consistent with the definitions.

use crate::domain::cache::TtlCache;
use crate::domain::error::JournalError;
use crate::domain::formula_parser;
use crate::domain::recalc::{RecalcSummary, Recalculator};
use crate::domain::variable::{
    NewVariable, Variable, VariableId, VariableUpdate, validate_kind, validate_name,
};
use crate::ports::journal_port::JournalStore;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

pub struct VariableService<'a> {
    store: &'a dyn JournalStore,
    recalculator: Recalculator,
    cache: Mutex<TtlCache<Vec<Variable>>>,
}

impl<'a> VariableService<'a> {
    pub fn new(store: &'a dyn JournalStore) -> Self {
        Self::with_cache_ttl(store, DEFAULT_CACHE_TTL)
    }

    pub fn with_cache_ttl(store: &'a dyn JournalStore, ttl: Duration) -> Self {
        Self {
            store,
            recalculator: Recalculator::new(),
            cache: Mutex::new(TtlCache::new(ttl)),
        }
    }

    /// Variables in display order, served from the cache while fresh.
    pub fn list_variables(&self) -> Result<Vec<Variable>, JournalError> {
        if let Some(cached) = self.cache()?.get() {
            return Ok(cached);
        }
        let variables = self.store.list_variables()?;
        self.cache()?.set(variables.clone());
        Ok(variables)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Variable, JournalError> {
        let lower = name.trim().to_lowercase();
        self.list_variables()?
            .into_iter()
            .find(|v| v.name.to_lowercase() == lower)
            .ok_or_else(|| JournalError::VariableInvalid {
                reason: format!("no variable named '{}'", name.trim()),
            })
    }

    /// Validate and persist a new variable. A calculated variable's formula
    /// must parse before anything is written; it is then computed for every
    /// trade.
    pub fn add_variable(
        &self,
        mut def: NewVariable,
    ) -> Result<(Variable, RecalcSummary), JournalError> {
        def.name = def.name.trim().to_string();
        validate_kind(def.var_type, def.formula.as_deref())?;
        let existing = self.store.list_variables()?;
        validate_name(&def.name, &existing, None)?;
        if let Some(formula) = def.formula.as_deref() {
            formula_parser::parse(formula)?;
        }

        let variable = self.store.insert_variable(def)?;
        self.invalidate();
        tracing::info!(id = variable.id, name = %variable.name, kind = %variable.var_type, "added variable");

        let summary = self.recalculator.recalculate(self.store, &variable)?;
        Ok((variable, summary))
    }

    /// Replace a calculated variable's formula and recompute it.
    pub fn update_formula(
        &self,
        id: VariableId,
        formula: &str,
    ) -> Result<RecalcSummary, JournalError> {
        let mut variable = self.get(id)?;
        if !variable.is_calculated() {
            return Err(JournalError::VariableInvalid {
                reason: format!("'{}' is not a calculated variable", variable.name),
            });
        }
        validate_kind(variable.var_type, Some(formula))?;
        formula_parser::parse(formula)?;

        let update = VariableUpdate {
            formula: Some(formula.to_string()),
            ..Default::default()
        };
        self.store.update_variable(id, &update)?;
        self.invalidate();
        update.apply_to(&mut variable);

        self.recalculator.recalculate(self.store, &variable)
    }

    /// Recompute one variable from its stored formula.
    pub fn recalculate(&self, id: VariableId) -> Result<RecalcSummary, JournalError> {
        let variable = self.get(id)?;
        self.recalculator.recalculate(self.store, &variable)
    }

    /// Recompute every calculated variable in display order. Each variable
    /// reads values written by the ones before it.
    pub fn recalculate_all(&self) -> Result<Vec<(Variable, RecalcSummary)>, JournalError> {
        let mut results = Vec::new();
        for variable in self.store.list_variables()? {
            if variable.calculated_formula().is_none() {
                continue;
            }
            let summary = self.recalculator.recalculate(self.store, &variable)?;
            results.push((variable, summary));
        }
        Ok(results)
    }

    /// Rename a variable and move its values on every trade to the new key.
    /// Returns the number of trades rewritten.
    pub fn rename_variable(&self, id: VariableId, new_name: &str) -> Result<usize, JournalError> {
        let new_name = new_name.trim();
        let existing = self.store.list_variables()?;
        let variable = existing
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or(JournalError::VariableNotFound { id })?;
        validate_name(new_name, &existing, Some(id))?;
        if variable.name == new_name {
            return Ok(0);
        }

        let moved = self
            .recalculator
            .rename_across_trades(self.store, &variable, new_name)?;
        self.store.update_variable(
            id,
            &VariableUpdate {
                name: Some(new_name.to_string()),
                ..Default::default()
            },
        )?;
        self.invalidate();
        Ok(moved)
    }

    /// Remove the definition and strip its key from every trade.
    pub fn delete_variable(&self, id: VariableId) -> Result<(), JournalError> {
        let variable = self.get(id)?;
        self.store.delete_variable(id)?;
        self.invalidate();

        let trades = self.store.list_trades()?;
        self.store.delete_trade_field(&trades, &variable.name)?;
        tracing::info!(id, name = %variable.name, "deleted variable");
        Ok(())
    }

    pub fn set_visibility(&self, id: VariableId, visible: bool) -> Result<(), JournalError> {
        self.store.update_variable(
            id,
            &VariableUpdate {
                visible: Some(visible),
                ..Default::default()
            },
        )?;
        self.invalidate();
        Ok(())
    }

    /// Assign display order from the position of each id in `ids`.
    pub fn reorder(&self, ids: &[VariableId]) -> Result<(), JournalError> {
        for (position, id) in ids.iter().enumerate() {
            self.store.update_variable(
                *id,
                &VariableUpdate {
                    order: Some(position as i64),
                    ..Default::default()
                },
            )?;
        }
        self.invalidate();
        Ok(())
    }

    fn get(&self, id: VariableId) -> Result<Variable, JournalError> {
        self.store
            .list_variables()?
            .into_iter()
            .find(|v| v.id == id)
            .ok_or(JournalError::VariableNotFound { id })
    }

    fn cache(&self) -> Result<MutexGuard<'_, TtlCache<Vec<Variable>>>, JournalError> {
        self.cache.lock().map_err(|e| JournalError::Store {
            reason: format!("variable cache lock poisoned: {}", e),
        })
    }

    fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.invalidate();
        }
    }
}
