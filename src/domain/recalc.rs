//! Recalculation of calculated variables across every stored trade.
//!
//! A pass parses the formula once, scans all trades, evaluates each one
//! independently and writes every updated trade back in a single batch.
//! Trades missing an input, or whose evaluation fails, are skipped. Only a
//! formula syntax error or a failed store call ends the pass early.
//!
//! Each pass takes a generation ticket for its variable. Starting a newer
//! pass (or a rename) for the same variable supersedes the older one, which
//! then refuses to write its batch.

use crate::domain::environment::build_environment;
use crate::domain::error::JournalError;
use crate::domain::formula::CompiledFormula;
use crate::domain::formula_eval::evaluate_with_reparse;
use crate::domain::formula_parser;
use crate::domain::trade::{TradeRecord, coerce_for_storage};
use crate::domain::variable::{Variable, VariableId};
use crate::ports::journal_port::JournalStore;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecalcSummary {
    pub updated_count: usize,
    pub skipped_count: usize,
}

/// Ticket identifying one pass over one variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    pub variable_id: VariableId,
    pub value: u64,
}

#[derive(Debug, Default)]
pub struct GenerationTracker {
    current: Mutex<HashMap<VariableId, u64>>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new pass for `variable_id`, superseding any earlier ticket.
    pub fn begin(&self, variable_id: VariableId) -> Generation {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let value = current.entry(variable_id).or_insert(0);
        *value += 1;
        Generation {
            variable_id,
            value: *value,
        }
    }

    pub fn is_current(&self, ticket: Generation) -> bool {
        let current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        current.get(&ticket.variable_id) == Some(&ticket.value)
    }
}

/// Evaluate `formula` for every trade and return the trades that received a
/// new value under `target_name`, plus the number skipped.
pub fn recalculate_trades(
    formula: &CompiledFormula,
    target_name: &str,
    trades: &[TradeRecord],
) -> (Vec<TradeRecord>, usize) {
    let inputs = formula.free_variables();
    let mut updated = Vec::new();
    let mut skipped = 0;

    for trade in trades {
        let env = build_environment(trade);

        if let Some(missing) = inputs.iter().find(|name| !env.contains_key(*name)) {
            tracing::debug!(trade_id = trade.id, input = %missing, "skipping trade: input not filled in");
            skipped += 1;
            continue;
        }

        let value = match evaluate_with_reparse(formula, &env) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(trade_id = trade.id, error = %e, "skipping trade: evaluation failed");
                skipped += 1;
                continue;
            }
        };

        let mut next = trade.clone();
        next.set(target_name, coerce_for_storage(&value));
        updated.push(next);
    }

    (updated, skipped)
}

/// Runs recalculation and rename passes, guarding each variable's passes
/// with generation tickets. Share one instance between callers that may
/// trigger passes concurrently.
#[derive(Debug, Default)]
pub struct Recalculator {
    generations: GenerationTracker,
}

impl Recalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generations(&self) -> &GenerationTracker {
        &self.generations
    }

    /// Recompute `variable` on every trade that has all of its inputs.
    /// Variables that are not calculated, or have no formula, are a no-op.
    pub fn recalculate(
        &self,
        store: &dyn JournalStore,
        variable: &Variable,
    ) -> Result<RecalcSummary, JournalError> {
        let Some(source) = variable.calculated_formula() else {
            return Ok(RecalcSummary::default());
        };
        let formula = formula_parser::parse(source)?;
        let ticket = self.generations.begin(variable.id);

        let trades = store.list_trades()?;
        let (updated, skipped_count) = recalculate_trades(&formula, &variable.name, &trades);

        if !self.generations.is_current(ticket) {
            tracing::warn!(
                variable = %variable.name,
                generation = ticket.value,
                "discarding recalculation superseded by a newer pass"
            );
            return Err(JournalError::StaleRecalculation {
                variable_id: variable.id,
            });
        }

        if !updated.is_empty() {
            store.batch_upsert_trades(&updated)?;
        }

        let summary = RecalcSummary {
            updated_count: updated.len(),
            skipped_count,
        };
        tracing::info!(
            variable = %variable.name,
            updated = summary.updated_count,
            skipped = summary.skipped_count,
            "recalculated variable"
        );
        Ok(summary)
    }

    /// Rename the key `variable.name` to `new_name` on every trade that has
    /// it. Returns the number of trades rewritten. Supersedes any in-flight
    /// recalculation of the variable, which would still write the old key.
    pub fn rename_across_trades(
        &self,
        store: &dyn JournalStore,
        variable: &Variable,
        new_name: &str,
    ) -> Result<usize, JournalError> {
        if variable.name == new_name {
            return Ok(0);
        }
        self.generations.begin(variable.id);

        let trades = store.list_trades()?;
        let renamed: Vec<TradeRecord> = trades
            .into_iter()
            .filter_map(|mut t| t.rename_field(&variable.name, new_name).then_some(t))
            .collect();

        if !renamed.is_empty() {
            store.batch_upsert_trades(&renamed)?;
        }
        tracing::info!(
            from = %variable.name,
            to = %new_name,
            trades = renamed.len(),
            "renamed variable across trades"
        );
        Ok(renamed.len())
    }
}

/// One-off recalculation without a shared generation tracker.
pub fn recalculate_variable(
    store: &dyn JournalStore,
    variable: &Variable,
) -> Result<RecalcSummary, JournalError> {
    Recalculator::new().recalculate(store, variable)
}

/// One-off rename without a shared generation tracker.
pub fn rename_variable_across_trades(
    store: &dyn JournalStore,
    variable: &Variable,
    new_name: &str,
) -> Result<usize, JournalError> {
    Recalculator::new().rename_across_trades(store, variable, new_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_adapter::MemoryStore;
    use crate::domain::trade::FieldValue;
    use crate::domain::variable::{NewVariable, VarType};

    fn calculated(id: VariableId, name: &str, formula: &str) -> Variable {
        NewVariable::calculated(name, formula).into_variable(id)
    }

    #[test]
    fn skips_trade_missing_input() {
        let store = MemoryStore::with_trades(vec![
            TradeRecord::new(1).with_field("Target Win", 200.0).with_field("Risk", 50.0),
            TradeRecord::new(2).with_field("Risk", 50.0),
        ]);
        let var = calculated(1, "Planned R", "targetwin / risk");

        let summary = recalculate_variable(&store, &var).unwrap();

        assert_eq!(
            summary,
            RecalcSummary {
                updated_count: 1,
                skipped_count: 1
            }
        );
        assert_eq!(store.trade(1).unwrap().get("Planned R"), Some(&FieldValue::Number(4.0)));
        assert_eq!(store.trade(2).unwrap(), TradeRecord::new(2).with_field("Risk", 50.0));
    }

    #[test]
    fn evaluation_failure_skips_only_that_trade() {
        let store = MemoryStore::with_trades(vec![
            TradeRecord::new(1).with_field("PnL", 30.0).with_field("Risk", 0.0),
            TradeRecord::new(2).with_field("PnL", 30.0).with_field("Risk", 10.0),
        ]);
        let var = calculated(1, "R", "pnl / risk");
        let summary = recalculate_variable(&store, &var).unwrap();
        assert_eq!(summary.updated_count, 1);
        assert_eq!(summary.skipped_count, 1);
        assert!(store.trade(1).unwrap().get("R").is_none());
        assert_eq!(store.trade(2).unwrap().get("R"), Some(&FieldValue::Number(3.0)));
    }

    #[test]
    fn syntax_error_aborts_before_touching_trades() {
        let store = MemoryStore::with_trades(vec![TradeRecord::new(1).with_field("PnL", 1.0)]);
        let var = calculated(1, "Bad", "pnl +");
        let err = recalculate_variable(&store, &var).unwrap_err();
        assert!(matches!(err, JournalError::FormulaSyntax(_)));
        assert_eq!(store.trade(1).unwrap().fields.len(), 1);
    }

    #[test]
    fn non_calculated_variable_is_noop() {
        let store = MemoryStore::with_trades(vec![TradeRecord::new(1)]);
        let var = NewVariable::new("Setup", VarType::Text).into_variable(1);
        assert_eq!(
            recalculate_variable(&store, &var).unwrap(),
            RecalcSummary::default()
        );
    }

    #[test]
    fn results_are_coerced_for_storage() {
        let store = MemoryStore::with_trades(vec![
            TradeRecord::new(1).with_field("PnL", 10.0),
            TradeRecord::new(2).with_field("PnL", -10.0),
        ]);
        let win = calculated(1, "Win", "pnl > 0");
        recalculate_variable(&store, &win).unwrap();
        assert_eq!(store.trade(1).unwrap().get("Win"), Some(&FieldValue::Text("TRUE".into())));
        assert_eq!(store.trade(2).unwrap().get("Win"), Some(&FieldValue::Text("FALSE".into())));

        let third = calculated(2, "Third", "pnl / 3");
        recalculate_variable(&store, &third).unwrap();
        assert_eq!(store.trade(1).unwrap().get("Third"), Some(&FieldValue::Number(3.33)));
    }

    #[test]
    fn batch_write_failure_is_surfaced() {
        let store = MemoryStore::with_trades(vec![TradeRecord::new(1).with_field("PnL", 1.0)]);
        store.fail_batch_writes("timeout");
        let err = recalculate_variable(&store, &calculated(1, "Double", "pnl * 2")).unwrap_err();
        assert!(matches!(err, JournalError::Store { .. }));
    }

    #[test]
    fn generation_tracker_supersedes_older_ticket() {
        let tracker = GenerationTracker::new();
        let first = tracker.begin(7);
        let second = tracker.begin(7);
        let other = tracker.begin(8);
        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));
        assert!(tracker.is_current(other));
    }

    #[test]
    fn rename_moves_key_on_affected_trades() {
        let store = MemoryStore::with_trades(vec![
            TradeRecord::new(1).with_field("Target Win", 100.0),
            TradeRecord::new(2).with_field("Target Win", 50.0),
            TradeRecord::new(3).with_field("PnL", 1.0),
        ]);
        let var = NewVariable::new("Target Win", VarType::Number).into_variable(1);
        let renamed = rename_variable_across_trades(&store, &var, "TW").unwrap();
        assert_eq!(renamed, 2);
        for trade in store.list_trades().unwrap() {
            assert!(trade.get("Target Win").is_none());
        }
        assert_eq!(store.trade(1).unwrap().get("TW"), Some(&FieldValue::Number(100.0)));
        assert_eq!(store.trade(3).unwrap(), TradeRecord::new(3).with_field("PnL", 1.0));
    }

    #[test]
    fn rename_to_same_name_is_noop() {
        let store = MemoryStore::with_trades(vec![TradeRecord::new(1).with_field("A", 1.0)]);
        store.fail_batch_writes("should not be called");
        let var = NewVariable::new("A", VarType::Number).into_variable(1);
        assert_eq!(rename_variable_across_trades(&store, &var, "A").unwrap(), 0);
    }

    #[test]
    fn rename_supersedes_in_flight_recalculation() {
        let recalculator = Recalculator::new();
        let ticket = recalculator.generations().begin(1);
        let store = MemoryStore::with_trades(vec![TradeRecord::new(1).with_field("A", 1.0)]);
        let var = NewVariable::new("A", VarType::Number).into_variable(1);
        recalculator.rename_across_trades(&store, &var, "B").unwrap();
        assert!(!recalculator.generations().is_current(ticket));
    }
}
