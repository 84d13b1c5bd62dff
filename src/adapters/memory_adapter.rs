//! In-process journal store.
//!
//! Backs tests and `stats --csv`. State lives behind mutexes so the
//! store can be shared by reference like the database adapters.

use crate::domain::error::JournalError;
use crate::domain::trade::{FieldValue, TradeId, TradeRecord};
use crate::domain::variable::{NewVariable, Variable, VariableId, VariableUpdate};
use crate::ports::journal_port::JournalStore;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    variables: Vec<Variable>,
    trades: BTreeMap<TradeId, TradeRecord>,
    next_variable_id: VariableId,
    next_trade_id: TradeId,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_batch_writes: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trades(trades: Vec<TradeRecord>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock_state_unchecked();
            for trade in trades {
                state.next_trade_id = state.next_trade_id.max(trade.id);
                state.trades.insert(trade.id, trade);
            }
        }
        store
    }

    /// Make every subsequent batch write fail with `reason`.
    pub fn fail_batch_writes(&self, reason: &str) {
        if let Ok(mut slot) = self.fail_batch_writes.lock() {
            *slot = Some(reason.to_string());
        }
    }

    pub fn trade(&self, id: TradeId) -> Option<TradeRecord> {
        self.lock_state_unchecked().trades.get(&id).cloned()
    }

    fn lock_state_unchecked(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, State>, JournalError> {
        self.state.lock().map_err(|e| JournalError::Store {
            reason: e.to_string(),
        })
    }
}

impl JournalStore for MemoryStore {
    fn list_variables(&self) -> Result<Vec<Variable>, JournalError> {
        let state = self.lock_state()?;
        let mut variables = state.variables.clone();
        variables.sort_by_key(|v| (v.order, v.id));
        Ok(variables)
    }

    fn insert_variable(&self, def: NewVariable) -> Result<Variable, JournalError> {
        let mut state = self.lock_state()?;
        state.next_variable_id += 1;
        let variable = def.into_variable(state.next_variable_id);
        state.variables.push(variable.clone());
        Ok(variable)
    }

    fn update_variable(
        &self,
        id: VariableId,
        update: &VariableUpdate,
    ) -> Result<(), JournalError> {
        let mut state = self.lock_state()?;
        let variable = state
            .variables
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(JournalError::VariableNotFound { id })?;
        update.apply_to(variable);
        Ok(())
    }

    fn delete_variable(&self, id: VariableId) -> Result<(), JournalError> {
        let mut state = self.lock_state()?;
        let before = state.variables.len();
        state.variables.retain(|v| v.id != id);
        if state.variables.len() == before {
            return Err(JournalError::VariableNotFound { id });
        }
        Ok(())
    }

    fn list_trades(&self) -> Result<Vec<TradeRecord>, JournalError> {
        Ok(self.lock_state()?.trades.values().cloned().collect())
    }

    fn create_trade(
        &self,
        fields: BTreeMap<String, FieldValue>,
    ) -> Result<TradeRecord, JournalError> {
        let mut state = self.lock_state()?;
        state.next_trade_id += 1;
        let trade = TradeRecord {
            id: state.next_trade_id,
            fields,
        };
        state.trades.insert(trade.id, trade.clone());
        Ok(trade)
    }

    fn batch_upsert_trades(&self, trades: &[TradeRecord]) -> Result<(), JournalError> {
        if let Some(reason) = self
            .fail_batch_writes
            .lock()
            .map_err(|e| JournalError::Store {
                reason: e.to_string(),
            })?
            .clone()
        {
            return Err(JournalError::Store { reason });
        }
        let mut state = self.lock_state()?;
        for trade in trades {
            state.next_trade_id = state.next_trade_id.max(trade.id);
            state.trades.insert(trade.id, trade.clone());
        }
        Ok(())
    }
}
