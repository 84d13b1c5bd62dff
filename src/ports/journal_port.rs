//! Journal storage port trait.
//!
//! The formula core reads and writes variables and trades only through this
//! trait. Batch writes are not guaranteed atomic: callers must tolerate a
//! partially applied batch when an error is returned.

use crate::domain::error::JournalError;
use crate::domain::trade::{FieldValue, TradeRecord};
use crate::domain::variable::{NewVariable, Variable, VariableId, VariableUpdate};
use std::collections::BTreeMap;

pub trait JournalStore {
    fn list_variables(&self) -> Result<Vec<Variable>, JournalError>;

    /// Persist a new definition and return it with its assigned id.
    fn insert_variable(&self, def: NewVariable) -> Result<Variable, JournalError>;

    fn update_variable(&self, id: VariableId, update: &VariableUpdate)
    -> Result<(), JournalError>;

    fn delete_variable(&self, id: VariableId) -> Result<(), JournalError>;

    /// Full scan, no pagination.
    fn list_trades(&self) -> Result<Vec<TradeRecord>, JournalError>;

    fn create_trade(
        &self,
        fields: BTreeMap<String, FieldValue>,
    ) -> Result<TradeRecord, JournalError>;

    fn batch_upsert_trades(&self, trades: &[TradeRecord]) -> Result<(), JournalError>;

    /// Default implementation: strip `field_name` from every trade that has
    /// it and write those trades back in one batch.
    fn delete_trade_field(
        &self,
        trades: &[TradeRecord],
        field_name: &str,
    ) -> Result<(), JournalError> {
        let updated: Vec<TradeRecord> = trades
            .iter()
            .filter(|t| t.fields.contains_key(field_name))
            .map(|t| {
                let mut t = t.clone();
                t.remove(field_name);
                t
            })
            .collect();
        if updated.is_empty() {
            return Ok(());
        }
        self.batch_upsert_trades(&updated)
    }
}
