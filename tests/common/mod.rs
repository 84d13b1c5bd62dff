#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use tradejournal::adapters::memory_adapter::MemoryStore;
use tradejournal::domain::error::JournalError;
pub use tradejournal::domain::trade::{FieldValue, TradeId, TradeRecord};
use tradejournal::domain::variable::{NewVariable, Variable, VariableId, VariableUpdate};
use tradejournal::ports::journal_port::JournalStore;

pub fn trade(id: TradeId, fields: &[(&str, FieldValue)]) -> TradeRecord {
    fields
        .iter()
        .fold(TradeRecord::new(id), |t, (name, value)| {
            t.with_field(name, value.clone())
        })
}

pub fn num(n: f64) -> FieldValue {
    FieldValue::Number(n)
}

pub fn text(s: &str) -> FieldValue {
    FieldValue::Text(s.to_string())
}

/// Four dated trades: two winners, one loser, one not yet closed.
pub fn sample_journal() -> MemoryStore {
    MemoryStore::with_trades(vec![
        trade(
            1,
            &[
                ("Date", text("2024-05-01")),
                ("Target Win", num(300.0)),
                ("Risk", num(100.0)),
                ("PnL", num(250.0)),
            ],
        ),
        trade(
            2,
            &[
                ("Date", text("2024-05-02")),
                ("Target Win", num(200.0)),
                ("Risk", num(50.0)),
                ("PnL", num(-50.0)),
            ],
        ),
        trade(
            3,
            &[
                ("Date", text("2024-05-02")),
                ("Target Win", num(150.0)),
                ("Risk", num(75.0)),
                ("PnL", num(120.0)),
            ],
        ),
        trade(
            4,
            &[("Date", text("2024-05-03")), ("Risk", num(60.0))],
        ),
    ])
}

/// Store wrapper that runs a hook the first time trades are listed, standing
/// in for a competing edit that lands mid-pass.
pub struct InterceptingStore<'a> {
    pub inner: MemoryStore,
    on_list: RefCell<Option<Box<dyn FnOnce() + 'a>>>,
}

impl<'a> InterceptingStore<'a> {
    pub fn new(inner: MemoryStore, hook: impl FnOnce() + 'a) -> Self {
        Self {
            inner,
            on_list: RefCell::new(Some(Box::new(hook))),
        }
    }
}

impl JournalStore for InterceptingStore<'_> {
    fn list_variables(&self) -> Result<Vec<Variable>, JournalError> {
        self.inner.list_variables()
    }

    fn insert_variable(&self, def: NewVariable) -> Result<Variable, JournalError> {
        self.inner.insert_variable(def)
    }

    fn update_variable(
        &self,
        id: VariableId,
        update: &VariableUpdate,
    ) -> Result<(), JournalError> {
        self.inner.update_variable(id, update)
    }

    fn delete_variable(&self, id: VariableId) -> Result<(), JournalError> {
        self.inner.delete_variable(id)
    }

    fn list_trades(&self) -> Result<Vec<TradeRecord>, JournalError> {
        let hook = self.on_list.borrow_mut().take();
        if let Some(hook) = hook {
            hook();
        }
        self.inner.list_trades()
    }

    fn create_trade(
        &self,
        fields: BTreeMap<String, FieldValue>,
    ) -> Result<TradeRecord, JournalError> {
        self.inner.create_trade(fields)
    }

    fn batch_upsert_trades(&self, trades: &[TradeRecord]) -> Result<(), JournalError> {
        self.inner.batch_upsert_trades(trades)
    }
}
