//! SQLite journal store.
//!
//! Variables live in their own table. Each trade is one row holding its
//! fields as a JSON document, so new variables need no schema change.

use crate::domain::error::JournalError;
use crate::domain::trade::{FieldValue, TradeId, TradeRecord};
use crate::domain::variable::{NewVariable, Phase, VarType, Variable, VariableId, VariableUpdate};
use crate::ports::journal_port::JournalStore;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;

const VARIABLE_COLUMNS: &str = "id, name, var_type, formula, phase, visible, ord";

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_err(e: r2d2::Error) -> JournalError {
    JournalError::Store {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> JournalError {
    JournalError::StoreQuery {
        reason: e.to_string(),
    }
}

fn json_err(e: serde_json::Error) -> JournalError {
    JournalError::Store {
        reason: format!("trade fields are not valid JSON: {}", e),
    }
}

/// Raw `variables` row before the kind and phase columns are parsed.
struct VariableRow {
    id: VariableId,
    name: String,
    var_type: String,
    formula: Option<String>,
    phase: String,
    visible: bool,
    order: i64,
}

impl VariableRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            var_type: row.get(2)?,
            formula: row.get(3)?,
            phase: row.get(4)?,
            visible: row.get(5)?,
            order: row.get(6)?,
        })
    }

    fn into_variable(self) -> Result<Variable, JournalError> {
        let var_type: VarType = self
            .var_type
            .parse()
            .map_err(|reason| JournalError::StoreQuery { reason })?;
        let phase: Phase = self
            .phase
            .parse()
            .map_err(|reason| JournalError::StoreQuery { reason })?;
        Ok(Variable {
            id: self.id,
            name: self.name,
            var_type,
            formula: self.formula,
            phase,
            visible: self.visible,
            order: self.order,
        })
    }
}

impl SqliteStore {
    pub fn open(db_path: &str, pool_size: u32) -> Result<Self, JournalError> {
        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;
        tracing::debug!(path = db_path, pool_size, "opened sqlite journal");
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, JournalError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), JournalError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS variables (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                var_type TEXT NOT NULL,
                formula TEXT,
                phase TEXT NOT NULL DEFAULT 'pre',
                visible INTEGER NOT NULL DEFAULT 1,
                ord INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fields TEXT NOT NULL DEFAULT '{}'
            );",
        )
        .map_err(query_err)?;

        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, JournalError> {
        self.pool.get().map_err(pool_err)
    }

    fn fetch_variable(conn: &Connection, id: VariableId) -> Result<Option<Variable>, JournalError> {
        let query = format!("SELECT {} FROM variables WHERE id = ?1", VARIABLE_COLUMNS);
        conn.query_row(&query, params![id], VariableRow::from_row)
            .optional()
            .map_err(query_err)?
            .map(VariableRow::into_variable)
            .transpose()
    }
}

impl JournalStore for SqliteStore {
    fn list_variables(&self) -> Result<Vec<Variable>, JournalError> {
        let conn = self.conn()?;
        let query = format!(
            "SELECT {} FROM variables ORDER BY ord ASC, id ASC",
            VARIABLE_COLUMNS
        );
        let mut stmt = conn.prepare(&query).map_err(query_err)?;
        let rows = stmt
            .query_map([], VariableRow::from_row)
            .map_err(query_err)?;

        let mut variables = Vec::new();
        for row in rows {
            variables.push(row.map_err(query_err)?.into_variable()?);
        }
        Ok(variables)
    }

    fn insert_variable(&self, def: NewVariable) -> Result<Variable, JournalError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO variables (name, var_type, formula, phase, visible, ord)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                def.name,
                def.var_type.as_str(),
                def.formula,
                def.phase.to_string(),
                def.visible,
                def.order
            ],
        )
        .map_err(query_err)?;
        Ok(def.into_variable(conn.last_insert_rowid()))
    }

    fn update_variable(
        &self,
        id: VariableId,
        update: &VariableUpdate,
    ) -> Result<(), JournalError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        let mut variable =
            Self::fetch_variable(&tx, id)?.ok_or(JournalError::VariableNotFound { id })?;
        update.apply_to(&mut variable);

        tx.execute(
            "UPDATE variables SET name = ?2, formula = ?3, phase = ?4, visible = ?5, ord = ?6
             WHERE id = ?1",
            params![
                id,
                variable.name,
                variable.formula,
                variable.phase.to_string(),
                variable.visible,
                variable.order
            ],
        )
        .map_err(query_err)?;

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    fn delete_variable(&self, id: VariableId) -> Result<(), JournalError> {
        let conn = self.conn()?;
        let affected = conn
            .execute("DELETE FROM variables WHERE id = ?1", params![id])
            .map_err(query_err)?;
        if affected == 0 {
            return Err(JournalError::VariableNotFound { id });
        }
        Ok(())
    }

    fn list_trades(&self) -> Result<Vec<TradeRecord>, JournalError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, fields FROM trades ORDER BY id ASC")
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, TradeId>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(query_err)?;

        let mut trades = Vec::new();
        for row in rows {
            let (id, json) = row.map_err(query_err)?;
            let fields: BTreeMap<String, FieldValue> =
                serde_json::from_str(&json).map_err(json_err)?;
            trades.push(TradeRecord { id, fields });
        }
        Ok(trades)
    }

    fn create_trade(
        &self,
        fields: BTreeMap<String, FieldValue>,
    ) -> Result<TradeRecord, JournalError> {
        let json = serde_json::to_string(&fields).map_err(json_err)?;
        let conn = self.conn()?;
        conn.execute("INSERT INTO trades (fields) VALUES (?1)", params![json])
            .map_err(query_err)?;
        Ok(TradeRecord {
            id: conn.last_insert_rowid(),
            fields,
        })
    }

    /// All rows are written in one transaction; a failure leaves the table
    /// unchanged.
    fn batch_upsert_trades(&self, trades: &[TradeRecord]) -> Result<(), JournalError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for trade in trades {
            let json = serde_json::to_string(&trade.fields).map_err(json_err)?;
            tx.execute(
                "INSERT INTO trades (id, fields) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET fields = excluded.fields",
                params![trade.id, json],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        tracing::debug!(count = trades.len(), "batch upserted trades");
        Ok(())
    }
}
