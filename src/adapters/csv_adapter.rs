//! CSV import and export of trade records.
//!
//! Each row is one trade; each header is a variable display name. An `id`
//! column is written on export and ignored on import, where the store
//! assigns fresh ids.

use crate::domain::error::JournalError;
use crate::domain::formula_eval::parse_finite;
use crate::domain::trade::{FieldValue, TradeRecord};
use crate::ports::journal_port::JournalStore;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

const ID_COLUMN: &str = "id";

pub struct CsvAdapter {
    path: PathBuf,
}

fn csv_err(e: csv::Error) -> JournalError {
    JournalError::Csv {
        reason: e.to_string(),
    }
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Create one trade per CSV row. Returns the created trades.
    pub fn import_into(&self, store: &dyn JournalStore) -> Result<Vec<TradeRecord>, JournalError> {
        let file = File::open(&self.path)?;
        let rows = read_trade_fields(file)?;
        let mut created = Vec::with_capacity(rows.len());
        for fields in rows {
            created.push(store.create_trade(fields)?);
        }
        tracing::info!(path = %self.path.display(), trades = created.len(), "imported trades");
        Ok(created)
    }

    /// Write every stored trade. Returns the number of rows written.
    pub fn export_from(&self, store: &dyn JournalStore) -> Result<usize, JournalError> {
        let trades = store.list_trades()?;
        let file = File::create(&self.path)?;
        write_trades(file, &trades)?;
        tracing::info!(path = %self.path.display(), trades = trades.len(), "exported trades");
        Ok(trades.len())
    }
}

/// Parse headered CSV into trade field maps. Empty cells are left out;
/// cells holding a finite number become numbers.
pub fn read_trade_fields<R: Read>(
    reader: R,
) -> Result<Vec<BTreeMap<String, FieldValue>>, JournalError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers().map_err(csv_err)?.clone();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(csv_err)?;
        let mut fields = BTreeMap::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            if header.is_empty() || header.eq_ignore_ascii_case(ID_COLUMN) || cell.is_empty() {
                continue;
            }
            let value = match parse_finite(cell) {
                Some(n) => FieldValue::Number(n),
                None => FieldValue::Text(cell.to_string()),
            };
            fields.insert(header.to_string(), value);
        }
        rows.push(fields);
    }
    Ok(rows)
}

/// Write trades with `id` first, then the union of all field names in
/// sorted order. Missing fields are written as empty cells.
pub fn write_trades<W: Write>(writer: W, trades: &[TradeRecord]) -> Result<(), JournalError> {
    let columns: BTreeSet<&str> = trades
        .iter()
        .flat_map(|t| t.fields.keys().map(String::as_str))
        .collect();

    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec![ID_COLUMN];
    header.extend(columns.iter().copied());
    wtr.write_record(&header).map_err(csv_err)?;

    for trade in trades {
        let mut row = vec![trade.id.to_string()];
        row.extend(
            columns
                .iter()
                .map(|c| trade.get(c).map(FieldValue::to_text).unwrap_or_default()),
        );
        wtr.write_record(&row).map_err(csv_err)?;
    }
    wtr.flush()?;
    Ok(())
}
