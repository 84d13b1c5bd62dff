//! Journal performance statistics over stored trades.

use crate::domain::environment::field_to_value;
use crate::domain::trade::{FieldValue, TradeRecord};
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JournalStats {
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub total_pnl: f64,
    pub max_drawdown: f64,
    pub daily_pnl: BTreeMap<NaiveDate, f64>,
}

impl JournalStats {
    /// Statistics over every trade whose `pnl_field` holds a finite number.
    /// Trades are ordered by `date_field` when it parses; undated trades keep
    /// their store order after the dated ones.
    pub fn compute(trades: &[TradeRecord], pnl_field: &str, date_field: &str) -> Self {
        let mut entries: Vec<(Option<NaiveDate>, f64)> = trades
            .iter()
            .filter_map(|t| {
                let pnl = t.get(pnl_field).and_then(numeric)?;
                Some((t.get(date_field).and_then(parse_date), pnl))
            })
            .collect();
        entries.sort_by_key(|(date, _)| (date.is_none(), *date));

        let mut stats = JournalStats {
            total_trades: entries.len(),
            ..Default::default()
        };
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;

        for (date, pnl) in &entries {
            let pnl = *pnl;
            if pnl > 0.0 {
                stats.trades_won += 1;
                total_wins += pnl;
                stats.largest_win = stats.largest_win.max(pnl);
            } else if pnl < 0.0 {
                stats.trades_lost += 1;
                total_losses += pnl.abs();
                stats.largest_loss = stats.largest_loss.max(pnl.abs());
            } else {
                stats.trades_breakeven += 1;
            }
            stats.total_pnl += pnl;
            if let Some(d) = date {
                *stats.daily_pnl.entry(*d).or_insert(0.0) += pnl;
            }
        }

        if stats.total_trades > 0 {
            stats.win_rate = stats.trades_won as f64 / stats.total_trades as f64;
        }
        stats.profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        if stats.trades_won > 0 {
            stats.avg_win = total_wins / stats.trades_won as f64;
        }
        if stats.trades_lost > 0 {
            stats.avg_loss = total_losses / stats.trades_lost as f64;
        }

        let pnls: Vec<f64> = entries.iter().map(|(_, p)| *p).collect();
        stats.max_drawdown = compute_drawdown(&pnls);
        stats
    }
}

fn numeric(field: &FieldValue) -> Option<f64> {
    field_to_value(field).as_number().filter(|n| n.is_finite())
}

fn parse_date(field: &FieldValue) -> Option<NaiveDate> {
    let FieldValue::Text(s) = field else {
        return None;
    };
    let s = s.trim();
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .or_else(|| s.get(..10).and_then(|d| NaiveDate::parse_from_str(d, DATE_FORMAT).ok()))
}

/// Largest peak-to-trough fall of the cumulative PnL curve, which starts at 0.
fn compute_drawdown(pnls: &[f64]) -> f64 {
    let mut equity = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_dd = 0.0_f64;
    for pnl in pnls {
        equity += pnl;
        if equity > peak {
            peak = equity;
        }
        max_dd = max_dd.max(peak - equity);
    }
    max_dd
}
