//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::memory_adapter::MemoryStore;
use crate::domain::analytics::JournalStats;
use crate::domain::conditional::ConditionalBlock;
use crate::domain::config_validation::JournalSettings;
use crate::domain::environment::build_environment;
use crate::domain::error::JournalError;
use crate::domain::formula_eval::{evaluate_with_reparse, parse_finite};
use crate::domain::formula_parser;
use crate::domain::recalc::RecalcSummary;
use crate::domain::trade::{FieldValue, TradeRecord, coerce_for_storage};
use crate::domain::variable::{NewVariable, Phase, VarType, Variable};
use crate::domain::variable_service::VariableService;
use crate::ports::journal_port::JournalStore;

#[derive(Parser, Debug)]
#[command(name = "tradejournal", about = "Trading journal with calculated variables")]
pub struct Cli {
    /// INI configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// SQLite database, overriding [sqlite] path
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a conditional tree (JSON) into formula text
    Compile { tree: PathBuf },
    /// Check formula syntax and list its inputs
    Check { formula: String },
    /// Evaluate a formula against NAME=VALUE inputs
    Eval {
        formula: String,
        #[arg(short = 's', long = "set", value_parser = parse_assignment)]
        inputs: Vec<(String, String)>,
    },
    /// List variable definitions
    Variables,
    /// Define a new variable
    AddVariable {
        name: String,
        #[arg(long)]
        kind: Option<VarType>,
        #[arg(long)]
        formula: Option<String>,
        #[arg(long, default_value_t = Phase::Pre)]
        phase: Phase,
        #[arg(long)]
        hidden: bool,
    },
    /// Replace a calculated variable's formula
    SetFormula { name: String, formula: String },
    /// Recompute one calculated variable, or all of them
    Recalc { name: Option<String> },
    /// Rename a variable across definitions and trades
    Rename { name: String, new_name: String },
    /// Delete a variable and its values on every trade
    DeleteVariable { name: String },
    /// Import trades from a headered CSV file
    Import { file: PathBuf },
    /// Export all trades to CSV
    Export { file: PathBuf },
    /// Print journal statistics
    Stats {
        /// Read trades from CSV instead of the database
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        pnl_field: Option<String>,
        #[arg(long)]
        date_field: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let settings = match load_settings(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    init_tracing(&settings.log_level);

    let result = dispatch(cli.command, &settings, cli.db.as_deref());
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn dispatch(
    command: Command,
    settings: &JournalSettings,
    db: Option<&Path>,
) -> Result<(), JournalError> {
    match command {
        Command::Compile { tree } => {
            let json = fs::read_to_string(&tree)?;
            println!("{}", compile_tree(&json)?);
            Ok(())
        }
        Command::Check { formula } => {
            let inputs = check_formula(&formula).inspect_err(|e| print_context(e, &formula))?;
            eprintln!("Formula OK");
            for name in inputs {
                println!("{}", name);
            }
            Ok(())
        }
        Command::Eval { formula, inputs } => {
            let value = eval_formula(&formula, &inputs).inspect_err(|e| print_context(e, &formula))?;
            println!("{}", value.to_text());
            Ok(())
        }
        Command::Variables => {
            let store = open_store(settings, db)?;
            let service = variable_service(store.as_ref(), settings);
            print_variables(&service.list_variables()?);
            Ok(())
        }
        Command::AddVariable {
            name,
            kind,
            formula,
            phase,
            hidden,
        } => {
            let store = open_store(settings, db)?;
            let service = variable_service(store.as_ref(), settings);
            let source = formula.clone().unwrap_or_default();
            let def = build_new_variable(&name, kind, formula, phase, hidden);
            let (variable, summary) = service
                .add_variable(def)
                .inspect_err(|e| print_context(e, &source))?;
            eprintln!("Added '{}' (id {})", variable.name, variable.id);
            print_summary(&variable.name, summary);
            Ok(())
        }
        Command::SetFormula { name, formula } => {
            let store = open_store(settings, db)?;
            let service = variable_service(store.as_ref(), settings);
            let variable = service.find_by_name(&name)?;
            let summary = service
                .update_formula(variable.id, &formula)
                .inspect_err(|e| print_context(e, &formula))?;
            print_summary(&variable.name, summary);
            Ok(())
        }
        Command::Recalc { name } => {
            let store = open_store(settings, db)?;
            let service = variable_service(store.as_ref(), settings);
            match name {
                Some(name) => {
                    let variable = service.find_by_name(&name)?;
                    let summary = service.recalculate(variable.id)?;
                    print_summary(&variable.name, summary);
                }
                None => {
                    for (variable, summary) in service.recalculate_all()? {
                        print_summary(&variable.name, summary);
                    }
                }
            }
            Ok(())
        }
        Command::Rename { name, new_name } => {
            let store = open_store(settings, db)?;
            let service = variable_service(store.as_ref(), settings);
            let variable = service.find_by_name(&name)?;
            let moved = service.rename_variable(variable.id, &new_name)?;
            eprintln!(
                "Renamed '{}' to '{}' on {} trades",
                variable.name,
                new_name.trim(),
                moved
            );
            Ok(())
        }
        Command::DeleteVariable { name } => {
            let store = open_store(settings, db)?;
            let service = variable_service(store.as_ref(), settings);
            let variable = service.find_by_name(&name)?;
            service.delete_variable(variable.id)?;
            eprintln!("Deleted '{}'", variable.name);
            Ok(())
        }
        Command::Import { file } => {
            let store = open_store(settings, db)?;
            let created = CsvAdapter::new(file).import_into(store.as_ref())?;
            eprintln!("Imported {} trades", created.len());
            Ok(())
        }
        Command::Export { file } => {
            let store = open_store(settings, db)?;
            let written = CsvAdapter::new(file.clone()).export_from(store.as_ref())?;
            eprintln!("Exported {} trades to {}", written, file.display());
            Ok(())
        }
        Command::Stats {
            csv,
            pnl_field,
            date_field,
        } => {
            let pnl_field = pnl_field.unwrap_or_else(|| settings.pnl_field.clone());
            let date_field = date_field.unwrap_or_else(|| settings.date_field.clone());
            let trades = match csv {
                Some(path) => {
                    let store = MemoryStore::new();
                    CsvAdapter::new(path).import_into(&store)?
                }
                None => open_store(settings, db)?.list_trades()?,
            };
            let stats = JournalStats::compute(&trades, &pnl_field, &date_field);
            print_stats(&stats);
            Ok(())
        }
    }
}

/// Load and validate settings. Without a config file every default applies.
pub fn load_settings(config_path: Option<&Path>) -> Result<JournalSettings, JournalError> {
    match config_path {
        Some(path) => {
            let adapter = FileConfigAdapter::from_file(path)?;
            JournalSettings::from_config(&adapter)
        }
        None => Ok(JournalSettings::default()),
    }
}

/// Install the stderr subscriber. `RUST_LOG` takes precedence over the
/// configured level. A second call is a no-op.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(feature = "sqlite")]
pub fn open_store(
    settings: &JournalSettings,
    db: Option<&Path>,
) -> Result<Box<dyn JournalStore>, JournalError> {
    use crate::adapters::sqlite_adapter::SqliteStore;

    let path = match (db, settings.sqlite_path.as_deref()) {
        (Some(p), _) => p.display().to_string(),
        (None, Some(p)) => p.to_string(),
        (None, None) => {
            return Err(JournalError::ConfigMissing {
                section: "sqlite".to_string(),
                key: "path".to_string(),
            });
        }
    };
    let store = SqliteStore::open(&path, settings.pool_size)?;
    store.initialize_schema()?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "sqlite"))]
pub fn open_store(
    _settings: &JournalSettings,
    _db: Option<&Path>,
) -> Result<Box<dyn JournalStore>, JournalError> {
    Err(JournalError::Store {
        reason: "built without the sqlite feature".to_string(),
    })
}

/// Variable service over `store`, caching definitions for the configured TTL.
pub fn variable_service<'a>(
    store: &'a dyn JournalStore,
    settings: &JournalSettings,
) -> VariableService<'a> {
    VariableService::with_cache_ttl(store, settings.variables_ttl)
}

pub fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

/// Compile a JSON conditional tree and confirm the result parses.
pub fn compile_tree(json: &str) -> Result<String, JournalError> {
    let tree: ConditionalBlock =
        serde_json::from_str(json).map_err(|e| JournalError::TreeInvalid {
            reason: e.to_string(),
        })?;
    let formula = crate::domain::formula_compiler::compile(&tree);
    formula_parser::parse(&formula).inspect_err(|e| {
        eprintln!("{}", e.display_with_context(&formula));
    })?;
    Ok(formula)
}

/// Parse a formula and return the normalized names it reads.
pub fn check_formula(formula: &str) -> Result<BTreeSet<String>, JournalError> {
    Ok(formula_parser::parse(formula)?.free_variables())
}

/// Evaluate `formula` against a one-off trade built from `inputs` and return
/// the value as it would be stored.
pub fn eval_formula(
    formula: &str,
    inputs: &[(String, String)],
) -> Result<FieldValue, JournalError> {
    let compiled = formula_parser::parse(formula)?;
    let trade = inputs
        .iter()
        .fold(TradeRecord::new(0), |trade, (name, raw)| match parse_finite(raw) {
            Some(n) => trade.with_field(name, n),
            None => trade.with_field(name, raw.as_str()),
        });
    let env = build_environment(&trade);
    let value = evaluate_with_reparse(&compiled, &env)?;
    Ok(coerce_for_storage(&value))
}

pub fn build_new_variable(
    name: &str,
    kind: Option<VarType>,
    formula: Option<String>,
    phase: Phase,
    hidden: bool,
) -> NewVariable {
    let kind = kind.unwrap_or(if formula.is_some() {
        VarType::Calculated
    } else {
        VarType::Text
    });
    let mut def = NewVariable::new(name, kind);
    def.formula = formula;
    def.phase = phase;
    def.visible = !hidden;
    def
}

fn print_context(err: &JournalError, source: &str) {
    if let JournalError::FormulaSyntax(e) = err {
        if !source.is_empty() {
            eprintln!("{}", e.display_with_context(source));
        }
    }
}

fn print_summary(name: &str, summary: RecalcSummary) {
    eprintln!(
        "{}: updated {} trades, skipped {}",
        name, summary.updated_count, summary.skipped_count
    );
}

fn print_variables(variables: &[Variable]) {
    if variables.is_empty() {
        eprintln!("No variables defined");
        return;
    }
    println!(
        "{:<5} {:<24} {:<11} {:<5} {:<7} FORMULA",
        "ID", "NAME", "TYPE", "PHASE", "VISIBLE"
    );
    for v in variables {
        println!(
            "{:<5} {:<24} {:<11} {:<5} {:<7} {}",
            v.id,
            v.name,
            v.var_type,
            v.phase,
            v.visible,
            v.formula.as_deref().unwrap_or("")
        );
    }
}

fn print_stats(stats: &JournalStats) {
    println!("=== Journal Statistics ===");
    println!("Total Trades:     {}", stats.total_trades);
    println!(
        "Won / Lost / BE:  {} / {} / {}",
        stats.trades_won, stats.trades_lost, stats.trades_breakeven
    );
    println!("Win Rate:         {:.1}%", stats.win_rate * 100.0);
    println!("Profit Factor:    {:.2}", stats.profit_factor);
    println!("Avg Win:          {:.2}", stats.avg_win);
    println!("Avg Loss:         {:.2}", stats.avg_loss);
    println!("Largest Win:      {:.2}", stats.largest_win);
    println!("Largest Loss:     {:.2}", stats.largest_loss);
    println!("Total PnL:        {:.2}", stats.total_pnl);
    println!("Max Drawdown:     {:.2}", stats.max_drawdown);
    if !stats.daily_pnl.is_empty() {
        println!("\n=== Daily PnL ===");
        for (day, pnl) in &stats.daily_pnl {
            println!("  {}  {:>10.2}", day, pnl);
        }
    }
}
