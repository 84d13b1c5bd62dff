//! Configuration validation.
//!
//! Validates every config field and resolves defaults before a command runs.

use crate::domain::error::JournalError;
use crate::ports::config_port::ConfigPort;
use std::time::Duration;

pub const DEFAULT_POOL_SIZE: i64 = 4;
pub const DEFAULT_CACHE_TTL_SECS: i64 = 30;
pub const DEFAULT_PNL_FIELD: &str = "PnL";
pub const DEFAULT_DATE_FIELD: &str = "Date";
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validated runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalSettings {
    pub sqlite_path: Option<String>,
    pub pool_size: u32,
    pub variables_ttl: Duration,
    pub pnl_field: String,
    pub date_field: String,
    pub log_level: String,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            sqlite_path: None,
            pool_size: DEFAULT_POOL_SIZE as u32,
            variables_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS as u64),
            pnl_field: DEFAULT_PNL_FIELD.to_string(),
            date_field: DEFAULT_DATE_FIELD.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl JournalSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, JournalError> {
        validate_journal_config(config)?;
        Ok(Self {
            sqlite_path: non_empty(config.get_string("sqlite", "path")),
            pool_size: config.get_int("sqlite", "pool_size", DEFAULT_POOL_SIZE) as u32,
            variables_ttl: Duration::from_secs(
                config.get_int("cache", "variables_ttl_secs", DEFAULT_CACHE_TTL_SECS) as u64,
            ),
            pnl_field: non_empty(config.get_string("analytics", "pnl_field"))
                .unwrap_or_else(|| DEFAULT_PNL_FIELD.to_string()),
            date_field: non_empty(config.get_string("analytics", "date_field"))
                .unwrap_or_else(|| DEFAULT_DATE_FIELD.to_string()),
            log_level: non_empty(config.get_string("logging", "level"))
                .map(|l| l.to_lowercase())
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }
}

pub fn validate_journal_config(config: &dyn ConfigPort) -> Result<(), JournalError> {
    validate_pool_size(config)?;
    validate_cache_ttl(config)?;
    validate_field_name(config, "pnl_field")?;
    validate_field_name(config, "date_field")?;
    validate_log_level(config)?;
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn validate_pool_size(config: &dyn ConfigPort) -> Result<(), JournalError> {
    if config.get_string("sqlite", "pool_size").is_none() {
        return Ok(());
    }
    let value = config.get_int("sqlite", "pool_size", 0);
    if !(1..=64).contains(&value) {
        return Err(JournalError::ConfigInvalid {
            section: "sqlite".to_string(),
            key: "pool_size".to_string(),
            reason: "pool_size must be between 1 and 64".to_string(),
        });
    }
    Ok(())
}

fn validate_cache_ttl(config: &dyn ConfigPort) -> Result<(), JournalError> {
    if config.get_string("cache", "variables_ttl_secs").is_none() {
        return Ok(());
    }
    let value = config.get_int("cache", "variables_ttl_secs", -1);
    if value < 0 {
        return Err(JournalError::ConfigInvalid {
            section: "cache".to_string(),
            key: "variables_ttl_secs".to_string(),
            reason: "variables_ttl_secs must be a non-negative integer".to_string(),
        });
    }
    Ok(())
}

fn validate_field_name(config: &dyn ConfigPort, key: &str) -> Result<(), JournalError> {
    match config.get_string("analytics", key) {
        Some(s) if s.trim().is_empty() => Err(JournalError::ConfigInvalid {
            section: "analytics".to_string(),
            key: key.to_string(),
            reason: format!("{} must name a trade field", key),
        }),
        _ => Ok(()),
    }
}

fn validate_log_level(config: &dyn ConfigPort) -> Result<(), JournalError> {
    match config.get_string("logging", "level") {
        Some(level) if !LOG_LEVELS.contains(&level.trim().to_lowercase().as_str()) => {
            Err(JournalError::ConfigInvalid {
                section: "logging".to_string(),
                key: "level".to_string(),
                reason: format!("level must be one of {}", LOG_LEVELS.join(", ")),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn valid_config_passes() {
        let config = make_config(
            r#"
[sqlite]
path = journal.db
pool_size = 8

[cache]
variables_ttl_secs = 60

[analytics]
pnl_field = Net PnL
date_field = Entry Date

[logging]
level = DEBUG
"#,
        );
        let settings = JournalSettings::from_config(&config).unwrap();
        assert_eq!(settings.sqlite_path.as_deref(), Some("journal.db"));
        assert_eq!(settings.pool_size, 8);
        assert_eq!(settings.variables_ttl, Duration::from_secs(60));
        assert_eq!(settings.pnl_field, "Net PnL");
        assert_eq!(settings.date_field, "Entry Date");
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = make_config("");
        assert_eq!(
            JournalSettings::from_config(&config).unwrap(),
            JournalSettings::default()
        );
    }

    #[test]
    fn pool_size_zero_fails() {
        let config = make_config("[sqlite]\npool_size = 0\n");
        let err = validate_journal_config(&config).unwrap_err();
        assert!(matches!(err, JournalError::ConfigInvalid { key, .. } if key == "pool_size"));
    }

    #[test]
    fn pool_size_non_numeric_fails() {
        let config = make_config("[sqlite]\npool_size = many\n");
        let err = validate_journal_config(&config).unwrap_err();
        assert!(matches!(err, JournalError::ConfigInvalid { key, .. } if key == "pool_size"));
    }

    #[test]
    fn negative_ttl_fails() {
        let config = make_config("[cache]\nvariables_ttl_secs = -5\n");
        let err = validate_journal_config(&config).unwrap_err();
        assert!(
            matches!(err, JournalError::ConfigInvalid { key, .. } if key == "variables_ttl_secs")
        );
    }

    #[test]
    fn zero_ttl_is_allowed() {
        let config = make_config("[cache]\nvariables_ttl_secs = 0\n");
        let settings = JournalSettings::from_config(&config).unwrap();
        assert_eq!(settings.variables_ttl, Duration::ZERO);
    }

    #[test]
    fn unknown_log_level_fails() {
        let config = make_config("[logging]\nlevel = loud\n");
        let err = validate_journal_config(&config).unwrap_err();
        assert!(matches!(err, JournalError::ConfigInvalid { key, .. } if key == "level"));
    }
}
