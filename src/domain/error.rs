//! Domain error types.
//!
//! Parse failures and transport failures cross component boundaries;
//! evaluation failures stay inside the per-trade loop.

/// A parse error with position information for formula parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let column = input
            .get(..self.position)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(self.position);
        let caret = " ".repeat(column) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Failure evaluating a parsed formula against one trade's environment.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("type mismatch: '{op}' cannot be applied to {operand}")]
    TypeMismatch { op: String, operand: String },

    #[error("division by zero")]
    DivisionByZero,
}

/// Top-level error type for tradejournal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("store error: {reason}")]
    Store { reason: String },

    #[error("store query error: {reason}")]
    StoreQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    FormulaSyntax(#[from] ParseError),

    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvalError),

    #[error("invalid conditional tree: {reason}")]
    TreeInvalid { reason: String },

    #[error("invalid variable: {reason}")]
    VariableInvalid { reason: String },

    #[error("no variable with id {id}")]
    VariableNotFound { id: i64 },

    #[error("recalculation of variable {variable_id} superseded by a newer pass")]
    StaleRecalculation { variable_id: i64 },

    #[error("csv error: {reason}")]
    Csv { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl JournalError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            JournalError::Io(_) | JournalError::Csv { .. } => 1,
            JournalError::ConfigParse { .. }
            | JournalError::ConfigMissing { .. }
            | JournalError::ConfigInvalid { .. } => 2,
            JournalError::Store { .. }
            | JournalError::StoreQuery { .. }
            | JournalError::StaleRecalculation { .. } => 3,
            JournalError::FormulaSyntax(_)
            | JournalError::Evaluation(_)
            | JournalError::TreeInvalid { .. } => 4,
            JournalError::VariableInvalid { .. } | JournalError::VariableNotFound { .. } => 5,
        }
    }
}

impl From<&JournalError> for std::process::ExitCode {
    fn from(err: &JournalError) -> Self {
        std::process::ExitCode::from(err.exit_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_points_at_position() {
        let err = ParseError {
            message: "expected ')'".into(),
            position: 4,
        };
        let ctx = err.display_with_context("a + (b");
        let lines: Vec<&str> = ctx.lines().collect();
        assert_eq!(lines[0], "a + (b");
        assert_eq!(lines[1], "    ^");
        assert!(lines[2].contains("position 4"));
    }

    #[test]
    fn parse_error_converts_to_journal_error() {
        let err: JournalError = ParseError {
            message: "bad".into(),
            position: 0,
        }
        .into();
        assert!(matches!(err, JournalError::FormulaSyntax(_)));
    }

    #[test]
    fn eval_error_messages() {
        assert_eq!(
            EvalError::UndefinedVariable("pnl".into()).to_string(),
            "undefined variable 'pnl'"
        );
        assert_eq!(EvalError::DivisionByZero.to_string(), "division by zero");
    }

    #[test]
    fn input_errors_share_formula_exit_code() {
        let tree = JournalError::TreeInvalid {
            reason: "expected value".into(),
        };
        assert_eq!(tree.exit_code(), 4);
        assert_eq!(
            JournalError::Evaluation(EvalError::DivisionByZero).exit_code(),
            4
        );
        let io = JournalError::Io(std::io::Error::other("disk"));
        assert_eq!(io.exit_code(), 1);
    }
}
