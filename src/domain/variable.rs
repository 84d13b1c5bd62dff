//! User-defined variables attachable to trade records.

use crate::domain::error::JournalError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type VariableId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    Text,
    Number,
    Dropdown,
    Time,
    Date,
    Textarea,
    Chart,
    Calculated,
}

impl VarType {
    pub const ALL: [VarType; 8] = [
        VarType::Text,
        VarType::Number,
        VarType::Dropdown,
        VarType::Time,
        VarType::Date,
        VarType::Textarea,
        VarType::Chart,
        VarType::Calculated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VarType::Text => "text",
            VarType::Number => "number",
            VarType::Dropdown => "dropdown",
            VarType::Time => "time",
            VarType::Date => "date",
            VarType::Textarea => "textarea",
            VarType::Chart => "chart",
            VarType::Calculated => "calculated",
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VarType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        VarType::ALL
            .into_iter()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| format!("unknown variable type '{}'", s))
    }
}

/// When in a trade's lifecycle the field is filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Pre,
    Post,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Pre => f.write_str("pre"),
            Phase::Post => f.write_str("post"),
        }
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pre" => Ok(Phase::Pre),
            "post" => Ok(Phase::Post),
            _ => Err(format!("unknown phase '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: VariableId,
    pub name: String,
    pub var_type: VarType,
    pub formula: Option<String>,
    pub phase: Phase,
    pub visible: bool,
    pub order: i64,
}

impl Variable {
    pub fn is_calculated(&self) -> bool {
        self.var_type == VarType::Calculated
    }

    /// The formula to recompute, if this variable has one.
    pub fn calculated_formula(&self) -> Option<&str> {
        if !self.is_calculated() {
            return None;
        }
        self.formula.as_deref().filter(|f| !f.trim().is_empty())
    }
}

/// Definition of a variable not yet persisted; the store assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVariable {
    pub name: String,
    pub var_type: VarType,
    pub formula: Option<String>,
    pub phase: Phase,
    pub visible: bool,
    pub order: i64,
}

impl NewVariable {
    pub fn new(name: &str, var_type: VarType) -> Self {
        Self {
            name: name.to_string(),
            var_type,
            formula: None,
            phase: Phase::default(),
            visible: true,
            order: 0,
        }
    }

    pub fn calculated(name: &str, formula: &str) -> Self {
        Self {
            formula: Some(formula.to_string()),
            ..Self::new(name, VarType::Calculated)
        }
    }

    pub fn into_variable(self, id: VariableId) -> Variable {
        Variable {
            id,
            name: self.name,
            var_type: self.var_type,
            formula: self.formula,
            phase: self.phase,
            visible: self.visible,
            order: self.order,
        }
    }
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariableUpdate {
    pub name: Option<String>,
    pub formula: Option<String>,
    pub phase: Option<Phase>,
    pub visible: Option<bool>,
    pub order: Option<i64>,
}

impl VariableUpdate {
    pub fn apply_to(&self, variable: &mut Variable) {
        if let Some(name) = &self.name {
            variable.name = name.clone();
        }
        if let Some(formula) = &self.formula {
            variable.formula = Some(formula.clone());
        }
        if let Some(phase) = self.phase {
            variable.phase = phase;
        }
        if let Some(visible) = self.visible {
            variable.visible = visible;
        }
        if let Some(order) = self.order {
            variable.order = order;
        }
    }
}

/// Reject empty names and names already used by another variable,
/// compared case-insensitively.
pub fn validate_name(
    name: &str,
    existing: &[Variable],
    except: Option<VariableId>,
) -> Result<(), JournalError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(JournalError::VariableInvalid {
            reason: "name must not be empty".to_string(),
        });
    }
    let lower = trimmed.to_lowercase();
    if let Some(clash) = existing
        .iter()
        .filter(|v| Some(v.id) != except)
        .find(|v| v.name.trim().to_lowercase() == lower)
    {
        return Err(JournalError::VariableInvalid {
            reason: format!("a variable named '{}' already exists", clash.name),
        });
    }
    Ok(())
}

/// A calculated variable must carry a formula; other kinds must not.
pub fn validate_kind(var_type: VarType, formula: Option<&str>) -> Result<(), JournalError> {
    let has_formula = formula.is_some_and(|f| !f.trim().is_empty());
    match (var_type, has_formula) {
        (VarType::Calculated, false) => Err(JournalError::VariableInvalid {
            reason: "calculated variables require a formula".to_string(),
        }),
        (t, true) if t != VarType::Calculated => Err(JournalError::VariableInvalid {
            reason: format!("{} variables cannot have a formula", t),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(id: VariableId, name: &str) -> Variable {
        NewVariable::new(name, VarType::Number).into_variable(id)
    }

    #[test]
    fn var_type_round_trips_through_str() {
        for t in VarType::ALL {
            assert_eq!(t.as_str().parse::<VarType>().unwrap(), t);
        }
        assert_eq!("Calculated".parse::<VarType>().unwrap(), VarType::Calculated);
        assert!("formula".parse::<VarType>().is_err());
    }

    #[test]
    fn phase_parses() {
        assert_eq!("post".parse::<Phase>().unwrap(), Phase::Post);
        assert_eq!(" PRE ".parse::<Phase>().unwrap(), Phase::Pre);
        assert!("during".parse::<Phase>().is_err());
    }

    #[test]
    fn calculated_formula_requires_kind_and_text() {
        let calc = NewVariable::calculated("R", "pnl / risk").into_variable(1);
        assert_eq!(calc.calculated_formula(), Some("pnl / risk"));

        let mut blank = calc.clone();
        blank.formula = Some("  ".into());
        assert_eq!(blank.calculated_formula(), None);

        let mut plain = calc.clone();
        plain.var_type = VarType::Number;
        assert_eq!(plain.calculated_formula(), None);
    }

    #[test]
    fn validate_name_rejects_case_insensitive_duplicate() {
        let existing = vec![var(1, "Target Win")];
        let err = validate_name("target win", &existing, None).unwrap_err();
        assert!(matches!(err, JournalError::VariableInvalid { .. }));
        assert!(validate_name("Stop", &existing, None).is_ok());
    }

    #[test]
    fn validate_name_allows_renaming_self() {
        let existing = vec![var(1, "Target Win")];
        assert!(validate_name("TARGET WIN", &existing, Some(1)).is_ok());
    }

    #[test]
    fn validate_name_rejects_empty() {
        assert!(validate_name("   ", &[], None).is_err());
    }

    #[test]
    fn validate_kind_rules() {
        assert!(validate_kind(VarType::Calculated, Some("a+b")).is_ok());
        assert!(validate_kind(VarType::Calculated, None).is_err());
        assert!(validate_kind(VarType::Calculated, Some(" ")).is_err());
        assert!(validate_kind(VarType::Number, Some("a+b")).is_err());
        assert!(validate_kind(VarType::Text, None).is_ok());
    }

    #[test]
    fn update_applies_only_present_fields() {
        let mut v = var(1, "Entry");
        VariableUpdate {
            visible: Some(false),
            order: Some(4),
            ..Default::default()
        }
        .apply_to(&mut v);
        assert_eq!(v.name, "Entry");
        assert!(!v.visible);
        assert_eq!(v.order, 4);
    }

    #[test]
    fn serde_uses_lowercase_kinds() {
        let v = NewVariable::calculated("R", "a").into_variable(2);
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains(r#""var_type":"calculated""#));
        assert!(json.contains(r#""phase":"pre""#));
    }
}
