//! Core domain types and logic.

pub mod error;
pub mod identifier;
pub mod formula;
pub mod formula_parser;
pub mod formula_eval;
pub mod conditional;
pub mod formula_compiler;
pub mod trade;
pub mod environment;
pub mod variable;
pub mod recalc;
pub mod cache;
pub mod variable_service;
pub mod analytics;
pub mod config_validation;
