//! tradejournal: a trading journal whose calculated variables are derived
//! from other per-trade fields through a small formula language.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
