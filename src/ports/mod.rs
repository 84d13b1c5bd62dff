//! Port traits the domain consumes; adapters implement them.

pub mod config_port;
pub mod journal_port;
