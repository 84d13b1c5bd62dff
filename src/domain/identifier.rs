//! Display-name to formula-token normalization.
//!
//! "Target Win" becomes `targetwin`. The same mapping is applied when tokens
//! are inserted into formulas and when trade keys are loaded into an
//! evaluation environment, so the two always agree.

/// Strip all whitespace and lower-case the remainder.
pub fn normalize(display_name: &str) -> String {
    display_name
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
