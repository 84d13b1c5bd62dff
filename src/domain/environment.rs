//! Per-trade evaluation environment.

use crate::domain::formula_eval::{Environment, Value, parse_finite};
use crate::domain::identifier::normalize;
use crate::domain::trade::{FieldValue, TradeRecord};

/// Environment view of one stored field. Text that reads as a finite number
/// becomes a number; tag lists become comma-joined text.
pub fn field_to_value(field: &FieldValue) -> Value {
    match field {
        FieldValue::Number(n) => Value::Number(*n),
        FieldValue::Bool(b) => Value::Bool(*b),
        FieldValue::Text(s) => match parse_finite(s) {
            Some(n) => Value::Number(n),
            None => Value::Text(s.clone()),
        },
        FieldValue::Tags(tags) => Value::Text(tags.join(", ")),
    }
}

/// Key every field of `trade` by its normalized name.
///
/// Two display names that normalize to the same token collide: the later key
/// in sorted order wins. The collision is logged, not rejected.
pub fn build_environment(trade: &TradeRecord) -> Environment {
    let mut env = Environment::with_capacity(trade.fields.len());
    for (name, field) in &trade.fields {
        let token = normalize(name);
        if env.insert(token.clone(), field_to_value(field)).is_some() {
            tracing::warn!(
                trade_id = trade.id,
                field = %name,
                token = %token,
                "field name collides with another field after normalization"
            );
        }
    }
    env
}
