use chrono::{DateTime, NaiveDate, Utc};
use ordered_float::OrderedFloat;
use serde_json::Value;
use uuid::Uuid;

use crate::ast::ScalarType;

/// A constant value embedded in the query.
///
/// Floats go through `OrderedFloat` so literals (and whole expression trees)
/// stay `PartialEq`, which the parameter de-duplication and the pass
/// idempotence tests rely on.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Uuid(Uuid),
    Array(Vec<Literal>),
    Json(Value),
}

impl Literal {
    pub fn float(value: f64) -> Self {
        Literal::Float(OrderedFloat(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Literal::String(value.into())
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Literal::Null => ScalarType::Unknown,
            Literal::Bool(_) => ScalarType::Bool,
            Literal::Int(_) => ScalarType::Int,
            Literal::Float(_) => ScalarType::Float,
            Literal::String(_) => ScalarType::String,
            Literal::Date(_) => ScalarType::Date,
            Literal::DateTime(_) => ScalarType::DateTime,
            Literal::Uuid(_) => ScalarType::Uuid,
            Literal::Array(_) => ScalarType::Array,
            Literal::Json(_) => ScalarType::Json,
        }
    }

    /// Whether the executable dialect may print this literal inline instead
    /// of externalizing it into the parameter map. Only values that are
    /// injection-safe without quoting qualify.
    pub fn prints_inline(&self) -> bool {
        matches!(self, Literal::Null | Literal::Bool(_) | Literal::Int(_) | Literal::Float(_))
    }

    /// Value as it appears in the returned parameter map.
    pub fn to_json(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::from(*i),
            Literal::Float(fl) => Value::from(fl.0),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            Literal::DateTime(dt) => Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            Literal::Uuid(u) => Value::String(u.to_string()),
            Literal::Array(items) => Value::Array(items.iter().map(Literal::to_json).collect()),
            Literal::Json(v) => v.clone(),
        }
    }
}

use std::fmt;

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(fl) => write!(f, "{}", fl.0),
            Literal::String(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Literal::Date(d) => write!(f, "'{}'", d.format("%Y-%m-%d")),
            Literal::DateTime(dt) => write!(f, "'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
            Literal::Uuid(u) => write!(f, "'{u}'"),
            Literal::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Literal::Json(v) => write!(f, "'{}'", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_policy_covers_only_unquoted_values() {
        assert!(Literal::Int(42).prints_inline());
        assert!(Literal::Bool(true).prints_inline());
        assert!(Literal::Null.prints_inline());
        assert!(Literal::float(1.5).prints_inline());
        assert!(!Literal::string("x").prints_inline());
        assert!(!Literal::Uuid(Uuid::nil()).prints_inline());
        assert!(!Literal::Array(vec![Literal::Int(1)]).prints_inline());
    }

    #[test]
    fn json_rendering_of_temporal_values() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(Literal::Date(d).to_json(), Value::String("2024-03-01".into()));
    }
}
