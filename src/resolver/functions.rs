use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

use crate::ast::{Expr, ScalarType};

/// Aggregate functions the resolver understands. Nesting any of these inside
/// another is a resolution error.
pub static AGGREGATE_FUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from(["count", "sum", "avg", "min", "max", "uniq", "any", "countMerge", "uniqMerge"])
});

pub fn is_aggregate(name: &str) -> bool {
    AGGREGATE_FUNCTIONS.contains(name)
}

/// (min, max) argument counts for functions with fixed arity. Functions not
/// listed accept whatever they were given; the storage engine validates the
/// rest of its large surface.
static FIXED_ARITY: Lazy<HashMap<&'static str, (usize, usize)>> = Lazy::new(|| {
    HashMap::from([
        ("toDate", (1, 1)),
        ("toDateTime", (1, 1)),
        ("toStartOfDay", (1, 1)),
        ("toStartOfWeek", (1, 1)),
        ("toStartOfMonth", (1, 1)),
        ("toString", (1, 1)),
        ("lower", (1, 1)),
        ("upper", (1, 1)),
        ("length", (1, 1)),
        ("not", (1, 1)),
        ("dateDiff", (3, 3)),
        ("if", (3, 3)),
        ("count", (0, 1)),
        ("sum", (1, 1)),
        ("avg", (1, 1)),
        ("min", (1, 1)),
        ("max", (1, 1)),
        ("uniq", (1, usize::MAX)),
        ("any", (1, 1)),
    ])
});

pub fn expected_arity(name: &str) -> Option<(usize, usize)> {
    FIXED_ARITY.get(name).copied()
}

/// Return type of a call, from a small table of functions whose result type
/// matters to later passes. `None` means the function is unknown here; the
/// expression types as `Unknown` and passes leave it alone.
pub fn call_return_type(name: &str, args: &[Expr]) -> Option<(ScalarType, bool)> {
    let arg_scalar = |index: usize| -> ScalarType {
        args.get(index).and_then(|a| a.ty.as_ref()).map(|t| t.scalar()).unwrap_or(ScalarType::Unknown)
    };
    let arg_nullable = |index: usize| -> bool {
        args.get(index).and_then(|a| a.ty.as_ref()).map(|t| t.nullable()).unwrap_or(false)
    };

    let ty = match name {
        "count" | "uniq" | "length" | "dateDiff" | "countMerge" | "uniqMerge" => (ScalarType::Int, false),
        "sum" | "min" | "max" | "any" => (arg_scalar(0), true),
        "avg" => (ScalarType::Float, true),
        "toDate" | "today" => (ScalarType::Date, arg_nullable(0)),
        "toDateTime" | "toStartOfDay" | "toStartOfWeek" | "toStartOfMonth" | "now" => {
            (ScalarType::DateTime, arg_nullable(0))
        }
        "toString" | "concat" | "lower" | "upper" | "trim" | "JSONExtractRaw" | "JSONExtractString" => {
            (ScalarType::String, arg_nullable(0))
        }
        "toInt" | "JSONExtractInt" => (ScalarType::Int, true),
        "toFloat" | "JSONExtractFloat" => (ScalarType::Float, true),
        "coalesce" => (arg_scalar(0), false),
        "if" => (arg_scalar(1), arg_nullable(1) || arg_nullable(2)),
        "not" => (ScalarType::Bool, arg_nullable(0)),
        _ => return None,
    };
    Some(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;

    #[test]
    fn aggregates_are_recognized() {
        assert!(is_aggregate("count"));
        assert!(is_aggregate("uniq"));
        assert!(!is_aggregate("toDate"));
    }

    #[test]
    fn return_types_follow_arguments() {
        let args = vec![Expr::lit(Literal::Int(1))];
        // literal args carry no resolved type yet; sum falls back to Unknown
        assert_eq!(call_return_type("count", &args), Some((ScalarType::Int, false)));
        assert_eq!(call_return_type("avg", &args), Some((ScalarType::Float, true)));
        assert_eq!(call_return_type("mysteryFn", &args), None);
    }
}
