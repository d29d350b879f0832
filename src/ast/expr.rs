use crate::ast::{ExprType, Literal, Query, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithmeticOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
            ArithmeticOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    NotLike,
    ILike,
    NotILike,
    In,
    NotIn,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
            CompareOp::Like => "LIKE",
            CompareOp::NotLike => "NOT LIKE",
            CompareOp::ILike => "ILIKE",
            CompareOp::NotILike => "NOT ILIKE",
            CompareOp::In => "IN",
            CompareOp::NotIn => "NOT IN",
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, CompareOp::Lt | CompareOp::LtEq | CompareOp::Gt | CompareOp::GtEq)
    }
}

/// Expression node kinds. A closed union: anything the front-end can emit
/// that is missing here surfaces as `QueryError::NotImplemented` in the
/// resolver, never as a silent skip.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    /// Dotted reference before and after resolution, e.g.
    /// `person.properties.email` keeps its chain so the display dialect can
    /// round-trip it; the resolved type carries the physical target.
    Field { chain: Vec<String> },
    /// `*` or `t.*`. Removed during wildcard expansion; reaching the printer
    /// is an internal error.
    Asterisk { prefix: Vec<String> },
    Call { name: String, args: Vec<Expr>, distinct: bool },
    Arithmetic { op: ArithmeticOp, left: Box<Expr>, right: Box<Expr> },
    Compare { op: CompareOp, left: Box<Expr>, right: Box<Expr> },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Alias { name: String, expr: Box<Expr> },
    Tuple(Vec<Expr>),
    Subquery(Box<Query>),
}

/// An expression node: kind plus the cross-cutting attributes every node
/// carries (span for diagnostics, type after resolution, wildcard origin for
/// the projection-pruning pass).
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Option<Span>,
    pub ty: Option<ExprType>,
    pub from_wildcard: bool,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self { kind, span: None, ty: None, from_wildcard: false }
    }

    pub fn typed(kind: ExprKind, ty: ExprType) -> Self {
        Self { kind, span: None, ty: Some(ty), from_wildcard: false }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn lit(value: Literal) -> Self {
        Self::new(ExprKind::Literal(value))
    }

    pub fn field(chain: &[&str]) -> Self {
        Self::new(ExprKind::Field { chain: chain.iter().map(|s| s.to_string()).collect() })
    }

    pub fn field_chain(chain: Vec<String>) -> Self {
        Self::new(ExprKind::Field { chain })
    }

    pub fn asterisk() -> Self {
        Self::new(ExprKind::Asterisk { prefix: vec![] })
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call { name: name.into(), args, distinct: false })
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Self::new(ExprKind::Compare { op, left: Box::new(left), right: Box::new(right) })
    }

    pub fn and(exprs: Vec<Expr>) -> Self {
        Self::new(ExprKind::And(exprs))
    }

    pub fn or(exprs: Vec<Expr>) -> Self {
        Self::new(ExprKind::Or(exprs))
    }

    pub fn not(expr: Expr) -> Self {
        Self::new(ExprKind::Not(Box::new(expr)))
    }

    pub fn alias(name: impl Into<String>, expr: Expr) -> Self {
        Self::new(ExprKind::Alias { name: name.into(), expr: Box::new(expr) })
    }

    /// Name under which this expression appears in a select list.
    pub fn output_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Alias { name, .. } => Some(name),
            ExprKind::Field { chain } => chain.last().map(|s| s.as_str()),
            _ => None,
        }
    }

    /// The expression behind any alias wrapper.
    pub fn unwrap_alias(&self) -> &Expr {
        match &self.kind {
            ExprKind::Alias { expr, .. } => expr.unwrap_alias(),
            _ => self,
        }
    }

    /// Split a boolean conjunction into its top-level conjuncts.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::And(parts) => parts.iter().flat_map(|p| p.conjuncts()).collect(),
            _ => vec![self],
        }
    }

    /// Rebuild a WHERE/HAVING expression from conjuncts. Empty input means
    /// no clause at all.
    pub fn conjoin(mut parts: Vec<Expr>) -> Option<Expr> {
        match parts.len() {
            0 => None,
            1 => Some(parts.remove(0)),
            _ => Some(Expr::typed(ExprKind::And(parts), crate::ast::ExprType::scalar_of(crate::ast::ScalarType::Bool))),
        }
    }
}

use std::fmt;

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(l) => write!(f, "{l}"),
            ExprKind::Field { chain } => write!(f, "{}", chain.join(".")),
            ExprKind::Asterisk { prefix } => {
                if prefix.is_empty() {
                    write!(f, "*")
                } else {
                    write!(f, "{}.*", prefix.join("."))
                }
            }
            ExprKind::Call { name, args, distinct } => {
                let rendered = args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
                if *distinct {
                    write!(f, "{name}(DISTINCT {rendered})")
                } else {
                    write!(f, "{name}({rendered})")
                }
            }
            ExprKind::Arithmetic { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            ExprKind::Compare { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            ExprKind::And(parts) => {
                let rendered = parts.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(" AND ");
                write!(f, "({rendered})")
            }
            ExprKind::Or(parts) => {
                let rendered = parts.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(" OR ");
                write!(f, "({rendered})")
            }
            ExprKind::Not(inner) => write!(f, "NOT {inner}"),
            ExprKind::Alias { name, expr } => write!(f, "{expr} AS {name}"),
            ExprKind::Tuple(items) => {
                let rendered = items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ");
                write!(f, "({rendered})")
            }
            ExprKind::Subquery(_) => write!(f, "(SELECT ...)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conjunct_splitting_is_recursive() {
        let e = Expr::and(vec![
            Expr::and(vec![Expr::field(&["a"]), Expr::field(&["b"])]),
            Expr::field(&["c"]),
        ]);
        let parts = e.conjuncts();
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn output_name_prefers_alias() {
        let e = Expr::alias("n", Expr::field(&["t", "event"]));
        assert_eq!(e.output_name(), Some("n"));
        assert_eq!(Expr::field(&["t", "event"]).output_name(), Some("event"));
    }
}
