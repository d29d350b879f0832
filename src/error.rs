use std::fmt::Display;

use crate::ast::Span;

/// User-facing resolution failures. Always carry a span when one is known so
/// callers can underline the offending fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionError {
    UnknownTable { name: String, span: Option<Span> },
    /// The table exists but the requesting scope is not allowed to see it.
    /// Distinct from `UnknownTable` so clients can tell a configuration
    /// mistake from a permission mistake.
    AccessDenied { name: String, span: Option<Span> },
    UnknownField { name: String, table: String, candidates: Vec<String>, span: Option<Span> },
    AmbiguousField { name: String, matches: Vec<(String, String)>, span: Option<Span> }, // (alias, field)
    NestedAggregation { name: String, span: Option<Span> },
    /// A lazy join was materialized with zero demanded fields.
    EmptyLazyJoin { table: String, span: Option<Span> },
    ArityMismatch { name: String, expected: String, got: usize, span: Option<Span> },
    BadQuery { message: String, span: Option<Span> },
}

impl ResolutionError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ResolutionError::UnknownTable { span, .. }
            | ResolutionError::AccessDenied { span, .. }
            | ResolutionError::UnknownField { span, .. }
            | ResolutionError::AmbiguousField { span, .. }
            | ResolutionError::NestedAggregation { span, .. }
            | ResolutionError::EmptyLazyJoin { span, .. }
            | ResolutionError::ArityMismatch { span, .. }
            | ResolutionError::BadQuery { span, .. } => *span,
        }
    }
}

impl Display for ResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionError::UnknownTable { name, .. } => write!(f, "Unknown table \"{name}\""),
            ResolutionError::AccessDenied { name, .. } => write!(f, "You do not have access to the table \"{name}\""),
            ResolutionError::UnknownField { name, table, candidates, .. } => {
                if candidates.is_empty() {
                    write!(f, "Unknown field \"{name}\" on table \"{table}\"")
                } else {
                    write!(f, "Unknown field \"{name}\" on table \"{table}\". Did you mean: {}", candidates.join(", "))
                }
            }
            ResolutionError::AmbiguousField { name, matches, .. } => {
                let opts = matches.iter().map(|(t, c)| format!("{t}.{c}")).collect::<Vec<_>>().join(", ");
                write!(f, "Ambiguous field \"{name}\", qualify it with a table alias: {opts}")
            }
            ResolutionError::NestedAggregation { name, .. } => {
                write!(f, "Aggregate function {name}() cannot be nested inside another aggregate")
            }
            ResolutionError::EmptyLazyJoin { table, .. } => {
                write!(f, "No fields requested from joined table \"{table}\"")
            }
            ResolutionError::ArityMismatch { name, expected, got, .. } => {
                write!(f, "Function {name}() expects {expected} argument(s), got {got}")
            }
            ResolutionError::BadQuery { message, .. } => write!(f, "{message}"),
        }
    }
}

/// Failures while building the schema catalog, before resolution starts.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    MalformedView { name: String, reason: String },
    DuplicateTable { name: String },
    MetadataUnavailable { source: String },
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::MalformedView { name, reason } => write!(f, "Saved view \"{name}\" is malformed: {reason}"),
            CatalogError::DuplicateTable { name } => write!(f, "Table \"{name}\" is already defined"),
            CatalogError::MetadataUnavailable { source } => write!(f, "Could not load schema metadata from {source}"),
        }
    }
}

/// The single error type flowing through the compile pipeline.
///
/// `Resolution` is the user-facing class (a 4xx equivalent); everything else
/// signals an internal problem and should be reported as such.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    Resolution(ResolutionError),
    /// A syntactically valid node this compiler has no handling for. Signals
    /// a gap between the front-end grammar and this crate, never a user
    /// mistake.
    NotImplemented { what: String, span: Option<Span> },
    Catalog(CatalogError),
    /// An invariant violation, e.g. printing an untyped node. Indicates a
    /// resolver bug.
    Internal(String),
}

impl QueryError {
    pub fn is_user_error(&self) -> bool {
        matches!(self, QueryError::Resolution(_))
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            QueryError::Resolution(e) => e.span(),
            QueryError::NotImplemented { span, .. } => *span,
            _ => None,
        }
    }

    pub fn not_implemented(what: impl Into<String>) -> Self {
        QueryError::NotImplemented { what: what.into(), span: None }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        QueryError::Internal(message.into())
    }
}

impl Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::Resolution(e) => write!(f, "{e}"),
            QueryError::NotImplemented { what, .. } => write!(f, "Not implemented: {what}"),
            QueryError::Catalog(e) => write!(f, "{e}"),
            QueryError::Internal(message) => write!(f, "Internal error: {message}"),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<ResolutionError> for QueryError {
    fn from(value: ResolutionError) -> Self {
        QueryError::Resolution(value)
    }
}

impl From<CatalogError> for QueryError {
    fn from(value: CatalogError) -> Self {
        QueryError::Catalog(value)
    }
}
