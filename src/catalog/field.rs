use crate::ast::{Expr, ScalarType};
use crate::catalog::Materializer;

/// How a field of a catalog table resolves.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// A plain physical column.
    Column { physical: String },
    /// A JSON property namespace: `table.properties.x` extracts `x` from the
    /// `json_column` physical column.
    Property { json_column: String },
    /// A field computed from a sub-expression evaluated in the referencing
    /// table's row scope. Bare chains inside the expression are resolved
    /// against the owning table.
    Expression { expr: Expr },
    /// An alias that redirects the field chain into a different nested
    /// table without materializing anything. Invisible to the caller.
    Traverser { chain: Vec<String> },
    /// A join materialized on demand from the set of sub-fields actually
    /// referenced.
    LazyJoin { join: Materializer, to_table: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub ty: ScalarType,
    pub nullable: bool,
    /// Hidden fields never appear in wildcard expansion; they stay reachable
    /// by direct reference. Used for low-level/implementation columns.
    pub hidden: bool,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn column(name: &str, ty: ScalarType) -> Self {
        Self { ty, nullable: false, hidden: false, kind: FieldKind::Column { physical: name.to_string() } }
    }

    pub fn nullable_column(name: &str, ty: ScalarType) -> Self {
        Self { ty, nullable: true, hidden: false, kind: FieldKind::Column { physical: name.to_string() } }
    }

    pub fn hidden_column(name: &str, ty: ScalarType) -> Self {
        Self { ty, nullable: false, hidden: true, kind: FieldKind::Column { physical: name.to_string() } }
    }

    pub fn properties(json_column: &str) -> Self {
        Self { ty: ScalarType::Json, nullable: true, hidden: false, kind: FieldKind::Property { json_column: json_column.to_string() } }
    }

    pub fn expression(expr: Expr, ty: ScalarType) -> Self {
        Self { ty, nullable: false, hidden: false, kind: FieldKind::Expression { expr } }
    }

    pub fn traverser(chain: &[&str]) -> Self {
        Self {
            ty: ScalarType::Unknown,
            nullable: false,
            hidden: false,
            kind: FieldKind::Traverser { chain: chain.iter().map(|s| s.to_string()).collect() },
        }
    }

    pub fn lazy_join(join: Materializer, to_table: &str) -> Self {
        Self {
            ty: ScalarType::Unknown,
            nullable: true,
            hidden: false,
            kind: FieldKind::LazyJoin { join, to_table: to_table.to_string() },
        }
    }

    pub fn hidden_of(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// Tenant isolation declaration. Every physical and warehouse-backed table
/// must either name its scope column or be explicitly exempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Scoping {
    Scoped { column: String },
    /// Cross-tenant-safe (system tables) or already scoped upstream
    /// (per-team warehouse credentials).
    Exempt,
}

impl Scoping {
    pub fn team_id() -> Self {
        Scoping::Scoped { column: "team_id".to_string() }
    }
}

/// Object-level access-control mapping for tables whose rows belong to
/// individually protected resources.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPolicy {
    /// Resource kind, matched against the principal's denial set.
    pub resource: String,
    pub id_column: String,
    pub created_by_column: String,
}
