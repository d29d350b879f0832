/// Scalar type lattice shared by literals, catalog fields and resolved
/// expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Int,
    Float,
    Bool,
    Date,
    DateTime,
    Uuid,
    Json,
    Array,
    Unknown,
}

impl ScalarType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarType::Int | ScalarType::Float)
    }

    /// Numeric promotion for arithmetic: Int op Float -> Float.
    pub fn promote(self, other: ScalarType) -> ScalarType {
        match (self, other) {
            (ScalarType::Float, _) | (_, ScalarType::Float) => ScalarType::Float,
            (ScalarType::Int, ScalarType::Int) => ScalarType::Int,
            _ => ScalarType::Unknown,
        }
    }
}

/// Type attached to every resolved expression node.
///
/// Scalar constants keep just their type and nullability; field references
/// keep enough structure for the printer to emit the physical access
/// expression without consulting the catalog again.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprType {
    /// A constant or computed scalar.
    Scalar { ty: ScalarType, nullable: bool },
    /// A resolved field of a catalog table visible under `table_alias`.
    Field {
        table_alias: String,
        table: String,
        name: String,
        physical: String,
        ty: ScalarType,
        nullable: bool,
    },
    /// A field of a FROM/JOIN subquery (including materialized lazy joins)
    /// visible under `source_alias`.
    SelectField { source_alias: String, name: String, ty: ScalarType, nullable: bool },
    /// A JSON property access that prints as extraction from `json_column`
    /// on `table_alias`. An empty path is the bare JSON column itself.
    Property {
        table: String,
        table_alias: String,
        json_column: String,
        path: Vec<String>,
        nullable: bool,
    },
    /// A bare table alias used in expression position (e.g. before `.*`
    /// expansion or in `count(t)`-style calls).
    Table { alias: String, table: String },
}

impl ExprType {
    pub fn scalar(&self) -> ScalarType {
        match self {
            ExprType::Scalar { ty, .. } => *ty,
            ExprType::Field { ty, .. } => *ty,
            ExprType::SelectField { ty, .. } => *ty,
            ExprType::Property { path, .. } => {
                if path.is_empty() { ScalarType::Json } else { ScalarType::String }
            }
            ExprType::Table { .. } => ScalarType::Unknown,
        }
    }

    pub fn nullable(&self) -> bool {
        match self {
            ExprType::Scalar { nullable, .. }
            | ExprType::Field { nullable, .. }
            | ExprType::SelectField { nullable, .. }
            | ExprType::Property { nullable, .. } => *nullable,
            ExprType::Table { .. } => false,
        }
    }

    pub fn scalar_of(ty: ScalarType) -> Self {
        ExprType::Scalar { ty, nullable: false }
    }
}
