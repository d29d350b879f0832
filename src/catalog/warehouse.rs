use indexmap::IndexMap;

use crate::ast::{Literal, ScalarType};
use crate::catalog::{FieldDef, FunctionArg, Scoping, TableDef, TableKind};
use crate::error::CatalogError;

/// Metadata for one externally discovered warehouse table, as handed over
/// by the metadata store. The compiler never fetches this itself; catalog
/// construction is the one phase allowed to block on it.
#[derive(Debug, Clone, PartialEq)]
pub struct WarehouseTable {
    pub name: String,
    /// Object-storage URL pattern of the backing files.
    pub url: String,
    /// File format understood by the storage engine (e.g. "Parquet").
    pub format: String,
    pub access_key: String,
    pub access_secret: String,
    pub columns: Vec<(String, ScalarType, bool)>, // (name, type, nullable)
}

impl WarehouseTable {
    /// Convert discovered metadata into a function-call catalog entry.
    /// Credentials become `Secret` arguments so they only ever reach the
    /// SQL text as redacted placeholders. Warehouse tables are exempt from
    /// the tenant guard: the credential set itself is per-team.
    pub fn into_table_def(self) -> Result<TableDef, CatalogError> {
        if self.name.is_empty() {
            return Err(CatalogError::MalformedView { name: self.name, reason: "empty table name".to_string() });
        }
        if self.columns.is_empty() {
            return Err(CatalogError::MetadataUnavailable {
                source: format!("warehouse table \"{}\" has no column metadata", self.name),
            });
        }

        let mut fields = IndexMap::new();
        for (name, ty, nullable) in &self.columns {
            let def = if *nullable {
                FieldDef::nullable_column(name, *ty)
            } else {
                FieldDef::column(name, *ty)
            };
            fields.insert(name.clone(), def);
        }

        Ok(TableDef {
            name: self.name,
            fields,
            kind: TableKind::Function {
                function: "s3".to_string(),
                args: vec![
                    FunctionArg::Plain(Literal::String(self.url)),
                    FunctionArg::Secret(Literal::String(self.access_key)),
                    FunctionArg::Secret(Literal::String(self.access_secret)),
                    FunctionArg::Plain(Literal::String(self.format)),
                ],
            },
            scoping: Scoping::Exempt,
            access: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WarehouseTable {
        WarehouseTable {
            name: "stripe_charges".to_string(),
            url: "https://bucket.s3.amazonaws.com/charges/*.parquet".to_string(),
            format: "Parquet".to_string(),
            access_key: "AKIA123".to_string(),
            access_secret: "shhh".to_string(),
            columns: vec![
                ("id".to_string(), ScalarType::String, false),
                ("amount".to_string(), ScalarType::Int, false),
            ],
        }
    }

    #[test]
    fn credentials_become_secret_args() {
        let def = sample().into_table_def().unwrap();
        let TableKind::Function { function, args } = &def.kind else {
            panic!("expected function table");
        };
        assert_eq!(function, "s3");
        let secrets = args.iter().filter(|a| matches!(a, FunctionArg::Secret(_))).count();
        assert_eq!(secrets, 2);
    }

    #[test]
    fn missing_column_metadata_fails_construction() {
        let mut t = sample();
        t.columns.clear();
        assert!(matches!(t.into_table_def(), Err(CatalogError::MetadataUnavailable { .. })));
    }
}
