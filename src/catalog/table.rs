use indexmap::IndexMap;

use crate::ast::{Literal, Query};
use crate::catalog::{AccessPolicy, FieldDef, FieldKind, Materializer, Scoping};

/// An argument of a storage-engine table function (e.g. `s3(...)`). Secret
/// arguments print exclusively through the sensitive parameter namespace;
/// they never appear as literal SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArg {
    Plain(Literal),
    Secret(Literal),
}

/// What a catalog table is backed by.
#[derive(Debug, Clone, PartialEq)]
pub enum TableKind {
    /// A named table in the storage engine.
    Physical { physical_name: String },
    /// Join/subquery form computed on demand from the referenced field set.
    Lazy { materializer: Materializer },
    /// A pure relabeling/subset of another catalog table's physical columns.
    /// No join cost; prints as the backing table.
    Virtual { backing: String },
    /// A saved query substituted in place of the table reference.
    View { query: Query },
    /// A table-valued storage-engine function, e.g. an object-storage file.
    Function { function: String, args: Vec<FunctionArg> },
}

/// One entry of the schema catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub fields: IndexMap<String, FieldDef>,
    pub kind: TableKind,
    pub scoping: Scoping,
    pub access: Option<AccessPolicy>,
}

impl TableDef {
    pub fn physical(name: &str, physical_name: &str, fields: IndexMap<String, FieldDef>) -> Self {
        Self {
            name: name.to_string(),
            fields,
            kind: TableKind::Physical { physical_name: physical_name.to_string() },
            scoping: Scoping::team_id(),
            access: None,
        }
    }

    pub fn lazy(name: &str, materializer: Materializer, fields: IndexMap<String, FieldDef>) -> Self {
        Self {
            name: name.to_string(),
            fields,
            kind: TableKind::Lazy { materializer },
            scoping: Scoping::Exempt,
            access: None,
        }
    }

    pub fn virtual_over(name: &str, backing: &str, fields: IndexMap<String, FieldDef>) -> Self {
        Self {
            name: name.to_string(),
            fields,
            kind: TableKind::Virtual { backing: backing.to_string() },
            scoping: Scoping::team_id(),
            access: None,
        }
    }

    pub fn view(name: &str, query: Query) -> Self {
        Self {
            name: name.to_string(),
            fields: IndexMap::new(),
            kind: TableKind::View { query },
            scoping: Scoping::Exempt,
            access: None,
        }
    }

    pub fn exempt(mut self) -> Self {
        self.scoping = Scoping::Exempt;
        self
    }

    pub fn with_access(mut self, policy: AccessPolicy) -> Self {
        self.access = Some(policy);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// Fields that participate in wildcard expansion, in declaration order.
    /// Hidden fields, lazy joins, traversers, and computed fields never
    /// appear in `SELECT *`.
    pub fn visible_fields(&self) -> impl Iterator<Item = (&String, &FieldDef)> {
        self.fields.iter().filter(|(_, def)| {
            !def.hidden
                && !matches!(
                    def.kind,
                    FieldKind::LazyJoin { .. } | FieldKind::Traverser { .. } | FieldKind::Expression { .. }
                )
        })
    }

    /// Candidate field names offered in "unknown field" diagnostics: a
    /// cheap containment match either direction.
    pub fn field_candidates(&self, name: &str) -> Vec<String> {
        let lower = name.to_lowercase();
        self.fields
            .keys()
            .filter(|k| {
                let kl = k.to_lowercase();
                kl.contains(&lower) || lower.contains(&kl)
            })
            .cloned()
            .collect()
    }

    pub fn scope_column(&self) -> Option<&str> {
        match &self.scoping {
            Scoping::Scoped { column } => Some(column),
            Scoping::Exempt => None,
        }
    }

    pub fn is_scoped(&self) -> bool {
        matches!(self.scoping, Scoping::Scoped { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ScalarType;

    #[test]
    fn hidden_and_lazy_fields_excluded_from_wildcard() {
        let mut fields = IndexMap::new();
        fields.insert("event".to_string(), FieldDef::column("event", ScalarType::String));
        fields.insert("_offset".to_string(), FieldDef::hidden_column("_offset", ScalarType::Int));
        fields.insert("person".to_string(), FieldDef::lazy_join(Materializer::PersonJoin, "persons"));
        let t = TableDef::physical("t", "t", fields);
        let visible: Vec<_> = t.visible_fields().map(|(n, _)| n.as_str()).collect();
        assert_eq!(visible, vec!["event"]);
    }

    #[test]
    fn candidates_match_loosely() {
        let mut fields = IndexMap::new();
        fields.insert("timestamp".to_string(), FieldDef::column("timestamp", ScalarType::DateTime));
        let t = TableDef::physical("t", "t", fields);
        assert_eq!(t.field_candidates("time"), vec!["timestamp".to_string()]);
    }
}
