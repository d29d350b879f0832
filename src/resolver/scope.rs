use std::sync::Arc;

use indexmap::IndexMap;

use crate::ast::{Query, ScalarType, SelectQuery};
use crate::catalog::TableDef;

/// What a visible name in a FROM/JOIN chain stands for.
#[derive(Debug, Clone)]
pub enum ScopeTable {
    Catalog { table: Arc<TableDef> },
    /// An authored subquery, an inlined CTE or view, or a materialized lazy
    /// join; only its output columns are visible.
    Subquery { columns: IndexMap<String, (ScalarType, bool)> },
}

/// One select's name scope: visible tables in join order, plus CTEs.
#[derive(Debug, Clone, Default)]
pub struct ScopeFrame {
    pub tables: IndexMap<String, ScopeTable>,
    pub ctes: IndexMap<String, Query>,
}

/// Stack of scopes, innermost last. Field lookup falls back outward so
/// correlated subqueries can reference enclosing aliases.
#[derive(Debug, Default)]
pub struct Scopes {
    frames: Vec<ScopeFrame>,
}

impl Scopes {
    pub fn push(&mut self) {
        self.frames.push(ScopeFrame::default());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn current(&self) -> &ScopeFrame {
        self.frames.last().expect("scope stack is never empty during resolution")
    }

    pub fn current_mut(&mut self) -> &mut ScopeFrame {
        self.frames.last_mut().expect("scope stack is never empty during resolution")
    }

    pub fn add_table(&mut self, alias: impl Into<String>, table: ScopeTable) {
        self.current_mut().tables.insert(alias.into(), table);
    }

    pub fn lookup_alias(&self, name: &str) -> Option<&ScopeTable> {
        self.frames.iter().rev().find_map(|frame| frame.tables.get(name))
    }

    pub fn lookup_cte(&self, name: &str) -> Option<&Query> {
        self.frames.iter().rev().find_map(|frame| frame.ctes.get(name))
    }

    /// Find which visible tables expose a field. Searches frames inner-out;
    /// the first frame with any match decides, and more than one match in
    /// that frame is an ambiguity the caller reports.
    pub fn tables_with_field(&self, field: &str) -> Vec<(&String, &ScopeTable)> {
        for frame in self.frames.iter().rev() {
            let matches: Vec<_> = frame
                .tables
                .iter()
                .filter(|(_, entry)| match entry {
                    ScopeTable::Catalog { table } => table.get_field(field).is_some(),
                    ScopeTable::Subquery { columns } => columns.contains_key(field),
                })
                .collect();
            if !matches.is_empty() {
                return matches;
            }
        }
        vec![]
    }

    /// Names of the tables in the current frame, for diagnostics.
    pub fn visible_names(&self) -> Vec<String> {
        self.current().tables.keys().cloned().collect()
    }
}

/// Output column names and types of a resolved select, as seen by an outer
/// query referencing it. Unnamed expressions produce no visible column.
pub fn output_columns(query: &SelectQuery) -> IndexMap<String, (ScalarType, bool)> {
    let mut columns = IndexMap::new();
    for item in &query.select {
        if let Some(name) = item.output_name() {
            let (ty, nullable) = item
                .ty
                .as_ref()
                .map(|t| (t.scalar(), t.nullable()))
                .unwrap_or((ScalarType::Unknown, true));
            columns.insert(name.to_string(), (ty, nullable));
        }
    }
    columns
}

/// Output columns of a whole statement: the leftmost select defines them.
pub fn query_output_columns(query: &Query) -> IndexMap<String, (ScalarType, bool)> {
    output_columns(query.first_select())
}
