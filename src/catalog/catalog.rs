use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::ast::{JoinExpr, Span};
use crate::catalog::{
    static_tables, Materializer, PropertySlots, SavedView, TableDef, TableKind, WarehouseTable,
};
use crate::error::{CatalogError, QueryError, ResolutionError};

/// The virtual database one compilation resolves against: built-in tables
/// plus the tenant's discovered views and warehouse tables. Built once per
/// incoming query and treated as immutable afterwards; only the static
/// built-in definitions are cached process-wide.
#[derive(Debug, Clone)]
pub struct Catalog {
    tables: IndexMap<String, Arc<TableDef>>,
    /// Names that exist but are not visible to the requesting scope.
    /// Referencing one yields an access-denied error, not unknown-table.
    restricted: HashSet<String>,
    slots: PropertySlots,
}

impl Catalog {
    /// The built-in analytics schema for one team. Warehouse/view discovery
    /// happens in the caller (it may block on external metadata) and is
    /// attached through `add_warehouse_tables` / `add_views` before the
    /// catalog is handed to a context.
    pub fn for_team(_team_id: i64) -> Self {
        let statics = static_tables();
        Self {
            tables: statics.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect(),
            restricted: HashSet::new(),
            slots: PropertySlots::default(),
        }
    }

    pub fn get_table(&self, name: &str, span: Option<Span>) -> Result<Arc<TableDef>, QueryError> {
        if let Some(table) = self.tables.get(name) {
            return Ok(Arc::clone(table));
        }
        if self.restricted.contains(name) {
            return Err(ResolutionError::AccessDenied { name: name.to_string(), span }.into());
        }
        Err(ResolutionError::UnknownTable { name: name.to_string(), span }.into())
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Materialize a lazy table's deferred join for exactly the demanded
    /// field set.
    pub fn resolve_lazy(
        &self,
        materializer: &Materializer,
        source_alias: &str,
        join_alias: &str,
        demand: &IndexMap<String, Vec<String>>,
    ) -> Result<JoinExpr, QueryError> {
        materializer.materialize(source_alias, join_alias, demand)
    }

    pub fn add_views(&mut self, views: Vec<SavedView>) -> Result<(), QueryError> {
        for view in views {
            let def = view.into_table_def()?;
            self.insert(def)?;
        }
        Ok(())
    }

    pub fn add_warehouse_tables(&mut self, tables: Vec<WarehouseTable>) -> Result<(), QueryError> {
        for table in tables {
            let def = table.into_table_def()?;
            self.insert(def)?;
        }
        Ok(())
    }

    fn insert(&mut self, def: TableDef) -> Result<(), QueryError> {
        if self.tables.contains_key(&def.name) {
            return Err(CatalogError::DuplicateTable { name: def.name }.into());
        }
        self.tables.insert(def.name.clone(), Arc::new(def));
        Ok(())
    }

    /// Mark names as known-but-denied for this scope.
    pub fn restrict(&mut self, names: impl IntoIterator<Item = String>) {
        self.restricted.extend(names);
    }

    pub fn set_property_slots(&mut self, slots: PropertySlots) {
        self.slots = slots;
    }

    pub fn property_slots(&self) -> &PropertySlots {
        &self.slots
    }

    /// All entries, for catalog-wide property checks.
    pub fn tables(&self) -> impl Iterator<Item = (&String, &Arc<TableDef>)> {
        self.tables.iter()
    }

    /// The physical backing of a virtual table, resolved through the
    /// catalog so the printer emits the real storage name.
    pub fn physical_backing(&self, def: &TableDef) -> Result<Arc<TableDef>, QueryError> {
        match &def.kind {
            TableKind::Virtual { backing } => {
                let backing = self.get_table(backing, None)?;
                match backing.kind {
                    TableKind::Physical { .. } => Ok(backing),
                    _ => Err(QueryError::internal(format!(
                        "virtual table \"{}\" backs onto non-physical \"{}\"",
                        def.name, backing.name
                    ))),
                }
            }
            _ => Err(QueryError::internal(format!("table \"{}\" is not virtual", def.name))),
        }
    }
}
