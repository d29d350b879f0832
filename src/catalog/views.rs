use crate::ast::Query;
use crate::catalog::TableDef;
use crate::error::CatalogError;

/// A named, pre-parsed saved query exposed as a table. The parse happened
/// upstream; a view arriving here unparsed is a storage problem, reported
/// as a catalog-construction error by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedView {
    pub name: String,
    pub query: Query,
}

impl SavedView {
    pub fn into_table_def(self) -> Result<TableDef, CatalogError> {
        if self.name.is_empty() {
            return Err(CatalogError::MalformedView { name: self.name, reason: "empty view name".to_string() });
        }
        if self.query.first_select().select.is_empty() {
            return Err(CatalogError::MalformedView {
                name: self.name,
                reason: "view query selects no columns".to_string(),
            });
        }
        Ok(TableDef::view(&self.name, self.query))
    }
}
