use indexmap::IndexMap;

use crate::catalog::Materializer;

/// One lazy join demanded somewhere in the query: which alias it hangs off,
/// how it joins, and exactly the fields referenced through it.
#[derive(Debug, Clone)]
pub struct LazyDemand {
    pub source_alias: String,
    pub join: Materializer,
    pub to_table: String,
    /// field name -> the full chain that demanded it
    pub fields: IndexMap<String, Vec<String>>,
}

/// Demand set accumulated while resolving expressions, keyed by the
/// synthetic alias the join will materialize under (`source__field`).
#[derive(Debug, Clone, Default)]
pub struct LazyDemands {
    entries: IndexMap<String, LazyDemand>,
}

impl LazyDemands {
    pub fn record(
        &mut self,
        join_alias: &str,
        source_alias: &str,
        join: Materializer,
        to_table: &str,
        field: &str,
        chain: Vec<String>,
    ) {
        let entry = self.entries.entry(join_alias.to_string()).or_insert_with(|| LazyDemand {
            source_alias: source_alias.to_string(),
            join,
            to_table: to_table.to_string(),
            fields: IndexMap::new(),
        });
        entry.fields.entry(field.to_string()).or_insert(chain);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn take(&mut self) -> IndexMap<String, LazyDemand> {
        std::mem::take(&mut self.entries)
    }

    pub fn contains(&self, join_alias: &str) -> bool {
        self.entries.contains_key(join_alias)
    }
}
