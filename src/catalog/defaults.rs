use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::ast::{Expr, ScalarType};
use crate::catalog::{AccessPolicy, FieldDef, Materializer, TableDef};

/// Tables allowed to skip the tenant-scope guard, with the reason they are
/// safe. Everything else physical must declare a scope column; a test
/// asserts this over the whole static set.
pub const SCOPE_EXEMPT_TABLES: &[&str] = &[
    // system number generator, no tenant rows at all
    "numbers",
];

pub fn events_table() -> TableDef {
    let mut fields = IndexMap::new();
    fields.insert("uuid".to_string(), FieldDef::column("uuid", ScalarType::Uuid));
    fields.insert("event".to_string(), FieldDef::column("event", ScalarType::String));
    fields.insert("timestamp".to_string(), FieldDef::column("timestamp", ScalarType::DateTime));
    fields.insert("distinct_id".to_string(), FieldDef::column("distinct_id", ScalarType::String));
    fields.insert("person_id".to_string(), FieldDef::column("person_id", ScalarType::Uuid));
    fields.insert("session_id".to_string(), FieldDef::column("$session_id", ScalarType::String));
    fields.insert("properties".to_string(), FieldDef::properties("properties"));
    fields.insert("person".to_string(), FieldDef::lazy_join(Materializer::PersonJoin, "persons"));
    fields.insert("session".to_string(), FieldDef::lazy_join(Materializer::SessionJoin, "sessions"));
    // shorthand reaching through the person join
    fields.insert("person_props".to_string(), FieldDef::traverser(&["person", "properties"]));
    fields.insert(
        "event_date".to_string(),
        FieldDef::expression(Expr::call("toDate", vec![Expr::field(&["timestamp"])]), ScalarType::Date),
    );
    for index in 0u8..5 {
        fields.insert(
            format!("group_key_{index}"),
            FieldDef::hidden_column(&format!("$group_{index}"), ScalarType::String),
        );
        fields.insert(
            format!("group_{index}"),
            FieldDef::lazy_join(Materializer::GroupJoin(index), "groups"),
        );
    }
    // denormalized person properties, readable when the join mode asks for it
    fields.insert("person_properties".to_string(), FieldDef::hidden_column("person_properties", ScalarType::Json));
    fields.insert("elements_chain".to_string(), FieldDef::hidden_column("elements_chain", ScalarType::String));
    fields.insert("_timestamp".to_string(), FieldDef::hidden_column("_timestamp", ScalarType::DateTime));
    fields.insert("_offset".to_string(), FieldDef::hidden_column("_offset", ScalarType::Int));
    TableDef::physical("events", "events", fields)
}

fn raw_persons_table() -> TableDef {
    let mut fields = IndexMap::new();
    fields.insert("id".to_string(), FieldDef::column("id", ScalarType::Uuid));
    fields.insert("created_at".to_string(), FieldDef::column("created_at", ScalarType::DateTime));
    fields.insert("properties".to_string(), FieldDef::properties("properties"));
    fields.insert("is_identified".to_string(), FieldDef::column("is_identified", ScalarType::Bool));
    fields.insert("version".to_string(), FieldDef::hidden_column("version", ScalarType::Int));
    fields.insert("is_deleted".to_string(), FieldDef::hidden_column("is_deleted", ScalarType::Bool));
    TableDef::physical("raw_persons", "person", fields)
}

/// The user-facing person table: a relabeled subset of `raw_persons`, no
/// join cost, implementation columns left behind.
fn persons_table() -> TableDef {
    let mut fields = IndexMap::new();
    fields.insert("id".to_string(), FieldDef::column("id", ScalarType::Uuid));
    fields.insert("created_at".to_string(), FieldDef::column("created_at", ScalarType::DateTime));
    fields.insert("properties".to_string(), FieldDef::properties("properties"));
    fields.insert("is_identified".to_string(), FieldDef::column("is_identified", ScalarType::Bool));
    fields.insert("props".to_string(), FieldDef::traverser(&["properties"]));
    TableDef::virtual_over("persons", "raw_persons", fields)
}

fn raw_sessions_table() -> TableDef {
    let mut fields = IndexMap::new();
    fields.insert("session_id".to_string(), FieldDef::column("session_id", ScalarType::String));
    fields.insert("min_timestamp".to_string(), FieldDef::column("min_timestamp", ScalarType::DateTime));
    fields.insert("max_timestamp".to_string(), FieldDef::column("max_timestamp", ScalarType::DateTime));
    fields.insert("entry_url".to_string(), FieldDef::nullable_column("entry_url", ScalarType::String));
    TableDef::physical("raw_sessions", "raw_sessions", fields)
}

/// Per-session aggregates, materialized on demand from `raw_sessions`.
fn sessions_table() -> TableDef {
    let mut fields = IndexMap::new();
    fields.insert("session_id".to_string(), FieldDef::column("session_id", ScalarType::String));
    fields.insert("start_at".to_string(), FieldDef::column("start_at", ScalarType::DateTime));
    fields.insert("end_at".to_string(), FieldDef::column("end_at", ScalarType::DateTime));
    fields.insert("duration".to_string(), FieldDef::column("duration", ScalarType::Int));
    fields.insert("entry_url".to_string(), FieldDef::nullable_column("entry_url", ScalarType::String));
    TableDef::lazy("sessions", Materializer::SessionJoin, fields)
}

fn groups_table() -> TableDef {
    let mut fields = IndexMap::new();
    fields.insert("group_type_index".to_string(), FieldDef::column("group_type_index", ScalarType::Int));
    fields.insert("group_key".to_string(), FieldDef::column("group_key", ScalarType::String));
    fields.insert("created_at".to_string(), FieldDef::column("created_at", ScalarType::DateTime));
    fields.insert("properties".to_string(), FieldDef::properties("group_properties"));
    TableDef::physical("groups", "groups", fields)
}

/// Daily pre-aggregated rollup of events. The partial-aggregate state
/// columns are hidden: the substitution pass reads them through merge
/// functions, `SELECT *` never sees them.
fn events_daily_table() -> TableDef {
    let mut fields = IndexMap::new();
    fields.insert("day".to_string(), FieldDef::column("day", ScalarType::Date));
    fields.insert("event".to_string(), FieldDef::column("event", ScalarType::String));
    fields.insert("count_state".to_string(), FieldDef::hidden_column("count_state", ScalarType::Unknown));
    fields.insert("uniq_persons_state".to_string(), FieldDef::hidden_column("uniq_persons_state", ScalarType::Unknown));
    TableDef::physical("events_daily", "events_daily", fields)
}

fn numbers_table() -> TableDef {
    let mut fields = IndexMap::new();
    fields.insert("number".to_string(), FieldDef::column("number", ScalarType::Int));
    TableDef::physical("numbers", "numbers", fields).exempt()
}

fn annotations_table() -> TableDef {
    let mut fields = IndexMap::new();
    fields.insert("id".to_string(), FieldDef::column("id", ScalarType::Int));
    fields.insert("content".to_string(), FieldDef::nullable_column("content", ScalarType::String));
    fields.insert("date_marker".to_string(), FieldDef::column("date_marker", ScalarType::DateTime));
    fields.insert("created_by_id".to_string(), FieldDef::column("created_by_id", ScalarType::Int));
    TableDef::physical("annotations", "annotations", fields).with_access(AccessPolicy {
        resource: "annotation".to_string(),
        id_column: "id".to_string(),
        created_by_column: "created_by_id".to_string(),
    })
}

/// Backing store of explicit per-principal denials, read by the
/// access-guard pass to build the blocked-id subquery.
fn access_denials_table() -> TableDef {
    let mut fields = IndexMap::new();
    fields.insert("resource".to_string(), FieldDef::column("resource", ScalarType::String));
    fields.insert("resource_id".to_string(), FieldDef::column("resource_id", ScalarType::Int));
    fields.insert("user_id".to_string(), FieldDef::column("user_id", ScalarType::Int));
    TableDef::physical("access_denials", "access_denials", fields)
}

fn build_static_tables() -> IndexMap<String, Arc<TableDef>> {
    let defs = vec![
        events_table(),
        raw_persons_table(),
        persons_table(),
        raw_sessions_table(),
        sessions_table(),
        groups_table(),
        events_daily_table(),
        numbers_table(),
        annotations_table(),
        access_denials_table(),
    ];
    defs.into_iter().map(|def| (def.name.clone(), Arc::new(def))).collect()
}

static STATIC_TABLES: Lazy<RwLock<Option<Arc<IndexMap<String, Arc<TableDef>>>>>> =
    Lazy::new(|| RwLock::new(None));

/// The process-wide cache of built-in table definitions. Built outside the
/// lock and swapped in whole, so concurrent readers never observe a
/// partially constructed set.
pub fn static_tables() -> Arc<IndexMap<String, Arc<TableDef>>> {
    if let Some(tables) = STATIC_TABLES.read().unwrap().as_ref() {
        return Arc::clone(tables);
    }
    let built = Arc::new(build_static_tables());
    let mut guard = STATIC_TABLES.write().unwrap();
    match guard.as_ref() {
        // another thread won the build race; keep its copy
        Some(existing) => Arc::clone(existing),
        None => {
            *guard = Some(Arc::clone(&built));
            built
        }
    }
}

/// Externally triggered refresh: drop the cached definitions so the next
/// compilation rebuilds them. Called whenever schema-affecting metadata
/// changes upstream.
pub fn invalidate_static_tables() {
    *STATIC_TABLES.write().unwrap() = None;
}
