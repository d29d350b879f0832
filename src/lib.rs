//! A compiler from an analytics query language to executable ClickHouse SQL.
//!
//! The pipeline is resolve -> transform -> print: the resolver types every
//! expression against a virtual schema catalog (expanding wildcards,
//! materializing lazy joins and injecting tenant-scope guards), a sequence
//! of idempotent optimizer passes rewrites the resolved tree, and the
//! printer renders it with every quoted literal externalized into a typed
//! parameter map.

pub mod ast;
pub mod catalog;
pub mod context;
pub mod error;
pub mod printer;
pub mod resolver;
pub mod transforms;

use std::time::Instant;

use indexmap::IndexMap;
use serde_json::Value;

use crate::ast::Query;
use crate::context::{Context, Notice};
use crate::error::QueryError;
use crate::printer::{print_query, Dialect};

/// The result of one successful compilation.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub sql: String,
    /// Server-side parameter values, keyed by placeholder name.
    pub params: IndexMap<String, Value>,
    pub warnings: Vec<Notice>,
    pub notices: Vec<Notice>,
    /// Phase durations in milliseconds, in execution order.
    pub timings: IndexMap<String, f64>,
}

/// Compile one statement to executable SQL plus its parameter map.
pub fn compile_select(query: Query, ctx: &mut Context) -> Result<CompiledQuery, QueryError> {
    let started = Instant::now();
    let resolved = resolver::resolve_query(query, ctx)?;
    ctx.timings.record_since("resolve", started);

    let passes = transforms::default_pipeline();
    let transformed = transforms::run_pipeline(resolved, ctx, &passes)?;

    let started = Instant::now();
    let sql = print_query(&transformed, Dialect::ClickHouse, ctx)?;
    ctx.timings.record_since("print", started);

    tracing::debug!(team_id = ctx.team_id, params = ctx.params.len(), "compilation finished");
    Ok(CompiledQuery {
        sql,
        params: ctx.params.to_json(),
        warnings: ctx.notices.warnings().to_vec(),
        notices: ctx.notices.notices().to_vec(),
        timings: ctx.timings.to_millis(),
    })
}

/// Render a statement back in the source language, for display and
/// round-tripping. No catalog access, no parameterization.
pub fn print_hogql(query: &Query) -> Result<String, QueryError> {
    let mut ctx = Context::new(0, catalog::Catalog::for_team(0));
    print_query(query, Dialect::HogQL, &mut ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompareOp, Expr, ExprKind, JoinExpr, Literal, SelectQuery};
    use crate::catalog::Catalog;
    use crate::context::{Modifiers, PersonJoinMode, Principal};
    use crate::error::ResolutionError;

    fn ctx_for(team_id: i64) -> Context {
        Context::new(team_id, Catalog::for_team(team_id))
    }

    fn events_filtered(filter: Expr) -> Query {
        let mut select = SelectQuery::new(vec![Expr::field(&["event"])], Some(JoinExpr::table(&["events"])));
        select.where_clause = Some(filter);
        Query::Select(select)
    }

    #[test]
    fn filtered_select_parameterizes_strings_and_inlines_the_guard() {
        let query = events_filtered(Expr::compare(
            CompareOp::Eq,
            Expr::field(&["event"]),
            Expr::lit(Literal::string("page_view")),
        ));
        let mut ctx = ctx_for(42);
        let compiled = compile_select(query, &mut ctx).unwrap();

        assert!(compiled.sql.contains("event = {val_0:String}"), "{}", compiled.sql);
        assert!(compiled.sql.contains("team_id = 42"), "{}", compiled.sql);
        assert_eq!(compiled.params.len(), 1);
        assert_eq!(compiled.params.get("val_0"), Some(&serde_json::json!("page_view")));
    }

    #[test]
    fn nested_wildcard_prunes_to_the_demanded_column() {
        let inner = SelectQuery::new(vec![Expr::asterisk()], Some(JoinExpr::table(&["events"])));
        let outer = SelectQuery::new(
            vec![Expr::field(&["sub", "event"])],
            Some(JoinExpr::subquery(inner.into(), "sub")),
        );
        let mut ctx = ctx_for(1);
        let compiled = compile_select(Query::Select(outer), &mut ctx).unwrap();

        assert!(compiled.sql.contains("events.event"), "{}", compiled.sql);
        assert!(!compiled.sql.contains("uuid"), "{}", compiled.sql);
        assert!(!compiled.sql.contains("distinct_id"), "{}", compiled.sql);
    }

    #[test]
    fn lazy_table_with_no_demanded_fields_is_a_user_error_naming_it() {
        let query = Query::Select(SelectQuery::new(
            vec![Expr::lit(Literal::Int(1))],
            Some(JoinExpr::table(&["sessions"])),
        ));
        let mut ctx = ctx_for(1);
        let err = compile_select(query, &mut ctx).unwrap_err();
        assert!(err.is_user_error());
        match err {
            QueryError::Resolution(ResolutionError::EmptyLazyJoin { table, .. }) => {
                assert_eq!(table, "sessions");
            }
            other => panic!("expected EmptyLazyJoin, got {other:?}"),
        }
    }

    #[test]
    fn every_parameter_placeholder_appears_in_the_sql() {
        let filter = Expr::and(vec![
            Expr::compare(CompareOp::Eq, Expr::field(&["event"]), Expr::lit(Literal::string("signup"))),
            Expr::compare(
                CompareOp::NotEq,
                Expr::field(&["distinct_id"]),
                Expr::lit(Literal::string("anon")),
            ),
            // repeated literal re-uses its slot
            Expr::compare(CompareOp::NotEq, Expr::field(&["event"]), Expr::lit(Literal::string("anon"))),
        ]);
        let mut ctx = ctx_for(5);
        let compiled = compile_select(events_filtered(filter), &mut ctx).unwrap();

        assert_eq!(compiled.params.len(), 2);
        for name in compiled.params.keys() {
            assert!(compiled.sql.contains(&format!("{{{name}:")), "{name} missing from {}", compiled.sql);
        }
    }

    #[test]
    fn person_property_access_materializes_a_left_join() {
        let query = Query::Select(SelectQuery::new(
            vec![Expr::field(&["person", "properties", "email"])],
            Some(JoinExpr::table(&["events"])),
        ));
        let mut ctx = ctx_for(3);
        let compiled = compile_select(query, &mut ctx).unwrap();

        assert!(compiled.sql.contains("LEFT JOIN"), "{}", compiled.sql);
        assert!(compiled.sql.contains("JSONExtractRaw(events__person.properties"), "{}", compiled.sql);
        // the person subquery carries its own tenant guard
        assert!(compiled.sql.contains("persons.team_id = 3"), "{}", compiled.sql);
    }

    #[test]
    fn denormalized_mode_reads_person_properties_off_the_events_row() {
        let query = Query::Select(SelectQuery::new(
            vec![Expr::field(&["person", "properties", "email"])],
            Some(JoinExpr::table(&["events"])),
        ));
        let mut ctx = ctx_for(3).with_modifiers(Modifiers {
            person_join_mode: PersonJoinMode::Denormalized,
            ..Modifiers::default()
        });
        let compiled = compile_select(query, &mut ctx).unwrap();

        assert!(compiled.sql.contains("events.person_properties"), "{}", compiled.sql);
        assert!(!compiled.sql.contains("LEFT JOIN"), "{}", compiled.sql);
    }

    #[test]
    fn daily_event_counts_read_the_rollup_table() {
        let bucket = Expr::call("toStartOfDay", vec![Expr::field(&["timestamp"])]);
        let mut select = SelectQuery::new(
            vec![bucket.clone(), Expr::call("count", vec![])],
            Some(JoinExpr::table(&["events"])),
        );
        select.group_by = vec![bucket];
        let mut ctx = ctx_for(42);
        let compiled = compile_select(Query::Select(select), &mut ctx).unwrap();

        assert!(compiled.sql.contains("events_daily"), "{}", compiled.sql);
        assert!(compiled.sql.contains("countMerge"), "{}", compiled.sql);
        assert!(compiled.sql.contains("team_id = 42"), "{}", compiled.sql);
    }

    #[test]
    fn aggregates_over_scalar_subqueries_of_aggregates_compile() {
        let inner = SelectQuery::new(
            vec![Expr::call("count", vec![])],
            Some(JoinExpr::table(&["events"])),
        );
        let scalar = Expr::new(ExprKind::Subquery(Box::new(Query::Select(inner))));
        let query = Query::Select(SelectQuery::new(
            vec![Expr::call("max", vec![scalar])],
            Some(JoinExpr::table(&["events"])),
        ));
        let mut ctx = ctx_for(1);
        let compiled = compile_select(query, &mut ctx).unwrap();
        assert!(compiled.sql.contains("max((SELECT"), "{}", compiled.sql);
    }

    #[test]
    fn denied_principal_sees_the_row_guard_and_admins_do_not() {
        let query = || {
            Query::Select(SelectQuery::new(
                vec![Expr::field(&["content"])],
                Some(JoinExpr::table(&["annotations"])),
            ))
        };

        let mut ctx =
            ctx_for(7).with_principal(Principal::new(9).with_denials(vec!["annotation".to_string()]));
        let guarded = compile_select(query(), &mut ctx).unwrap();
        assert!(guarded.sql.contains("created_by_id = 9"), "{}", guarded.sql);
        assert!(guarded.sql.contains("NOT IN"), "{}", guarded.sql);

        let mut ctx = ctx_for(7).with_principal(Principal::admin(9));
        let open = compile_select(query(), &mut ctx).unwrap();
        assert!(!open.sql.contains("NOT IN"), "{}", open.sql);
    }

    #[test]
    fn unknown_fields_suggest_close_names() {
        let query = Query::Select(SelectQuery::new(
            vec![Expr::field(&["time"])],
            Some(JoinExpr::table(&["events"])),
        ));
        let mut ctx = ctx_for(1);
        match compile_select(query, &mut ctx).unwrap_err() {
            QueryError::Resolution(ResolutionError::UnknownField { name, candidates, .. }) => {
                assert_eq!(name, "time");
                assert!(candidates.contains(&"timestamp".to_string()), "{candidates:?}");
            }
            other => panic!("expected UnknownField, got {other:?}"),
        }
    }

    #[test]
    fn timings_cover_every_phase() {
        let mut ctx = ctx_for(1);
        let compiled = compile_select(
            Query::Select(SelectQuery::new(vec![Expr::field(&["event"])], Some(JoinExpr::table(&["events"])))),
            &mut ctx,
        )
        .unwrap();
        assert!(compiled.timings.contains_key("resolve"));
        assert!(compiled.timings.contains_key("print"));
        assert!(compiled.timings.keys().any(|k| k.starts_with("pass.")));
    }

    #[test]
    fn display_dialect_round_trips_the_source_form() {
        let query = events_filtered(Expr::compare(
            CompareOp::Eq,
            Expr::field(&["properties", "plan"]),
            Expr::lit(Literal::string("pro")),
        ));
        let sql = print_hogql(&query).unwrap();
        assert_eq!(sql, "SELECT event FROM events WHERE properties.plan = 'pro'");
    }
}
