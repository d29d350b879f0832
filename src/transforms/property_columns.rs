use crate::ast::{map_queries, map_select_exprs, ExprType, Query, ScalarType};
use crate::context::Context;
use crate::error::QueryError;

/// Substitute ready materialized property columns for JSON extraction.
///
/// A single-segment property access whose (table, property) pair has a
/// `Ready` slot retypes to a plain column read of the slot's storage column.
/// The expression kind is untouched; only the resolved type changes, and the
/// printer follows the type. Multi-segment paths and slots still
/// backfilling keep extracting from JSON.
pub fn property_columns(query: Query, ctx: &mut Context) -> Result<Query, QueryError> {
    let slots = ctx.catalog.property_slots().clone();
    if slots.is_empty() {
        return Ok(query);
    }

    map_queries(query, &mut |select| {
        map_select_exprs(select, &mut |mut e| {
            if let Some(ExprType::Property { table, table_alias, path, nullable, .. }) = &e.ty {
                if path.len() == 1 {
                    if let Some(slot) = slots.ready(table, &path[0]) {
                        e.ty = Some(ExprType::Field {
                            table_alias: table_alias.clone(),
                            table: table.clone(),
                            name: path[0].clone(),
                            physical: slot.column.clone(),
                            ty: ScalarType::String,
                            nullable: *nullable,
                        });
                    }
                }
            }
            Ok(e)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, ExprKind, SelectQuery};
    use crate::catalog::{Catalog, PropertySlot, PropertySlots, ReadinessState};

    fn property_expr(path: &[&str]) -> Expr {
        Expr::typed(
            ExprKind::Field {
                chain: std::iter::once("events".to_string())
                    .chain(std::iter::once("properties".to_string()))
                    .chain(path.iter().map(|s| s.to_string()))
                    .collect(),
            },
            ExprType::Property {
                table: "events".to_string(),
                table_alias: "events".to_string(),
                json_column: "properties".to_string(),
                path: path.iter().map(|s| s.to_string()).collect(),
                nullable: true,
            },
        )
    }

    fn context_with_slot(state: ReadinessState) -> Context {
        let mut slots = PropertySlots::default();
        slots.insert("events", "plan", PropertySlot { column: "mat_plan".to_string(), state });
        let mut catalog = Catalog::for_team(1);
        catalog.set_property_slots(slots);
        Context::new(1, catalog)
    }

    fn run(ctx: &mut Context, expr: Expr) -> Expr {
        let query = Query::Select(SelectQuery::new(vec![expr], None));
        let out = property_columns(query, ctx).unwrap();
        out.first_select().select[0].clone()
    }

    #[test]
    fn ready_slot_retypes_to_a_column_read() {
        let mut ctx = context_with_slot(ReadinessState::Ready);
        let out = run(&mut ctx, property_expr(&["plan"]));
        match out.ty.unwrap() {
            ExprType::Field { physical, .. } => assert_eq!(physical, "mat_plan"),
            other => panic!("expected a field type, got {other:?}"),
        }
    }

    #[test]
    fn backfilling_slot_keeps_json_extraction() {
        let mut ctx = context_with_slot(ReadinessState::Backfilling);
        let out = run(&mut ctx, property_expr(&["plan"]));
        assert!(matches!(out.ty.unwrap(), ExprType::Property { .. }));
    }

    #[test]
    fn nested_paths_are_never_substituted() {
        let mut ctx = context_with_slot(ReadinessState::Ready);
        let out = run(&mut ctx, property_expr(&["plan", "tier"]));
        assert!(matches!(out.ty.unwrap(), ExprType::Property { .. }));
    }

    #[test]
    fn second_run_changes_nothing() {
        let mut ctx = context_with_slot(ReadinessState::Ready);
        let once = run(&mut ctx, property_expr(&["plan"]));
        let twice = run(&mut ctx, once.clone());
        assert_eq!(once, twice);
    }
}
