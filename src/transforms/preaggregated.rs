use std::sync::Arc;

use chrono::NaiveTime;

use crate::ast::{
    map_queries, CompareOp, Expr, ExprKind, ExprType, Literal, Query, ResolvedTable, ScalarType, SelectQuery,
    TableExpr,
};
use crate::catalog::TableDef;
use crate::context::Context;
use crate::error::QueryError;

/// Rewrite daily-bucketed event aggregations to read the pre-aggregated
/// rollup table through merge functions.
///
/// Recognition is all-or-nothing: either every select item, group key and
/// filter conjunct maps onto the rollup's columns, or the select is left
/// byte-identical. A partially rewritten query would double-count.
pub fn preaggregated(query: Query, ctx: &mut Context) -> Result<Query, QueryError> {
    let Ok(daily) = ctx.catalog.get_table("events_daily", None) else {
        return Ok(query);
    };
    map_queries(query, &mut |select| {
        Ok(match try_rewrite(&select, &daily) {
            Some(rewritten) => rewritten,
            None => select,
        })
    })
}

fn try_rewrite(select: &SelectQuery, daily: &Arc<TableDef>) -> Option<SelectQuery> {
    let root = select.from.as_ref()?;
    if root.next.is_some() || select.distinct || select.having.is_some() || !select.full_sample() {
        return None;
    }
    let Some(ResolvedTable::Catalog { table, alias }) = &root.resolved else {
        return None;
    };
    if table.name != "events" {
        return None;
    }
    // without a mergeable aggregate the rollup's one-row-per-group shape
    // changes the result set
    if !select.select.iter().any(has_merge_aggregate) {
        return None;
    }
    let alias = alias.clone();

    let mut out = select.clone();
    for item in &mut out.select {
        *item = rewrite_item(item, &alias)?;
    }
    for key in &mut out.group_by {
        *key = rewrite_group_key(key, &alias)?;
    }
    for order in &mut out.order_by {
        order.expr = rewrite_item(&order.expr, &alias)?;
    }
    out.where_clause = match &select.where_clause {
        Some(filter) => Some(rewrite_filter(filter, &alias)?),
        None => None,
    };

    let root = out.from.as_mut()?;
    root.table = TableExpr::Table { chain: vec!["events_daily".to_string()] };
    root.alias = Some(alias.clone());
    root.resolved = Some(ResolvedTable::Catalog { table: Arc::clone(daily), alias });
    Some(out)
}

fn has_merge_aggregate(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Alias { expr: inner, .. } => has_merge_aggregate(inner),
        ExprKind::Call { name, .. } => name == "count" || name == "uniq",
        _ => false,
    }
}

fn rewrite_item(expr: &Expr, alias: &str) -> Option<Expr> {
    match &expr.kind {
        ExprKind::Alias { name, expr: inner } => {
            let rewritten = rewrite_item(inner, alias)?;
            let ty = rewritten.ty.clone();
            Some(Expr {
                kind: ExprKind::Alias { name: name.clone(), expr: Box::new(rewritten) },
                span: expr.span,
                ty,
                from_wildcard: expr.from_wildcard,
            })
        }
        ExprKind::Call { name, args, distinct } if name == "count" && args.is_empty() && !distinct => {
            Some(merge_call("countMerge", alias, "count_state"))
        }
        ExprKind::Call { name, args, distinct } if name == "uniq" && args.len() == 1 && !distinct => {
            if is_field(&args[0], alias, "person_id") {
                Some(merge_call("uniqMerge", alias, "uniq_persons_state"))
            } else {
                None
            }
        }
        _ => rewrite_group_key(expr, alias),
    }
}

fn rewrite_group_key(expr: &Expr, alias: &str) -> Option<Expr> {
    match &expr.kind {
        ExprKind::Call { name, args, distinct }
            if (name == "toStartOfDay" || name == "toDate") && args.len() == 1 && !distinct =>
        {
            if is_field(&args[0], alias, "timestamp") {
                Some(daily_field(alias, "day", ScalarType::Date))
            } else {
                None
            }
        }
        ExprKind::Field { .. } if is_field(expr, alias, "event") => {
            Some(daily_field(alias, "event", ScalarType::String))
        }
        _ => None,
    }
}

fn rewrite_filter(filter: &Expr, alias: &str) -> Option<Expr> {
    let mut rewritten = Vec::new();
    for conjunct in filter.conjuncts() {
        rewritten.push(rewrite_conjunct(conjunct, alias)?);
    }
    Expr::conjoin(rewritten)
}

fn rewrite_conjunct(conjunct: &Expr, alias: &str) -> Option<Expr> {
    match &conjunct.kind {
        ExprKind::Compare { op: CompareOp::Eq, left, right } if is_field(left, alias, "team_id") => {
            if matches!(right.kind, ExprKind::Literal(Literal::Int(_))) {
                Some(compare(CompareOp::Eq, daily_field(alias, "team_id", ScalarType::Int), (**right).clone()))
            } else {
                None
            }
        }
        ExprKind::Compare { op: CompareOp::Eq, left, right } if is_field(left, alias, "event") => {
            if matches!(right.kind, ExprKind::Literal(Literal::String(_))) {
                Some(compare(CompareOp::Eq, daily_field(alias, "event", ScalarType::String), (**right).clone()))
            } else {
                None
            }
        }
        ExprKind::Compare { op: CompareOp::In, left, right } if is_field(left, alias, "event") => {
            let all_strings = match &right.kind {
                ExprKind::Tuple(items) => {
                    items.iter().all(|i| matches!(i.kind, ExprKind::Literal(Literal::String(_))))
                }
                ExprKind::Literal(Literal::Array(items)) => {
                    items.iter().all(|i| matches!(i, Literal::String(_)))
                }
                _ => false,
            };
            if all_strings {
                Some(compare(CompareOp::In, daily_field(alias, "event", ScalarType::String), (**right).clone()))
            } else {
                None
            }
        }
        ExprKind::Compare { op: op @ (CompareOp::GtEq | CompareOp::Lt), left, right }
            if is_field(left, alias, "timestamp") =>
        {
            // only bounds sitting exactly on a day edge select whole rollup
            // rows; anything finer keeps the raw table
            let day = match &right.kind {
                ExprKind::Literal(Literal::Date(d)) => *d,
                ExprKind::Literal(Literal::DateTime(at)) if at.time() == NaiveTime::MIN => {
                    at.date_naive()
                }
                _ => return None,
            };
            Some(compare(
                *op,
                daily_field(alias, "day", ScalarType::Date),
                Expr::typed(
                    ExprKind::Literal(Literal::Date(day)),
                    ExprType::scalar_of(ScalarType::Date),
                ),
            ))
        }
        ExprKind::Or(parts) => {
            let rewritten = parts.iter().map(|p| rewrite_conjunct(p, alias)).collect::<Option<Vec<_>>>()?;
            Some(Expr::typed(ExprKind::Or(rewritten), ExprType::scalar_of(ScalarType::Bool)))
        }
        _ => None,
    }
}

fn is_field(expr: &Expr, alias: &str, name: &str) -> bool {
    matches!(
        &expr.ty,
        Some(ExprType::Field { table_alias, name: field, .. }) if table_alias == alias && field == name
    )
}

fn daily_field(alias: &str, name: &str, ty: ScalarType) -> Expr {
    Expr::typed(
        ExprKind::Field { chain: vec![alias.to_string(), name.to_string()] },
        ExprType::Field {
            table_alias: alias.to_string(),
            table: "events_daily".to_string(),
            name: name.to_string(),
            physical: name.to_string(),
            ty,
            nullable: false,
        },
    )
}

fn merge_call(function: &str, alias: &str, state_column: &str) -> Expr {
    Expr::typed(
        ExprKind::Call {
            name: function.to_string(),
            args: vec![daily_field(alias, state_column, ScalarType::Unknown)],
            distinct: false,
        },
        ExprType::scalar_of(ScalarType::Int),
    )
}

fn compare(op: CompareOp, left: Expr, right: Expr) -> Expr {
    Expr::typed(
        ExprKind::Compare { op, left: Box::new(left), right: Box::new(right) },
        ExprType::scalar_of(ScalarType::Bool),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::JoinExpr;
    use crate::catalog::Catalog;

    fn events_field(name: &str, ty: ScalarType) -> Expr {
        Expr::typed(
            ExprKind::Field { chain: vec!["events".to_string(), name.to_string()] },
            ExprType::Field {
                table_alias: "events".to_string(),
                table: "events".to_string(),
                name: name.to_string(),
                physical: name.to_string(),
                ty,
                nullable: false,
            },
        )
    }

    fn resolved_events_from() -> JoinExpr {
        let catalog = Catalog::for_team(1);
        let table = catalog.get_table("events", None).unwrap();
        let mut entry = JoinExpr::table(&["events"]);
        entry.resolved = Some(ResolvedTable::Catalog { table, alias: "events".to_string() });
        entry
    }

    fn count_call() -> Expr {
        Expr::typed(
            ExprKind::Call { name: "count".to_string(), args: vec![], distinct: false },
            ExprType::scalar_of(ScalarType::Int),
        )
    }

    fn daily_shaped_select() -> SelectQuery {
        let mut select = SelectQuery::new(
            vec![
                Expr::typed(
                    ExprKind::Call {
                        name: "toStartOfDay".to_string(),
                        args: vec![events_field("timestamp", ScalarType::DateTime)],
                        distinct: false,
                    },
                    ExprType::scalar_of(ScalarType::DateTime),
                ),
                count_call(),
            ],
            Some(resolved_events_from()),
        );
        select.group_by = vec![select.select[0].clone()];
        select.where_clause = Some(compare(
            CompareOp::Eq,
            events_field("team_id", ScalarType::Int),
            Expr::lit(Literal::Int(42)),
        ));
        select
    }

    #[test]
    fn daily_counts_read_the_rollup() {
        let mut ctx = Context::new(42, Catalog::for_team(42));
        let out = preaggregated(Query::Select(daily_shaped_select()), &mut ctx).unwrap();
        let select = out.first_select();

        let root = select.from.as_ref().unwrap();
        assert_eq!(root.table, TableExpr::Table { chain: vec!["events_daily".to_string()] });
        match &select.select[1].kind {
            ExprKind::Call { name, .. } => assert_eq!(name, "countMerge"),
            other => panic!("expected a merge call, got {other:?}"),
        }
        // the tenant guard survives against the rollup's own column
        let filter = format!("{}", select.where_clause.as_ref().unwrap());
        assert!(filter.contains("team_id = 42"));
    }

    #[test]
    fn day_aligned_time_ranges_map_onto_the_day_column() {
        use chrono::{TimeZone, Utc};

        let mut select = daily_shaped_select();
        let bound = compare(
            CompareOp::GtEq,
            events_field("timestamp", ScalarType::DateTime),
            Expr::lit(Literal::DateTime(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap())),
        );
        let guard = select.where_clause.take().unwrap();
        select.where_clause = Expr::conjoin(vec![guard, bound]);

        let mut ctx = Context::new(42, Catalog::for_team(42));
        let out = preaggregated(Query::Select(select), &mut ctx).unwrap();
        let select = out.first_select();
        assert_eq!(
            select.from.as_ref().unwrap().table,
            TableExpr::Table { chain: vec!["events_daily".to_string()] }
        );
        let filter = format!("{}", select.where_clause.as_ref().unwrap());
        assert!(filter.contains("events.day >= '2025-06-01'"), "{filter}");
    }

    #[test]
    fn intraday_time_bounds_keep_the_raw_table() {
        use chrono::{TimeZone, Utc};

        let mut select = daily_shaped_select();
        let bound = compare(
            CompareOp::Lt,
            events_field("timestamp", ScalarType::DateTime),
            Expr::lit(Literal::DateTime(Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap())),
        );
        let guard = select.where_clause.take().unwrap();
        select.where_clause = Expr::conjoin(vec![guard, bound]);

        let before = Query::Select(select);
        let mut ctx = Context::new(42, Catalog::for_team(42));
        let after = preaggregated(before.clone(), &mut ctx).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn plain_row_selects_are_never_rewritten() {
        let mut select = daily_shaped_select();
        select.select = vec![events_field("event", ScalarType::String)];
        select.group_by.clear();
        let before = Query::Select(select);
        let mut ctx = Context::new(42, Catalog::for_team(42));
        let after = preaggregated(before.clone(), &mut ctx).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn one_unmapped_item_keeps_the_raw_table() {
        let mut select = daily_shaped_select();
        select.select.push(Expr::typed(
            ExprKind::Call {
                name: "avg".to_string(),
                args: vec![events_field("person_id", ScalarType::Uuid)],
                distinct: false,
            },
            ExprType::scalar_of(ScalarType::Float),
        ));
        let before = Query::Select(select);
        let mut ctx = Context::new(42, Catalog::for_team(42));
        let after = preaggregated(before.clone(), &mut ctx).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn sampled_queries_are_never_rewritten() {
        let mut select = daily_shaped_select();
        select.sample = Some(ordered_float::OrderedFloat(0.1));
        let before = Query::Select(select);
        let mut ctx = Context::new(42, Catalog::for_team(42));
        let after = preaggregated(before.clone(), &mut ctx).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn rewriting_is_idempotent() {
        let mut ctx = Context::new(42, Catalog::for_team(42));
        let once = preaggregated(Query::Select(daily_shaped_select()), &mut ctx).unwrap();
        let twice = preaggregated(once.clone(), &mut ctx).unwrap();
        assert_eq!(once, twice);
    }
}
