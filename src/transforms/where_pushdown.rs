use crate::ast::{
    map_queries, Expr, ExprKind, ExprType, JoinExpr, Query, ResolvedTable, ScalarType, TableExpr,
};
use crate::catalog::Materializer;
use crate::context::Context;
use crate::error::QueryError;

/// Clone qualifying outer WHERE conjuncts into materialized lazy-join
/// subqueries, so the aggregation inside scans fewer rows.
///
/// Conservative on both axes: only top-level conjuncts (never disjunction
/// branches), and only predicates on columns the join declares a pushdown
/// mapping for. The outer predicate always stays in place; the clone is a
/// pure row-count optimization.
pub fn where_pushdown(query: Query, ctx: &mut Context) -> Result<Query, QueryError> {
    let _ = ctx;
    map_queries(query, &mut |mut select| {
        let Some(where_clause) = select.where_clause.clone() else {
            return Ok(select);
        };
        let conjuncts: Vec<Expr> = where_clause.conjuncts().into_iter().cloned().collect();
        let mut cursor = select.from.as_mut();
        while let Some(entry) = cursor {
            push_into_entry(entry, &conjuncts);
            cursor = entry.next.as_deref_mut();
        }
        Ok(select)
    })
}

fn materializer_for(table: &str) -> Option<Materializer> {
    match table {
        "persons" => Some(Materializer::PersonJoin),
        "sessions" => Some(Materializer::SessionJoin),
        "groups" => Some(Materializer::GroupJoin(0)),
        _ => None,
    }
}

fn push_into_entry(entry: &mut JoinExpr, conjuncts: &[Expr]) {
    let (table, alias) = match &entry.resolved {
        Some(ResolvedTable::LazyMaterialized { table, alias }) => (table.clone(), alias.clone()),
        _ => return,
    };
    // only joins hung off a source row have an outer side to push from
    let Some((source, _)) = alias.split_once("__") else { return };
    let Some(join) = materializer_for(&table) else { return };

    let TableExpr::Subquery(inner) = &mut entry.table else { return };
    let Query::Select(inner_select) = inner.as_mut() else { return };
    let (inner_table, inner_alias) = match inner_select.from.as_ref().and_then(|f| f.resolved.as_ref()) {
        Some(ResolvedTable::Catalog { table, alias }) => (table.name.clone(), alias.clone()),
        _ => return,
    };

    for conjunct in conjuncts {
        let ExprKind::Compare { op, left, right } = &conjunct.kind else { continue };
        if !matches!(right.kind, ExprKind::Literal(_)) {
            continue;
        }
        let Some(ExprType::Field { table_alias, name, ty, .. }) = &left.ty else { continue };
        if table_alias != source {
            continue;
        }
        let Some(inner_column) = join.pushdown_column(name, *op) else { continue };

        let pushed = Expr::typed(
            ExprKind::Compare {
                op: *op,
                left: Box::new(Expr::typed(
                    ExprKind::Field { chain: vec![inner_alias.clone(), inner_column.to_string()] },
                    ExprType::Field {
                        table_alias: inner_alias.clone(),
                        table: inner_table.clone(),
                        name: inner_column.to_string(),
                        physical: inner_column.to_string(),
                        ty: *ty,
                        nullable: false,
                    },
                )),
                right: right.clone(),
            },
            ExprType::scalar_of(ScalarType::Bool),
        );

        let already = inner_select
            .where_clause
            .as_ref()
            .map(|w| w.conjuncts().into_iter().any(|c| *c == pushed))
            .unwrap_or(false);
        if already {
            continue;
        }
        let existing = inner_select.where_clause.take();
        inner_select.where_clause = Expr::conjoin(match existing {
            Some(w) => vec![w, pushed],
            None => vec![pushed],
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompareOp, JoinKind, Literal, SelectQuery};
    use crate::catalog::Catalog;
    use chrono::{TimeZone, Utc};

    fn field(alias: &str, table: &str, name: &str, ty: ScalarType) -> Expr {
        Expr::typed(
            ExprKind::Field { chain: vec![alias.to_string(), name.to_string()] },
            ExprType::Field {
                table_alias: alias.to_string(),
                table: table.to_string(),
                name: name.to_string(),
                physical: name.to_string(),
                ty,
                nullable: false,
            },
        )
    }

    fn cmp(op: CompareOp, left: Expr, right: Expr) -> Expr {
        Expr::typed(
            ExprKind::Compare { op, left: Box::new(left), right: Box::new(right) },
            ExprType::scalar_of(ScalarType::Bool),
        )
    }

    /// events joined to a materialized session aggregate, the shape the
    /// resolver produces for `events.session.duration`.
    fn joined_select(filter: Expr) -> SelectQuery {
        let catalog = Catalog::for_team(1);

        let mut inner_from = JoinExpr::table(&["raw_sessions"]);
        inner_from.resolved = Some(ResolvedTable::Catalog {
            table: catalog.get_table("raw_sessions", None).unwrap(),
            alias: "raw_sessions".to_string(),
        });
        let inner = SelectQuery::new(
            vec![Expr::alias("session_id", field("raw_sessions", "raw_sessions", "session_id", ScalarType::String))],
            Some(inner_from),
        );

        let mut join = JoinExpr::subquery(inner.into(), "events__session")
            .with_join(JoinKind::Left, None);
        join.resolved = Some(ResolvedTable::LazyMaterialized {
            table: "sessions".to_string(),
            alias: "events__session".to_string(),
        });

        let mut root = JoinExpr::table(&["events"]);
        root.resolved = Some(ResolvedTable::Catalog {
            table: catalog.get_table("events", None).unwrap(),
            alias: "events".to_string(),
        });
        root.push(join);

        let mut select = SelectQuery::new(vec![field("events", "events", "event", ScalarType::String)], Some(root));
        select.where_clause = Some(filter);
        select
    }

    fn inner_where(query: &Query) -> Option<String> {
        let root = query.first_select().from.as_ref().unwrap();
        let join = root.next.as_ref().unwrap();
        let TableExpr::Subquery(inner) = &join.table else { panic!("expected a subquery join") };
        inner.first_select().where_clause.as_ref().map(|w| format!("{w}"))
    }

    fn timestamp_bound(op: CompareOp) -> Expr {
        cmp(
            op,
            field("events", "events", "timestamp", ScalarType::DateTime),
            Expr::lit(Literal::DateTime(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap())),
        )
    }

    #[test]
    fn upper_timestamp_bounds_are_cloned_into_the_session_subquery() {
        let mut ctx = Context::new(1, Catalog::for_team(1));
        let out =
            where_pushdown(Query::Select(joined_select(timestamp_bound(CompareOp::LtEq))), &mut ctx)
                .unwrap();

        let pushed = inner_where(&out).unwrap();
        assert!(pushed.contains("min_timestamp"), "expected pushed bound, got {pushed}");
        // the outer predicate stays
        assert!(out.first_select().where_clause.is_some());
    }

    #[test]
    fn lower_timestamp_bounds_stay_outside() {
        // a session whose earliest chunk precedes the cutoff can still own
        // matching events, so its rows must all reach the aggregation
        let mut ctx = Context::new(1, Catalog::for_team(1));
        let out =
            where_pushdown(Query::Select(joined_select(timestamp_bound(CompareOp::GtEq))), &mut ctx)
                .unwrap();
        assert!(inner_where(&out).is_none());
    }

    #[test]
    fn unmapped_columns_stay_outside() {
        let filter = cmp(
            CompareOp::Eq,
            field("events", "events", "event", ScalarType::String),
            Expr::lit(Literal::string("page_view")),
        );
        let mut ctx = Context::new(1, Catalog::for_team(1));
        let out = where_pushdown(Query::Select(joined_select(filter)), &mut ctx).unwrap();
        assert!(inner_where(&out).is_none());
    }

    #[test]
    fn disjunction_branches_are_never_pushed() {
        let filter = Expr::typed(
            ExprKind::Or(vec![
                timestamp_bound(CompareOp::LtEq),
                cmp(
                    CompareOp::Eq,
                    field("events", "events", "event", ScalarType::String),
                    Expr::lit(Literal::string("x")),
                ),
            ]),
            ExprType::scalar_of(ScalarType::Bool),
        );
        let mut ctx = Context::new(1, Catalog::for_team(1));
        let out = where_pushdown(Query::Select(joined_select(filter)), &mut ctx).unwrap();
        assert!(inner_where(&out).is_none());
    }

    #[test]
    fn pushing_twice_adds_nothing() {
        let mut ctx = Context::new(1, Catalog::for_team(1));
        let once =
            where_pushdown(Query::Select(joined_select(timestamp_bound(CompareOp::LtEq))), &mut ctx)
                .unwrap();
        let twice = where_pushdown(once.clone(), &mut ctx).unwrap();
        assert_eq!(once, twice);
    }
}
