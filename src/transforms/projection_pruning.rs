use std::collections::{HashMap, HashSet};

use crate::ast::{
    for_each_select_expr, ExprKind, ExprType, JoinExpr, Query, SelectQuery, SelectSetQuery, TableExpr,
};
use crate::context::Context;
use crate::error::QueryError;

/// Drop wildcard-born columns that no outer expression reads.
///
/// Only select items marked as wildcard expansions are candidates; anything
/// the author spelled out survives even when unreferenced. A projection
/// never prunes to zero columns, and set-operation branches prune by the
/// same positions so the branches stay union-compatible.
pub fn projection_pruning(query: Query, ctx: &mut Context) -> Result<Query, QueryError> {
    let _ = ctx;
    prune_query(query)
}

fn prune_query(query: Query) -> Result<Query, QueryError> {
    match query {
        Query::Select(select) => Ok(Query::Select(prune_select(select)?)),
        Query::Set(set) => {
            let initial = prune_query(*set.initial)?;
            let branches = set
                .branches
                .into_iter()
                .map(|(op, b)| Ok((op, prune_query(b)?)))
                .collect::<Result<Vec<_>, QueryError>>()?;
            Ok(Query::Set(SelectSetQuery { initial: Box::new(initial), branches }))
        }
    }
}

fn prune_select(mut select: SelectQuery) -> Result<SelectQuery, QueryError> {
    let mut demand: HashMap<String, HashSet<String>> = HashMap::new();
    collect_demand(&select, &mut demand);

    select.from = match select.from {
        Some(root) => Some(prune_join(root, &demand)?),
        None => None,
    };

    // expression-position subqueries keep their own projection (a scalar
    // position reads exactly one column) but still prune inside
    crate::ast::map_select_exprs(select, &mut |e| match e.kind {
        ExprKind::Subquery(inner) => {
            let pruned = prune_query(*inner)?;
            Ok(crate::ast::Expr {
                kind: ExprKind::Subquery(Box::new(pruned)),
                span: e.span,
                ty: e.ty,
                from_wildcard: e.from_wildcard,
            })
        }
        _ => Ok(e),
    })
}

fn prune_join(mut entry: JoinExpr, demand: &HashMap<String, HashSet<String>>) -> Result<JoinExpr, QueryError> {
    if let TableExpr::Subquery(inner) = entry.table {
        let wanted = entry.resolved.as_ref().map(|r| r.alias()).and_then(|alias| demand.get(alias));
        let inner = prune_projection(*inner, wanted);
        let inner = prune_query(inner)?;
        entry.table = TableExpr::Subquery(Box::new(inner));
    }
    entry.next = match entry.next {
        Some(next) => Some(Box::new(prune_join(*next, demand)?)),
        None => None,
    };
    Ok(entry)
}

/// Every (alias, column) pair this select reads, including reads made by
/// correlated expression subqueries. Over-collection is safe; it only keeps
/// more columns alive.
fn collect_demand(select: &SelectQuery, demand: &mut HashMap<String, HashSet<String>>) {
    for_each_select_expr(select, &mut |e| {
        match &e.ty {
            Some(ExprType::SelectField { source_alias, name, .. }) => {
                demand.entry(source_alias.clone()).or_default().insert(name.clone());
            }
            Some(ExprType::Property { table_alias, json_column, .. }) => {
                demand.entry(table_alias.clone()).or_default().insert(json_column.clone());
            }
            Some(ExprType::Field { table_alias, name, .. }) => {
                demand.entry(table_alias.clone()).or_default().insert(name.clone());
            }
            _ => {}
        }
        if let ExprKind::Subquery(inner) = &e.kind {
            collect_demand_query(inner, demand);
        }
    });
}

fn collect_demand_query(query: &Query, demand: &mut HashMap<String, HashSet<String>>) {
    match query {
        Query::Select(select) => collect_demand(select, demand),
        Query::Set(set) => {
            collect_demand_query(&set.initial, demand);
            for (_, branch) in &set.branches {
                collect_demand_query(branch, demand);
            }
        }
    }
}

fn prune_projection(query: Query, wanted: Option<&HashSet<String>>) -> Query {
    let first = query.first_select();
    let mut kept: Vec<usize> = first
        .select
        .iter()
        .enumerate()
        .filter(|(_, item)| {
            if !item.from_wildcard {
                return true;
            }
            match item.output_name() {
                Some(name) => wanted.map(|w| w.contains(name)).unwrap_or(false),
                None => true,
            }
        })
        .map(|(index, _)| index)
        .collect();
    if kept.is_empty() {
        kept.push(0);
    }
    if kept.len() == first.select.len() {
        return query;
    }
    apply_kept(query, &kept)
}

fn apply_kept(query: Query, kept: &[usize]) -> Query {
    match query {
        Query::Select(mut select) => {
            select.select = select
                .select
                .into_iter()
                .enumerate()
                .filter(|(index, _)| kept.contains(index))
                .map(|(_, item)| item)
                .collect();
            Query::Select(select)
        }
        Query::Set(set) => {
            let initial = apply_kept(*set.initial, kept);
            let branches = set.branches.into_iter().map(|(op, b)| (op, apply_kept(b, kept))).collect();
            Query::Set(SelectSetQuery { initial: Box::new(initial), branches })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, ResolvedTable, ScalarType, SetOp};
    use crate::catalog::Catalog;

    fn wildcard_field(alias: &str, name: &str) -> Expr {
        let mut e = Expr::typed(
            ExprKind::Field { chain: vec![alias.to_string(), name.to_string()] },
            ExprType::Field {
                table_alias: alias.to_string(),
                table: "events".to_string(),
                name: name.to_string(),
                physical: name.to_string(),
                ty: ScalarType::String,
                nullable: false,
            },
        );
        e.from_wildcard = true;
        e
    }

    fn select_field(alias: &str, name: &str) -> Expr {
        Expr::typed(
            ExprKind::Field { chain: vec![alias.to_string(), name.to_string()] },
            ExprType::SelectField {
                source_alias: alias.to_string(),
                name: name.to_string(),
                ty: ScalarType::String,
                nullable: false,
            },
        )
    }

    fn inner_events_select() -> SelectQuery {
        SelectQuery::new(
            vec![
                wildcard_field("events", "uuid"),
                wildcard_field("events", "event"),
                wildcard_field("events", "timestamp"),
            ],
            Some(JoinExpr::table(&["events"])),
        )
    }

    fn outer_over(inner: Query, select: Vec<Expr>) -> Query {
        let mut entry = JoinExpr::subquery(inner, "sub");
        entry.resolved = Some(ResolvedTable::SubqueryRef { alias: "sub".to_string() });
        Query::Select(SelectQuery::new(select, Some(entry)))
    }

    fn inner_names(query: &Query) -> Vec<String> {
        let root = query.first_select().from.as_ref().unwrap();
        let TableExpr::Subquery(inner) = &root.table else { panic!("expected subquery") };
        inner.first_select().select.iter().filter_map(|e| e.output_name().map(str::to_string)).collect()
    }

    #[test]
    fn unread_wildcard_columns_are_dropped() {
        let query = outer_over(Query::Select(inner_events_select()), vec![select_field("sub", "event")]);
        let mut ctx = Context::new(1, Catalog::for_team(1));
        let out = projection_pruning(query, &mut ctx).unwrap();
        assert_eq!(inner_names(&out), vec!["event"]);
    }

    #[test]
    fn authored_columns_always_survive() {
        let mut inner = inner_events_select();
        inner.select[0].from_wildcard = false; // as if the author typed `uuid, *`
        let query = outer_over(Query::Select(inner), vec![select_field("sub", "event")]);
        let mut ctx = Context::new(1, Catalog::for_team(1));
        let out = projection_pruning(query, &mut ctx).unwrap();
        assert_eq!(inner_names(&out), vec!["uuid", "event"]);
    }

    #[test]
    fn a_projection_never_prunes_to_zero() {
        let query = outer_over(
            Query::Select(inner_events_select()),
            vec![Expr::lit(crate::ast::Literal::Int(1))],
        );
        let mut ctx = Context::new(1, Catalog::for_team(1));
        let out = projection_pruning(query, &mut ctx).unwrap();
        assert_eq!(inner_names(&out), vec!["uuid"]);
    }

    #[test]
    fn set_branches_prune_the_same_positions() {
        let set = Query::Set(SelectSetQuery {
            initial: Box::new(Query::Select(inner_events_select())),
            branches: vec![(SetOp::UnionAll, Query::Select(inner_events_select()))],
        });
        let query = outer_over(set, vec![select_field("sub", "event")]);
        let mut ctx = Context::new(1, Catalog::for_team(1));
        let out = projection_pruning(query, &mut ctx).unwrap();

        let root = out.first_select().from.as_ref().unwrap();
        let TableExpr::Subquery(inner) = &root.table else { panic!("expected subquery") };
        let Query::Set(set) = inner.as_ref() else { panic!("expected set op") };
        assert_eq!(set.initial.first_select().select.len(), 1);
        let (_, branch) = &set.branches[0];
        assert_eq!(branch.first_select().select.len(), 1);
    }
}
