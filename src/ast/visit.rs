use crate::ast::{Expr, ExprKind, JoinExpr, Query, SelectQuery, SelectSetQuery, TableExpr};
use crate::error::QueryError;

/// Walk an expression tree in pre-order, including the root. Does not
/// descend into `Subquery` nodes; callers that need nested statements walk
/// those through `map_queries`.
pub fn for_each_expr<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a Expr)) {
    f(expr);
    match &expr.kind {
        ExprKind::Literal(_) | ExprKind::Field { .. } | ExprKind::Asterisk { .. } | ExprKind::Subquery(_) => {}
        ExprKind::Call { args, .. } => {
            for a in args {
                for_each_expr(a, f);
            }
        }
        ExprKind::Arithmetic { left, right, .. } | ExprKind::Compare { left, right, .. } => {
            for_each_expr(left, f);
            for_each_expr(right, f);
        }
        ExprKind::And(parts) | ExprKind::Or(parts) | ExprKind::Tuple(parts) => {
            for p in parts {
                for_each_expr(p, f);
            }
        }
        ExprKind::Not(inner) => for_each_expr(inner, f),
        ExprKind::Alias { expr, .. } => for_each_expr(expr, f),
    }
}

/// Visit every expression position of a select: select list, WHERE,
/// GROUP BY, HAVING, ORDER BY, LIMIT/OFFSET and all join constraints.
pub fn for_each_select_expr<'a>(query: &'a SelectQuery, f: &mut impl FnMut(&'a Expr)) {
    for e in &query.select {
        for_each_expr(e, f);
    }
    if let Some(w) = &query.where_clause {
        for_each_expr(w, f);
    }
    for e in &query.group_by {
        for_each_expr(e, f);
    }
    if let Some(h) = &query.having {
        for_each_expr(h, f);
    }
    for o in &query.order_by {
        for_each_expr(&o.expr, f);
    }
    if let Some(l) = &query.limit {
        for_each_expr(l, f);
    }
    if let Some(o) = &query.offset {
        for_each_expr(o, f);
    }
    if let Some(from) = &query.from {
        for entry in from.iter() {
            if let Some(c) = &entry.constraint {
                for_each_expr(c, f);
            }
        }
    }
}

/// Rebuild an expression bottom-up. Children are mapped before their
/// parent. Does not enter `Subquery` nodes.
pub fn try_map_expr(expr: Expr, f: &mut impl FnMut(Expr) -> Result<Expr, QueryError>) -> Result<Expr, QueryError> {
    let Expr { kind, span, ty, from_wildcard } = expr;
    let kind = match kind {
        ExprKind::Literal(_) | ExprKind::Field { .. } | ExprKind::Asterisk { .. } | ExprKind::Subquery(_) => kind,
        ExprKind::Call { name, args, distinct } => {
            let args = args.into_iter().map(|a| try_map_expr(a, f)).collect::<Result<Vec<_>, _>>()?;
            ExprKind::Call { name, args, distinct }
        }
        ExprKind::Arithmetic { op, left, right } => ExprKind::Arithmetic {
            op,
            left: Box::new(try_map_expr(*left, f)?),
            right: Box::new(try_map_expr(*right, f)?),
        },
        ExprKind::Compare { op, left, right } => ExprKind::Compare {
            op,
            left: Box::new(try_map_expr(*left, f)?),
            right: Box::new(try_map_expr(*right, f)?),
        },
        ExprKind::And(parts) => {
            ExprKind::And(parts.into_iter().map(|p| try_map_expr(p, f)).collect::<Result<Vec<_>, _>>()?)
        }
        ExprKind::Or(parts) => {
            ExprKind::Or(parts.into_iter().map(|p| try_map_expr(p, f)).collect::<Result<Vec<_>, _>>()?)
        }
        ExprKind::Not(inner) => ExprKind::Not(Box::new(try_map_expr(*inner, f)?)),
        ExprKind::Alias { name, expr } => ExprKind::Alias { name, expr: Box::new(try_map_expr(*expr, f)?) },
        ExprKind::Tuple(items) => {
            ExprKind::Tuple(items.into_iter().map(|i| try_map_expr(i, f)).collect::<Result<Vec<_>, _>>()?)
        }
    };
    f(Expr { kind, span, ty, from_wildcard })
}

pub fn map_expr(expr: Expr, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
    // infallible wrapper; the closure below never returns Err
    match try_map_expr(expr, &mut |e| Ok(f(e))) {
        Ok(e) => e,
        Err(_) => unreachable!(),
    }
}

/// Apply `f` to every expression position of a select, bottom-up within
/// each tree. Nested statements are not entered.
pub fn map_select_exprs(
    query: SelectQuery,
    f: &mut impl FnMut(Expr) -> Result<Expr, QueryError>,
) -> Result<SelectQuery, QueryError> {
    let SelectQuery {
        select,
        from,
        where_clause,
        group_by,
        having,
        order_by,
        limit,
        offset,
        distinct,
        sample,
        ctes,
        span,
    } = query;

    let select = select.into_iter().map(|e| try_map_expr(e, f)).collect::<Result<Vec<_>, _>>()?;
    let where_clause = where_clause.map(|w| try_map_expr(w, f)).transpose()?;
    let group_by = group_by.into_iter().map(|e| try_map_expr(e, f)).collect::<Result<Vec<_>, _>>()?;
    let having = having.map(|h| try_map_expr(h, f)).transpose()?;
    let order_by = order_by
        .into_iter()
        .map(|o| Ok(crate::ast::OrderByExpr { expr: try_map_expr(o.expr, f)?, ascending: o.ascending }))
        .collect::<Result<Vec<_>, QueryError>>()?;
    let limit = limit.map(|l| try_map_expr(l, f)).transpose()?;
    let offset = offset.map(|o| try_map_expr(o, f)).transpose()?;
    let from = match from {
        Some(root) => Some(map_join_constraints(root, f)?),
        None => None,
    };

    Ok(SelectQuery { select, from, where_clause, group_by, having, order_by, limit, offset, distinct, sample, ctes, span })
}

fn map_join_constraints(
    mut join: JoinExpr,
    f: &mut impl FnMut(Expr) -> Result<Expr, QueryError>,
) -> Result<JoinExpr, QueryError> {
    join.constraint = join.constraint.map(|c| try_map_expr(c, f)).transpose()?;
    join.next = match join.next {
        Some(next) => Some(Box::new(map_join_constraints(*next, f)?)),
        None => None,
    };
    Ok(join)
}

/// Rebuild every `SelectQuery` in a statement bottom-up: subqueries in the
/// join chain, subqueries in expression position, CTE bodies and set-op
/// branches are transformed before the enclosing select. This is the
/// traversal backbone of the transform passes; passes construct replacement
/// subtrees and never alias a node into two positions.
pub fn map_queries(
    query: Query,
    f: &mut impl FnMut(SelectQuery) -> Result<SelectQuery, QueryError>,
) -> Result<Query, QueryError> {
    match query {
        Query::Select(select) => Ok(Query::Select(map_queries_in_select(select, f)?)),
        Query::Set(set) => {
            let initial = map_queries(*set.initial, f)?;
            let mut branches = Vec::with_capacity(set.branches.len());
            for (op, branch) in set.branches {
                branches.push((op, map_queries(branch, f)?));
            }
            Ok(Query::Set(SelectSetQuery { initial: Box::new(initial), branches }))
        }
    }
}

fn map_queries_in_select(
    mut select: SelectQuery,
    f: &mut impl FnMut(SelectQuery) -> Result<SelectQuery, QueryError>,
) -> Result<SelectQuery, QueryError> {
    select.from = match select.from {
        Some(root) => Some(map_queries_in_join(root, f)?),
        None => None,
    };

    let mut ctes = indexmap::IndexMap::new();
    for (name, cte) in select.ctes {
        ctes.insert(name, map_queries(cte, f)?);
    }
    select.ctes = ctes;

    let select = map_select_exprs(select, &mut |e| match e.kind {
        ExprKind::Subquery(inner) => {
            let mapped = map_queries(*inner, f)?;
            Ok(Expr { kind: ExprKind::Subquery(Box::new(mapped)), span: e.span, ty: e.ty, from_wildcard: e.from_wildcard })
        }
        _ => Ok(e),
    })?;

    f(select)
}

fn map_queries_in_join(
    mut join: JoinExpr,
    f: &mut impl FnMut(SelectQuery) -> Result<SelectQuery, QueryError>,
) -> Result<JoinExpr, QueryError> {
    join.table = match join.table {
        TableExpr::Subquery(inner) => TableExpr::Subquery(Box::new(map_queries(*inner, f)?)),
        table => table,
    };
    join.next = match join.next {
        Some(next) => Some(Box::new(map_queries_in_join(*next, f)?)),
        None => None,
    };
    Ok(join)
}
