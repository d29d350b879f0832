use crate::ast::{map_queries, CompareOp, Expr, ExprKind, ExprType, Literal, Query, ScalarType};
use crate::context::Context;
use crate::error::QueryError;

/// Add coarse date bounds next to fine timestamp bounds.
///
/// The events table is partitioned by day; a conjunct like
/// `timestamp >= '2025-06-01 12:30:00'` only prunes partitions when an
/// equivalent `toDate(timestamp) >= '2025-06-01'` bound sits beside it. The
/// fine predicate stays authoritative; the hint is redundant by
/// construction.
pub fn timestamp_hints(query: Query, ctx: &mut Context) -> Result<Query, QueryError> {
    let _ = ctx;
    map_queries(query, &mut |mut select| {
        let Some(where_clause) = select.where_clause.take() else {
            return Ok(select);
        };
        let existing: Vec<Expr> = where_clause.conjuncts().into_iter().cloned().collect();
        let mut hints = Vec::new();
        for conjunct in &existing {
            if let Some(hint) = date_hint(conjunct) {
                if !existing.contains(&hint) && !hints.contains(&hint) {
                    hints.push(hint);
                }
            }
        }
        let mut all = existing;
        all.extend(hints);
        select.where_clause = Expr::conjoin(all);
        Ok(select)
    })
}

fn date_hint(conjunct: &Expr) -> Option<Expr> {
    let ExprKind::Compare { op, left, right } = &conjunct.kind else { return None };
    if !op.is_range() {
        return None;
    }
    match &left.ty {
        Some(ExprType::Field { table, name, ty: ScalarType::DateTime, .. })
            if table == "events" && name == "timestamp" => {}
        _ => return None,
    }
    let ExprKind::Literal(Literal::DateTime(at)) = &right.kind else { return None };

    let coarse_op = match op {
        CompareOp::Gt | CompareOp::GtEq => CompareOp::GtEq,
        CompareOp::Lt | CompareOp::LtEq => CompareOp::LtEq,
        _ => return None,
    };
    let day = Expr::typed(
        ExprKind::Call { name: "toDate".to_string(), args: vec![(**left).clone()], distinct: false },
        ExprType::scalar_of(ScalarType::Date),
    );
    Some(Expr::typed(
        ExprKind::Compare {
            op: coarse_op,
            left: Box::new(day),
            right: Box::new(Expr::typed(
                ExprKind::Literal(Literal::Date(at.date_naive())),
                ExprType::scalar_of(ScalarType::Date),
            )),
        },
        ExprType::scalar_of(ScalarType::Bool),
    ))
}
