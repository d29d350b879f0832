use std::sync::Arc;

use crate::ast::{
    map_queries, CompareOp, Expr, ExprKind, ExprType, JoinExpr, Literal, Query, ResolvedTable, ScalarType,
    SelectQuery,
};
use crate::catalog::{AccessPolicy, TableDef};
use crate::context::{Context, Principal};
use crate::error::QueryError;

/// Enforce row-level denials on access-controlled tables.
///
/// For every reference to a table with an access policy, when the principal
/// is a non-admin with at least one explicit denial on that resource kind,
/// a predicate restricts rows to those the principal created or whose id is
/// not on their denial list. Admins and principals without denials compile
/// without the predicate.
pub fn access_guards(query: Query, ctx: &mut Context) -> Result<Query, QueryError> {
    let Some(principal) = ctx.principal.clone() else {
        return Ok(query);
    };
    if principal.is_admin {
        return Ok(query);
    }
    let Ok(denials) = ctx.catalog.get_table("access_denials", None) else {
        return Ok(query);
    };
    let team_id = ctx.team_id;

    map_queries(query, &mut |mut select| {
        let mut guards: Vec<(String, Expr, bool)> = Vec::new(); // (alias, predicate, is_root)
        let mut is_root = true;
        let mut cursor = select.from.as_ref();
        while let Some(entry) = cursor {
            if let Some(ResolvedTable::Catalog { table, alias }) = &entry.resolved {
                if let Some(policy) = &table.access {
                    if principal.has_denials_on(&policy.resource) {
                        let predicate =
                            guard_predicate(alias, &table.name, policy, &principal, team_id, &denials);
                        guards.push((alias.clone(), predicate, is_root));
                    }
                }
            }
            is_root = false;
            cursor = entry.next.as_deref();
        }

        for (alias, predicate, at_root) in guards {
            if at_root {
                let present = select
                    .where_clause
                    .as_ref()
                    .map(|w| w.conjuncts().into_iter().any(|c| *c == predicate))
                    .unwrap_or(false);
                if present {
                    continue;
                }
                let existing = select.where_clause.take();
                select.where_clause = Expr::conjoin(match existing {
                    Some(w) => vec![w, predicate],
                    None => vec![predicate],
                });
            } else if let Some(root) = select.from.as_mut() {
                attach_to_join(root, &alias, predicate)?;
            }
        }
        Ok(select)
    })
}

/// Conjoin the guard into the constraint of the chain entry it was built
/// for. Each reference guards independently; a guard with no matching entry
/// means the chain changed underneath us.
fn attach_to_join(root: &mut JoinExpr, alias: &str, predicate: Expr) -> Result<(), QueryError> {
    let mut cursor = Some(root);
    while let Some(entry) = cursor {
        if entry.resolved.as_ref().map(|r| r.alias()) == Some(alias) {
            let present = entry
                .constraint
                .as_ref()
                .map(|c| c.conjuncts().into_iter().any(|part| *part == predicate))
                .unwrap_or(false);
            if !present {
                let existing = entry.constraint.take();
                entry.constraint = Expr::conjoin(match existing {
                    Some(c) => vec![c, predicate],
                    None => vec![predicate],
                });
            }
            return Ok(());
        }
        cursor = entry.next.as_deref_mut();
    }
    Err(QueryError::internal(format!("no join entry found for access-guarded alias \"{alias}\"")))
}

fn guard_predicate(
    alias: &str,
    table: &str,
    policy: &AccessPolicy,
    principal: &Principal,
    team_id: i64,
    denials: &Arc<TableDef>,
) -> Expr {
    let mine = compare(
        CompareOp::Eq,
        field(alias, table, &policy.created_by_column, ScalarType::Int),
        int_lit(principal.user_id),
    );

    let denial_list = denial_subquery(policy, principal, team_id, denials);
    let not_denied = Expr::typed(
        ExprKind::Compare {
            op: CompareOp::NotIn,
            left: Box::new(field(alias, table, &policy.id_column, ScalarType::Int)),
            right: Box::new(Expr::typed(
                ExprKind::Subquery(Box::new(Query::Select(denial_list))),
                ExprType::Scalar { ty: ScalarType::Int, nullable: true },
            )),
        },
        ExprType::scalar_of(ScalarType::Bool),
    );

    Expr::typed(ExprKind::Or(vec![mine, not_denied]), ExprType::scalar_of(ScalarType::Bool))
}

fn denial_subquery(
    policy: &AccessPolicy,
    principal: &Principal,
    team_id: i64,
    denials: &Arc<TableDef>,
) -> SelectQuery {
    let d = "access_denials";
    let mut from = JoinExpr::table(&[d]);
    from.resolved = Some(ResolvedTable::Catalog { table: Arc::clone(denials), alias: d.to_string() });

    let mut select =
        SelectQuery::new(vec![field(d, d, "resource_id", ScalarType::Int)], Some(from));
    select.where_clause = Expr::conjoin(vec![
        compare(CompareOp::Eq, field(d, d, "team_id", ScalarType::Int), int_lit(team_id)),
        compare(
            CompareOp::Eq,
            field(d, d, "resource", ScalarType::String),
            Expr::typed(
                ExprKind::Literal(Literal::string(&policy.resource)),
                ExprType::scalar_of(ScalarType::String),
            ),
        ),
        compare(CompareOp::Eq, field(d, d, "user_id", ScalarType::Int), int_lit(principal.user_id)),
    ]);
    select
}

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

fn int_lit(value: i64) -> Expr {
    Expr::typed(ExprKind::Literal(Literal::Int(value)), ExprType::scalar_of(ScalarType::Int))
}

fn compare(op: CompareOp, left: Expr, right: Expr) -> Expr {
    Expr::typed(
        ExprKind::Compare { op, left: Box::new(left), right: Box::new(right) },
        ExprType::scalar_of(ScalarType::Bool),
    )
}
