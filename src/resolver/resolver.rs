use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::ast::{
    CompareOp, Expr, ExprKind, ExprType, JoinExpr, Literal, Query, ResolvedTable, ScalarType, SelectQuery,
    SelectSetQuery, Span, TableExpr, for_each_select_expr, map_expr,
};
use crate::catalog::{FieldKind, Materializer, TableDef, TableKind};
use crate::context::{Context, Notice, PersonJoinMode};
use crate::error::{QueryError, ResolutionError};
use crate::resolver::{
    call_return_type, expected_arity, is_aggregate, query_output_columns, LazyDemand, LazyDemands, ScopeTable,
    Scopes,
};

/// A physical table reference that must receive a tenant-scope guard.
struct GuardTarget {
    alias: String,
    column: String,
    table: Arc<TableDef>,
}

/// Resolve an untyped statement: assign a type to every expression, expand
/// wildcards, materialize demanded lazy joins, and inject tenant-scope
/// guards. The returned tree is ready for the transform pipeline.
pub fn resolve_query(query: Query, ctx: &mut Context) -> Result<Query, QueryError> {
    let mut resolver = Resolver { ctx, scopes: Scopes::default(), aggregate_depth: 0 };
    resolver.resolve(query)
}

struct Resolver<'c> {
    ctx: &'c mut Context,
    scopes: Scopes,
    aggregate_depth: usize,
}

impl<'c> Resolver<'c> {
    fn resolve(&mut self, query: Query) -> Result<Query, QueryError> {
        match query {
            Query::Select(select) => Ok(Query::Select(self.resolve_select(select)?)),
            Query::Set(set) => {
                let initial = self.resolve(*set.initial)?;
                let width = initial.first_select().select.len();
                let mut branches = Vec::with_capacity(set.branches.len());
                for (op, branch) in set.branches {
                    let resolved = self.resolve(branch)?;
                    if resolved.first_select().select.len() != width {
                        return Err(ResolutionError::BadQuery {
                            message: "set operation branches must select the same number of columns".to_string(),
                            span: None,
                        }
                        .into());
                    }
                    branches.push((op, resolved));
                }
                Ok(Query::Set(SelectSetQuery { initial: Box::new(initial), branches }))
            }
        }
    }

    fn resolve_select(&mut self, query: SelectQuery) -> Result<SelectQuery, QueryError> {
        self.scopes.push();
        let result = self.resolve_select_inner(query);
        self.scopes.pop();
        result
    }

    fn resolve_select_inner(&mut self, mut query: SelectQuery) -> Result<SelectQuery, QueryError> {
        for (name, cte) in &query.ctes {
            self.scopes.current_mut().ctes.insert(name.clone(), cte.clone());
        }

        // demand for lazy tables referenced directly in FROM has to be known
        // before the join chain resolves, so pre-scan the unresolved tree
        let from_lazy = self.collect_from_lazy_demand(&query);

        let mut guards: Vec<GuardTarget> = Vec::new();
        let mut demand = LazyDemands::default();
        let mut root_alias: Option<String> = None;
        query.from = match query.from.take() {
            Some(root) => {
                let resolved = self.resolve_join_chain(root, &from_lazy, &mut guards, &mut demand)?;
                root_alias = resolved.resolved.as_ref().map(|r| r.alias().to_string());
                Some(resolved)
            }
            None => None,
        };

        query.select = self.expand_wildcards(std::mem::take(&mut query.select))?;

        query.select = query
            .select
            .into_iter()
            .map(|e| self.resolve_expr(e, &mut demand))
            .collect::<Result<Vec<_>, _>>()?;
        query.where_clause = query.where_clause.take().map(|e| self.resolve_expr(e, &mut demand)).transpose()?;
        query.group_by = query
            .group_by
            .into_iter()
            .map(|e| self.resolve_expr(e, &mut demand))
            .collect::<Result<Vec<_>, _>>()?;
        query.having = query.having.take().map(|e| self.resolve_expr(e, &mut demand)).transpose()?;
        for order in &mut query.order_by {
            let expr = std::mem::replace(&mut order.expr, Expr::lit(Literal::Null));
            order.expr = self.resolve_expr(expr, &mut demand)?;
        }
        query.limit = query.limit.take().map(|e| self.resolve_expr(e, &mut demand)).transpose()?;
        query.offset = query.offset.take().map(|e| self.resolve_expr(e, &mut demand)).transpose()?;

        // materialize demanded lazy joins; the generated subtrees may demand
        // further joins, so loop to a fixpoint
        while !demand.is_empty() {
            let batch = demand.take();
            for (join_alias, lazy) in batch {
                let entry = self.ctx.catalog.resolve_lazy(&lazy.join, &lazy.source_alias, &join_alias, &lazy.fields)?;
                let entry = self.resolve_lazy_entry(entry, &join_alias, &lazy, &mut demand)?;
                match query.from.as_mut() {
                    Some(root) => root.push(entry),
                    None => return Err(QueryError::internal("lazy join demanded without a FROM clause")),
                }
            }
        }

        // one tenant guard per physical reference: the root table guards in
        // WHERE, joined tables guard in their join constraint
        for guard in guards {
            let predicate = self.scope_guard(&guard);
            if root_alias.as_deref() == Some(guard.alias.as_str()) {
                let existing = query.where_clause.take();
                query.where_clause = Expr::conjoin(match existing {
                    Some(w) => vec![predicate, w],
                    None => vec![predicate],
                });
            } else if let Some(root) = query.from.as_mut() {
                attach_join_guard(root, &guard.alias, predicate)?;
            }
        }

        // CTE bodies were inlined at each use site
        query.ctes.clear();
        Ok(query)
    }

    /// Field names demanded from lazy tables used directly in FROM, found
    /// by scanning the unresolved expressions. Wildcards demand every
    /// visible field.
    fn collect_from_lazy_demand(&self, query: &SelectQuery) -> HashMap<String, IndexMap<String, Vec<String>>> {
        let mut lazy_aliases: IndexMap<String, Arc<TableDef>> = IndexMap::new();
        if let Some(root) = &query.from {
            for entry in root.iter() {
                let TableExpr::Table { chain } = &entry.table else { continue };
                if chain.len() != 1 || self.scopes.lookup_cte(&chain[0]).is_some() {
                    continue;
                }
                if let Ok(def) = self.ctx.catalog.get_table(&chain[0], None) {
                    if matches!(def.kind, TableKind::Lazy { .. }) {
                        let alias = entry.alias.clone().unwrap_or_else(|| chain[0].clone());
                        lazy_aliases.insert(alias, def);
                    }
                }
            }
        }
        if lazy_aliases.is_empty() {
            return HashMap::new();
        }

        let single_lazy = lazy_aliases.len() == 1
            && query.from.as_ref().map(|root| root.iter().count()).unwrap_or(0) == 1;

        let mut demand: HashMap<String, IndexMap<String, Vec<String>>> = HashMap::new();
        for_each_select_expr(query, &mut |e| match &e.kind {
            ExprKind::Field { chain } => {
                if chain.len() > 1 {
                    if let Some(def) = lazy_aliases.get(&chain[0]) {
                        if def.get_field(&chain[1]).is_some() {
                            demand
                                .entry(chain[0].clone())
                                .or_default()
                                .entry(chain[1].clone())
                                .or_insert_with(|| chain.clone());
                        }
                        return;
                    }
                }
                if single_lazy {
                    let (alias, def) = lazy_aliases.first().expect("single lazy alias");
                    if def.get_field(&chain[0]).is_some() {
                        demand
                            .entry(alias.clone())
                            .or_default()
                            .entry(chain[0].clone())
                            .or_insert_with(|| chain.clone());
                    }
                }
            }
            ExprKind::Asterisk { prefix } => {
                let target = if prefix.is_empty() && single_lazy {
                    lazy_aliases.first().map(|(a, d)| (a.clone(), Arc::clone(d)))
                } else if prefix.len() == 1 {
                    lazy_aliases.get(&prefix[0]).map(|d| (prefix[0].clone(), Arc::clone(d)))
                } else {
                    None
                };
                if let Some((alias, def)) = target {
                    let entry = demand.entry(alias.clone()).or_default();
                    for (name, _) in def.visible_fields() {
                        entry
                            .entry(name.clone())
                            .or_insert_with(|| vec![alias.clone(), name.clone()]);
                    }
                }
            }
            _ => {}
        });
        demand
    }

    fn resolve_join_chain(
        &mut self,
        root: JoinExpr,
        from_lazy: &HashMap<String, IndexMap<String, Vec<String>>>,
        guards: &mut Vec<GuardTarget>,
        demand: &mut LazyDemands,
    ) -> Result<JoinExpr, QueryError> {
        let mut entries = Vec::new();
        let mut cursor = Some(Box::new(root));
        while let Some(mut entry) = cursor {
            cursor = entry.next.take();
            entries.push(*entry);
        }

        let mut resolved = Vec::with_capacity(entries.len());
        for entry in entries {
            resolved.push(self.resolve_join_entry(entry, from_lazy, guards, demand)?);
        }

        let mut tail: Option<Box<JoinExpr>> = None;
        for mut entry in resolved.into_iter().rev() {
            entry.next = tail;
            tail = Some(Box::new(entry));
        }
        match tail {
            Some(root) => Ok(*root),
            None => Err(QueryError::internal("empty join chain")),
        }
    }

    fn resolve_join_entry(
        &mut self,
        mut entry: JoinExpr,
        from_lazy: &HashMap<String, IndexMap<String, Vec<String>>>,
        guards: &mut Vec<GuardTarget>,
        demand: &mut LazyDemands,
    ) -> Result<JoinExpr, QueryError> {
        let table = std::mem::replace(&mut entry.table, TableExpr::Table { chain: vec![] });
        match table {
            TableExpr::Table { chain } => {
                if chain.len() != 1 {
                    return Err(QueryError::not_implemented("multi-segment table references"));
                }
                let name = chain[0].clone();
                let alias = entry.alias.clone().unwrap_or_else(|| name.clone());

                if let Some(cte) = self.scopes.lookup_cte(&name).cloned() {
                    let resolved = self.resolve(cte)?;
                    self.scopes.add_table(alias.as_str(), ScopeTable::Subquery { columns: query_output_columns(&resolved) });
                    entry.table = TableExpr::Subquery(Box::new(resolved));
                    entry.alias = Some(alias.clone());
                    entry.resolved = Some(ResolvedTable::SubqueryRef { alias });
                } else {
                    let table = self.ctx.catalog.get_table(&name, entry.span)?;
                    match &table.kind {
                        TableKind::Physical { .. } | TableKind::Virtual { .. } | TableKind::Function { .. } => {
                            if let Some(column) = table.scope_column() {
                                guards.push(GuardTarget {
                                    alias: alias.clone(),
                                    column: column.to_string(),
                                    table: Arc::clone(&table),
                                });
                            }
                            self.scopes.add_table(alias.as_str(), ScopeTable::Catalog { table: Arc::clone(&table) });
                            entry.table = TableExpr::Table { chain };
                            entry.resolved = Some(ResolvedTable::Catalog { table, alias });
                        }
                        TableKind::View { query } => {
                            let resolved = self.resolve(query.clone())?;
                            self.scopes
                                .add_table(alias.as_str(), ScopeTable::Subquery { columns: query_output_columns(&resolved) });
                            entry.table = TableExpr::Subquery(Box::new(resolved));
                            entry.alias = Some(alias.clone());
                            entry.resolved = Some(ResolvedTable::SubqueryRef { alias });
                        }
                        TableKind::Lazy { materializer } => {
                            let fields = from_lazy.get(&alias).cloned().unwrap_or_default();
                            let subquery = materializer.build_subquery(&fields)?;
                            let resolved = self.resolve(Query::Select(subquery))?;
                            self.scopes
                                .add_table(alias.as_str(), ScopeTable::Subquery { columns: query_output_columns(&resolved) });
                            entry.table = TableExpr::Subquery(Box::new(resolved));
                            entry.alias = Some(alias.clone());
                            entry.resolved = Some(ResolvedTable::LazyMaterialized { table: table.name.clone(), alias });
                        }
                    }
                }
            }
            TableExpr::Subquery(inner) => {
                let alias = entry.alias.clone().ok_or_else(|| {
                    QueryError::from(ResolutionError::BadQuery {
                        message: "every FROM subquery needs an alias".to_string(),
                        span: entry.span,
                    })
                })?;
                let resolved = self.resolve(*inner)?;
                self.scopes.add_table(alias.as_str(), ScopeTable::Subquery { columns: query_output_columns(&resolved) });
                entry.table = TableExpr::Subquery(Box::new(resolved));
                entry.resolved = Some(ResolvedTable::SubqueryRef { alias });
            }
        }

        // the constraint sees every alias registered so far, left to right
        entry.constraint = entry.constraint.take().map(|c| self.resolve_expr(c, demand)).transpose()?;
        Ok(entry)
    }

    fn resolve_lazy_entry(
        &mut self,
        mut entry: JoinExpr,
        join_alias: &str,
        lazy: &LazyDemand,
        demand: &mut LazyDemands,
    ) -> Result<JoinExpr, QueryError> {
        let TableExpr::Subquery(inner) = std::mem::replace(&mut entry.table, TableExpr::Table { chain: vec![] })
        else {
            return Err(QueryError::internal("materializer produced a non-subquery join"));
        };
        let resolved = self.resolve(*inner)?;
        self.scopes
            .add_table(join_alias, ScopeTable::Subquery { columns: query_output_columns(&resolved) });
        entry.table = TableExpr::Subquery(Box::new(resolved));
        entry.constraint = entry.constraint.take().map(|c| self.resolve_expr(c, demand)).transpose()?;
        entry.resolved =
            Some(ResolvedTable::LazyMaterialized { table: lazy.to_table.clone(), alias: join_alias.to_string() });
        Ok(entry)
    }

    fn expand_wildcards(&mut self, select: Vec<Expr>) -> Result<Vec<Expr>, QueryError> {
        let mut out = Vec::new();
        for item in select {
            match &item.kind {
                ExprKind::Asterisk { prefix } if prefix.is_empty() => {
                    let frame = self.scopes.current().clone();
                    if frame.tables.is_empty() {
                        return Err(ResolutionError::BadQuery {
                            message: "* is not valid without a FROM clause".to_string(),
                            span: item.span,
                        }
                        .into());
                    }
                    for (alias, entry) in &frame.tables {
                        expand_scope_entry(alias, entry, &mut out);
                    }
                }
                ExprKind::Asterisk { prefix } => {
                    if prefix.len() != 1 {
                        return Err(QueryError::not_implemented("multi-segment wildcard prefixes"));
                    }
                    let Some(entry) = self.scopes.lookup_alias(&prefix[0]).cloned() else {
                        return Err(ResolutionError::UnknownTable { name: prefix[0].clone(), span: item.span }.into());
                    };
                    expand_scope_entry(&prefix[0], &entry, &mut out);
                }
                _ => out.push(item),
            }
        }
        Ok(out)
    }

    fn resolve_expr(&mut self, expr: Expr, demand: &mut LazyDemands) -> Result<Expr, QueryError> {
        let Expr { kind, span, ty: _, from_wildcard } = expr;
        let (kind, ty) = match kind {
            ExprKind::Literal(lit) => {
                let ty = ExprType::Scalar { ty: lit.scalar_type(), nullable: matches!(lit, Literal::Null) };
                (ExprKind::Literal(lit), ty)
            }
            ExprKind::Field { chain } => return self.resolve_field(chain, span, from_wildcard, demand),
            ExprKind::Asterisk { .. } => {
                return Err(ResolutionError::BadQuery {
                    message: "* is only valid in a select list or inside count()".to_string(),
                    span,
                }
                .into());
            }
            ExprKind::Call { name, mut args, distinct } => {
                if name == "count" && args.len() == 1 && matches!(args[0].kind, ExprKind::Asterisk { .. }) {
                    args.clear();
                }
                let aggregate = is_aggregate(&name);
                if aggregate {
                    if self.aggregate_depth > 0 {
                        return Err(ResolutionError::NestedAggregation { name, span }.into());
                    }
                    self.aggregate_depth += 1;
                }
                let resolved_args =
                    args.into_iter().map(|a| self.resolve_expr(a, demand)).collect::<Result<Vec<_>, _>>();
                if aggregate {
                    self.aggregate_depth -= 1;
                }
                let args = resolved_args?;
                if let Some((min, max)) = expected_arity(&name) {
                    if args.len() < min || args.len() > max {
                        let expected = if min == max {
                            format!("{min}")
                        } else if max == usize::MAX {
                            format!("at least {min}")
                        } else {
                            format!("{min} to {max}")
                        };
                        return Err(ResolutionError::ArityMismatch { name, expected, got: args.len(), span }.into());
                    }
                }
                let ty = match call_return_type(&name, &args) {
                    Some((ty, nullable)) => ExprType::Scalar { ty, nullable },
                    None => {
                        self.ctx.add_notice(
                            Notice::new(format!("Unknown function {name}(), passed through to the storage engine"))
                                .with_span(span),
                        );
                        ExprType::Scalar { ty: ScalarType::Unknown, nullable: true }
                    }
                };
                (ExprKind::Call { name, args, distinct }, ty)
            }
            ExprKind::Arithmetic { op, left, right } => {
                let left = self.resolve_expr(*left, demand)?;
                let right = self.resolve_expr(*right, demand)?;
                let ty = ExprType::Scalar {
                    ty: left
                        .ty
                        .as_ref()
                        .map(|t| t.scalar())
                        .unwrap_or(ScalarType::Unknown)
                        .promote(right.ty.as_ref().map(|t| t.scalar()).unwrap_or(ScalarType::Unknown)),
                    nullable: type_nullable(&left) || type_nullable(&right),
                };
                (ExprKind::Arithmetic { op, left: Box::new(left), right: Box::new(right) }, ty)
            }
            ExprKind::Compare { op, left, right } => {
                let left = self.resolve_expr(*left, demand)?;
                let right = self.resolve_expr(*right, demand)?;
                let ty = ExprType::Scalar { ty: ScalarType::Bool, nullable: type_nullable(&left) || type_nullable(&right) };
                (ExprKind::Compare { op, left: Box::new(left), right: Box::new(right) }, ty)
            }
            ExprKind::And(parts) => {
                let parts = parts.into_iter().map(|p| self.resolve_expr(p, demand)).collect::<Result<Vec<_>, _>>()?;
                (ExprKind::And(parts), ExprType::scalar_of(ScalarType::Bool))
            }
            ExprKind::Or(parts) => {
                let parts = parts.into_iter().map(|p| self.resolve_expr(p, demand)).collect::<Result<Vec<_>, _>>()?;
                (ExprKind::Or(parts), ExprType::scalar_of(ScalarType::Bool))
            }
            ExprKind::Not(inner) => {
                let inner = self.resolve_expr(*inner, demand)?;
                let ty = ExprType::Scalar { ty: ScalarType::Bool, nullable: type_nullable(&inner) };
                (ExprKind::Not(Box::new(inner)), ty)
            }
            ExprKind::Alias { name, expr } => {
                let inner = self.resolve_expr(*expr, demand)?;
                let ty = inner.ty.clone().unwrap_or_else(|| ExprType::scalar_of(ScalarType::Unknown));
                (ExprKind::Alias { name, expr: Box::new(inner) }, ty)
            }
            ExprKind::Tuple(items) => {
                let items = items.into_iter().map(|i| self.resolve_expr(i, demand)).collect::<Result<Vec<_>, _>>()?;
                (ExprKind::Tuple(items), ExprType::scalar_of(ScalarType::Array))
            }
            ExprKind::Subquery(inner) => {
                // a subquery opens its own aggregation scope; the enclosing
                // aggregate wraps its result, not its internals
                let depth = std::mem::replace(&mut self.aggregate_depth, 0);
                let resolved = self.resolve(*inner);
                self.aggregate_depth = depth;
                let resolved = resolved?;
                let ty = query_output_columns(&resolved)
                    .values()
                    .next()
                    .map(|(ty, _)| *ty)
                    .unwrap_or(ScalarType::Unknown);
                (ExprKind::Subquery(Box::new(resolved)), ExprType::Scalar { ty, nullable: true })
            }
        };
        Ok(Expr { kind, span, ty: Some(ty), from_wildcard })
    }

    fn resolve_field(
        &mut self,
        chain: Vec<String>,
        span: Option<Span>,
        from_wildcard: bool,
        demand: &mut LazyDemands,
    ) -> Result<Expr, QueryError> {
        if chain.is_empty() {
            return Err(QueryError::internal("empty field chain"));
        }

        if let Some(entry) = self.scopes.lookup_alias(&chain[0]).cloned() {
            let alias = chain[0].clone();
            return self.resolve_field_on(alias, entry, chain, 1, span, from_wildcard, demand);
        }

        let matched: Vec<(String, ScopeTable)> = self
            .scopes
            .tables_with_field(&chain[0])
            .into_iter()
            .map(|(alias, entry)| (alias.clone(), entry.clone()))
            .collect();
        match matched.len() {
            0 => {
                let visible = self.scopes.visible_names();
                let table = if visible.is_empty() { "query".to_string() } else { visible.join(", ") };
                Err(ResolutionError::UnknownField {
                    name: chain[0].clone(),
                    table,
                    candidates: self.field_candidates_in_scope(&chain[0]),
                    span,
                }
                .into())
            }
            1 => {
                let (alias, entry) = matched.into_iter().next().expect("one match");
                self.resolve_field_on(alias, entry, chain, 0, span, from_wildcard, demand)
            }
            _ => Err(ResolutionError::AmbiguousField {
                name: chain[0].clone(),
                matches: matched.into_iter().map(|(alias, _)| (alias, chain[0].clone())).collect(),
                span,
            }
            .into()),
        }
    }

    fn resolve_field_on(
        &mut self,
        alias: String,
        entry: ScopeTable,
        chain: Vec<String>,
        start: usize,
        span: Option<Span>,
        from_wildcard: bool,
        demand: &mut LazyDemands,
    ) -> Result<Expr, QueryError> {
        match entry {
            ScopeTable::Catalog { table } => {
                self.resolve_catalog_field(alias, table, chain, start, span, from_wildcard, demand)
            }
            ScopeTable::Subquery { columns } => {
                if start >= chain.len() {
                    let ty = ExprType::Table { alias: alias.clone(), table: alias };
                    return Ok(Expr { kind: ExprKind::Field { chain }, span, ty: Some(ty), from_wildcard });
                }
                let name = chain[start].clone();
                let Some((ty, nullable)) = columns.get(&name).copied() else {
                    let candidates = columns
                        .keys()
                        .filter(|k| k.to_lowercase().contains(&name.to_lowercase()))
                        .cloned()
                        .collect();
                    return Err(ResolutionError::UnknownField { name, table: alias, candidates, span }.into());
                };
                let rest = &chain[start + 1..];
                let resolved = if rest.is_empty() {
                    ExprType::SelectField { source_alias: alias, name, ty, nullable }
                } else if ty == ScalarType::Json {
                    ExprType::Property {
                        table: alias.clone(),
                        table_alias: alias,
                        json_column: name,
                        path: rest.to_vec(),
                        nullable: true,
                    }
                } else {
                    return Err(ResolutionError::BadQuery {
                        message: format!("cannot access \"{}\" on scalar column \"{name}\"", rest[0]),
                        span,
                    }
                    .into());
                };
                Ok(Expr { kind: ExprKind::Field { chain }, span, ty: Some(resolved), from_wildcard })
            }
        }
    }

    fn resolve_catalog_field(
        &mut self,
        alias: String,
        table: Arc<TableDef>,
        chain: Vec<String>,
        start: usize,
        span: Option<Span>,
        from_wildcard: bool,
        demand: &mut LazyDemands,
    ) -> Result<Expr, QueryError> {
        if start >= chain.len() {
            let ty = ExprType::Table { alias: alias.clone(), table: table.name.clone() };
            return Ok(Expr { kind: ExprKind::Field { chain }, span, ty: Some(ty), from_wildcard });
        }
        let segment = chain[start].clone();
        let Some(field) = table.get_field(&segment) else {
            return Err(ResolutionError::UnknownField {
                name: segment.clone(),
                table: table.name.clone(),
                candidates: table.field_candidates(&segment),
                span,
            }
            .into());
        };
        let field = field.clone();
        let rest: Vec<String> = chain[start + 1..].to_vec();

        let ty = match &field.kind {
            FieldKind::Column { physical } => {
                if rest.is_empty() {
                    ExprType::Field {
                        table_alias: alias,
                        table: table.name.clone(),
                        name: segment,
                        physical: physical.clone(),
                        ty: field.ty,
                        nullable: field.nullable,
                    }
                } else if field.ty == ScalarType::Json {
                    ExprType::Property {
                        table: table.name.clone(),
                        table_alias: alias,
                        json_column: physical.clone(),
                        path: rest,
                        nullable: true,
                    }
                } else {
                    return Err(ResolutionError::BadQuery {
                        message: format!("cannot access \"{}\" on scalar field \"{segment}\"", rest[0]),
                        span,
                    }
                    .into());
                }
            }
            FieldKind::Property { json_column } => ExprType::Property {
                table: table.name.clone(),
                table_alias: alias,
                json_column: json_column.clone(),
                path: rest,
                nullable: true,
            },
            FieldKind::Expression { expr } => {
                if !rest.is_empty() {
                    return Err(ResolutionError::BadQuery {
                        message: format!("cannot access \"{}\" on computed field \"{segment}\"", rest[0]),
                        span,
                    }
                    .into());
                }
                let prefixed = prefix_bare_chains(expr.clone(), &alias);
                let resolved = self.resolve_expr(prefixed, demand)?;
                return Ok(Expr { kind: resolved.kind, span, ty: resolved.ty, from_wildcard });
            }
            FieldKind::Traverser { chain: redirect } => {
                let mut new_chain = vec![alias];
                new_chain.extend(redirect.iter().cloned());
                new_chain.extend(rest);
                return self.resolve_field(new_chain, span, from_wildcard, demand);
            }
            FieldKind::LazyJoin { join, to_table } => {
                return self.resolve_lazy_field(
                    &alias, &table, &segment, *join, to_table, &rest, chain, span, from_wildcard, demand,
                );
            }
        };
        Ok(Expr { kind: ExprKind::Field { chain }, span, ty: Some(ty), from_wildcard })
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_lazy_field(
        &mut self,
        source_alias: &str,
        source: &TableDef,
        field_name: &str,
        join: Materializer,
        to_table: &str,
        rest: &[String],
        full_chain: Vec<String>,
        span: Option<Span>,
        from_wildcard: bool,
        demand: &mut LazyDemands,
    ) -> Result<Expr, QueryError> {
        // the denormalized strategy reads person properties straight off the
        // events row instead of joining
        if self.ctx.modifiers.person_join_mode == PersonJoinMode::Denormalized
            && source.name == "events"
            && field_name == "person"
            && rest.first().map(String::as_str) == Some("properties")
        {
            let ty = ExprType::Property {
                table: source.name.clone(),
                table_alias: source_alias.to_string(),
                json_column: "person_properties".to_string(),
                path: rest[1..].to_vec(),
                nullable: true,
            };
            return Ok(Expr { kind: ExprKind::Field { chain: full_chain }, span, ty: Some(ty), from_wildcard });
        }

        let join_alias = format!("{source_alias}__{field_name}");
        let target = self.ctx.catalog.get_table(to_table, span)?;

        let (demand_field, ty) = if rest.is_empty() {
            // a bare join reference reads the join key
            let key = join.key_field();
            let key_ty = target.get_field(key).map(|f| f.ty).unwrap_or(ScalarType::Unknown);
            (
                key.to_string(),
                ExprType::SelectField {
                    source_alias: join_alias.clone(),
                    name: key.to_string(),
                    ty: key_ty,
                    nullable: true,
                },
            )
        } else {
            let sub = rest[0].clone();
            let Some(target_field) = target.get_field(&sub) else {
                return Err(ResolutionError::UnknownField {
                    name: sub,
                    table: to_table.to_string(),
                    candidates: target.field_candidates(&rest[0]),
                    span,
                }
                .into());
            };
            match &target_field.kind {
                FieldKind::Column { .. } | FieldKind::Expression { .. } => {
                    if rest.len() > 1 {
                        if target_field.ty == ScalarType::Json {
                            (
                                sub.clone(),
                                ExprType::Property {
                                    table: to_table.to_string(),
                                    table_alias: join_alias.clone(),
                                    json_column: sub,
                                    path: rest[1..].to_vec(),
                                    nullable: true,
                                },
                            )
                        } else {
                            return Err(ResolutionError::BadQuery {
                                message: format!("cannot access \"{}\" on scalar field \"{sub}\"", rest[1]),
                                span,
                            }
                            .into());
                        }
                    } else {
                        (
                            sub.clone(),
                            ExprType::SelectField {
                                source_alias: join_alias.clone(),
                                name: sub,
                                ty: target_field.ty,
                                nullable: true,
                            },
                        )
                    }
                }
                FieldKind::Property { .. } => (
                    sub.clone(),
                    ExprType::Property {
                        table: to_table.to_string(),
                        table_alias: join_alias.clone(),
                        json_column: sub,
                        path: rest[1..].to_vec(),
                        nullable: true,
                    },
                ),
                FieldKind::Traverser { chain: redirect } => {
                    let mut new_chain = vec![source_alias.to_string(), field_name.to_string()];
                    new_chain.extend(redirect.iter().cloned());
                    new_chain.extend(rest[1..].iter().cloned());
                    return self.resolve_field(new_chain, span, from_wildcard, demand);
                }
                FieldKind::LazyJoin { .. } => {
                    return Err(QueryError::not_implemented("nested lazy joins"));
                }
            }
        };

        demand.record(&join_alias, source_alias, join, to_table, &demand_field, full_chain.clone());
        Ok(Expr { kind: ExprKind::Field { chain: full_chain }, span, ty: Some(ty), from_wildcard })
    }

    fn field_candidates_in_scope(&self, name: &str) -> Vec<String> {
        let mut candidates = Vec::new();
        for (_, entry) in &self.scopes.current().tables {
            match entry {
                ScopeTable::Catalog { table } => candidates.extend(table.field_candidates(name)),
                ScopeTable::Subquery { columns } => candidates.extend(
                    columns.keys().filter(|k| k.to_lowercase().contains(&name.to_lowercase())).cloned(),
                ),
            }
        }
        candidates.sort();
        candidates.dedup();
        candidates
    }

    fn scope_guard(&self, guard: &GuardTarget) -> Expr {
        let field = Expr::typed(
            ExprKind::Field { chain: vec![guard.alias.clone(), guard.column.clone()] },
            ExprType::Field {
                table_alias: guard.alias.clone(),
                table: guard.table.name.clone(),
                name: guard.column.clone(),
                physical: guard.column.clone(),
                ty: ScalarType::Int,
                nullable: false,
            },
        );
        let team = Expr::typed(ExprKind::Literal(Literal::Int(self.ctx.team_id)), ExprType::scalar_of(ScalarType::Int));
        Expr::typed(
            ExprKind::Compare { op: CompareOp::Eq, left: Box::new(field), right: Box::new(team) },
            ExprType::scalar_of(ScalarType::Bool),
        )
    }
}

fn type_nullable(expr: &Expr) -> bool {
    expr.ty.as_ref().map(|t| t.nullable()).unwrap_or(false)
}

fn expand_scope_entry(alias: &str, entry: &ScopeTable, out: &mut Vec<Expr>) {
    match entry {
        ScopeTable::Catalog { table } => {
            for (name, _) in table.visible_fields() {
                let mut e = Expr::field_chain(vec![alias.to_string(), name.clone()]);
                e.from_wildcard = true;
                out.push(e);
            }
        }
        ScopeTable::Subquery { columns } => {
            for name in columns.keys() {
                let mut e = Expr::field_chain(vec![alias.to_string(), name.clone()]);
                e.from_wildcard = true;
                out.push(e);
            }
        }
    }
}

/// Rewrite bare chains in a computed-field expression so they resolve in
/// the owning table's row scope.
fn prefix_bare_chains(expr: Expr, alias: &str) -> Expr {
    map_expr(expr, &mut |mut e| {
        if let ExprKind::Field { chain } = &mut e.kind {
            let mut prefixed = Vec::with_capacity(chain.len() + 1);
            prefixed.push(alias.to_string());
            prefixed.append(chain);
            *chain = prefixed;
        }
        e
    })
}

fn attach_join_guard(root: &mut JoinExpr, alias: &str, predicate: Expr) -> Result<(), QueryError> {
    let mut cursor = Some(root);
    while let Some(entry) = cursor {
        if entry.resolved.as_ref().map(|r| r.alias()) == Some(alias) {
            let existing = entry.constraint.take();
            entry.constraint = Expr::conjoin(match existing {
                Some(c) => vec![predicate, c],
                None => vec![predicate],
            });
            return Ok(());
        }
        cursor = entry.next.as_deref_mut();
    }
    Err(QueryError::internal(format!("no join entry found for scoped table alias \"{alias}\"")))
}
