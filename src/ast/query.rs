use std::sync::Arc;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;

use crate::ast::{Expr, Span};
use crate::catalog::TableDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

/// The table expression of one join-chain entry.
#[derive(Debug, Clone, PartialEq)]
pub enum TableExpr {
    /// A dotted table reference, e.g. `events`. Views and lazy tables are
    /// replaced with `Subquery` during resolution.
    Table { chain: Vec<String> },
    Subquery(Box<Query>),
}

/// What a join-chain entry resolved to; filled in by the resolver and read
/// by the printer and transform passes.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedTable {
    /// A catalog table printed from its definition (physical name, virtual
    /// backing, or storage-engine function call).
    Catalog { table: Arc<TableDef>, alias: String },
    /// An explicitly authored subquery.
    SubqueryRef { alias: String },
    /// A subquery generated by lazy-join materialization.
    LazyMaterialized { table: String, alias: String },
}

impl ResolvedTable {
    pub fn alias(&self) -> &str {
        match self {
            ResolvedTable::Catalog { alias, .. }
            | ResolvedTable::SubqueryRef { alias }
            | ResolvedTable::LazyMaterialized { alias, .. } => alias,
        }
    }
}

/// One entry in a FROM/JOIN chain, linked to the next entry. The first entry
/// has `join_op: None`.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinExpr {
    pub table: TableExpr,
    pub alias: Option<String>,
    pub join_op: Option<JoinKind>,
    pub constraint: Option<Expr>,
    pub next: Option<Box<JoinExpr>>,
    pub resolved: Option<ResolvedTable>,
    pub span: Option<Span>,
}

impl JoinExpr {
    pub fn table(chain: &[&str]) -> Self {
        Self {
            table: TableExpr::Table { chain: chain.iter().map(|s| s.to_string()).collect() },
            alias: None,
            join_op: None,
            constraint: None,
            next: None,
            resolved: None,
            span: None,
        }
    }

    pub fn subquery(query: Query, alias: impl Into<String>) -> Self {
        Self {
            table: TableExpr::Subquery(Box::new(query)),
            alias: Some(alias.into()),
            join_op: None,
            constraint: None,
            next: None,
            resolved: None,
            span: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_join(mut self, op: JoinKind, constraint: Option<Expr>) -> Self {
        self.join_op = Some(op);
        self.constraint = constraint;
        self
    }

    /// Append an entry at the end of the chain.
    pub fn push(&mut self, entry: JoinExpr) {
        match &mut self.next {
            Some(next) => next.push(entry),
            None => self.next = Some(Box::new(entry)),
        }
    }

    /// Iterate the chain front to back.
    pub fn iter(&self) -> JoinChainIter<'_> {
        JoinChainIter { current: Some(self) }
    }
}

pub struct JoinChainIter<'a> {
    current: Option<&'a JoinExpr>,
}

impl<'a> Iterator for JoinChainIter<'a> {
    type Item = &'a JoinExpr;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.current?;
        self.current = item.next.as_deref();
        Some(item)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub ascending: bool,
}

/// A single SELECT statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub select: Vec<Expr>,
    pub from: Option<JoinExpr>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
    pub distinct: bool,
    /// Row-sampling rate; `None` or `1.0` means full rate.
    pub sample: Option<OrderedFloat<f64>>,
    pub ctes: IndexMap<String, Query>,
    pub span: Option<Span>,
}

impl SelectQuery {
    pub fn new(select: Vec<Expr>, from: Option<JoinExpr>) -> Self {
        Self { select, from, ..Default::default() }
    }

    /// Sampling is effectively off when absent or at full rate.
    pub fn full_sample(&self) -> bool {
        match self.sample {
            None => true,
            Some(rate) => rate.0 == 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    UnionAll,
    UnionDistinct,
    Intersect,
    Except,
}

impl SetOp {
    pub fn keyword(&self) -> &'static str {
        match self {
            SetOp::UnionAll => "UNION ALL",
            SetOp::UnionDistinct => "UNION DISTINCT",
            SetOp::Intersect => "INTERSECT",
            SetOp::Except => "EXCEPT",
        }
    }
}

/// A chain of set operations over selects, e.g. `a UNION ALL b UNION ALL c`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectSetQuery {
    pub initial: Box<Query>,
    pub branches: Vec<(SetOp, Query)>,
}

/// Top-level statement node: either a plain select or a set-operation chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select(SelectQuery),
    Set(SelectSetQuery),
}

impl Query {
    /// The leftmost select of the statement; its select list defines the
    /// output column names of the whole statement.
    pub fn first_select(&self) -> &SelectQuery {
        match self {
            Query::Select(s) => s,
            Query::Set(set) => set.initial.first_select(),
        }
    }

    pub fn as_select(&self) -> Option<&SelectQuery> {
        match self {
            Query::Select(s) => Some(s),
            Query::Set(_) => None,
        }
    }
}

impl From<SelectQuery> for Query {
    fn from(value: SelectQuery) -> Self {
        Query::Select(value)
    }
}
