pub mod property_columns;
pub use property_columns::*;

pub mod preaggregated;
pub use preaggregated::*;

pub mod where_pushdown;
pub use where_pushdown::*;

pub mod time_range;
pub use time_range::*;

pub mod projection_pruning;
pub use projection_pruning::*;

pub mod access_guards;
pub use access_guards::*;

use std::time::Instant;

use crate::ast::Query;
use crate::context::Context;
use crate::error::QueryError;

/// One optimizer pass over a resolved statement. Every pass is a pure
/// tree-to-tree rewrite: it recognizes the shapes it understands and leaves
/// everything else byte-identical, so running a pass twice changes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    PropertyColumns,
    Preaggregated,
    WherePushdown,
    TimestampHints,
    ProjectionPruning,
    AccessGuards,
}

impl Pass {
    pub fn name(&self) -> &'static str {
        match self {
            Pass::PropertyColumns => "property_columns",
            Pass::Preaggregated => "preaggregated",
            Pass::WherePushdown => "where_pushdown",
            Pass::TimestampHints => "timestamp_hints",
            Pass::ProjectionPruning => "projection_pruning",
            Pass::AccessGuards => "access_guards",
        }
    }

    fn enabled(&self, ctx: &Context) -> bool {
        match self {
            Pass::PropertyColumns => ctx.modifiers.property_columns,
            Pass::Preaggregated => ctx.modifiers.use_preaggregated_tables,
            Pass::WherePushdown => ctx.modifiers.pushdown,
            Pass::TimestampHints => ctx.modifiers.timestamp_hints,
            Pass::ProjectionPruning | Pass::AccessGuards => true,
        }
    }

    fn run(&self, query: Query, ctx: &mut Context) -> Result<Query, QueryError> {
        match self {
            Pass::PropertyColumns => property_columns(query, ctx),
            Pass::Preaggregated => preaggregated(query, ctx),
            Pass::WherePushdown => where_pushdown(query, ctx),
            Pass::TimestampHints => timestamp_hints(query, ctx),
            Pass::ProjectionPruning => projection_pruning(query, ctx),
            Pass::AccessGuards => access_guards(query, ctx),
        }
    }
}

/// Pass order matters: property substitution runs before pushdown so pushed
/// predicates reference final columns, pruning runs after materialization
/// added its joins, and access guards run last so nothing rewrites them.
pub fn default_pipeline() -> Vec<Pass> {
    vec![
        Pass::PropertyColumns,
        Pass::Preaggregated,
        Pass::WherePushdown,
        Pass::TimestampHints,
        Pass::ProjectionPruning,
        Pass::AccessGuards,
    ]
}

pub fn run_pipeline(mut query: Query, ctx: &mut Context, passes: &[Pass]) -> Result<Query, QueryError> {
    for pass in passes {
        if !pass.enabled(ctx) {
            tracing::debug!(pass = pass.name(), "pass disabled by modifiers");
            continue;
        }
        let started = Instant::now();
        query = pass.run(query, ctx)?;
        ctx.timings.record_since(&format!("pass.{}", pass.name()), started);
    }
    Ok(query)
}
