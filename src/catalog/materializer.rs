use indexmap::IndexMap;

use crate::ast::{CompareOp, Expr, JoinExpr, JoinKind, Literal, SelectQuery, TableExpr};
use crate::error::{QueryError, ResolutionError};

/// Deferred join constructors for lazy tables.
///
/// A closed sum type rather than stored closures: each variant names the
/// join strategy and carries its captured parameters, keeping the catalog
/// inspectable and free of borrowed state. Dispatch happens in
/// `build_subquery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materializer {
    /// events.person -> person table, keyed on `person_id`.
    PersonJoin,
    /// events.session -> per-session aggregates over the raw session rows,
    /// keyed on `session_id`.
    SessionJoin,
    /// events.group_N -> groups table at a fixed group-type index.
    GroupJoin(u8),
}

impl Materializer {
    /// Table named in user-facing errors about this join.
    pub fn target_table(&self) -> &'static str {
        match self {
            Materializer::PersonJoin => "persons",
            Materializer::SessionJoin => "sessions",
            Materializer::GroupJoin(_) => "groups",
        }
    }

    /// Output column of the generated subquery used as the join key.
    pub fn key_field(&self) -> &'static str {
        match self {
            Materializer::PersonJoin => "id",
            Materializer::SessionJoin => "session_id",
            Materializer::GroupJoin(_) => "group_key",
        }
    }

    /// Column on the referencing table that the key joins against.
    pub fn source_key(&self) -> String {
        match self {
            Materializer::PersonJoin => "person_id".to_string(),
            Materializer::SessionJoin => "session_id".to_string(),
            Materializer::GroupJoin(index) => format!("group_key_{index}"),
        }
    }

    /// Outer columns of the referencing table whose predicates may be
    /// cloned into the generated subquery, mapped to the inner column they
    /// filter. Conservative: anything unmapped stays outer.
    ///
    /// `min_timestamp` bounds every chunk row of a session from below, so
    /// only upper bounds transfer; a lower bound would drop the early chunks
    /// of sessions that still have matching events after the cutoff.
    pub fn pushdown_column(&self, outer_field: &str, op: CompareOp) -> Option<&'static str> {
        match (self, outer_field) {
            (Materializer::SessionJoin, "timestamp")
                if matches!(op, CompareOp::Lt | CompareOp::LtEq) =>
            {
                Some("min_timestamp")
            }
            _ => None,
        }
    }

    /// Build the minimal-projection subquery for the demanded field set.
    /// `demand` maps each requested field name to the chain that requested
    /// it; only these fields (plus the join key) are projected.
    pub fn build_subquery(&self, demand: &IndexMap<String, Vec<String>>) -> Result<SelectQuery, QueryError> {
        if demand.is_empty() {
            return Err(ResolutionError::EmptyLazyJoin { table: self.target_table().to_string(), span: None }.into());
        }

        let mut names: Vec<&str> = vec![self.key_field()];
        for name in demand.keys() {
            if name != self.key_field() {
                names.push(name);
            }
        }

        match self {
            Materializer::PersonJoin => {
                let select = names
                    .iter()
                    .map(|name| Expr::alias(*name, Expr::field(&["persons", name])))
                    .collect();
                Ok(SelectQuery::new(select, Some(JoinExpr::table(&["persons"]))))
            }
            Materializer::SessionJoin => {
                let mut select = Vec::with_capacity(names.len());
                for name in &names {
                    let expr = match *name {
                        "session_id" => Expr::field(&["raw_sessions", "session_id"]),
                        "start_at" => Expr::call("min", vec![Expr::field(&["raw_sessions", "min_timestamp"])]),
                        "end_at" => Expr::call("max", vec![Expr::field(&["raw_sessions", "max_timestamp"])]),
                        "duration" => Expr::call(
                            "dateDiff",
                            vec![
                                Expr::lit(Literal::string("second")),
                                Expr::call("min", vec![Expr::field(&["raw_sessions", "min_timestamp"])]),
                                Expr::call("max", vec![Expr::field(&["raw_sessions", "max_timestamp"])]),
                            ],
                        ),
                        "entry_url" => Expr::call("any", vec![Expr::field(&["raw_sessions", "entry_url"])]),
                        other => {
                            return Err(QueryError::internal(format!(
                                "sessions table has no materialization for field \"{other}\""
                            )));
                        }
                    };
                    select.push(Expr::alias(*name, expr));
                }
                let mut query = SelectQuery::new(select, Some(JoinExpr::table(&["raw_sessions"])));
                query.group_by = vec![Expr::field(&["raw_sessions", "session_id"])];
                Ok(query)
            }
            Materializer::GroupJoin(index) => {
                let select = names
                    .iter()
                    .map(|name| Expr::alias(*name, Expr::field(&["groups", name])))
                    .collect();
                let mut query = SelectQuery::new(select, Some(JoinExpr::table(&["groups"])));
                query.where_clause = Some(Expr::compare(
                    CompareOp::Eq,
                    Expr::field(&["groups", "group_type_index"]),
                    Expr::lit(Literal::Int(*index as i64)),
                ));
                Ok(query)
            }
        }
    }

    /// Materialize the lazy join as a chain entry: a LEFT JOIN of the
    /// minimal subquery, constrained on the join key. The produced subtree
    /// is unresolved; the resolver resolves it in place.
    pub fn materialize(
        &self,
        source_alias: &str,
        join_alias: &str,
        demand: &IndexMap<String, Vec<String>>,
    ) -> Result<JoinExpr, QueryError> {
        let subquery = self.build_subquery(demand)?;
        let constraint = Expr::compare(
            CompareOp::Eq,
            Expr::field_chain(vec![join_alias.to_string(), self.key_field().to_string()]),
            Expr::field_chain(vec![source_alias.to_string(), self.source_key()]),
        );
        Ok(JoinExpr {
            table: TableExpr::Subquery(Box::new(subquery.into())),
            alias: Some(join_alias.to_string()),
            join_op: Some(JoinKind::Left),
            constraint: Some(constraint),
            next: None,
            resolved: None,
            span: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demand_of(names: &[&str]) -> IndexMap<String, Vec<String>> {
        names.iter().map(|n| (n.to_string(), vec![n.to_string()])).collect()
    }

    #[test]
    fn empty_demand_is_a_resolution_error_naming_the_table() {
        let err = Materializer::PersonJoin.build_subquery(&IndexMap::new()).unwrap_err();
        match err {
            QueryError::Resolution(ResolutionError::EmptyLazyJoin { table, .. }) => {
                assert_eq!(table, "persons");
            }
            other => panic!("expected EmptyLazyJoin, got {other:?}"),
        }
    }

    #[test]
    fn projection_is_minimal_plus_key() {
        let q = Materializer::PersonJoin.build_subquery(&demand_of(&["properties"])).unwrap();
        let names: Vec<_> = q.select.iter().filter_map(|e| e.output_name()).collect();
        assert_eq!(names, vec!["id", "properties"]);
    }

    #[test]
    fn session_aggregates_group_by_session() {
        let q = Materializer::SessionJoin.build_subquery(&demand_of(&["duration"])).unwrap();
        assert_eq!(q.group_by.len(), 1);
        let names: Vec<_> = q.select.iter().filter_map(|e| e.output_name()).collect();
        assert_eq!(names, vec!["session_id", "duration"]);
    }

    #[test]
    fn only_upper_bounds_map_onto_the_session_floor_column() {
        let join = Materializer::SessionJoin;
        assert_eq!(join.pushdown_column("timestamp", CompareOp::LtEq), Some("min_timestamp"));
        assert_eq!(join.pushdown_column("timestamp", CompareOp::Lt), Some("min_timestamp"));
        assert_eq!(join.pushdown_column("timestamp", CompareOp::GtEq), None);
        assert_eq!(join.pushdown_column("timestamp", CompareOp::Eq), None);
    }

    #[test]
    fn group_join_filters_on_its_index() {
        let q = Materializer::GroupJoin(2).build_subquery(&demand_of(&["properties"])).unwrap();
        let filter = q.where_clause.unwrap();
        assert!(format!("{filter}").contains("group_type_index = 2"));
    }
}
