use crate::ast::{
    Expr, ExprKind, ExprType, JoinExpr, Literal, Query, SelectQuery, TableExpr,
};
use crate::catalog::{FunctionArg, TableKind};
use crate::context::Context;
use crate::error::QueryError;
use crate::printer::quote_identifier;

/// Output language of the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// The source language, printed back from the expression kinds. Used for
    /// display and round-tripping; literals print inline.
    HogQL,
    /// The executable dialect, printed from resolved types. Quoted literals
    /// externalize into the parameter map as typed placeholders.
    ClickHouse,
}

/// Render a statement in the given dialect. The executable dialect requires
/// a fully resolved tree and records parameters on the context as a side
/// effect.
pub fn print_query(query: &Query, dialect: Dialect, ctx: &mut Context) -> Result<String, QueryError> {
    Printer { dialect, ctx }.query(query)
}

struct Printer<'c> {
    dialect: Dialect,
    ctx: &'c mut Context,
}

impl<'c> Printer<'c> {
    fn query(&mut self, query: &Query) -> Result<String, QueryError> {
        match query {
            Query::Select(select) => self.select(select),
            Query::Set(set) => {
                let mut out = self.query(&set.initial)?;
                for (op, branch) in &set.branches {
                    out.push(' ');
                    out.push_str(op.keyword());
                    out.push(' ');
                    out.push_str(&self.query(branch)?);
                }
                Ok(out)
            }
        }
    }

    fn select(&mut self, select: &SelectQuery) -> Result<String, QueryError> {
        let mut out = String::new();

        if !select.ctes.is_empty() {
            match self.dialect {
                Dialect::HogQL => {
                    let mut rendered = Vec::with_capacity(select.ctes.len());
                    for (name, cte) in &select.ctes {
                        rendered.push(format!("{} AS ({})", quote_identifier(name), self.query(cte)?));
                    }
                    out.push_str("WITH ");
                    out.push_str(&rendered.join(", "));
                    out.push(' ');
                }
                Dialect::ClickHouse => {
                    return Err(QueryError::internal("CTE survived resolution into the executable printer"));
                }
            }
        }

        out.push_str("SELECT ");
        if select.distinct {
            out.push_str("DISTINCT ");
        }
        let items = select.select.iter().map(|e| self.expr(e)).collect::<Result<Vec<_>, _>>()?;
        out.push_str(&items.join(", "));

        if let Some(root) = &select.from {
            out.push_str(" FROM ");
            out.push_str(&self.join_chain(root, select)?);
        }
        if let Some(filter) = &select.where_clause {
            out.push_str(" WHERE ");
            out.push_str(&self.expr(filter)?);
        }
        if !select.group_by.is_empty() {
            let keys = select.group_by.iter().map(|e| self.expr(e)).collect::<Result<Vec<_>, _>>()?;
            out.push_str(" GROUP BY ");
            out.push_str(&keys.join(", "));
        }
        if let Some(having) = &select.having {
            out.push_str(" HAVING ");
            out.push_str(&self.expr(having)?);
        }
        if !select.order_by.is_empty() {
            let keys = select
                .order_by
                .iter()
                .map(|o| {
                    Ok(format!("{} {}", self.expr(&o.expr)?, if o.ascending { "ASC" } else { "DESC" }))
                })
                .collect::<Result<Vec<_>, QueryError>>()?;
            out.push_str(" ORDER BY ");
            out.push_str(&keys.join(", "));
        }
        if let Some(limit) = &select.limit {
            out.push_str(" LIMIT ");
            out.push_str(&self.expr(limit)?);
        }
        if let Some(offset) = &select.offset {
            out.push_str(" OFFSET ");
            out.push_str(&self.expr(offset)?);
        }
        Ok(out)
    }

    fn join_chain(&mut self, root: &JoinExpr, select: &SelectQuery) -> Result<String, QueryError> {
        let mut out = String::new();
        let mut first = true;
        for entry in root.iter() {
            if first {
                if entry.constraint.is_some() {
                    return Err(QueryError::internal("join constraint on the first FROM entry"));
                }
                out.push_str(&self.join_entry(entry)?);
                if !select.full_sample() {
                    if let Some(rate) = select.sample {
                        out.push_str(&format!(" SAMPLE {rate}"));
                    }
                }
            } else {
                let keyword = match entry.join_op {
                    Some(op) => op.keyword(),
                    None if entry.constraint.is_some() => {
                        return Err(QueryError::internal("join constraint without a join operator"));
                    }
                    None => "CROSS JOIN",
                };
                out.push(' ');
                out.push_str(keyword);
                out.push(' ');
                out.push_str(&self.join_entry(entry)?);
                if let Some(constraint) = &entry.constraint {
                    out.push_str(" ON ");
                    out.push_str(&self.expr(constraint)?);
                }
            }
            first = false;
        }
        Ok(out)
    }

    fn join_entry(&mut self, entry: &JoinExpr) -> Result<String, QueryError> {
        if self.dialect == Dialect::HogQL {
            let base = match &entry.table {
                TableExpr::Table { chain } => {
                    chain.iter().map(|s| quote_identifier(s)).collect::<Vec<_>>().join(".")
                }
                TableExpr::Subquery(inner) => format!("({})", self.query(inner)?),
            };
            return Ok(match &entry.alias {
                Some(alias) => format!("{base} AS {}", quote_identifier(alias)),
                None => base,
            });
        }

        match &entry.resolved {
            Some(crate::ast::ResolvedTable::Catalog { table, alias }) => {
                let physical = match &table.kind {
                    TableKind::Physical { physical_name } => physical_name.clone(),
                    TableKind::Virtual { .. } => {
                        let backing = self.ctx.catalog.physical_backing(table)?;
                        match &backing.kind {
                            TableKind::Physical { physical_name } => physical_name.clone(),
                            _ => return Err(QueryError::internal("virtual backing is not physical")),
                        }
                    }
                    TableKind::Function { function, args } => {
                        let rendered =
                            args.iter().map(|a| self.function_arg(a)).collect::<Result<Vec<_>, _>>()?;
                        let call = format!("{function}({})", rendered.join(", "));
                        return Ok(format!("{call} AS {}", quote_identifier(alias)));
                    }
                    TableKind::Lazy { .. } | TableKind::View { .. } => {
                        return Err(QueryError::internal(format!(
                            "table \"{}\" was not replaced during resolution",
                            table.name
                        )));
                    }
                };
                if alias == &physical {
                    Ok(quote_identifier(&physical))
                } else {
                    Ok(format!("{} AS {}", quote_identifier(&physical), quote_identifier(alias)))
                }
            }
            Some(crate::ast::ResolvedTable::SubqueryRef { alias })
            | Some(crate::ast::ResolvedTable::LazyMaterialized { alias, .. }) => {
                let TableExpr::Subquery(inner) = &entry.table else {
                    return Err(QueryError::internal("subquery reference without a subquery"));
                };
                Ok(format!("({}) AS {}", self.query(inner)?, quote_identifier(alias)))
            }
            None => Err(QueryError::internal("unresolved table reference reached the executable printer")),
        }
    }

    fn function_arg(&mut self, arg: &FunctionArg) -> Result<String, QueryError> {
        match arg {
            FunctionArg::Plain(value) => self.literal(value),
            FunctionArg::Secret(value) => {
                let name = self.ctx.add_sensitive_value(value.clone());
                Ok(format!("{{{name}:{}}}", placeholder_type(value)))
            }
        }
    }

    fn expr(&mut self, expr: &Expr) -> Result<String, QueryError> {
        match &expr.kind {
            ExprKind::Literal(value) => self.literal(value),
            ExprKind::Field { chain } => self.field(expr, chain),
            ExprKind::Asterisk { prefix } => match self.dialect {
                Dialect::HogQL => {
                    if prefix.is_empty() {
                        Ok("*".to_string())
                    } else {
                        Ok(format!(
                            "{}.*",
                            prefix.iter().map(|s| quote_identifier(s)).collect::<Vec<_>>().join(".")
                        ))
                    }
                }
                Dialect::ClickHouse => {
                    Err(QueryError::internal("unexpanded wildcard reached the executable printer"))
                }
            },
            ExprKind::Call { name, args, distinct } => {
                let rendered = args.iter().map(|a| self.expr(a)).collect::<Result<Vec<_>, _>>()?;
                if *distinct {
                    Ok(format!("{name}(DISTINCT {})", rendered.join(", ")))
                } else {
                    Ok(format!("{name}({})", rendered.join(", ")))
                }
            }
            ExprKind::Arithmetic { op, left, right } => {
                Ok(format!("({} {} {})", self.expr(left)?, op.symbol(), self.expr(right)?))
            }
            ExprKind::Compare { op, left, right } => {
                Ok(format!("{} {} {}", self.expr(left)?, op.symbol(), self.expr(right)?))
            }
            ExprKind::And(parts) => {
                let rendered = parts.iter().map(|p| self.expr(p)).collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", rendered.join(" AND ")))
            }
            ExprKind::Or(parts) => {
                let rendered = parts.iter().map(|p| self.expr(p)).collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", rendered.join(" OR ")))
            }
            ExprKind::Not(inner) => Ok(format!("NOT {}", self.expr(inner)?)),
            ExprKind::Alias { name, expr } => {
                Ok(format!("{} AS {}", self.expr(expr)?, quote_identifier(name)))
            }
            ExprKind::Tuple(items) => {
                let rendered = items.iter().map(|i| self.expr(i)).collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", rendered.join(", ")))
            }
            ExprKind::Subquery(inner) => Ok(format!("({})", self.query(inner)?)),
        }
    }

    fn field(&mut self, expr: &Expr, chain: &[String]) -> Result<String, QueryError> {
        if self.dialect == Dialect::HogQL {
            return Ok(chain.iter().map(|s| quote_identifier(s)).collect::<Vec<_>>().join("."));
        }
        match &expr.ty {
            Some(ExprType::Field { table_alias, physical, .. }) => {
                Ok(format!("{}.{}", quote_identifier(table_alias), quote_identifier(physical)))
            }
            Some(ExprType::SelectField { source_alias, name, .. }) => {
                Ok(format!("{}.{}", quote_identifier(source_alias), quote_identifier(name)))
            }
            Some(ExprType::Property { table_alias, json_column, path, .. }) => {
                let column = format!("{}.{}", quote_identifier(table_alias), quote_identifier(json_column));
                if path.is_empty() {
                    return Ok(column);
                }
                let mut args = vec![column];
                for segment in path {
                    args.push(self.literal(&Literal::string(segment))?);
                }
                Ok(format!("JSONExtractRaw({})", args.join(", ")))
            }
            Some(ExprType::Table { alias, .. }) => Ok(quote_identifier(alias)),
            Some(ExprType::Scalar { .. }) | None => Err(QueryError::internal(format!(
                "untyped field \"{}\" reached the executable printer",
                chain.join(".")
            ))),
        }
    }

    fn literal(&mut self, value: &Literal) -> Result<String, QueryError> {
        if self.dialect == Dialect::HogQL || value.prints_inline() {
            return Ok(format!("{value}"));
        }
        let name = self.ctx.add_value(value.clone());
        Ok(format!("{{{name}:{}}}", placeholder_type(value)))
    }
}

/// Server-side parameter type for a quoted literal.
fn placeholder_type(value: &Literal) -> &'static str {
    match value {
        Literal::String(_) | Literal::Json(_) => "String",
        Literal::Date(_) => "Date",
        Literal::DateTime(_) => "DateTime",
        Literal::Uuid(_) => "UUID",
        Literal::Array(_) => "Array(String)",
        Literal::Null | Literal::Bool(_) | Literal::Int(_) | Literal::Float(_) => "String",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompareOp, ScalarType};
    use crate::catalog::Catalog;

    fn ctx() -> Context {
        Context::new(1, Catalog::for_team(1))
    }

    fn events_field(name: &str, physical: &str, ty: ScalarType) -> Expr {
        Expr::typed(
            ExprKind::Field { chain: vec!["events".to_string(), name.to_string()] },
            ExprType::Field {
                table_alias: "events".to_string(),
                table: "events".to_string(),
                name: name.to_string(),
                physical: physical.to_string(),
                ty,
                nullable: false,
            },
        )
    }

    #[test]
    fn quoted_literals_become_typed_placeholders() {
        let mut ctx = ctx();
        let filter = Expr::compare(
            CompareOp::Eq,
            events_field("event", "event", ScalarType::String),
            Expr::lit(Literal::string("page_view")),
        );
        let mut select = SelectQuery::new(vec![events_field("event", "event", ScalarType::String)], None);
        select.where_clause = Some(filter);

        let sql = print_query(&Query::Select(select), Dialect::ClickHouse, &mut ctx).unwrap();
        assert!(sql.contains("events.event = {val_0:String}"), "{sql}");
        assert_eq!(ctx.params.to_json().get("val_0"), Some(&serde_json::json!("page_view")));
    }

    #[test]
    fn numeric_literals_print_inline_and_claim_no_slot() {
        let mut ctx = ctx();
        let filter = Expr::compare(
            CompareOp::Eq,
            events_field("team_id", "team_id", ScalarType::Int),
            Expr::lit(Literal::Int(42)),
        );
        let mut select = SelectQuery::new(vec![Expr::lit(Literal::Int(1))], None);
        select.where_clause = Some(filter);

        let sql = print_query(&Query::Select(select), Dialect::ClickHouse, &mut ctx).unwrap();
        assert!(sql.contains("team_id = 42"), "{sql}");
        assert!(ctx.params.is_empty());
    }

    #[test]
    fn property_access_extracts_from_json() {
        let mut ctx = ctx();
        let prop = Expr::typed(
            ExprKind::Field {
                chain: vec!["events".to_string(), "properties".to_string(), "utm source".to_string()],
            },
            ExprType::Property {
                table: "events".to_string(),
                table_alias: "events".to_string(),
                json_column: "properties".to_string(),
                path: vec!["utm source".to_string()],
                nullable: true,
            },
        );
        let select = SelectQuery::new(vec![prop], None);
        let sql = print_query(&Query::Select(select), Dialect::ClickHouse, &mut ctx).unwrap();
        assert!(sql.contains("JSONExtractRaw(events.properties, {val_0:String})"), "{sql}");
        assert_eq!(ctx.params.to_json().get("val_0"), Some(&serde_json::json!("utm source")));
    }

    #[test]
    fn physical_names_needing_quotes_get_backticks() {
        let mut ctx = ctx();
        let select =
            SelectQuery::new(vec![events_field("session_id", "$session_id", ScalarType::String)], None);
        let sql = print_query(&Query::Select(select), Dialect::ClickHouse, &mut ctx).unwrap();
        assert!(sql.contains("events.`$session_id`"), "{sql}");
    }

    #[test]
    fn untyped_fields_are_an_internal_error_in_the_executable_dialect() {
        let mut ctx = ctx();
        let select = SelectQuery::new(vec![Expr::field(&["events", "event"])], None);
        let err = print_query(&Query::Select(select), Dialect::ClickHouse, &mut ctx).unwrap_err();
        assert!(!err.is_user_error());
    }

    #[test]
    fn constraint_on_the_first_from_entry_is_an_internal_error() {
        use crate::ast::ResolvedTable;

        let catalog = Catalog::for_team(1);
        let events = catalog.get_table("events", None).unwrap();
        let mut from = JoinExpr::table(&["events"]);
        from.resolved =
            Some(ResolvedTable::Catalog { table: events, alias: "events".to_string() });
        from.constraint = Some(Expr::lit(Literal::Bool(true)));

        let select = SelectQuery::new(vec![Expr::lit(Literal::Int(1))], Some(from));
        let err = print_query(&Query::Select(select), Dialect::ClickHouse, &mut ctx()).unwrap_err();
        assert!(!err.is_user_error());
    }

    #[test]
    fn constraint_without_a_join_operator_is_an_internal_error() {
        use crate::ast::ResolvedTable;
        use std::sync::Arc;

        let catalog = Catalog::for_team(1);
        let events = catalog.get_table("events", None).unwrap();
        let mut joined = JoinExpr::table(&["events"]).with_alias("e2");
        joined.resolved =
            Some(ResolvedTable::Catalog { table: Arc::clone(&events), alias: "e2".to_string() });
        joined.constraint = Some(Expr::lit(Literal::Bool(true)));
        let mut root = JoinExpr::table(&["events"]);
        root.resolved = Some(ResolvedTable::Catalog { table: events, alias: "events".to_string() });
        root.push(joined);

        let select = SelectQuery::new(vec![Expr::lit(Literal::Int(1))], Some(root));
        let err = print_query(&Query::Select(select), Dialect::ClickHouse, &mut ctx()).unwrap_err();
        assert!(!err.is_user_error());
    }

    #[test]
    fn display_dialect_prints_the_source_form() {
        let mut ctx = ctx();
        let filter = Expr::compare(
            CompareOp::Eq,
            Expr::field(&["properties", "plan"]),
            Expr::lit(Literal::string("pro")),
        );
        let mut select = SelectQuery::new(vec![Expr::field(&["event"])], Some(JoinExpr::table(&["events"])));
        select.where_clause = Some(filter);

        let sql = print_query(&Query::Select(select), Dialect::HogQL, &mut ctx).unwrap();
        assert_eq!(sql, "SELECT event FROM events WHERE properties.plan = 'pro'");
        assert!(ctx.params.is_empty());
    }

    #[test]
    fn secret_function_arguments_use_the_sensitive_namespace() {
        use crate::ast::ResolvedTable;
        use crate::catalog::{FieldDef, TableDef, TableKind};
        use indexmap::IndexMap;
        use std::sync::Arc;

        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), FieldDef::column("id", ScalarType::String));
        let table = TableDef {
            name: "stripe_charges".to_string(),
            fields,
            kind: TableKind::Function {
                function: "s3".to_string(),
                args: vec![
                    FunctionArg::Plain(Literal::string("https://bucket/charges/*.parquet")),
                    FunctionArg::Secret(Literal::string("AKIA")),
                    FunctionArg::Secret(Literal::string("shh")),
                    FunctionArg::Plain(Literal::string("Parquet")),
                ],
            },
            scoping: crate::catalog::Scoping::Exempt,
            access: None,
        };

        let mut from = JoinExpr::table(&["stripe_charges"]);
        from.resolved = Some(ResolvedTable::Catalog {
            table: Arc::new(table),
            alias: "stripe_charges".to_string(),
        });
        let select = SelectQuery::new(
            vec![Expr::typed(
                ExprKind::Field { chain: vec!["stripe_charges".to_string(), "id".to_string()] },
                ExprType::Field {
                    table_alias: "stripe_charges".to_string(),
                    table: "stripe_charges".to_string(),
                    name: "id".to_string(),
                    physical: "id".to_string(),
                    ty: ScalarType::String,
                    nullable: false,
                },
            )],
            Some(from),
        );

        let mut ctx = ctx();
        let sql = print_query(&Query::Select(select), Dialect::ClickHouse, &mut ctx).unwrap();
        assert!(sql.contains("s3("), "{sql}");
        assert!(sql.contains("{val_sensitive_0:String}"), "{sql}");
        assert!(sql.contains("{val_sensitive_1:String}"), "{sql}");
        assert!(!sql.contains("AKIA"), "{sql}");
        assert!(!sql.contains("shh"), "{sql}");
    }
}
