use super::{AnalyzerError, AnalyzerResult, AnalyzerRule};
use crate::catalog::Catalog;
use crate::expression::{AttributeRef, Expression, FunctionArgs, FunctionCall};
use crate::plan::LogicalPlan;

/// Binds `UnresolvedRelation` leaves against the catalog.
pub struct ResolveRelations;

impl AnalyzerRule for ResolveRelations {
    fn name(&self) -> &'static str {
        "resolve_relations"
    }

    fn apply(&self, plan: LogicalPlan, catalog: &Catalog) -> AnalyzerResult<LogicalPlan> {
        plan.transform_down(&mut |node| match node {
            LogicalPlan::UnresolvedRelation(name) => Ok(catalog.lookup_relation(&name)?),
            other => Ok(other),
        })
    }
}

/// Binds column name references against the output of the node below
/// them. Unknown names are left untouched: a HAVING or ORDER BY reference
/// may be a SELECT alias that only absorption can bind, and whatever is
/// still unresolved after the fixed point is reported then.
pub struct ResolveColumns;

impl AnalyzerRule for ResolveColumns {
    fn name(&self) -> &'static str {
        "resolve_columns"
    }

    fn apply(&self, plan: LogicalPlan, _catalog: &Catalog) -> AnalyzerResult<LogicalPlan> {
        plan.transform_down(&mut |node| {
            let scope = match &node {
                LogicalPlan::Project(project) => project.input.output(),
                LogicalPlan::Filter(filter) => filter.input.output(),
                LogicalPlan::Sort(sort) => sort.input.output(),
                LogicalPlan::UnresolvedAggregate(agg) => agg.input.output(),
                _ => return Ok(node),
            };
            bind_columns(node, &scope)
        })
    }
}

fn bind_columns(node: LogicalPlan, scope: &[AttributeRef]) -> AnalyzerResult<LogicalPlan> {
    let mut error = None;
    let node = node.map_expressions(&mut |expr| {
        expr.transform_up(&mut |e| match e {
            Expression::Column(name) => {
                let mut matches = scope
                    .iter()
                    .filter(|attr| !attr.internal && attr.name == name);
                match (matches.next(), matches.next()) {
                    (Some(attr), None) => Expression::Attribute(attr.clone()),
                    (Some(_), Some(_)) => {
                        if error.is_none() {
                            error = Some(AnalyzerError::AmbiguousColumn(name.clone()));
                        }
                        Expression::Column(name)
                    }
                    _ => Expression::Column(name),
                }
            }
            other => other,
        })
    });
    match error {
        Some(error) => Err(error),
        None => Ok(node),
    }
}

/// Binds unresolved function calls through the catalog's builders.
pub struct ResolveFunctions;

impl AnalyzerRule for ResolveFunctions {
    fn name(&self) -> &'static str {
        "resolve_functions"
    }

    fn apply(&self, plan: LogicalPlan, catalog: &Catalog) -> AnalyzerResult<LogicalPlan> {
        plan.transform_down(&mut |node| {
            let mut error = None;
            let node = node.map_expressions(&mut |expr| {
                expr.transform_up(&mut |e| match e {
                    Expression::Function(call) if error.is_none() => {
                        match bind_function(&call, catalog) {
                            Ok(resolved) => resolved,
                            Err(e) => {
                                error = Some(e);
                                Expression::Function(call)
                            }
                        }
                    }
                    other => other,
                })
            });
            match error {
                Some(error) => Err(error),
                None => Ok(node),
            }
        })
    }
}

fn bind_function(call: &FunctionCall, catalog: &Catalog) -> AnalyzerResult<Expression> {
    let info = catalog.lookup_function(&call.name)?;
    let args = match &call.args {
        FunctionArgs::Wildcard => {
            // count(*) is a special case equivalent to count(1).
            if call.name.eq_ignore_ascii_case("count") {
                vec![Expression::literal(1i64)]
            } else {
                return Err(AnalyzerError::InvalidArgument(call.name.clone()));
            }
        }
        FunctionArgs::Expressions(args) => args.clone(),
    };
    let resolved = (info.build)(args)?;
    if call.is_distinct {
        match resolved {
            Expression::Aggregate(inner) => Ok(Expression::DistinctAggregate(inner)),
            _ => Err(AnalyzerError::InvalidArgument(call.name.clone())),
        }
    } else {
        Ok(resolved)
    }
}
