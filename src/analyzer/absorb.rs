use super::{AnalyzerResult, AnalyzerRule, IllegalAggregation};
use crate::catalog::Catalog;
use crate::expression::collect::collect_window_functions;
use crate::expression::Expression;
use crate::plan::{Filter, LogicalPlan, Sort};

/// Folds a `Filter` sitting directly above an `UnresolvedAggregate` into
/// its HAVING slot. The condition is bound against the aggregation's
/// projection first, with aliases unwrapped, so HAVING operates on the
/// underlying expressions.
pub struct AbsorbHavingConditions;

impl AnalyzerRule for AbsorbHavingConditions {
    fn name(&self) -> &'static str {
        "absorb_having_conditions"
    }

    fn apply(&self, plan: LogicalPlan, _catalog: &Catalog) -> AnalyzerResult<LogicalPlan> {
        plan.transform_down(&mut |node| match node {
            LogicalPlan::Filter(filter) => match *filter.input {
                LogicalPlan::UnresolvedAggregate(mut agg)
                    if agg.project_list.iter().all(Expression::resolved) =>
                {
                    let condition =
                        resolve_against_projection(filter.condition, &agg.project_list);
                    // HAVING is evaluated before windows, so the bound
                    // condition may reference neither a window call nor
                    // the synthetic attribute a window layer exposes.
                    if let Some(window) =
                        collect_window_functions(std::slice::from_ref(&condition)).first()
                    {
                        return Err(IllegalAggregation::WindowNotAllowed {
                            clause: "HAVING",
                            window: window.to_string(),
                        }
                        .into());
                    }
                    if let Some(attr) = condition
                        .references()
                        .into_iter()
                        .find(|attr| attr.internal)
                    {
                        return Err(IllegalAggregation::WindowNotAllowed {
                            clause: "HAVING",
                            window: attr.name,
                        }
                        .into());
                    }
                    agg.having_conditions.push(condition);
                    Ok(LogicalPlan::UnresolvedAggregate(agg))
                }
                input => Ok(LogicalPlan::Filter(Filter {
                    condition: filter.condition,
                    input: Box::new(input),
                })),
            },
            other => Ok(other),
        })
    }
}

/// Folds a `Sort` sitting directly above an `UnresolvedAggregate` into
/// its order slot. A single ORDER BY binds to the aggregation, so the
/// sort adjacent to it wins and outer sorts collapse without overriding.
pub struct AbsorbSorts;

impl AnalyzerRule for AbsorbSorts {
    fn name(&self) -> &'static str {
        "absorb_sorts"
    }

    fn apply(&self, plan: LogicalPlan, _catalog: &Catalog) -> AnalyzerResult<LogicalPlan> {
        plan.transform_down(&mut |node| match node {
            LogicalPlan::Sort(sort) => match *sort.input {
                LogicalPlan::UnresolvedAggregate(mut agg)
                    if agg.project_list.iter().all(Expression::resolved) =>
                {
                    if agg.order.is_empty() {
                        agg.order = sort
                            .order
                            .into_iter()
                            .map(|order| {
                                order.map_expr(|expr| {
                                    resolve_against_projection(expr, &agg.project_list)
                                })
                            })
                            .collect();
                    }
                    Ok(LogicalPlan::UnresolvedAggregate(agg))
                }
                input => Ok(LogicalPlan::Sort(Sort {
                    order: sort.order,
                    input: Box::new(input),
                })),
            },
            other => Ok(other),
        })
    }
}

/// Binds alias references (by name or by output attribute) to the aliased
/// expression itself, so `HAVING c > 0` with `count(x) AS c` filters on
/// `count(x)`.
fn resolve_against_projection(expr: Expression, project_list: &[Expression]) -> Expression {
    expr.transform_up(&mut |e| {
        match &e {
            Expression::Column(name) => {
                for item in project_list {
                    if let Expression::Alias(alias) = item {
                        if alias.name == *name {
                            return alias.child.clone();
                        }
                    }
                }
            }
            Expression::Attribute(attr) => {
                for item in project_list {
                    if let Expression::Alias(alias) = item {
                        if alias.id == attr.id {
                            return alias.child.clone();
                        }
                    }
                }
            }
            _ => {}
        }
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{AggregateCall, AggregateFunction, AttributeRef};
    use crate::types::Type;

    #[test]
    fn alias_references_unwrap_to_the_aliased_expression() {
        let x = Expression::Attribute(AttributeRef::new("x", Type::Integer, false));
        let count = Expression::Aggregate(AggregateCall::new(AggregateFunction::Count, vec![x]));
        let project_list = vec![count.clone().alias("c")];

        let condition = Expression::column("c").gt(Expression::literal(0i64));
        let resolved = resolve_against_projection(condition, &project_list);
        assert_eq!(resolved, count.gt(Expression::literal(0i64)));
    }
}
