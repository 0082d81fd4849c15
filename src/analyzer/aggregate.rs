use super::{AnalyzerResult, AnalyzerRule, IllegalAggregation};
use crate::catalog::Catalog;
use crate::expression::alias::{restorer, rewriter, SyntheticAlias};
use crate::expression::collect::{
    collect_aggregate_functions, collect_window_functions, eliminate_window_functions,
    has_distinct_aggregate_function,
};
use crate::expression::{Alias, Expression, ExpressionId, SortOrder, WindowCall, WindowSpec};
use crate::plan::{self, Filter, LogicalPlan, Sort, UnresolvedAggregate};

/// Lowers a ready `UnresolvedAggregate` into the canonical layered plan
///
/// ```text
/// Aggregate → Filter? → Window* → Sort? → Project
/// ```
///
/// where every grouping key, aggregate occurrence, and window occurrence
/// is bound to a synthetic attribute, and the top projection restores the
/// user-visible names and ids.
pub struct ResolveAggregates;

impl AnalyzerRule for ResolveAggregates {
    fn name(&self) -> &'static str {
        "resolve_aggregates"
    }

    fn apply(&self, plan: LogicalPlan, _catalog: &Catalog) -> AnalyzerResult<LogicalPlan> {
        resolve(plan)
    }
}

fn resolve(plan: LogicalPlan) -> AnalyzerResult<LogicalPlan> {
    match plan {
        // A Filter or Sort directly above the aggregation absorbs into it
        // first; skip the aggregation itself but keep descending.
        LogicalPlan::Filter(filter) => match *filter.input {
            LogicalPlan::UnresolvedAggregate(agg) => Ok(LogicalPlan::Filter(Filter {
                condition: filter.condition,
                input: Box::new(resolve_input_only(agg)?),
            })),
            input => Ok(LogicalPlan::Filter(Filter {
                condition: filter.condition,
                input: Box::new(resolve(input)?),
            })),
        },
        LogicalPlan::Sort(sort) => match *sort.input {
            LogicalPlan::UnresolvedAggregate(agg) => Ok(LogicalPlan::Sort(Sort {
                order: sort.order,
                input: Box::new(resolve_input_only(agg)?),
            })),
            input => Ok(LogicalPlan::Sort(Sort {
                order: sort.order,
                input: Box::new(resolve(input)?),
            })),
        },
        LogicalPlan::UnresolvedAggregate(agg) => {
            let UnresolvedAggregate {
                input,
                keys,
                project_list,
                having_conditions,
                order,
            } = agg;
            let agg = UnresolvedAggregate {
                input: Box::new(resolve(*input)?),
                keys,
                project_list,
                having_conditions,
                order,
            };
            if ready(&agg) {
                resolve_aggregate(agg)
            } else {
                Ok(LogicalPlan::UnresolvedAggregate(agg))
            }
        }
        other => other.try_map_children(&mut |child| resolve(child)),
    }
}

fn resolve_input_only(agg: UnresolvedAggregate) -> AnalyzerResult<LogicalPlan> {
    let UnresolvedAggregate {
        input,
        keys,
        project_list,
        having_conditions,
        order,
    } = agg;
    Ok(LogicalPlan::UnresolvedAggregate(UnresolvedAggregate {
        input: Box::new(resolve(*input)?),
        keys,
        project_list,
        having_conditions,
        order,
    }))
}

/// The rule only fires once everything it needs to inspect is resolved,
/// and never while a distinct aggregate is present (a later check rejects
/// those as unsupported).
fn ready(agg: &UnresolvedAggregate) -> bool {
    agg.input.resolved()
        && agg.keys.iter().all(Expression::resolved)
        && agg.project_list.iter().all(Expression::resolved)
        && agg.having_conditions.iter().all(Expression::resolved)
        && agg.order.iter().all(|order| order.expr.resolved())
        && !has_distinct_aggregate_function(&agg.project_list)
}

fn resolve_aggregate(agg: UnresolvedAggregate) -> AnalyzerResult<LogicalPlan> {
    let UnresolvedAggregate {
        input,
        keys,
        project_list,
        having_conditions,
        order,
    } = agg;

    // Aggregates are illegal in GROUP BY; windows are illegal in GROUP BY
    // and HAVING.
    for key in &keys {
        let concealed = eliminate_window_functions(key);
        if let Some(aggregate) =
            collect_aggregate_functions(std::slice::from_ref(&concealed)).first()
        {
            return Err(IllegalAggregation::AggregateInGroupingKey {
                key: key.to_string(),
                aggregate: aggregate.to_string(),
            }
            .into());
        }
        if let Some(window) = collect_window_functions(std::slice::from_ref(key)).first() {
            return Err(IllegalAggregation::WindowNotAllowed {
                clause: "GROUP BY",
                window: window.to_string(),
            }
            .into());
        }
    }
    for condition in &having_conditions {
        if let Some(window) = collect_window_functions(std::slice::from_ref(condition)).first() {
            return Err(IllegalAggregation::WindowNotAllowed {
                clause: "HAVING",
                window: window.to_string(),
            }
            .into());
        }
    }

    // Alias every grouping key.
    let mut key_aliases = Vec::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        key_aliases.push(SyntheticAlias::grouping(i, key.clone())?);
    }

    // Collect aggregate occurrences across SELECT, HAVING and ORDER BY,
    // after the key rewrite so aggregate arguments coinciding with a
    // grouping key reference the key attribute.
    let mut sources = Vec::with_capacity(project_list.len() + having_conditions.len() + order.len());
    for expr in project_list.iter().chain(&having_conditions) {
        sources.push(apply_rewriter(expr.clone(), &key_aliases));
    }
    for order in &order {
        sources.push(apply_rewriter(order.expr.clone(), &key_aliases));
    }
    let aggs = collect_aggregate_functions(&sources);

    // Aggregates do not nest.
    for agg in &aggs {
        let args = match agg {
            Expression::Aggregate(call) | Expression::DistinctAggregate(call) => &call.args,
            _ => continue,
        };
        if let Some(inner) = collect_aggregate_functions(args).first() {
            return Err(IllegalAggregation::NestedAggregate {
                outer: apply_restorer(agg.clone(), &key_aliases).to_string(),
                inner: apply_restorer(inner.clone(), &key_aliases).to_string(),
            }
            .into());
        }
    }

    // Alias every aggregate occurrence.
    let mut agg_aliases = Vec::with_capacity(aggs.len());
    for (i, agg) in aggs.iter().enumerate() {
        agg_aliases.push(SyntheticAlias::aggregation(i, agg.clone())?);
    }

    // Collect window occurrences from SELECT and ORDER BY once keys and
    // aggregates are substituted, and alias them as well.
    let mut window_sources = Vec::with_capacity(project_list.len() + order.len());
    for expr in &project_list {
        window_sources.push(rewrite_aggregates(
            apply_rewriter(expr.clone(), &key_aliases),
            &agg_aliases,
        ));
    }
    for order in &order {
        window_sources.push(rewrite_aggregates(
            apply_rewriter(order.expr.clone(), &key_aliases),
            &agg_aliases,
        ));
    }
    let wins = collect_window_functions(&window_sources);
    let mut window_aliases = Vec::with_capacity(wins.len());
    for (i, win) in wins.iter().enumerate() {
        window_aliases.push(SyntheticAlias::window(i, win.clone())?);
    }

    // Keys, then aggregates, then windows; restoration runs the inverse
    // order and exists only to format errors.
    let rewrite = |expr: Expression| -> Expression {
        let expr = apply_rewriter(expr, &key_aliases);
        let expr = rewrite_aggregates(expr, &agg_aliases);
        apply_rewriter(expr, &window_aliases)
    };
    let restore = |expr: Expression| -> Expression {
        let expr = apply_restorer(expr, &window_aliases);
        let expr = apply_restorer(expr, &agg_aliases);
        apply_restorer(expr, &key_aliases)
    };

    let rewritten_conditions: Vec<Expression> = having_conditions
        .iter()
        .map(|condition| rewrite(condition.clone()))
        .collect();
    let rewritten_order: Vec<SortOrder> = order
        .iter()
        .map(|order| order.clone().map_expr(|expr| rewrite(expr)))
        .collect();

    // Project items that collapse to a bare internal attribute are
    // re-aliased under their original name and id, so output identities
    // survive the rewrite.
    let mut rewritten_project = Vec::with_capacity(project_list.len());
    for item in &project_list {
        let rewritten = match rewrite(item.clone()) {
            Expression::Attribute(attr) if attr.internal => {
                let alias = match named_id(item) {
                    Some(id) => Alias::with_id(Expression::Attribute(attr), item.name(), id),
                    None => Alias::new(Expression::Attribute(attr), item.name()),
                };
                Expression::Alias(Box::new(alias))
            }
            other => other,
        };
        rewritten_project.push(rewritten);
    }

    // Everything each component still references must be a synthetic
    // attribute; HAVING and ORDER BY may additionally reference the
    // projected outputs.
    let output_ids: Vec<ExpressionId> = rewritten_project
        .iter()
        .filter_map(|expr| expr.output_attribute().ok())
        .map(|attr| attr.id)
        .collect();
    let keys_rendering = keys
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let reject_dangling =
        |component: &'static str, exprs: &[Expression], allowed: &[ExpressionId]| {
            for expr in exprs {
                for attr in expr.references() {
                    if attr.internal || allowed.contains(&attr.id) {
                        continue;
                    }
                    return Err(IllegalAggregation::DanglingReference {
                        component,
                        attribute: attr.name.clone(),
                        expression: restore(expr.clone()).to_string(),
                        keys: keys_rendering.clone(),
                    });
                }
            }
            Ok(())
        };
    reject_dangling("window function", &wins, &[])?;
    reject_dangling("SELECT field", &rewritten_project, &[])?;
    reject_dangling("HAVING condition", &rewritten_conditions, &output_ids)?;
    let order_exprs: Vec<Expression> = rewritten_order
        .iter()
        .map(|order| order.expr.clone())
        .collect();
    reject_dangling("ORDER BY expression", &order_exprs, &output_ids)?;

    // Assemble the layered plan bottom-up.
    let mut plan = LogicalPlan::Aggregate(plan::Aggregate {
        input,
        keys: key_aliases,
        aggregates: agg_aliases,
    });
    if !rewritten_conditions.is_empty() {
        plan = plan.filter(conjunction(rewritten_conditions));
    }
    for functions in window_layers(window_aliases) {
        plan = LogicalPlan::Window(plan::Window {
            input: Box::new(plan),
            functions,
        });
    }
    if !rewritten_order.is_empty() {
        plan = plan.sort(rewritten_order);
    }
    Ok(plan.project(rewritten_project))
}

fn apply_rewriter(expr: Expression, aliases: &[SyntheticAlias]) -> Expression {
    expr.transform_up(&mut rewriter(aliases))
}

fn apply_restorer(expr: Expression, aliases: &[SyntheticAlias]) -> Expression {
    expr.transform_up(&mut restorer(aliases))
}

/// Substitutes aggregate occurrences, except for the one sitting at the
/// top of a window function: `max(a) OVER (…)` is an analytic
/// computation, not a group-by aggregate. Aggregates nested inside the
/// window operand's arguments stay substituted.
fn rewrite_aggregates(expr: Expression, aliases: &[SyntheticAlias]) -> Expression {
    let rewritten = expr.transform_up(&mut rewriter(aliases));
    rewritten.transform_up(&mut |e| match e {
        Expression::Window(call) => {
            let WindowCall { function, spec } = *call;
            let function = function
                .transform_up(&mut restorer(aliases))
                .map_children(&mut |child| child.transform_up(&mut rewriter(aliases)));
            Expression::Window(Box::new(WindowCall { function, spec }))
        }
        other => other,
    })
}

fn named_id(expr: &Expression) -> Option<ExpressionId> {
    match expr {
        Expression::Attribute(attr) => Some(attr.id),
        Expression::Alias(alias) => Some(alias.id),
        _ => None,
    }
}

fn conjunction(conditions: Vec<Expression>) -> Expression {
    let mut iter = conditions.into_iter();
    match iter.next() {
        Some(first) => iter.fold(first, Expression::and),
        None => Expression::literal(true),
    }
}

/// Groups window aliases into layers by their window spec, first-seen
/// order both across and within layers.
fn window_layers(aliases: Vec<SyntheticAlias>) -> Vec<Vec<SyntheticAlias>> {
    let mut layers: Vec<(WindowSpec, Vec<SyntheticAlias>)> = Vec::new();
    for alias in aliases {
        let spec = match &alias.child {
            Expression::Window(call) => call.spec.clone(),
            _ => WindowSpec::default(),
        };
        match layers.iter_mut().find(|(existing, _)| *existing == spec) {
            Some((_, layer)) => layer.push(alias),
            None => layers.push((spec, vec![alias])),
        }
    }
    layers.into_iter().map(|(_, layer)| layer).collect()
}
