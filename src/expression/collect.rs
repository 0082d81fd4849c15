use super::{AttributeRef, Expression};
use crate::types::NullableType;

/// Collects the deduplicated, first-seen-ordered non-window aggregate
/// occurrences in `exprs`.
///
/// A window operand is an analytic computation, not a group-by aggregate,
/// so it is excluded; aggregates nested in a window operand's arguments
/// or in its window spec are ordinary aggregates and are included.
pub fn collect_aggregate_functions(exprs: &[Expression]) -> Vec<Expression> {
    let mut out = Vec::new();
    for expr in exprs {
        collect_into(expr, &mut out);
    }
    out
}

fn collect_into(expr: &Expression, out: &mut Vec<Expression>) {
    // Aggregates buried under window functions first.
    for win in expr.collect(&|e| matches!(e, Expression::Window(_))) {
        if let Expression::Window(call) = win {
            for child in call.function.children() {
                collect_into(child, out);
            }
            for expr in &call.spec.partition_by {
                collect_into(expr, out);
            }
            for order in &call.spec.order_by {
                collect_into(&order.expr, out);
            }
        }
    }

    // Conceal window subtrees so their operands stay invisible to the
    // outer scan, then gather distinct aggregates before plain ones.
    let concealed = eliminate(expr.clone(), &|e| matches!(e, Expression::Window(_)));
    for agg in concealed.collect(&|e| matches!(e, Expression::DistinctAggregate(_))) {
        push_unique(out, agg);
    }
    let concealed = eliminate(concealed, &|e| {
        matches!(e, Expression::DistinctAggregate(_))
    });
    for agg in concealed.collect(&|e| matches!(e, Expression::Aggregate(_))) {
        push_unique(out, agg);
    }
}

/// Collects the deduplicated, first-seen-ordered window function
/// occurrences in `exprs`.
pub fn collect_window_functions(exprs: &[Expression]) -> Vec<Expression> {
    let mut out = Vec::new();
    for expr in exprs {
        for win in expr.collect(&|e| matches!(e, Expression::Window(_))) {
            push_unique(&mut out, win);
        }
    }
    out
}

pub fn has_aggregate_function(exprs: &[Expression]) -> bool {
    exprs.iter().any(|expr| {
        let concealed = eliminate(expr.clone(), &|e| matches!(e, Expression::Window(_)));
        !concealed
            .collect(&|e| {
                matches!(
                    e,
                    Expression::Aggregate(_) | Expression::DistinctAggregate(_)
                )
            })
            .is_empty()
    })
}

pub fn has_distinct_aggregate_function(exprs: &[Expression]) -> bool {
    exprs.iter().any(|expr| {
        let concealed = eliminate(expr.clone(), &|e| matches!(e, Expression::Window(_)));
        !concealed
            .collect(&|e| matches!(e, Expression::DistinctAggregate(_)))
            .is_empty()
    })
}

pub fn has_window_function(exprs: &[Expression]) -> bool {
    exprs.iter().any(|expr| {
        !expr
            .collect(&|e| matches!(e, Expression::Window(_)))
            .is_empty()
    })
}

/// A copy of `expr` with every window subtree concealed.
pub(crate) fn eliminate_window_functions(expr: &Expression) -> Expression {
    eliminate(expr.clone(), &|e| matches!(e, Expression::Window(_)))
}

/// Replaces every node matching `predicate` with a throwaway internal
/// attribute, hiding the whole subtree from subsequent scans.
fn eliminate<F>(expr: Expression, predicate: &F) -> Expression
where
    F: Fn(&Expression) -> bool,
{
    expr.transform_down(&mut |e| {
        if predicate(&e) {
            let ty = e.ty().unwrap_or(NullableType::Null);
            Expression::Attribute(AttributeRef::new_internal("$hidden".to_owned(), ty, true))
        } else {
            e
        }
    })
}

fn push_unique(out: &mut Vec<Expression>, expr: Expression) {
    if !out.contains(&expr) {
        out.push(expr);
    }
}
