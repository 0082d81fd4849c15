use crate::catalog::{CatalogError, CatalogResult, FunctionInfo};
use crate::expression::{AggregateCall, AggregateFunction, Expression};

pub(crate) fn load() -> impl Iterator<Item = FunctionInfo> {
    [
        FunctionInfo {
            name: "avg",
            build: |args| build(AggregateFunction::Avg, "avg", args),
        },
        FunctionInfo {
            name: "count",
            build: |args| build(AggregateFunction::Count, "count", args),
        },
        FunctionInfo {
            name: "max",
            build: |args| build(AggregateFunction::Max, "max", args),
        },
        FunctionInfo {
            name: "min",
            build: |args| build(AggregateFunction::Min, "min", args),
        },
        FunctionInfo {
            name: "sum",
            build: |args| build(AggregateFunction::Sum, "sum", args),
        },
    ]
    .into_iter()
}

fn build(
    function: AggregateFunction,
    name: &'static str,
    args: Vec<Expression>,
) -> CatalogResult<Expression> {
    if args.len() != 1 {
        return Err(CatalogError::Arity(name));
    }
    Ok(Expression::Aggregate(AggregateCall::new(function, args)))
}
