use crate::catalog::{CatalogError, CatalogResult, FunctionInfo};
use crate::expression::{Expression, ScalarFunction};

pub(crate) fn load() -> impl Iterator<Item = FunctionInfo> {
    [
        FunctionInfo {
            name: "abs",
            build: |args| build(ScalarFunction::Abs, "abs", args),
        },
        FunctionInfo {
            name: "length",
            build: |args| build(ScalarFunction::Length, "length", args),
        },
        FunctionInfo {
            name: "lower",
            build: |args| build(ScalarFunction::Lower, "lower", args),
        },
        FunctionInfo {
            name: "upper",
            build: |args| build(ScalarFunction::Upper, "upper", args),
        },
    ]
    .into_iter()
}

fn build(
    function: ScalarFunction,
    name: &'static str,
    args: Vec<Expression>,
) -> CatalogResult<Expression> {
    if args.len() != 1 {
        return Err(CatalogError::Arity(name));
    }
    Ok(Expression::ScalarFunction { function, args })
}
