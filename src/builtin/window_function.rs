use crate::catalog::{CatalogError, CatalogResult, FunctionInfo};
use crate::expression::{Expression, RankingFunction};

pub(crate) fn load() -> impl Iterator<Item = FunctionInfo> {
    [
        FunctionInfo {
            name: "row_number",
            build: |args| build(RankingFunction::RowNumber, "row_number", args),
        },
        FunctionInfo {
            name: "rank",
            build: |args| build(RankingFunction::Rank, "rank", args),
        },
        FunctionInfo {
            name: "dense_rank",
            build: |args| build(RankingFunction::DenseRank, "dense_rank", args),
        },
    ]
    .into_iter()
}

fn build(
    function: RankingFunction,
    name: &'static str,
    args: Vec<Expression>,
) -> CatalogResult<Expression> {
    if !args.is_empty() {
        return Err(CatalogError::Arity(name));
    }
    Ok(Expression::Ranking(function))
}
