pub mod analyzer;
pub mod catalog;
pub mod expression;
pub mod plan;
pub mod types;

mod builtin;

pub use analyzer::{Analyzer, AnalyzerError, IllegalAggregation};
pub use catalog::{Catalog, CatalogError, FunctionInfo};
pub use expression::{Expression, ExpressionError};
pub use plan::LogicalPlan;
pub use types::{NullableType, Type, Value};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),
}

pub type Result<T> = std::result::Result<T, Error>;
