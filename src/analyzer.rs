pub mod absorb;
pub mod aggregate;
pub mod distinct;
pub mod resolve;

use crate::catalog::{Catalog, CatalogError};
use crate::expression::{Expression, ExpressionError};
use crate::plan::LogicalPlan;
use tracing::{debug, trace};

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    IllegalAggregation(#[from] IllegalAggregation),

    #[error("Distinct aggregate function is not supported yet")]
    DistinctAggregateUnsupported,

    #[error("Ambiguous column {0:?}")]
    AmbiguousColumn(String),

    #[error("Invalid argument to function {0}")]
    InvalidArgument(String),

    #[error("Window function {0} requires an OVER clause")]
    WindowRequired(String),

    #[error("Plan is not fully resolved: {0}")]
    Unresolved(String),

    #[error("Analysis did not converge after {0} iterations")]
    IterationLimit(usize),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

pub type AnalyzerResult<T> = std::result::Result<T, AnalyzerError>;

/// A query that mixes grouping, aggregates, HAVING, ORDER BY, or window
/// functions in a way that has no meaning.
#[derive(Debug, thiserror::Error)]
pub enum IllegalAggregation {
    #[error("Aggregate function {aggregate} is not allowed in grouping key {key}")]
    AggregateInGroupingKey { key: String, aggregate: String },

    #[error("Window function {window} is not allowed in {clause}")]
    WindowNotAllowed {
        clause: &'static str,
        window: String,
    },

    #[error("Aggregate function {inner} cannot be nested inside {outer}")]
    NestedAggregate { outer: String, inner: String },

    #[error(
        "{attribute} in {component} is neither a grouping key nor an aggregate: \
         {expression} (grouping keys: [{keys}])"
    )]
    DanglingReference {
        component: &'static str,
        attribute: String,
        expression: String,
        keys: String,
    },
}

/// A single analysis rule. Rules are pure plan-to-plan rewrites; each is
/// idempotent on its own output, and the driver below runs the batch to a
/// fixed point.
pub trait AnalyzerRule {
    fn name(&self) -> &'static str;
    fn apply(&self, plan: LogicalPlan, catalog: &Catalog) -> AnalyzerResult<LogicalPlan>;
}

pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Drives the rule batch over a plan until nothing changes, then verifies
/// the result is fully resolved.
pub struct Analyzer {
    catalog: Catalog,
    rules: Vec<Box<dyn AnalyzerRule>>,
    max_iterations: usize,
}

impl Analyzer {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            rules: vec![
                Box::new(resolve::ResolveRelations),
                Box::new(resolve::ResolveColumns),
                Box::new(resolve::ResolveFunctions),
                Box::new(distinct::RewriteDistincts),
                Box::new(distinct::RewriteProjectsAsGlobalAggregates),
                Box::new(absorb::AbsorbHavingConditions),
                Box::new(absorb::AbsorbSorts),
                Box::new(aggregate::ResolveAggregates),
            ],
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn analyze(&self, plan: LogicalPlan) -> AnalyzerResult<LogicalPlan> {
        let mut plan = plan;
        for iteration in 0..self.max_iterations {
            let mut changed = false;
            for rule in &self.rules {
                let next = rule.apply(plan.clone(), &self.catalog)?;
                if next != plan {
                    debug!(rule = rule.name(), "rule rewrote plan");
                    changed = true;
                }
                plan = next;
            }
            trace!(iteration, changed, "analysis pass complete");
            if !changed {
                check(&plan)?;
                return Ok(plan);
            }
        }
        Err(AnalyzerError::IterationLimit(self.max_iterations))
    }
}

/// Post-fixpoint validation: rejects distinct aggregates (unsupported),
/// bare ranking functions, and anything still unresolved.
fn check(plan: &LogicalPlan) -> AnalyzerResult<()> {
    for expr in plan.expressions() {
        if !expr
            .collect(&|e| matches!(e, Expression::DistinctAggregate(_)))
            .is_empty()
        {
            return Err(AnalyzerError::DistinctAggregateUnsupported);
        }
        check_ranking_placement(expr)?;
        expr.ty()?;
    }
    if matches!(
        plan,
        LogicalPlan::UnresolvedRelation(_) | LogicalPlan::UnresolvedAggregate(_)
    ) {
        return Err(AnalyzerError::Unresolved(plan.to_string()));
    }
    for child in plan.children() {
        check(child)?;
    }
    Ok(())
}

/// Ranking functions only make sense as a window operand.
fn check_ranking_placement(expr: &Expression) -> AnalyzerResult<()> {
    match expr {
        Expression::Ranking(function) => Err(AnalyzerError::WindowRequired(function.to_string())),
        Expression::Window(call) => {
            for child in call.function.children() {
                check_ranking_placement(child)?;
            }
            for expr in &call.spec.partition_by {
                check_ranking_placement(expr)?;
            }
            for order in &call.spec.order_by {
                check_ranking_placement(&order.expr)?;
            }
            Ok(())
        }
        _ => {
            for child in expr.children() {
                check_ranking_placement(child)?;
            }
            Ok(())
        }
    }
}
