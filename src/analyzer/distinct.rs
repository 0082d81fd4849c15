use super::{AnalyzerResult, AnalyzerRule};
use crate::catalog::Catalog;
use crate::expression::{collect::has_aggregate_function, Expression};
use crate::plan::{LogicalPlan, UnresolvedAggregate};

/// `SELECT DISTINCT l FROM r` is `SELECT l FROM r GROUP BY l`: a
/// `Distinct` over a resolved input becomes an aggregation grouping on
/// every output column.
pub struct RewriteDistincts;

impl AnalyzerRule for RewriteDistincts {
    fn name(&self) -> &'static str {
        "rewrite_distincts"
    }

    fn apply(&self, plan: LogicalPlan, _catalog: &Catalog) -> AnalyzerResult<LogicalPlan> {
        plan.transform_down(&mut |node| match node {
            LogicalPlan::Distinct(distinct) if distinct.input.resolved() => {
                let output: Vec<Expression> = distinct
                    .input
                    .output()
                    .into_iter()
                    .map(Expression::Attribute)
                    .collect();
                Ok(LogicalPlan::UnresolvedAggregate(UnresolvedAggregate {
                    input: distinct.input,
                    keys: output.clone(),
                    project_list: output,
                    having_conditions: Vec::new(),
                    order: Vec::new(),
                }))
            }
            other => Ok(other),
        })
    }
}

/// A projection containing an aggregate is an aggregation over the whole
/// input: `SELECT count(x) FROM t` groups on nothing.
pub struct RewriteProjectsAsGlobalAggregates;

impl AnalyzerRule for RewriteProjectsAsGlobalAggregates {
    fn name(&self) -> &'static str {
        "rewrite_projects_as_global_aggregates"
    }

    fn apply(&self, plan: LogicalPlan, _catalog: &Catalog) -> AnalyzerResult<LogicalPlan> {
        plan.transform_down(&mut |node| match node {
            LogicalPlan::Project(project)
                if project.input.resolved() && has_aggregate_function(&project.project_list) =>
            {
                Ok(LogicalPlan::UnresolvedAggregate(UnresolvedAggregate {
                    input: project.input,
                    keys: Vec::new(),
                    project_list: project.project_list,
                    having_conditions: Vec::new(),
                    order: Vec::new(),
                }))
            }
            other => Ok(other),
        })
    }
}
