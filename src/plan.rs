use crate::expression::{alias::SyntheticAlias, AttributeRef, Expression, SortOrder};

/// A node in the immutable logical plan tree. Rewrites replace nodes in
/// the parent; nothing is mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    UnresolvedRelation(String),
    Relation(Relation),
    Project(Project),
    Filter(Filter),
    Sort(Sort),
    Distinct(Distinct),
    UnresolvedAggregate(UnresolvedAggregate),
    Aggregate(Aggregate),
    Window(Window),
}

/// Leaf: a named relation with a known output schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub name: String,
    pub output: Vec<AttributeRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub project_list: Vec<Expression>,
    pub input: Box<LogicalPlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub condition: Expression,
    pub input: Box<LogicalPlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub order: Vec<SortOrder>,
    pub input: Box<LogicalPlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Distinct {
    pub input: Box<LogicalPlan>,
}

/// The intermediate aggregation produced by the SQL frontend: grouping
/// keys, projection, and any absorbed HAVING/ORDER BY, all still in
/// source form. The analyzer lowers this into the layered
/// `Aggregate → Filter → Window* → Sort → Project` stack.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedAggregate {
    pub input: Box<LogicalPlan>,
    pub keys: Vec<Expression>,
    pub project_list: Vec<Expression>,
    pub having_conditions: Vec<Expression>,
    pub order: Vec<SortOrder>,
}

/// Resolved aggregation: each grouping key and each aggregate call is
/// bound to a synthetic output attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub input: Box<LogicalPlan>,
    pub keys: Vec<SyntheticAlias>,
    pub aggregates: Vec<SyntheticAlias>,
}

/// One window computation layer; every function in the layer shares a
/// single window spec.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub input: Box<LogicalPlan>,
    pub functions: Vec<SyntheticAlias>,
}

impl LogicalPlan {
    pub fn relation(name: impl Into<String>, output: Vec<AttributeRef>) -> Self {
        Self::Relation(Relation {
            name: name.into(),
            output,
        })
    }

    pub fn project(self, project_list: Vec<Expression>) -> Self {
        Self::Project(Project {
            project_list,
            input: Box::new(self),
        })
    }

    pub fn filter(self, condition: Expression) -> Self {
        Self::Filter(Filter {
            condition,
            input: Box::new(self),
        })
    }

    pub fn sort(self, order: Vec<SortOrder>) -> Self {
        Self::Sort(Sort {
            order,
            input: Box::new(self),
        })
    }

    pub fn distinct(self) -> Self {
        Self::Distinct(Distinct {
            input: Box::new(self),
        })
    }

    pub fn aggregate(self, keys: Vec<Expression>, project_list: Vec<Expression>) -> Self {
        Self::UnresolvedAggregate(UnresolvedAggregate {
            input: Box::new(self),
            keys,
            project_list,
            having_conditions: Vec::new(),
            order: Vec::new(),
        })
    }

    /// The attributes this node exposes to its parent. Unresolved nodes
    /// expose what is known so far; unnamed projections get throwaway
    /// attributes.
    pub fn output(&self) -> Vec<AttributeRef> {
        match self {
            Self::UnresolvedRelation(_) => Vec::new(),
            Self::Relation(relation) => relation.output.clone(),
            Self::Project(project) => project_outputs(&project.project_list),
            Self::Filter(filter) => filter.input.output(),
            Self::Sort(sort) => sort.input.output(),
            Self::Distinct(distinct) => distinct.input.output(),
            Self::UnresolvedAggregate(agg) => project_outputs(&agg.project_list),
            Self::Aggregate(agg) => agg
                .keys
                .iter()
                .chain(&agg.aggregates)
                .map(|alias| alias.attr.clone())
                .collect(),
            Self::Window(window) => {
                let mut output = window.input.output();
                output.extend(window.functions.iter().map(|alias| alias.attr.clone()));
                output
            }
        }
    }

    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            Self::UnresolvedRelation(_) | Self::Relation(_) => Vec::new(),
            Self::Project(project) => vec![project.input.as_ref()],
            Self::Filter(filter) => vec![filter.input.as_ref()],
            Self::Sort(sort) => vec![sort.input.as_ref()],
            Self::Distinct(distinct) => vec![distinct.input.as_ref()],
            Self::UnresolvedAggregate(agg) => vec![agg.input.as_ref()],
            Self::Aggregate(agg) => vec![agg.input.as_ref()],
            Self::Window(window) => vec![window.input.as_ref()],
        }
    }

    /// The expressions held directly by this node.
    pub fn expressions(&self) -> Vec<&Expression> {
        match self {
            Self::UnresolvedRelation(_) | Self::Relation(_) | Self::Distinct(_) => Vec::new(),
            Self::Project(project) => project.project_list.iter().collect(),
            Self::Filter(filter) => vec![&filter.condition],
            Self::Sort(sort) => sort.order.iter().map(|order| &order.expr).collect(),
            Self::UnresolvedAggregate(agg) => agg
                .keys
                .iter()
                .chain(&agg.project_list)
                .chain(&agg.having_conditions)
                .chain(agg.order.iter().map(|order| &order.expr))
                .collect(),
            Self::Aggregate(agg) => agg
                .keys
                .iter()
                .chain(&agg.aggregates)
                .map(|alias| &alias.child)
                .collect(),
            Self::Window(window) => window.functions.iter().map(|alias| &alias.child).collect(),
        }
    }

    /// True iff this node and everything below it binds and type-checks.
    /// The unresolved node kinds never are.
    pub fn resolved(&self) -> bool {
        if matches!(
            self,
            Self::UnresolvedRelation(_) | Self::UnresolvedAggregate(_)
        ) {
            return false;
        }
        self.expressions().iter().all(|expr| expr.resolved())
            && self.children().iter().all(|child| child.resolved())
    }

    pub(crate) fn map_children<F>(self, f: &mut F) -> Self
    where
        F: FnMut(LogicalPlan) -> LogicalPlan,
    {
        match self {
            plan @ (Self::UnresolvedRelation(_) | Self::Relation(_)) => plan,
            Self::Project(project) => Self::Project(Project {
                project_list: project.project_list,
                input: f(*project.input).into(),
            }),
            Self::Filter(filter) => Self::Filter(Filter {
                condition: filter.condition,
                input: f(*filter.input).into(),
            }),
            Self::Sort(sort) => Self::Sort(Sort {
                order: sort.order,
                input: f(*sort.input).into(),
            }),
            Self::Distinct(distinct) => Self::Distinct(Distinct {
                input: f(*distinct.input).into(),
            }),
            Self::UnresolvedAggregate(agg) => Self::UnresolvedAggregate(UnresolvedAggregate {
                input: f(*agg.input).into(),
                keys: agg.keys,
                project_list: agg.project_list,
                having_conditions: agg.having_conditions,
                order: agg.order,
            }),
            Self::Aggregate(agg) => Self::Aggregate(Aggregate {
                input: f(*agg.input).into(),
                keys: agg.keys,
                aggregates: agg.aggregates,
            }),
            Self::Window(window) => Self::Window(Window {
                input: f(*window.input).into(),
                functions: window.functions,
            }),
        }
    }

    /// Rewrites the plan top-down with a fallible rule: `f` sees each
    /// node before its (already rewritten) children are visited.
    pub fn transform_down<F, E>(self, f: &mut F) -> Result<Self, E>
    where
        F: FnMut(LogicalPlan) -> Result<LogicalPlan, E>,
    {
        let plan = f(self)?;
        plan.try_map_children(&mut |child| child.transform_down(&mut *f))
    }

    pub(crate) fn try_map_children<F, E>(self, f: &mut F) -> Result<Self, E>
    where
        F: FnMut(LogicalPlan) -> Result<LogicalPlan, E>,
    {
        let mut error = None;
        let plan = self.map_children(&mut |child| match f(child) {
            Ok(child) => child,
            Err(e) => {
                error = Some(e);
                // Placeholder; the error aborts the rewrite below.
                LogicalPlan::UnresolvedRelation(String::new())
            }
        });
        match error {
            Some(e) => Err(e),
            None => Ok(plan),
        }
    }

    /// Rewrites every expression held by this node (children untouched).
    pub fn map_expressions<F>(self, f: &mut F) -> Self
    where
        F: FnMut(Expression) -> Expression,
    {
        match self {
            Self::Project(project) => Self::Project(Project {
                project_list: project.project_list.into_iter().map(|e| f(e)).collect(),
                input: project.input,
            }),
            Self::Filter(filter) => Self::Filter(Filter {
                condition: f(filter.condition),
                input: filter.input,
            }),
            Self::Sort(sort) => Self::Sort(Sort {
                order: sort
                    .order
                    .into_iter()
                    .map(|order| order.map_expr(|expr| f(expr)))
                    .collect(),
                input: sort.input,
            }),
            Self::UnresolvedAggregate(agg) => Self::UnresolvedAggregate(UnresolvedAggregate {
                input: agg.input,
                keys: agg.keys.into_iter().map(|e| f(e)).collect(),
                project_list: agg.project_list.into_iter().map(|e| f(e)).collect(),
                having_conditions: agg.having_conditions.into_iter().map(|e| f(e)).collect(),
                order: agg
                    .order
                    .into_iter()
                    .map(|order| order.map_expr(|expr| f(expr)))
                    .collect(),
            }),
            plan => plan,
        }
    }

    fn fmt_tree(&self, f: &mut std::fmt::Formatter, depth: usize) -> std::fmt::Result {
        for _ in 0..depth {
            f.write_str("  ")?;
        }
        match self {
            Self::UnresolvedRelation(name) => write!(f, "UnresolvedRelation {name}")?,
            Self::Relation(relation) => {
                write!(f, "Relation {} [{}]", relation.name, join(&relation.output))?;
            }
            Self::Project(project) => write!(f, "Project [{}]", join(&project.project_list))?,
            Self::Filter(filter) => write!(f, "Filter {}", filter.condition)?,
            Self::Sort(sort) => write!(f, "Sort [{}]", join(&sort.order))?,
            Self::Distinct(_) => f.write_str("Distinct")?,
            Self::UnresolvedAggregate(agg) => {
                write!(
                    f,
                    "UnresolvedAggregate keys=[{}] project=[{}]",
                    join(&agg.keys),
                    join(&agg.project_list),
                )?;
                if !agg.having_conditions.is_empty() {
                    write!(f, " having=[{}]", join(&agg.having_conditions))?;
                }
                if !agg.order.is_empty() {
                    write!(f, " order=[{}]", join(&agg.order))?;
                }
            }
            Self::Aggregate(agg) => {
                write!(
                    f,
                    "Aggregate keys=[{}] aggregates=[{}]",
                    join_aliases(&agg.keys),
                    join_aliases(&agg.aggregates),
                )?;
            }
            Self::Window(window) => write!(f, "Window [{}]", join_aliases(&window.functions))?,
        }
        for child in self.children() {
            f.write_str("\n")?;
            child.fmt_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.fmt_tree(f, 0)
    }
}

fn project_outputs(project_list: &[Expression]) -> Vec<AttributeRef> {
    project_list
        .iter()
        .filter_map(|expr| expr.output_attribute().ok())
        .collect()
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_aliases(aliases: &[SyntheticAlias]) -> String {
    aliases
        .iter()
        .map(|alias| format!("{} AS {}", alias.child, alias.attr))
        .collect::<Vec<_>>()
        .join(", ")
}
