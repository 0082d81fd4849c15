pub mod alias;
pub mod collect;

use crate::types::{NullableType, Type, Value};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("Expression {0:?} is not resolved")]
    Unresolved(String),

    #[error("Type mismatch in {0:?}")]
    Type(String),
}

pub type ExpressionResult<T> = std::result::Result<T, ExpressionError>;

pub type ExpressionId = u64;

static NEXT_EXPRESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Mints a process-wide unique expression id.
pub fn fresh_id() -> ExpressionId {
    NEXT_EXPRESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// A reference to a concrete, typed attribute of some plan node's output.
///
/// Equality is by id only: tree rewriting clones nodes freely, so identity
/// has to live in the node rather than in its address.
#[derive(Debug, Clone, Eq)]
pub struct AttributeRef {
    pub id: ExpressionId,
    pub name: String,
    pub ty: NullableType,
    pub nullable: bool,
    pub internal: bool,
}

impl PartialEq for AttributeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl AttributeRef {
    pub fn new(name: impl Into<String>, ty: impl Into<NullableType>, nullable: bool) -> Self {
        Self {
            id: fresh_id(),
            name: name.into(),
            ty: ty.into(),
            nullable,
            internal: false,
        }
    }

    pub(crate) fn new_internal(name: String, ty: NullableType, nullable: bool) -> Self {
        Self {
            id: fresh_id(),
            name,
            ty,
            nullable,
            internal: true,
        }
    }
}

impl std::fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// A named expression: `child AS name`.
#[derive(Debug, Clone)]
pub struct Alias {
    pub child: Expression,
    pub name: String,
    pub id: ExpressionId,
}

impl PartialEq for Alias {
    fn eq(&self, other: &Self) -> bool {
        // Structural: the id only matters for the exposed attribute.
        self.child == other.child && self.name == other.name
    }
}

impl Alias {
    pub fn new(child: Expression, name: impl Into<String>) -> Self {
        Self {
            child,
            name: name.into(),
            id: fresh_id(),
        }
    }

    pub(crate) fn with_id(child: Expression, name: impl Into<String>, id: ExpressionId) -> Self {
        Self {
            child,
            name: name.into(),
            id,
        }
    }

    /// The attribute this alias exposes to parent plan nodes.
    pub fn attribute(&self) -> ExpressionResult<AttributeRef> {
        Ok(AttributeRef {
            id: self.id,
            name: self.name.clone(),
            ty: self.child.ty()?,
            nullable: self.child.nullable()?,
            internal: false,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    IsNull,
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Not => "NOT",
            Self::IsNull => "IS NULL",
        })
    }
}

impl UnaryOp {
    fn is_prefix(self) -> bool {
        matches!(self, Self::Plus | Self::Minus | Self::Not)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Concat,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Concat => "||",
        })
    }
}

impl BinaryOp {
    fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseBranch {
    pub condition: Expression,
    pub result: Expression,
}

impl std::fmt::Display for CaseBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "WHEN {} THEN {}", self.condition, self.result)
    }
}

/// An unresolved function call, to be bound against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: FunctionArgs,
    pub is_distinct: bool,
}

impl std::fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}(", self.name)?;
        if self.is_distinct {
            f.write_str("DISTINCT ")?;
        }
        self.args.fmt(f)?;
        f.write_str(")")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArgs {
    Wildcard,
    Expressions(Vec<Expression>),
}

impl std::fmt::Display for FunctionArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Wildcard => f.write_str("*"),
            Self::Expressions(args) => {
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    arg.fmt(f)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarFunction {
    Abs,
    Length,
    Lower,
    Upper,
}

impl std::fmt::Display for ScalarFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Abs => "abs",
            Self::Length => "length",
            Self::Lower => "lower",
            Self::Upper => "upper",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl std::fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
        })
    }
}

/// An applied aggregate function. The arguments may be arbitrary
/// expressions but must not contain another aggregate; the analyzer
/// enforces this when the enclosing aggregation is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    pub function: AggregateFunction,
    pub args: Vec<Expression>,
}

impl AggregateCall {
    pub fn new(function: AggregateFunction, args: Vec<Expression>) -> Self {
        Self { function, args }
    }

    fn ty(&self) -> ExpressionResult<NullableType> {
        let arg_ty = match self.args.as_slice() {
            [arg] => arg.ty()?,
            _ => return Err(ExpressionError::Type(self.to_string())),
        };
        match self.function {
            AggregateFunction::Count => Ok(Type::Integer.into()),
            AggregateFunction::Avg if arg_ty.is_numeric() => Ok(Type::Real.into()),
            AggregateFunction::Sum | AggregateFunction::Min | AggregateFunction::Max
                if arg_ty.is_numeric() =>
            {
                Ok(arg_ty)
            }
            _ => Err(ExpressionError::Type(self.to_string())),
        }
    }
}

impl std::fmt::Display for AggregateCall {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}(", self.function)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            arg.fmt(f)?;
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankingFunction {
    RowNumber,
    Rank,
    DenseRank,
}

impl std::fmt::Display for RankingFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::RowNumber => "row_number",
            Self::Rank => "rank",
            Self::DenseRank => "dense_rank",
        })
    }
}

/// A window function application: an aggregate or ranking function
/// together with the window it is computed over.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowCall {
    pub function: Expression,
    pub spec: WindowSpec,
}

impl std::fmt::Display for WindowCall {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} OVER ({})", self.function, self.spec)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowSpec {
    pub partition_by: Vec<Expression>,
    pub order_by: Vec<SortOrder>,
    pub frame: Option<WindowFrame>,
}

impl std::fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut need_space = false;
        if !self.partition_by.is_empty() {
            f.write_str("PARTITION BY ")?;
            for (i, expr) in self.partition_by.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                expr.fmt(f)?;
            }
            need_space = true;
        }
        if !self.order_by.is_empty() {
            if need_space {
                f.write_str(" ")?;
            }
            f.write_str("ORDER BY ")?;
            for (i, order) in self.order_by.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                order.fmt(f)?;
            }
            need_space = true;
        }
        if let Some(frame) = &self.frame {
            if need_space {
                f.write_str(" ")?;
            }
            frame.fmt(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowFrame {
    pub units: FrameUnits,
    pub start: FrameBound,
    pub end: FrameBound,
}

impl std::fmt::Display for WindowFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} BETWEEN {} AND {}", self.units, self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameUnits {
    Rows,
    Range,
}

impl std::fmt::Display for FrameUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Rows => "ROWS",
            Self::Range => "RANGE",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u64),
    CurrentRow,
    Following(u64),
    UnboundedFollowing,
}

impl std::fmt::Display for FrameBound {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::UnboundedPreceding => f.write_str("UNBOUNDED PRECEDING"),
            Self::Preceding(n) => write!(f, "{n} PRECEDING"),
            Self::CurrentRow => f.write_str("CURRENT ROW"),
            Self::Following(n) => write!(f, "{n} FOLLOWING"),
            Self::UnboundedFollowing => f.write_str("UNBOUNDED FOLLOWING"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    /// Where NULLs sort when the query does not say: last when
    /// ascending, first when descending.
    pub fn default_nulls(self) -> NullOrder {
        if self == Self::Asc {
            NullOrder::Last
        } else {
            NullOrder::First
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortOrder {
    pub expr: Expression,
    pub order: Order,
    pub null_order: NullOrder,
}

impl SortOrder {
    pub fn new(expr: Expression, order: Order) -> Self {
        Self {
            expr,
            order,
            null_order: order.default_nulls(),
        }
    }

    pub fn asc(expr: Expression) -> Self {
        Self::new(expr, Order::Asc)
    }

    pub fn desc(expr: Expression) -> Self {
        Self::new(expr, Order::Desc)
    }

    pub(crate) fn map_expr<F: FnOnce(Expression) -> Expression>(self, f: F) -> Self {
        Self {
            expr: f(self.expr),
            order: self.order,
            null_order: self.null_order,
        }
    }
}

/// Ascending is implied, as is the default null placement for the
/// direction; only deviations are spelled out.
impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.expr.fmt(f)?;
        if self.order == Order::Desc {
            f.write_str(" DESC")?;
        }
        match (self.order, self.null_order) {
            (Order::Asc, NullOrder::First) => f.write_str(" NULLS FIRST"),
            (Order::Desc, NullOrder::Last) => f.write_str(" NULLS LAST"),
            _ => Ok(()),
        }
    }
}

/// A node in the immutable expression tree. Every rewrite produces a new
/// tree; nothing is mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Column(String),
    Attribute(AttributeRef),
    Alias(Box<Alias>),
    UnaryOp {
        op: UnaryOp,
        expr: Box<Expression>,
    },
    BinaryOp {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Case {
        branches: Vec<CaseBranch>,
        else_branch: Option<Box<Expression>>,
    },
    Function(FunctionCall),
    ScalarFunction {
        function: ScalarFunction,
        args: Vec<Expression>,
    },
    Aggregate(AggregateCall),
    DistinctAggregate(AggregateCall),
    Ranking(RankingFunction),
    Window(Box<WindowCall>),
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Literal(value) => value.fmt(f),
            Self::Column(name) => f.write_str(name),
            Self::Attribute(attr) => attr.fmt(f),
            Self::Alias(alias) => write!(f, "{} AS {}", alias.child, alias.name),
            Self::UnaryOp { op, expr } => {
                if op.is_prefix() {
                    write!(f, "({op} {expr})")
                } else {
                    write!(f, "({expr} {op})")
                }
            }
            Self::BinaryOp { op, lhs, rhs } => write!(f, "({lhs} {op} {rhs})"),
            Self::Case {
                branches,
                else_branch,
            } => {
                f.write_str("CASE")?;
                for branch in branches {
                    write!(f, " {branch}")?;
                }
                if let Some(else_branch) = else_branch {
                    write!(f, " ELSE {else_branch}")?;
                }
                f.write_str(" END")
            }
            Self::Function(call) => call.fmt(f),
            Self::ScalarFunction { function, args } => {
                write!(f, "{function}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    arg.fmt(f)?;
                }
                f.write_str(")")
            }
            Self::Aggregate(call) => call.fmt(f),
            Self::DistinctAggregate(call) => {
                write!(f, "{}(DISTINCT ", call.function)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    arg.fmt(f)?;
                }
                f.write_str(")")
            }
            Self::Ranking(function) => write!(f, "{function}()"),
            Self::Window(call) => call.fmt(f),
        }
    }
}

impl Expression {
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn alias(self, name: impl Into<String>) -> Self {
        Self::Alias(Box::new(Alias::new(self, name)))
    }

    pub fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Self {
        Self::BinaryOp {
            op,
            lhs: lhs.into(),
            rhs: rhs.into(),
        }
    }

    pub fn gt(self, rhs: Expression) -> Self {
        Self::binary(BinaryOp::Gt, self, rhs)
    }

    pub fn eq(self, rhs: Expression) -> Self {
        Self::binary(BinaryOp::Eq, self, rhs)
    }

    pub fn and(self, rhs: Expression) -> Self {
        Self::binary(BinaryOp::And, self, rhs)
    }

    /// Direct children, in evaluation order. A window's children are its
    /// function operand followed by the expressions of its spec.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Self::Literal(_) | Self::Column(_) | Self::Attribute(_) | Self::Ranking(_) => {
                Vec::new()
            }
            Self::Alias(alias) => vec![&alias.child],
            Self::UnaryOp { expr, .. } => vec![expr.as_ref()],
            Self::BinaryOp { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            Self::Case {
                branches,
                else_branch,
            } => {
                let mut children = Vec::with_capacity(branches.len() * 2 + 1);
                for branch in branches {
                    children.push(&branch.condition);
                    children.push(&branch.result);
                }
                if let Some(else_branch) = else_branch {
                    children.push(else_branch.as_ref());
                }
                children
            }
            Self::Function(call) => match &call.args {
                FunctionArgs::Wildcard => Vec::new(),
                FunctionArgs::Expressions(args) => args.iter().collect(),
            },
            Self::ScalarFunction { args, .. } => args.iter().collect(),
            Self::Aggregate(call) | Self::DistinctAggregate(call) => call.args.iter().collect(),
            Self::Window(call) => {
                let mut children = vec![&call.function];
                children.extend(&call.spec.partition_by);
                children.extend(call.spec.order_by.iter().map(|order| &order.expr));
                children
            }
        }
    }

    pub(crate) fn map_children<F>(self, f: &mut F) -> Self
    where
        F: FnMut(Expression) -> Expression,
    {
        match self {
            expr @ (Self::Literal(_)
            | Self::Column(_)
            | Self::Attribute(_)
            | Self::Ranking(_)) => expr,
            Self::Alias(alias) => Self::Alias(Box::new(Alias::with_id(
                f(alias.child),
                alias.name,
                alias.id,
            ))),
            Self::UnaryOp { op, expr } => Self::UnaryOp {
                op,
                expr: f(*expr).into(),
            },
            Self::BinaryOp { op, lhs, rhs } => Self::BinaryOp {
                op,
                lhs: f(*lhs).into(),
                rhs: f(*rhs).into(),
            },
            Self::Case {
                branches,
                else_branch,
            } => Self::Case {
                branches: branches
                    .into_iter()
                    .map(|branch| CaseBranch {
                        condition: f(branch.condition),
                        result: f(branch.result),
                    })
                    .collect(),
                else_branch: else_branch.map(|expr| f(*expr).into()),
            },
            Self::Function(call) => Self::Function(FunctionCall {
                name: call.name,
                args: match call.args {
                    FunctionArgs::Wildcard => FunctionArgs::Wildcard,
                    FunctionArgs::Expressions(args) => {
                        FunctionArgs::Expressions(args.into_iter().map(|arg| f(arg)).collect())
                    }
                },
                is_distinct: call.is_distinct,
            }),
            Self::ScalarFunction { function, args } => Self::ScalarFunction {
                function,
                args: args.into_iter().map(|arg| f(arg)).collect(),
            },
            Self::Aggregate(call) => Self::Aggregate(AggregateCall {
                function: call.function,
                args: call.args.into_iter().map(|arg| f(arg)).collect(),
            }),
            Self::DistinctAggregate(call) => Self::DistinctAggregate(AggregateCall {
                function: call.function,
                args: call.args.into_iter().map(|arg| f(arg)).collect(),
            }),
            Self::Window(call) => Self::Window(Box::new(WindowCall {
                function: f(call.function),
                spec: WindowSpec {
                    partition_by: call
                        .spec
                        .partition_by
                        .into_iter()
                        .map(|expr| f(expr))
                        .collect(),
                    order_by: call
                        .spec
                        .order_by
                        .into_iter()
                        .map(|order| order.map_expr(|expr| f(expr)))
                        .collect(),
                    frame: call.spec.frame,
                },
            })),
        }
    }

    /// Rewrites the tree bottom-up: children are transformed first, then
    /// the rewritten node is handed to `f`.
    pub fn transform_up<F>(self, f: &mut F) -> Self
    where
        F: FnMut(Expression) -> Expression,
    {
        let expr = self.map_children(&mut |child| child.transform_up(&mut *f));
        f(expr)
    }

    /// Rewrites the tree top-down: `f` sees the node before its children.
    pub fn transform_down<F>(self, f: &mut F) -> Self
    where
        F: FnMut(Expression) -> Expression,
    {
        f(self).map_children(&mut |child| child.transform_down(&mut *f))
    }

    /// Collects, in pre-order, clones of every node matching `predicate`.
    pub fn collect<F>(&self, predicate: &F) -> Vec<Expression>
    where
        F: Fn(&Expression) -> bool,
    {
        let mut out = Vec::new();
        self.collect_into(predicate, &mut out);
        out
    }

    fn collect_into<F>(&self, predicate: &F, out: &mut Vec<Expression>)
    where
        F: Fn(&Expression) -> bool,
    {
        if predicate(self) {
            out.push(self.clone());
        }
        for child in self.children() {
            child.collect_into(predicate, out);
        }
    }

    /// All attribute references in the subtree, first-seen order, deduped
    /// by id.
    pub fn references(&self) -> Vec<AttributeRef> {
        let mut refs: Vec<AttributeRef> = Vec::new();
        for expr in self.collect(&|expr| matches!(expr, Self::Attribute(_))) {
            if let Self::Attribute(attr) = expr {
                if !refs.iter().any(|seen| seen.id == attr.id) {
                    refs.push(attr);
                }
            }
        }
        refs
    }

    /// True iff every reference binds and the whole subtree type-checks.
    pub fn resolved(&self) -> bool {
        self.ty().is_ok()
    }

    /// The type this expression evaluates to. Fails on unresolved
    /// references and on operand type mismatches.
    pub fn ty(&self) -> ExpressionResult<NullableType> {
        match self {
            Self::Literal(value) => Ok(value.ty()),
            Self::Column(_) | Self::Function(_) => {
                Err(ExpressionError::Unresolved(self.to_string()))
            }
            Self::Attribute(attr) => Ok(attr.ty),
            Self::Alias(alias) => alias.child.ty(),
            Self::UnaryOp { op, expr } => {
                let ty = expr.ty()?;
                match (op, ty) {
                    (UnaryOp::IsNull, _) => Ok(Type::Boolean.into()),
                    (_, NullableType::Null) => Ok(NullableType::Null),
                    (UnaryOp::Not, NullableType::NonNull(Type::Boolean)) => {
                        Ok(Type::Boolean.into())
                    }
                    (UnaryOp::Plus | UnaryOp::Minus, NullableType::NonNull(ty))
                        if ty.is_numeric() =>
                    {
                        Ok(ty.into())
                    }
                    _ => Err(ExpressionError::Type(self.to_string())),
                }
            }
            Self::BinaryOp { op, lhs, rhs } => {
                let (lhs_ty, rhs_ty) = (lhs.ty()?, rhs.ty()?);
                self.binary_op_ty(*op, lhs_ty, rhs_ty)
            }
            Self::Case {
                branches,
                else_branch,
            } => {
                let mut result = NullableType::Null;
                for branch in branches {
                    if !branch.condition.ty()?.is_compatible_with(Type::Boolean) {
                        return Err(ExpressionError::Type(self.to_string()));
                    }
                    result = unify(result, branch.result.ty()?)
                        .ok_or_else(|| ExpressionError::Type(self.to_string()))?;
                }
                if let Some(else_branch) = else_branch {
                    result = unify(result, else_branch.ty()?)
                        .ok_or_else(|| ExpressionError::Type(self.to_string()))?;
                }
                Ok(result)
            }
            Self::ScalarFunction { function, args } => {
                let arg_ty = match args.as_slice() {
                    [arg] => arg.ty()?,
                    _ => return Err(ExpressionError::Type(self.to_string())),
                };
                match function {
                    ScalarFunction::Abs if arg_ty.is_numeric() => Ok(arg_ty),
                    ScalarFunction::Length if arg_ty.is_compatible_with(Type::Text) => {
                        Ok(Type::Integer.into())
                    }
                    ScalarFunction::Lower | ScalarFunction::Upper
                        if arg_ty.is_compatible_with(Type::Text) =>
                    {
                        Ok(Type::Text.into())
                    }
                    _ => Err(ExpressionError::Type(self.to_string())),
                }
            }
            Self::Aggregate(call) | Self::DistinctAggregate(call) => call.ty(),
            Self::Ranking(_) => Ok(Type::Integer.into()),
            Self::Window(call) => {
                for expr in &call.spec.partition_by {
                    expr.ty()?;
                }
                for order in &call.spec.order_by {
                    order.expr.ty()?;
                }
                call.function.ty()
            }
        }
    }

    fn binary_op_ty(
        &self,
        op: BinaryOp,
        lhs: NullableType,
        rhs: NullableType,
    ) -> ExpressionResult<NullableType> {
        use NullableType::{NonNull, Null};
        if op.is_comparison() || matches!(op, BinaryOp::And | BinaryOp::Or) {
            let operands_ok = match op {
                BinaryOp::And | BinaryOp::Or => {
                    lhs.is_compatible_with(Type::Boolean) && rhs.is_compatible_with(Type::Boolean)
                }
                _ => match (lhs, rhs) {
                    (Null, _) | (_, Null) => true,
                    (NonNull(a), NonNull(b)) => a == b || (a.is_numeric() && b.is_numeric()),
                },
            };
            return if operands_ok {
                Ok(Type::Boolean.into())
            } else {
                Err(ExpressionError::Type(self.to_string()))
            };
        }
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                match (lhs, rhs) {
                    (Null, _) | (_, Null) => Ok(Null),
                    (NonNull(Type::Integer), NonNull(Type::Integer)) => Ok(Type::Integer.into()),
                    (NonNull(a), NonNull(Type::Real)) | (NonNull(Type::Real), NonNull(a))
                        if a.is_numeric() =>
                    {
                        Ok(Type::Real.into())
                    }
                    _ => Err(ExpressionError::Type(self.to_string())),
                }
            }
            BinaryOp::Concat => match (lhs, rhs) {
                (Null, _) | (_, Null) => Ok(Null),
                (NonNull(Type::Text), NonNull(Type::Text)) => Ok(Type::Text.into()),
                _ => Err(ExpressionError::Type(self.to_string())),
            },
            _ => unreachable!("handled above"),
        }
    }

    /// Whether the expression can evaluate to NULL.
    pub fn nullable(&self) -> ExpressionResult<bool> {
        match self {
            Self::Literal(value) => Ok(value.is_null()),
            Self::Column(_) | Self::Function(_) => {
                Err(ExpressionError::Unresolved(self.to_string()))
            }
            Self::Attribute(attr) => Ok(attr.nullable),
            Self::Alias(alias) => alias.child.nullable(),
            Self::UnaryOp {
                op: UnaryOp::IsNull,
                ..
            } => Ok(false),
            Self::UnaryOp { expr, .. } => expr.nullable(),
            Self::BinaryOp { lhs, rhs, .. } => Ok(lhs.nullable()? || rhs.nullable()?),
            Self::Case { .. } => Ok(true),
            Self::ScalarFunction { args, .. } => {
                for arg in args {
                    if arg.nullable()? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Aggregate(call) | Self::DistinctAggregate(call) => {
                Ok(call.function != AggregateFunction::Count)
            }
            Self::Ranking(_) => Ok(false),
            Self::Window(call) => call.function.nullable(),
        }
    }

    /// The column name this expression projects as.
    pub fn name(&self) -> String {
        match self {
            Self::Attribute(attr) => attr.name.clone(),
            Self::Alias(alias) => alias.name.clone(),
            _ => self.to_string(),
        }
    }

    /// The attribute a projection of this expression exposes. Named
    /// expressions keep their id; anything else gets a fresh one.
    pub fn output_attribute(&self) -> ExpressionResult<AttributeRef> {
        match self {
            Self::Attribute(attr) => Ok(attr.clone()),
            Self::Alias(alias) => alias.attribute(),
            _ => Ok(AttributeRef {
                id: fresh_id(),
                name: self.to_string(),
                ty: self.ty()?,
                nullable: self.nullable()?,
                internal: false,
            }),
        }
    }
}

fn unify(a: NullableType, b: NullableType) -> Option<NullableType> {
    match (a, b) {
        (NullableType::Null, ty) | (ty, NullableType::Null) => Some(ty),
        (NullableType::NonNull(a), NullableType::NonNull(b)) if a == b => Some(a.into()),
        (NullableType::NonNull(a), NullableType::NonNull(b))
            if a.is_numeric() && b.is_numeric() =>
        {
            Some(Type::Real.into())
        }
        _ => None,
    }
}
