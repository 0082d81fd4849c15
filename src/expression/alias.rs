use super::{AttributeRef, Expression, ExpressionResult};

/// An internal alias minted while an aggregation is resolved. It owns the
/// aliased expression and exposes a synthetic attribute with a fresh id;
/// the attribute never appears in user-visible output.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticAlias {
    pub child: Expression,
    pub attr: AttributeRef,
}

impl SyntheticAlias {
    fn new(prefix: &str, index: usize, child: Expression) -> ExpressionResult<Self> {
        let attr = AttributeRef::new_internal(
            format!("${prefix}{index}"),
            child.ty()?,
            child.nullable()?,
        );
        Ok(Self { child, attr })
    }

    /// Alias for a grouping key: `$g<index>`.
    pub fn grouping(index: usize, child: Expression) -> ExpressionResult<Self> {
        Self::new("g", index, child)
    }

    /// Alias for an aggregate function occurrence: `$a<index>`.
    pub fn aggregation(index: usize, child: Expression) -> ExpressionResult<Self> {
        Self::new("a", index, child)
    }

    /// Alias for a window function occurrence: `$w<index>`.
    pub fn window(index: usize, child: Expression) -> ExpressionResult<Self> {
        Self::new("w", index, child)
    }
}

/// A substitution that replaces each expression structurally equal to an
/// alias's child with the alias's synthetic attribute. Ties go to the
/// first alias in declaration order. Apply via `transform_up`.
pub fn rewriter(aliases: &[SyntheticAlias]) -> impl FnMut(Expression) -> Expression + '_ {
    move |expr| {
        for alias in aliases {
            if expr == alias.child {
                return Expression::Attribute(alias.attr.clone());
            }
        }
        expr
    }
}

/// The inverse substitution: synthetic attributes back to the expressions
/// they alias. Used to render user-facing error messages.
pub fn restorer(aliases: &[SyntheticAlias]) -> impl FnMut(Expression) -> Expression + '_ {
    move |expr| {
        if let Expression::Attribute(attr) = &expr {
            for alias in aliases {
                if alias.attr.id == attr.id {
                    return alias.child.clone();
                }
            }
        }
        expr
    }
}
