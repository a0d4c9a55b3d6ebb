use lazyframe_error::Result;

use super::{Expression, ExpressionId, ExpressionKind};
use crate::session::Session;

const PLACEHOLDER_NAME: &str = "placeholder";

/// An expression whose value must be explicitly bound in the session.
///
/// Carries only the proxy held by the owning [`Expression`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderExpression;

impl PlaceholderExpression {
    pub(crate) fn build<V>(id: Option<ExpressionId>, proxy: V) -> Expression<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        let id = id.unwrap_or_else(|| ExpressionId::generate(PLACEHOLDER_NAME));
        Expression::from_parts(
            id,
            PLACEHOLDER_NAME,
            proxy,
            ExpressionKind::Placeholder(PlaceholderExpression),
        )
    }

    /// Looks up the bound value. Errors if nothing was bound.
    pub fn evaluate_at<V>(&self, expr: &Expression<V>, session: &Session<V>) -> Result<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        session.lookup(expr)
    }
}
