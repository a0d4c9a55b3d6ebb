use lazyframe_error::Result;

use super::{Expression, ExpressionId, ExpressionKind};
use crate::session::Session;

const CONSTANT_NAME: &str = "constant";

/// An expression whose value is known at graph construction time.
#[derive(Debug, Clone)]
pub struct ConstantExpression<V> {
    value: V,
}

impl<V> ConstantExpression<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Build the node. Without an explicit proxy, the value serves as its own
    /// proxy.
    pub(crate) fn build(id: Option<ExpressionId>, value: V, proxy: Option<V>) -> Expression<V> {
        let id = id.unwrap_or_else(|| ExpressionId::generate(CONSTANT_NAME));
        let proxy = proxy.unwrap_or_else(|| value.clone());
        Expression::from_parts(
            id,
            CONSTANT_NAME,
            proxy,
            ExpressionKind::Constant(ConstantExpression { value }),
        )
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// Returns the stored value. The session is never consulted.
    pub fn evaluate_at(&self, _session: &Session<V>) -> Result<V> {
        Ok(self.value.clone())
    }
}
