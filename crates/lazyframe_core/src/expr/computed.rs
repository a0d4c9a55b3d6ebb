use std::fmt;
use std::sync::Arc;

use lazyframe_error::Result;

use super::{Expression, ExpressionId, ExpressionKind};
use crate::session::Session;

/// Function applied to the evaluated arguments of a computed expression.
pub type ExprFunction<V> = Arc<dyn Fn(&[V]) -> Result<V> + Send + Sync>;

/// An expression whose value is computed from its arguments at evaluation
/// time.
pub struct ComputedExpression<V> {
    func: ExprFunction<V>,
    args: Vec<Expression<V>>,
    requires_partition_by_index: bool,
    preserves_partition_by_index: bool,
}

impl<V> ComputedExpression<V> {
    pub fn args(&self) -> &[Expression<V>] {
        &self.args
    }

    pub fn requires_partition_by_index(&self) -> bool {
        self.requires_partition_by_index
    }

    pub fn preserves_partition_by_index(&self) -> bool {
        self.preserves_partition_by_index
    }
}

impl<V> ComputedExpression<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Evaluate each argument through the session, then apply the function.
    ///
    /// Errors from the function are returned as is.
    pub fn evaluate_at(&self, session: &Session<V>) -> Result<V> {
        let inputs = self
            .args
            .iter()
            .map(|arg| session.evaluate(arg))
            .collect::<Result<Vec<_>>>()?;

        (self.func)(&inputs)
    }
}

impl<V> fmt::Debug for ComputedExpression<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedExpression")
            .field("args", &self.args)
            .field(
                "requires_partition_by_index",
                &self.requires_partition_by_index,
            )
            .field(
                "preserves_partition_by_index",
                &self.preserves_partition_by_index,
            )
            .finish_non_exhaustive()
    }
}

/// Builder for computed expressions.
///
/// Defaults to requiring partitioning by index and not preserving it, which
/// forces a repartition unless the caller opts out.
pub struct ComputedBuilder<V> {
    name: String,
    func: ExprFunction<V>,
    args: Vec<Expression<V>>,
    proxy: Option<V>,
    id: Option<ExpressionId>,
    requires_partition_by_index: bool,
    preserves_partition_by_index: bool,
}

impl<V> ComputedBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[V]) -> Result<V> + Send + Sync + 'static,
    {
        ComputedBuilder {
            name: name.into(),
            func: Arc::new(func),
            args: Vec::new(),
            proxy: None,
            id: None,
            requires_partition_by_index: true,
            preserves_partition_by_index: false,
        }
    }

    pub fn arg(mut self, arg: Expression<V>) -> Self {
        self.args.push(arg);
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = Expression<V>>) -> Self {
        self.args.extend(args);
        self
    }

    /// Use an explicit proxy instead of inferring one from the arguments.
    pub fn proxy(mut self, proxy: V) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn id(mut self, id: impl Into<ExpressionId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn requires_partition_by_index(mut self, requires: bool) -> Self {
        self.requires_partition_by_index = requires;
        self
    }

    pub fn preserves_partition_by_index(mut self, preserves: bool) -> Self {
        self.preserves_partition_by_index = preserves;
        self
    }

    /// Build the expression.
    ///
    /// If no proxy was provided, the function is applied to the arguments'
    /// proxies. The function should be cheap on proxies; callers whose
    /// function isn't should provide a proxy.
    pub fn build(self) -> Result<Expression<V>> {
        let proxy = match self.proxy {
            Some(proxy) => proxy,
            None => {
                let proxies: Vec<V> = self.args.iter().map(|a| a.proxy().clone()).collect();
                (self.func)(&proxies)?
            }
        };

        let id = self.id.unwrap_or_else(|| ExpressionId::generate(&self.name));
        let kind = ExpressionKind::Computed(ComputedExpression {
            func: self.func,
            args: self.args,
            requires_partition_by_index: self.requires_partition_by_index,
            preserves_partition_by_index: self.preserves_partition_by_index,
        });

        Ok(Expression::from_parts(id, self.name, proxy, kind))
    }
}

/// Create a computed expression that operates on each row independently.
///
/// Such expressions need no index alignment across arguments, and their
/// output stays partitioned by index.
pub fn elementwise<V, F>(
    name: impl Into<String>,
    func: F,
    args: impl IntoIterator<Item = Expression<V>>,
) -> Result<Expression<V>>
where
    V: Clone + Send + Sync + 'static,
    F: Fn(&[V]) -> Result<V> + Send + Sync + 'static,
{
    ComputedBuilder::new(name, func)
        .args(args)
        .requires_partition_by_index(false)
        .preserves_partition_by_index(true)
        .build()
}
