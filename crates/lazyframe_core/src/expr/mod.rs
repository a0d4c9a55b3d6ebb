//! Deferred expression graph.
//!
//! An [`Expression`] is a shared, immutable node. Nodes are cheap to clone
//! (reference counted) and may be referenced by any number of parents, so a
//! graph is a DAG rather than a tree. Equality and hashing use only the
//! node's [`ExpressionId`].

pub mod computed;
pub mod constant;
pub mod placeholder;

mod id;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use hashbrown::HashSet;
use lazyframe_error::Result;
use serde::{Deserialize, Serialize};

pub use self::computed::{ComputedBuilder, ComputedExpression, ExprFunction, elementwise};
pub use self::constant::ConstantExpression;
pub use self::id::ExpressionId;
pub use self::placeholder::PlaceholderExpression;
use crate::session::Session;

/// The closed set of expression kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpressionVariant {
    Placeholder,
    Constant,
    Computed,
}

impl fmt::Display for ExpressionVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placeholder => write!(f, "placeholder"),
            Self::Constant => write!(f, "constant"),
            Self::Computed => write!(f, "computed"),
        }
    }
}

pub enum ExpressionKind<V> {
    Placeholder(PlaceholderExpression),
    Constant(ConstantExpression<V>),
    Computed(ComputedExpression<V>),
}

impl<V> ExpressionKind<V> {
    pub fn variant(&self) -> ExpressionVariant {
        match self {
            Self::Placeholder(_) => ExpressionVariant::Placeholder,
            Self::Constant(_) => ExpressionVariant::Constant,
            Self::Computed(_) => ExpressionVariant::Computed,
        }
    }
}

/// Structural description of a node, excluding names, functions and values.
///
/// Two nodes sharing an id are expected to share a signature. A session
/// rejects an id that shows up with a second, different signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpressionSignature {
    pub variant: ExpressionVariant,
    pub args: Vec<ExpressionId>,
    pub requires_partition_by_index: bool,
    pub preserves_partition_by_index: bool,
}

/// A deferred operation producing a value of type `V`.
pub struct Expression<V> {
    inner: Arc<ExpressionNode<V>>,
}

struct ExpressionNode<V> {
    id: ExpressionId,
    name: String,
    proxy: V,
    kind: ExpressionKind<V>,
    signature: ExpressionSignature,
}

impl<V> Expression<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_parts(
        id: ExpressionId,
        name: impl Into<String>,
        proxy: V,
        kind: ExpressionKind<V>,
    ) -> Self {
        let (args, requires, preserves) = match &kind {
            ExpressionKind::Placeholder(_) | ExpressionKind::Constant(_) => {
                (Vec::new(), false, false)
            }
            ExpressionKind::Computed(c) => (
                c.args().iter().map(|a| a.id().clone()).collect(),
                c.requires_partition_by_index(),
                c.preserves_partition_by_index(),
            ),
        };

        let signature = ExpressionSignature {
            variant: kind.variant(),
            args,
            requires_partition_by_index: requires,
            preserves_partition_by_index: preserves,
        };

        Expression {
            inner: Arc::new(ExpressionNode {
                id,
                name: name.into(),
                proxy,
                kind,
                signature,
            }),
        }
    }

    /// Create a placeholder whose value must be bound in the session.
    pub fn placeholder(proxy: V) -> Self {
        PlaceholderExpression::build(None, proxy)
    }

    /// Create a placeholder with an explicit identity.
    pub fn placeholder_with_id(id: impl Into<ExpressionId>, proxy: V) -> Self {
        PlaceholderExpression::build(Some(id.into()), proxy)
    }

    /// Create a constant, using the value itself as the proxy.
    pub fn constant(value: V) -> Self {
        ConstantExpression::build(None, value, None)
    }

    pub fn constant_with_proxy(value: V, proxy: V) -> Self {
        ConstantExpression::build(None, value, Some(proxy))
    }

    pub fn constant_with_id(id: impl Into<ExpressionId>, value: V, proxy: Option<V>) -> Self {
        ConstantExpression::build(Some(id.into()), value, proxy)
    }

    /// Create a computed expression with the conservative partitioning
    /// defaults (requires partitioning, does not preserve it).
    ///
    /// Errors if inferring the proxy from the arguments' proxies fails.
    pub fn computed<F>(
        name: impl Into<String>,
        func: F,
        args: impl IntoIterator<Item = Expression<V>>,
    ) -> Result<Self>
    where
        F: Fn(&[V]) -> Result<V> + Send + Sync + 'static,
    {
        ComputedBuilder::new(name, func).args(args).build()
    }

    /// Returns the result of this expression with the bindings given in
    /// `session`.
    ///
    /// Children are requested through [`Session::evaluate`] so that shared
    /// subgraphs are only computed once per session.
    pub fn evaluate_at(&self, session: &Session<V>) -> Result<V> {
        match &self.inner.kind {
            ExpressionKind::Placeholder(p) => p.evaluate_at(self, session),
            ExpressionKind::Constant(c) => c.evaluate_at(session),
            ExpressionKind::Computed(c) => c.evaluate_at(session),
        }
    }

    /// Every distinct node reachable from this expression, children before
    /// parents.
    ///
    /// Nodes are deduplicated by id, so shared subgraphs are visited once.
    pub fn walk_postorder(&self) -> Vec<Expression<V>> {
        let mut seen: HashSet<ExpressionId> = HashSet::new();
        let mut out = Vec::new();
        // (node, children already pushed)
        let mut stack = vec![(self.clone(), false)];

        while let Some((expr, expanded)) = stack.pop() {
            if expanded {
                out.push(expr);
                continue;
            }
            if !seen.insert(expr.id().clone()) {
                continue;
            }

            stack.push((expr.clone(), true));
            // Reverse so the first argument is emitted first.
            for arg in expr.args().iter().rev() {
                if !seen.contains(arg.id()) {
                    stack.push((arg.clone(), false));
                }
            }
        }

        out
    }
}

impl<V> Expression<V> {
    pub fn id(&self) -> &ExpressionId {
        &self.inner.id
    }

    /// Operation label, for diagnostics only.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Type witness for this expression's result.
    pub fn proxy(&self) -> &V {
        &self.inner.proxy
    }

    pub fn kind(&self) -> &ExpressionKind<V> {
        &self.inner.kind
    }

    pub fn variant(&self) -> ExpressionVariant {
        self.inner.signature.variant
    }

    pub fn signature(&self) -> &ExpressionSignature {
        &self.inner.signature
    }

    /// Children in evaluation order. Empty for leaves.
    pub fn args(&self) -> &[Expression<V>] {
        match &self.inner.kind {
            ExpressionKind::Placeholder(_) | ExpressionKind::Constant(_) => &[],
            ExpressionKind::Computed(c) => c.args(),
        }
    }

    /// Whether this expression requires its arguments to be partitioned by
    /// index.
    pub fn requires_partition_by_index(&self) -> bool {
        self.inner.signature.requires_partition_by_index
    }

    /// Whether the result is partitioned by index whenever all inputs are
    /// partitioned by index.
    pub fn preserves_partition_by_index(&self) -> bool {
        self.inner.signature.preserves_partition_by_index
    }
}

impl<V> Clone for Expression<V> {
    fn clone(&self) -> Self {
        Expression {
            inner: self.inner.clone(),
        }
    }
}

impl<V> PartialEq for Expression<V> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<V> Eq for Expression<V> {}

impl<V> Hash for Expression<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state)
    }
}

impl<V> fmt::Debug for Expression<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("variant", &self.inner.signature.variant)
            .field("args", &self.inner.signature.args)
            .finish_non_exhaustive()
    }
}

impl<V> fmt::Display for Expression<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.id)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;

    fn hash_of<T: Hash>(v: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        v.hash(&mut hasher);
        hasher.finish()
    }

    fn add(args: &[i64]) -> Result<i64> {
        Ok(args.iter().sum())
    }

    #[test]
    fn same_id_is_same_node() {
        let a = Expression::placeholder_with_id("input", 0_i64);
        let b = Expression::placeholder_with_id("input", 100_i64);

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = Expression::constant(1_i64);
        let b = Expression::constant(1_i64);

        assert_ne!(a, b);
        assert!(a.id().as_str().starts_with("constant_"));
    }

    #[test]
    fn proxy_not_part_of_identity() {
        let a = Expression::constant_with_id("c", 1_i64, Some(7));
        let b = Expression::constant_with_id("c", 2_i64, Some(8));
        assert_eq!(a, b);
        assert_eq!(&7, a.proxy());
    }

    #[test]
    fn leaf_args_empty() {
        let p = Expression::placeholder(0_i64);
        let c = Expression::constant(3_i64);

        assert!(p.args().is_empty());
        assert!(c.args().is_empty());
        assert_eq!(ExpressionVariant::Placeholder, p.variant());
        assert_eq!(ExpressionVariant::Constant, c.variant());
        assert_eq!("placeholder", p.name());
        assert_eq!("constant", c.name());
    }

    #[test]
    fn args_keep_order() {
        let a = Expression::constant(1_i64);
        let b = Expression::constant(2_i64);
        let sum = Expression::computed("add", add, [a.clone(), b.clone()]).unwrap();

        assert_eq!(&[a.clone(), b.clone()], sum.args());
        assert_eq!(vec![a.id().clone(), b.id().clone()], sum.signature().args);
    }

    #[test]
    fn signature_ignores_name() {
        let c = Expression::constant(1_i64);
        let a = ComputedBuilder::new("add", add)
            .arg(c.clone())
            .id("x")
            .build()
            .unwrap();
        let b = ComputedBuilder::new("sum", add)
            .arg(c)
            .id("x")
            .build()
            .unwrap();

        assert_eq!(a.signature(), b.signature());
        assert_ne!(a.name(), b.name());
    }

    #[test]
    fn postorder_dedupes_diamond() {
        let a = Expression::placeholder(0_i64);
        let g = Expression::computed("g", add, [a.clone()]).unwrap();
        let h = Expression::computed("h", add, [a.clone()]).unwrap();
        let root = Expression::computed("root", add, [g.clone(), h.clone()]).unwrap();

        let order = root.walk_postorder();
        assert_eq!(vec![a, g, h, root], order);
    }

    #[test]
    fn postorder_repeated_arg() {
        let a = Expression::constant(1_i64);
        let root = Expression::computed("twice", add, [a.clone(), a.clone()]).unwrap();

        let order = root.walk_postorder();
        assert_eq!(vec![a, root], order);
    }

    #[test]
    fn debug_does_not_require_debug_value() {
        #[derive(Clone)]
        struct Opaque;

        let p = Expression::placeholder_with_id("opaque", Opaque);
        let s = format!("{p:?}");
        assert!(s.contains("opaque"));
        assert_eq!("opaque", p.to_string());
    }
}
