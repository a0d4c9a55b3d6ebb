//! Partitioning analysis over an expression graph.
//!
//! This only reports where partitioning by index holds and where it would
//! need to be established. Moving data between partitions is left to the
//! caller.

use hashbrown::HashMap;
use tracing::trace;

use crate::expr::{Expression, ExpressionId, ExpressionKind};

#[derive(Debug, Clone, Default)]
pub struct PartitionAnalysis {
    /// Whether each node's output is guaranteed partitioned by index.
    partitioned: HashMap<ExpressionId, bool>,
    /// Nodes needing a repartition of their inputs, in dependency order.
    repartitions: Vec<ExpressionId>,
}

impl PartitionAnalysis {
    /// Analyze every node reachable from `root`.
    ///
    /// `placeholders_partitioned` states whether bound inputs arrive
    /// partitioned by index. Constants are replicated, and so always count as
    /// partitioned.
    ///
    /// A computed node whose inputs are not all partitioned, and which
    /// requires partitioning, is recorded as a repartition point. After the
    /// repartition its inputs are partitioned, so its output is partitioned
    /// exactly when it preserves partitioning.
    pub fn analyze<V>(root: &Expression<V>, placeholders_partitioned: bool) -> Self
    where
        V: Clone + Send + Sync + 'static,
    {
        let mut analysis = PartitionAnalysis::default();

        for expr in root.walk_postorder() {
            let output = match expr.kind() {
                ExpressionKind::Placeholder(_) => placeholders_partitioned,
                ExpressionKind::Constant(_) => true,
                ExpressionKind::Computed(c) => {
                    let inputs_partitioned = c
                        .args()
                        .iter()
                        .all(|arg| analysis.partitioned.get(arg.id()).copied().unwrap_or(false));

                    if c.requires_partition_by_index() && !inputs_partitioned {
                        trace!(id = %expr.id(), "repartition required");
                        analysis.repartitions.push(expr.id().clone());
                    }

                    c.preserves_partition_by_index()
                        && (inputs_partitioned || c.requires_partition_by_index())
                }
            };

            analysis.partitioned.insert(expr.id().clone(), output);
        }

        analysis
    }

    /// Whether the output of `expr` is partitioned by index. None if the
    /// expression wasn't part of the analyzed graph.
    pub fn is_partitioned_by_index<V>(&self, expr: &Expression<V>) -> Option<bool> {
        self.partitioned.get(expr.id()).copied()
    }

    pub fn requires_repartition<V>(&self, expr: &Expression<V>) -> bool {
        self.repartitions.contains(expr.id())
    }

    /// Nodes that need their inputs repartitioned, children before parents.
    pub fn repartition_points(&self) -> &[ExpressionId] {
        &self.repartitions
    }
}
