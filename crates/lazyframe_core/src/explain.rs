use std::fmt;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::expr::{Expression, ExpressionId, ExpressionVariant};

/// Serializable description of an expression graph.
///
/// Shared nodes are expanded the first time they're reached, and referenced
/// by id afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainNode {
    pub id: ExpressionId,
    pub name: String,
    pub variant: ExpressionVariant,
    pub requires_partition_by_index: bool,
    pub preserves_partition_by_index: bool,
    pub children: Vec<ExplainChild>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplainChild {
    Node(ExplainNode),
    /// Node already expanded elsewhere in the tree.
    Ref(ExpressionId),
}

impl ExplainNode {
    pub fn walk<V>(root: &Expression<V>) -> Self {
        let mut seen = HashSet::new();
        Self::walk_inner(root, &mut seen)
    }

    fn walk_inner<V>(expr: &Expression<V>, seen: &mut HashSet<ExpressionId>) -> Self {
        seen.insert(expr.id().clone());

        let children = expr
            .args()
            .iter()
            .map(|arg| {
                if seen.contains(arg.id()) {
                    ExplainChild::Ref(arg.id().clone())
                } else {
                    ExplainChild::Node(Self::walk_inner(arg, seen))
                }
            })
            .collect();

        ExplainNode {
            id: expr.id().clone(),
            name: expr.name().to_string(),
            variant: expr.variant(),
            requires_partition_by_index: expr.requires_partition_by_index(),
            preserves_partition_by_index: expr.preserves_partition_by_index(),
            children,
        }
    }

    fn fmt_indent(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        write!(f, "{:indent$}{} ({})", "", self.name, self.id)?;
        if self.variant == ExpressionVariant::Computed {
            write!(
                f,
                " [requires_partition: {}, preserves_partition: {}]",
                self.requires_partition_by_index, self.preserves_partition_by_index
            )?;
        }
        writeln!(f)?;

        for child in &self.children {
            match child {
                ExplainChild::Node(node) => node.fmt_indent(f, indent + 2)?,
                ExplainChild::Ref(id) => writeln!(f, "{:width$}-> {id}", "", width = indent + 2)?,
            }
        }

        Ok(())
    }
}

impl fmt::Display for ExplainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indent(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use lazyframe_error::Result;

    use super::*;
    use crate::expr::{ComputedBuilder, elementwise};

    fn sum(v: &[i64]) -> Result<i64> {
        Ok(v.iter().sum())
    }

    #[test]
    fn display_diamond() {
        let p = Expression::placeholder_with_id("input", 0_i64);
        let scale = elementwise("scale", sum, [p.clone()]).unwrap();
        let g = ComputedBuilder::new("g", sum)
            .arg(scale)
            .id("g")
            .build()
            .unwrap();
        let h = ComputedBuilder::new("h", sum)
            .arg(p)
            .id("h")
            .requires_partition_by_index(false)
            .preserves_partition_by_index(true)
            .build()
            .unwrap();
        let root = ComputedBuilder::new("root", sum)
            .args([g, h])
            .id("root")
            .build()
            .unwrap();

        let explained = ExplainNode::walk(&root);
        let lines: Vec<_> = explained.to_string().lines().map(str::to_string).collect();

        assert_eq!(
            "root (root) [requires_partition: true, preserves_partition: false]",
            lines[0]
        );
        assert_eq!(
            "  g (g) [requires_partition: true, preserves_partition: false]",
            lines[1]
        );
        assert_eq!("      placeholder (input)", lines[3]);
        assert_eq!(
            "  h (h) [requires_partition: false, preserves_partition: true]",
            lines[4]
        );
        assert_eq!("    -> input", lines[5]);
        assert_eq!(6, lines.len());
    }

    #[test]
    fn serializes_with_ids() {
        let c = Expression::constant_with_id("two", 2_i64, None);
        let root = ComputedBuilder::new("double", sum)
            .args([c.clone(), c])
            .id("double")
            .build()
            .unwrap();

        let explained = ExplainNode::walk(&root);
        assert_eq!(ExplainChild::Ref(ExpressionId::new("two")), explained.children[1]);

        let json = serde_json::to_string(&explained).unwrap();
        let got: ExplainNode = serde_json::from_str(&json).unwrap();
        assert_eq!(explained, got);
    }
}
