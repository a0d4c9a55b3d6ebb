use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Stable identity of an expression node.
///
/// Generated ids take the form `{name}_{n}` with `n` drawn from a process
/// wide counter. Ids never depend on memory addresses, so an id serialized in
/// one process names the same node when deserialized in another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpressionId(Arc<str>);

impl ExpressionId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        ExpressionId(id.into())
    }

    /// Generate a fresh id for a node with the given name.
    pub fn generate(name: &str) -> Self {
        let n = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        ExpressionId(format!("{name}_{n}").into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExpressionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExpressionId {
    fn from(value: &str) -> Self {
        ExpressionId::new(value)
    }
}

impl From<String> for ExpressionId {
    fn from(value: String) -> Self {
        ExpressionId::new(value)
    }
}

impl AsRef<str> for ExpressionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
