//! Deferred expression graphs for partitioned dataframe pipelines.
//!
//! Graphs are built bottom up from [`Expression`] leaves (placeholders and
//! constants) to computed roots, then evaluated against a [`Session`] that
//! binds each placeholder to a value. Computed nodes carry flags describing
//! how they interact with partitioning by index, which an external scheduler
//! uses to decide where data must be repartitioned.

pub mod config;
pub mod explain;
pub mod expr;
pub mod partition;
pub mod session;

pub use config::SessionConfig;
pub use expr::{ComputedBuilder, Expression, ExpressionId, elementwise};
pub use session::Session;
