//! The board executor: topological layering, concurrent per-layer dispatch,
//! per-node routing, result aggregation, and serialized output streaming.

pub mod model;
pub mod pipeline;
pub mod printer;
pub mod router;
pub mod runner;
pub mod schedule;
pub mod store;
pub mod usage;

pub use model::{Board, BoardEdge, BoardNode};
pub use pipeline::Workers;
pub use printer::StreamPrinter;
pub use router::Router;
pub use runner::{GraphRunner, RunReport};
pub use store::{ProcessedSet, ResultStore};
pub use usage::UsageSummary;
