//! knitbench-core: test-case variants, verification, and rating.
//!
//! This crate defines the data model, the fifteen question families and
//! their graders, the suite builder, the compute-normalized Elo rating
//! engine, and the driver that ties a model provider to all of it.

pub mod bank;
pub mod cases;
pub mod cost;
pub mod engine;
pub mod error;
pub mod extract;
pub mod marker;
pub mod model;
pub mod report;
pub mod results;
pub mod suite;
pub mod traits;
