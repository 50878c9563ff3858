//! Incremental orders ETL pipeline
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Moves changed orders from the transactional PostgreSQL database into two
//! derived stores: an Elasticsearch index for search and dashboards, and a
//! date-partitioned Parquet/JSON warehouse on local disk.
//!
//! The pipeline is a single-threaded loop. Each cycle extracts the orders
//! created or updated since the persisted high-water mark (pre-joined with
//! their line items), transforms them into flat order documents with derived
//! aggregates, and loads both sinks. Both sinks are idempotent by `order_id`,
//! so a failed cycle is simply retried over the same window; the high-water
//! mark only advances after both sinks return.

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod sink;
pub mod state;
pub mod transform;

pub use config::EtlConfig;
pub use error::{ErrorClass, EtlError, Result};
pub use pipeline::{CycleSummary, Pipeline};
