//! Sink loaders for transformed order documents
//!
//! Two independent best-effort sinks: the search index (bulk upsert by
//! `order_id`) and the partitioned Parquet/JSON warehouse (read-merge-write
//! by `order_id`). A failure in one never blocks the other being attempted
//! on the next cycle; both converge because re-emitting a document
//! overwrites instead of duplicating.

pub mod files;
pub mod search;

pub use files::{FileStoreSink, FileStoreSummary};
pub use search::{IndexSummary, SearchIndexSink};
