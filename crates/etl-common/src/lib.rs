//! Shared infrastructure for the commerce analytics ETL workspace.
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Currently this hosts the logging setup used by every binary in the
//! workspace. Pipeline-specific types live with the pipelines themselves.

pub mod logging;
