//! Pipeline orchestration and the scheduler loop
//!
//! One cycle is extract -> transform -> search index -> file store, run to
//! completion before anything else happens. The loop sleeps the configured
//! interval after a successful cycle and a shorter backoff after a failed
//! one. The high-water mark only advances (and is persisted) after both
//! sinks have returned for the cycle; a failure anywhere leaves it
//! untouched, so the same window is re-extracted next cycle and the
//! idempotent sinks converge (at-least-once delivery).
//!
//! The two sink writes are deliberately not atomic as a pair: a crash
//! between them leaves the search index ahead of the file store for one
//! cycle, and the unchanged high-water mark re-emits those rows to both
//! sinks on the next run.

use crate::config::EtlConfig;
use crate::db::ConnectionManager;
use crate::error::{ErrorClass, Result};
use crate::extract;
use crate::sink::{FileStoreSink, SearchIndexSink};
use crate::state::EtlState;
use crate::transform;
use chrono::Utc;
use tracing::{error, info, warn};

/// Counts from one completed cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Orders pulled from the source
    pub extracted: usize,
    /// Documents acknowledged by the search index
    pub indexed: usize,
    /// Distinct rows in the rewritten hourly file pair
    pub file_rows: usize,
}

/// The orders ETL pipeline and its scheduler
pub struct Pipeline {
    config: EtlConfig,
    db: ConnectionManager,
    search: SearchIndexSink,
    files: FileStoreSink,
    state: EtlState,
}

impl Pipeline {
    /// Assemble a pipeline from configuration, loading any persisted
    /// high-water mark
    pub fn new(config: EtlConfig) -> Result<Self> {
        let db = ConnectionManager::new(config.database_url.clone());
        let search = SearchIndexSink::new(config.elasticsearch_url.clone(), config.index_name.clone())?;
        let files = FileStoreSink::new(config.warehouse_dir.clone());
        let state = EtlState::load(&config.state_path);

        if let Some(mark) = state.last_etl_time {
            info!(last_etl_time = %mark, "Resuming from persisted high-water mark");
        } else {
            info!("No persisted high-water mark, first cycle will be a capped cold start");
        }

        Ok(Self {
            config,
            db,
            search,
            files,
            state,
        })
    }

    /// Run one extract-transform-load cycle.
    ///
    /// Returns the counts on success. The high-water mark is not advanced
    /// here; the caller advances it only after a successful cycle that
    /// processed at least one order.
    pub async fn run_cycle(&mut self) -> Result<CycleSummary> {
        info!("Starting orders ETL cycle");

        let conn = self.db.acquire().await?;
        let since = self.state.last_etl_time.map(|mark| mark.naive_utc());
        let rows = extract::extract_orders(conn, since, self.config.extract_limit).await?;

        if rows.is_empty() {
            info!("No orders to process");
            return Ok(CycleSummary::default());
        }

        let documents = transform::transform_orders(rows)?;

        // Search index first, then the file store. Not atomic as a pair; see
        // the module docs.
        if let Err(err) = self.search.ensure_index().await {
            error!(error = %err, "Error creating index");
        }
        let index_summary = self.search.bulk_index(&documents).await?;

        let file_summary = self.files.write_batch(&documents, Utc::now())?;

        Ok(CycleSummary {
            extracted: documents.len(),
            indexed: index_summary.indexed,
            file_rows: file_summary.rows_written,
        })
    }

    /// Run a single cycle, advance the high-water mark on success, and
    /// release the database connection
    pub async fn once(&mut self) -> Result<CycleSummary> {
        let outcome = self.run_cycle().await;
        self.record_outcome(&outcome);
        self.db.close().await;
        outcome
    }

    /// Drive the pipeline until interrupted.
    ///
    /// Ctrl-C is honored only between cycles; a cycle in progress always
    /// runs to completion. On shutdown the database connection is closed
    /// and the loop exits cleanly.
    pub async fn run(&mut self) -> Result<()> {
        let mut shutdown = std::pin::pin!(tokio::signal::ctrl_c());

        loop {
            let outcome = self.run_cycle().await;
            self.record_outcome(&outcome);

            let delay = match outcome {
                Ok(summary) => {
                    if summary.extracted > 0 {
                        info!(
                            extracted = summary.extracted,
                            indexed = summary.indexed,
                            file_rows = summary.file_rows,
                            "Orders ETL cycle completed successfully"
                        );
                    }
                    self.config.interval
                },
                Err(err) => {
                    error!(error = %err, class = ?err.class(), "ETL cycle failed");
                    if err.class() == ErrorClass::Transient {
                        self.db.invalidate().await;
                    }
                    self.config.error_backoff
                },
            };

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping ETL loop");
                    break;
                },
                _ = tokio::time::sleep(delay) => {},
            }
        }

        self.db.close().await;
        Ok(())
    }

    /// Advance the high-water mark only for a successful cycle that
    /// processed at least one order; failures and empty cycles leave it
    /// untouched so the same window is retried
    fn record_outcome(&mut self, outcome: &Result<CycleSummary>) {
        if let Ok(summary) = outcome {
            if summary.extracted > 0 {
                self.advance_watermark();
            }
        }
    }

    /// Record the cycle completion time as the new high-water mark and
    /// persist it. A persistence failure is logged but does not fail the
    /// cycle; the in-memory mark still gates the next extraction.
    fn advance_watermark(&mut self) {
        let now = Utc::now();
        self.state.last_etl_time = Some(now);
        info!(last_etl_time = %now, "Advanced high-water mark");

        if let Err(err) = self.state.save(&self.config.state_path) {
            warn!(error = %err, path = %self.config.state_path.display(),
                "Could not persist high-water mark; a restart will re-extract this window");
        }
    }

    /// The current high-water mark, if any cycle has ever succeeded
    pub fn last_etl_time(&self) -> Option<chrono::DateTime<Utc>> {
        self.state.last_etl_time
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use tempfile::TempDir;

    fn test_pipeline(dir: &TempDir) -> Pipeline {
        let config = EtlConfig {
            warehouse_dir: dir.path().join("warehouse"),
            state_path: dir.path().join("etl_state.json"),
            ..EtlConfig::default()
        };
        Pipeline::new(config).unwrap()
    }

    #[test]
    fn test_watermark_starts_unset_and_advances() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = test_pipeline(&dir);
        assert_eq!(pipeline.last_etl_time(), None);

        pipeline.advance_watermark();
        let mark = pipeline.last_etl_time().unwrap();

        // Persisted: a new pipeline over the same state file resumes there.
        let resumed = test_pipeline(&dir);
        assert_eq!(resumed.last_etl_time(), Some(mark));
    }

    #[test]
    fn test_failed_cycle_outcome_does_not_advance_watermark() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = test_pipeline(&dir);

        let failed: Result<CycleSummary> = Err(EtlError::config("boom"));
        pipeline.record_outcome(&failed);
        assert_eq!(pipeline.last_etl_time(), None);

        let empty: Result<CycleSummary> = Ok(CycleSummary::default());
        pipeline.record_outcome(&empty);
        assert_eq!(pipeline.last_etl_time(), None);

        let processed: Result<CycleSummary> = Ok(CycleSummary {
            extracted: 3,
            indexed: 3,
            file_rows: 3,
        });
        pipeline.record_outcome(&processed);
        assert!(pipeline.last_etl_time().is_some());
    }
}
