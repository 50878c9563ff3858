//! Source database connection management
//!
//! The pipeline is single-threaded and owns exactly one PostgreSQL
//! connection. The manager hands it out per cycle, pinging before reuse and
//! reconnecting once if the handle has gone stale. Reconnect failures
//! propagate to the scheduler, which backs off and tries again next cycle.

use crate::error::Result;
use sqlx::{Connection, PgConnection};
use tracing::{debug, info, warn};

/// Owns the single source-database connection for the pipeline
#[derive(Debug)]
pub struct ConnectionManager {
    database_url: String,
    conn: Option<PgConnection>,
}

impl ConnectionManager {
    /// Create a manager; no connection is opened until first use
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            conn: None,
        }
    }

    /// Return a live connection, reconnecting if the cached one fails a ping
    pub async fn acquire(&mut self) -> Result<&mut PgConnection> {
        let healthy = match self.conn.as_mut() {
            Some(conn) => match conn.ping().await {
                Ok(()) => true,
                Err(err) => {
                    warn!(error = %err, "Cached connection failed ping, reconnecting");
                    false
                },
            },
            None => false,
        };

        if !healthy {
            if let Some(stale) = self.conn.take() {
                // Best effort; the server side may already be gone.
                let _ = stale.close().await;
            }
            info!("Opening new PostgreSQL connection");
            let conn = PgConnection::connect(&self.database_url).await?;
            return Ok(self.conn.insert(conn));
        }

        debug!("Reusing existing PostgreSQL connection");
        let conn = match self.conn.take() {
            Some(conn) => conn,
            // Unreachable given the branch above; reconnect anyway.
            None => PgConnection::connect(&self.database_url).await?,
        };
        Ok(self.conn.insert(conn))
    }

    /// Drop the cached handle so the next cycle starts with a fresh connect.
    /// Called by the scheduler after a transient failure.
    pub async fn invalidate(&mut self) {
        if let Some(conn) = self.conn.take() {
            info!("Resetting connection for next attempt");
            let _ = conn.close().await;
        }
    }

    /// Close the connection if one is open. Idempotent.
    pub async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(err) = conn.close().await {
                warn!(error = %err, "Error closing PostgreSQL connection");
            }
        }
    }

    /// Whether a connection is currently cached (it may still be stale)
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
}
