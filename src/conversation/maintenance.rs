//! Background cleanup worker for stale sessions.
//!
//! Periodically runs [`ConversationStore::cleanup_old_sessions`], a second
//! expiry policy layered on top of the backend TTL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::conversation::core::config::DEFAULT_CLEANUP_MAX_AGE_SECONDS;
use crate::conversation::core::errors::StoreResult;
use crate::conversation::store::ConversationStore;

/// Configuration for background cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Interval between cleanup runs (in seconds).
    pub interval_seconds: u64,
    /// Sessions idle for longer than this are deleted (in seconds).
    pub max_age_seconds: u64,
    /// Whether background cleanup is enabled.
    pub enabled: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3600, // 1 hour
            max_age_seconds: DEFAULT_CLEANUP_MAX_AGE_SECONDS,
            enabled: true,
        }
    }
}

impl CleanupConfig {
    /// Idle threshold as a duration.
    #[must_use]
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }
}

/// Statistics from a cleanup run.
#[derive(Debug, Clone, Default)]
pub struct CleanupStats {
    /// Number of sessions deleted.
    pub deleted: usize,
    /// Total cleanup duration in milliseconds.
    pub duration_ms: u64,
}

/// Background cleanup worker for session maintenance.
pub struct BackgroundCleanup {
    store: Arc<ConversationStore>,
    config: CleanupConfig,
    shutdown: Arc<Notify>,
}

impl BackgroundCleanup {
    /// Create a new background cleanup worker.
    #[must_use]
    pub fn new(store: Arc<ConversationStore>, config: CleanupConfig) -> Self {
        Self {
            store,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a shutdown notifier to stop the cleanup worker.
    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn the background cleanup worker as a tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the cleanup loop until shutdown is signaled.
    async fn run(&self) {
        if !self.config.enabled {
            info!("Background cleanup is disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.interval_seconds);
        info!(?interval, max_age = ?self.config.max_age(), "Starting background cleanup worker");

        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    match self.run_cleanup().await {
                        Ok(stats) if stats.deleted > 0 => {
                            info!(
                                deleted = stats.deleted,
                                duration_ms = stats.duration_ms,
                                "Cleanup completed"
                            );
                        }
                        Ok(_) => debug!("Cleanup completed with no sessions to remove"),
                        Err(err) => warn!(%err, "Cleanup failed"),
                    }
                }
                () = self.shutdown.notified() => {
                    info!("Background cleanup worker shutting down");
                    break;
                }
            }
        }
    }

    /// Run a single cleanup cycle.
    ///
    /// # Errors
    /// Returns an error if store operations fail.
    pub async fn run_cleanup(&self) -> StoreResult<CleanupStats> {
        let start = Instant::now();
        let deleted = self.store.cleanup_old_sessions(self.config.max_age()).await?;

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        Ok(CleanupStats {
            deleted,
            duration_ms,
        })
    }
}
