//! Cull Task
//!
//! Background task that periodically culls the cache table, on top of the
//! probabilistic culling done by writes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{DatabaseCache, KeyFunctionRegistry};
use crate::config::CacheSettings;
use crate::error::{CacheError, Result};

/// A running cull loop. Dropping it without [`CullTask::stop`] aborts the loop.
pub struct CullTask {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl CullTask {
    /// Starts culling the table described by `settings` every `interval_secs`.
    ///
    /// Each run opens its own connection on the blocking pool, so the task
    /// never shares a connection with request handlers.
    ///
    /// # Arguments
    /// * `database_path` - Database file holding the cache table
    /// * `settings` - Settings of the cache to cull
    /// * `registry` - Key functions the settings may name
    /// * `interval_secs` - Seconds between runs, must be positive
    pub fn start(
        database_path: PathBuf,
        settings: Arc<CacheSettings>,
        registry: Arc<KeyFunctionRegistry>,
        interval_secs: u64,
    ) -> Self {
        let (shutdown, mut stopped) = watch::channel(false);
        let period = Duration::from_secs(interval_secs.max(1));

        let handle = tokio::spawn(async move {
            info!(
                "Starting cull task for table '{}' with interval of {} seconds",
                settings.location, interval_secs
            );
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stopped.changed() => break,
                }

                match run_once(database_path.clone(), settings.clone(), registry.clone()).await {
                    Ok(0) => debug!("Cull task: nothing to remove"),
                    Ok(removed) => info!("Cull task: removed {} rows", removed),
                    Err(e) => warn!("Cull task failed: {}", e),
                }
            }

            info!("Cull task stopped");
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Signals the loop to stop and waits for the current run to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for CullTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Runs one unconditional cull on the blocking pool.
async fn run_once(
    database_path: PathBuf,
    settings: Arc<CacheSettings>,
    registry: Arc<KeyFunctionRegistry>,
) -> Result<usize> {
    tokio::task::spawn_blocking(move || -> Result<usize> {
        let cache = DatabaseCache::open_with_registry(&database_path, &settings, &registry)?;
        let removed = cache.cull()?;
        cache.close()?;
        Ok(removed)
    })
    .await
    .map_err(|e| CacheError::Internal(e.to_string()))?
}
