//! Parallel Hydration Module
//!
//! Materializes many compiler calls at once:
//! - One blocking task per call on tokio's blocking pool
//! - At most `max_concurrency` calls in flight
//! - Results in the same order as the input calls
//!
//! Correlation itself stays single-threaded; only hydration of already
//! ordered calls fans out.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::{CompilerCall, ComplogError, Result};
use crate::reader::{CompilationData, CompilerLogReader};

/// Configuration for parallel hydration
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Maximum calls hydrated at the same time
    pub max_concurrency: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

impl ParallelConfig {
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }
}

/// Hydrate `calls` with the default concurrency limit.
pub async fn hydrate_all(
    reader: Arc<CompilerLogReader>,
    calls: Vec<CompilerCall>,
    cancel: CancellationToken,
) -> Result<Vec<CompilationData>> {
    hydrate_all_with(reader, calls, cancel, &ParallelConfig::default()).await
}

/// Hydrate `calls` concurrently.
///
/// The first failure cancels the calls still running and is returned.
/// Cancelling `cancel` stops every call at its next file boundary.
pub async fn hydrate_all_with(
    reader: Arc<CompilerLogReader>,
    calls: Vec<CompilerCall>,
    cancel: CancellationToken,
    config: &ParallelConfig,
) -> Result<Vec<CompilationData>> {
    info!(calls = calls.len(), max_concurrency = config.max_concurrency, "hydrating compiler calls");

    let limit = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let batch = cancel.child_token();
    let mut tasks: Vec<JoinHandle<Result<CompilationData>>> = Vec::with_capacity(calls.len());

    for call in calls {
        let permit = tokio::select! {
            permit = limit.clone().acquire_owned() => {
                permit.map_err(|_| ComplogError::Cancelled)?
            }
            _ = batch.cancelled() => break,
        };
        let reader = Arc::clone(&reader);
        let token = batch.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            reader.compilation_data(&call, &token)
        }));
    }

    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(Ok(data)) => results.push(data),
            Ok(Err(e)) => {
                batch.cancel();
                return Err(e);
            }
            Err(e) => {
                batch.cancel();
                return Err(e.into());
            }
        }
    }
    if cancel.is_cancelled() {
        return Err(ComplogError::Cancelled);
    }

    debug!(hydrated = results.len(), "hydration finished");
    Ok(results)
}
