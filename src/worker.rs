//! Worker loop and tick protocol
//!
//! A worker repeats one unit of work (a tick) against the store. Each tick
//! claims a view, runs inside one transaction and either commits or leaves
//! nothing behind. The loop drains backlog without pausing and sleeps only
//! after a tick that found no work, aborted, or failed.
//!
//! ```text
//! while not shut down:
//!     Completed -> tick again
//!     Idle | Aborted | Err -> sleep(loop_delay), or stop when there is none
//! ```

use crate::error::EngineError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No view had work for this pipeline
    Idle,
    /// The tick committed
    Completed { members: usize },
    /// The tick hit a consistency failure and rolled back
    Aborted,
}

/// One fragmentation pipeline
///
/// `process` is blocking; the loop runs it on the blocking thread pool.
pub trait FragmentationWorker: Send + Sync + 'static {
    /// Pipeline name for log lines
    fn name(&self) -> &'static str;

    /// Identity of this worker instance in claims and log lines
    fn worker_id(&self) -> &str;

    /// Run one tick
    fn process(&self) -> Result<TickOutcome, EngineError>;
}

/// Totals of one worker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub ticks: usize,
    pub members: usize,
    pub aborted: usize,
    pub failed: usize,
}

/// Run `worker` until shut down
///
/// With no `loop_delay` the worker stops at the first tick that does not
/// complete. A shutdown request is honoured before every tick and interrupts
/// the delay; a tick already running finishes first.
pub async fn run_worker<W: FragmentationWorker>(
    worker: Arc<W>,
    loop_delay: Option<Duration>,
    mut shutdown: watch::Receiver<bool>,
) -> WorkerReport {
    let mut report = WorkerReport::default();
    tracing::info!(worker = %worker.worker_id(), pipeline = worker.name(), "Worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let ticking = Arc::clone(&worker);
        let result = match tokio::task::spawn_blocking(move || ticking.process()).await {
            Ok(result) => result,
            Err(e) => Err(EngineError::from(e)),
        };
        report.ticks += 1;

        match result {
            Ok(TickOutcome::Completed { members }) => {
                report.members += members;
                tracing::info!(
                    worker = %worker.worker_id(),
                    pipeline = worker.name(),
                    members,
                    "Tick completed"
                );
                continue;
            }
            Ok(TickOutcome::Idle) => {
                tracing::debug!(
                    worker = %worker.worker_id(),
                    pipeline = worker.name(),
                    "Nothing to do"
                );
            }
            Ok(TickOutcome::Aborted) => {
                report.aborted += 1;
                tracing::warn!(
                    worker = %worker.worker_id(),
                    pipeline = worker.name(),
                    "Tick aborted, work will be retried"
                );
            }
            Err(e) => {
                report.failed += 1;
                if e.is_transient() {
                    tracing::warn!(
                        worker = %worker.worker_id(),
                        pipeline = worker.name(),
                        error = %e,
                        "Tick failed"
                    );
                } else {
                    tracing::error!(
                        worker = %worker.worker_id(),
                        pipeline = worker.name(),
                        error = %e,
                        "Tick failed"
                    );
                }
            }
        }

        let Some(delay) = loop_delay else {
            break;
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!(
        worker = %worker.worker_id(),
        pipeline = worker.name(),
        ticks = report.ticks,
        members = report.members,
        "Worker stopped"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted outcomes, then reports idle
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<TickOutcome, EngineError>>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<TickOutcome, EngineError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
            })
        }
    }

    impl FragmentationWorker for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn worker_id(&self) -> &str {
            "test"
        }

        fn process(&self) -> Result<TickOutcome, EngineError> {
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(TickOutcome::Idle))
        }
    }

    #[tokio::test]
    async fn test_one_shot_drains_backlog_then_stops() {
        let worker = Scripted::new(vec![
            Ok(TickOutcome::Completed { members: 3 }),
            Ok(TickOutcome::Completed { members: 2 }),
        ]);
        let (_tx, rx) = watch::channel(false);

        let report = run_worker(worker, None, rx).await;
        assert_eq!(report.ticks, 3);
        assert_eq!(report.members, 5);
    }

    #[tokio::test]
    async fn test_errors_and_aborts_do_not_stop_the_loop() {
        let worker = Scripted::new(vec![
            Err(EngineError::Storage(StorageError::Corruption("bad".to_string()))),
            Ok(TickOutcome::Aborted),
            Ok(TickOutcome::Completed { members: 1 }),
        ]);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_worker(worker, Some(Duration::from_millis(5)), rx));
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();

        let report = handle.await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.aborted, 1);
        assert_eq!(report.members, 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let worker = Scripted::new(vec![Ok(TickOutcome::Completed { members: 1 })]);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let report = run_worker(worker, Some(Duration::from_secs(60)), rx).await;
        assert_eq!(report.ticks, 0);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_delay() {
        let worker = Scripted::new(Vec::new());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_worker(worker, Some(Duration::from_secs(3600)), rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let report = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.ticks, 1);
    }
}
