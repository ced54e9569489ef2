use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{error, info, warn};

use yoman_core::clock::Clock;
use yoman_core::config::SchedulerConfig;

use crate::engine::SchedulerHandle;
use crate::types::Job;

/// How a job execution failed.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Worth retrying (transport hiccup, vendor 5xx).
    #[error("transient: {0}")]
    Transient(String),

    /// Retrying cannot help (reminder gone, payload unusable).
    #[error("permanent: {0}")]
    Permanent(String),
}

/// Executes one fired job. Implemented by the delivery layer.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), JobError>;
}

/// Bounded worker pool over the engine's fired-job channel.
///
/// Guarantees: at most `worker_concurrency` jobs in flight, at most
/// `dispatch_per_second` dispatches per second globally, each attempt
/// bounded by the job deadline, and up to `max_attempts` attempts with
/// exponential backoff before a job is marked failed.
pub struct WorkerPool {
    handle: SchedulerHandle,
    handler: Arc<dyn JobHandler>,
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
}

impl WorkerPool {
    pub fn new(
        handle: SchedulerHandle,
        handler: Arc<dyn JobHandler>,
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            handle,
            handler,
            config,
            clock,
        }
    }

    pub async fn run(self, mut rx: mpsc::Receiver<Job>, mut shutdown: watch::Receiver<bool>) {
        info!(
            concurrency = self.config.worker_concurrency,
            rate = self.config.dispatch_per_second,
            "worker pool started"
        );
        let semaphore = Arc::new(Semaphore::new(self.config.worker_concurrency.max(1)));
        let gate_period_ms = (1000 / u64::from(self.config.dispatch_per_second.max(1))).max(1);
        let mut rate_gate = tokio::time::interval(Duration::from_millis(gate_period_ms));
        rate_gate.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let job = tokio::select! {
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("worker pool shutting down");
                        break;
                    }
                    continue;
                }
            };

            // Global dispatch rate cap, then concurrency cap.
            rate_gate.tick().await;
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };

            let handle = self.handle.clone();
            let handler = Arc::clone(&self.handler);
            let clock = Arc::clone(&self.clock);
            let config = self.config.clone();
            tokio::spawn(async move {
                let _permit = permit;
                execute_job(handle, handler, clock, config, job).await;
            });
        }
    }
}

async fn execute_job(
    handle: SchedulerHandle,
    handler: Arc<dyn JobHandler>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    job: Job,
) {
    let deadline = Duration::from_secs(config.job_deadline_secs);
    let outcome = tokio::time::timeout(deadline, handler.handle(&job)).await;

    let failure = match outcome {
        Ok(Ok(())) => {
            if let Err(e) = handle.mark_completed(&job.id) {
                error!(job_id = %job.id, "completed-mark failed: {e}");
            }
            return;
        }
        Ok(Err(JobError::Permanent(reason))) => {
            warn!(job_id = %job.id, %reason, "job failed permanently");
            let _ = handle.mark_failed(&job.id);
            return;
        }
        Ok(Err(JobError::Transient(reason))) => reason,
        Err(_) => format!("deadline of {}s exceeded", config.job_deadline_secs),
    };

    let attempts = job.attempts + 1;
    if attempts >= config.max_attempts {
        warn!(job_id = %job.id, attempts, reason = %failure, "job exhausted attempts");
        let _ = handle.mark_failed(&job.id);
        return;
    }

    let delay = backoff_secs(&config, attempts);
    let retry_at = clock.now_utc() + ChronoDuration::seconds(delay as i64);
    warn!(job_id = %job.id, attempts, delay_secs = delay, reason = %failure, "job retry scheduled");
    if let Err(e) = handle.requeue_for_retry(&job.id, attempts, retry_at) {
        error!(job_id = %job.id, "retry requeue failed: {e}");
    }
}

/// Exponential backoff: base · 2^(attempt-1), capped.
fn backoff_secs(config: &SchedulerConfig, attempt: u32) -> u64 {
    let exp = attempt.saturating_sub(1).min(16);
    (config.backoff_base_secs.saturating_mul(1_u64 << exp)).min(config.backoff_cap_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobKind;
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicU32, Ordering};
    use yoman_core::clock::FixedClock;

    fn scheduler_config() -> SchedulerConfig {
        SchedulerConfig {
            worker_concurrency: 2,
            dispatch_per_second: 1000,
            max_attempts: 3,
            backoff_base_secs: 1,
            backoff_cap_secs: 30,
            job_deadline_secs: 1,
            ..Default::default()
        }
    }

    struct ScriptedHandler {
        calls: AtomicU32,
        fail_first: u32,
        permanent: bool,
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        async fn handle(&self, _job: &Job) -> Result<(), JobError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.permanent {
                return Err(JobError::Permanent("no".to_string()));
            }
            if n < self.fail_first {
                return Err(JobError::Transient("flaky".to_string()));
            }
            Ok(())
        }
    }

    fn setup(handler: Arc<ScriptedHandler>) -> (Arc<FixedClock>, SchedulerHandle, WorkerPool) {
        let clock = Arc::new(FixedClock::new("2025-10-10T07:00:00Z".parse().unwrap()));
        let handle =
            SchedulerHandle::new(Connection::open_in_memory().unwrap(), clock.clone()).unwrap();
        let pool = WorkerPool::new(
            handle.clone(),
            handler,
            scheduler_config(),
            clock.clone(),
        );
        (clock, handle, pool)
    }

    fn job(handle: &SchedulerHandle) -> Job {
        handle
            .enqueue(
                JobKind::MorningSummary {
                    user_id: "u-1".to_string(),
                },
                "2025-10-10T07:00:00Z".parse().unwrap(),
            )
            .unwrap()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = scheduler_config();
        assert_eq!(backoff_secs(&config, 1), 1);
        assert_eq!(backoff_secs(&config, 2), 2);
        assert_eq!(backoff_secs(&config, 3), 4);
        assert_eq!(backoff_secs(&config, 6), 30); // capped
    }

    #[tokio::test]
    async fn successful_job_is_marked_completed() {
        let handler = Arc::new(ScriptedHandler {
            calls: AtomicU32::new(0),
            fail_first: 0,
            permanent: false,
        });
        let (clock, handle, _pool) = setup(handler.clone());
        let j = job(&handle);
        execute_job(
            handle.clone(),
            handler,
            clock,
            scheduler_config(),
            handle.claim_due(1).unwrap().pop().unwrap(),
        )
        .await;
        assert_eq!(
            handle.get(&j.id).unwrap().status,
            crate::types::JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn transient_failure_requeues_with_attempts() {
        let handler = Arc::new(ScriptedHandler {
            calls: AtomicU32::new(0),
            fail_first: 10,
            permanent: false,
        });
        let (clock, handle, _pool) = setup(handler.clone());
        let j = job(&handle);
        execute_job(
            handle.clone(),
            handler,
            clock.clone(),
            scheduler_config(),
            handle.claim_due(1).unwrap().pop().unwrap(),
        )
        .await;
        let stored = handle.get(&j.id).unwrap();
        assert_eq!(stored.status, crate::types::JobStatus::Pending);
        assert_eq!(stored.attempts, 1);
        assert!(stored.run_at_utc > clock.now_utc());
    }

    #[tokio::test]
    async fn attempts_exhaust_to_failed() {
        let handler = Arc::new(ScriptedHandler {
            calls: AtomicU32::new(0),
            fail_first: 10,
            permanent: false,
        });
        let (clock, handle, _pool) = setup(handler.clone());
        let j = job(&handle);
        for _ in 0..3 {
            clock.advance(ChronoDuration::minutes(1));
            if let Some(due) = handle.claim_due(1).unwrap().pop() {
                execute_job(
                    handle.clone(),
                    handler.clone(),
                    clock.clone(),
                    scheduler_config(),
                    due,
                )
                .await;
            }
        }
        assert_eq!(
            handle.get(&j.id).unwrap().status,
            crate::types::JobStatus::Failed
        );
        // No automatic requeue after terminal failure.
        clock.advance(ChronoDuration::hours(1));
        assert!(handle.claim_due(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn permanent_failure_skips_retries() {
        let handler = Arc::new(ScriptedHandler {
            calls: AtomicU32::new(0),
            fail_first: 0,
            permanent: true,
        });
        let (clock, handle, _pool) = setup(handler.clone());
        let j = job(&handle);
        execute_job(
            handle.clone(),
            handler.clone(),
            clock,
            scheduler_config(),
            handle.claim_due(1).unwrap().pop().unwrap(),
        )
        .await;
        assert_eq!(
            handle.get(&j.id).unwrap().status,
            crate::types::JobStatus::Failed
        );
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }
}
