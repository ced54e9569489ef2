use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use yoman_core::clock::Clock;
use yoman_core::types::new_row_id;

use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::types::{Job, JobKind, JobStatus};

const JOB_COLUMNS: &str = "id, kind, run_at_utc, status, attempts, created_at, updated_at";

/// Shared handle for queue management while the engine loop runs.
///
/// Cloneable across the router (enqueue/cancel on reminder mutations), the
/// worker pool (status updates, retries) and the engine itself.
#[derive(Clone)]
pub struct SchedulerHandle {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SchedulerHandle {
    pub fn new(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    /// Enqueue a job. Delivery jobs are idempotent per
    /// `(reminder_id, occurrence_utc)`: re-enqueueing an occurrence that
    /// is already queued returns the existing row untouched.
    pub fn enqueue(&self, kind: JobKind, run_at: DateTime<Utc>) -> Result<Job> {
        let now = self.clock.now_utc();
        let id = new_row_id();
        let kind_json =
            serde_json::to_string(&kind).map_err(|e| SchedulerError::InvalidJob(e.to_string()))?;
        let (reminder_id, occurrence) = match &kind {
            JobKind::ReminderDelivery {
                reminder_id,
                occurrence_utc,
                ..
            } => (Some(reminder_id.clone()), Some(occurrence_utc.to_rfc3339())),
            _ => (None, None),
        };

        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO jobs
             (id, kind, reminder_id, occurrence_utc, run_at_utc, status, attempts,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, ?6, ?6)",
            rusqlite::params![
                id,
                kind_json,
                reminder_id,
                occurrence,
                run_at.to_rfc3339(),
                now.to_rfc3339()
            ],
        )?;
        if inserted > 0 {
            info!(job_id = %id, run_at = %run_at, "job enqueued");
        }

        let effective_id: String = match (&reminder_id, &occurrence) {
            (Some(rid), Some(occ)) => conn.query_row(
                "SELECT id FROM jobs WHERE reminder_id = ?1 AND occurrence_utc = ?2",
                rusqlite::params![rid, occ],
                |row| row.get(0),
            )?,
            _ => id,
        };

        conn.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            rusqlite::params![effective_id],
            row_to_job,
        )
        .map_err(SchedulerError::from)
    }

    /// Remove still-pending delivery jobs for a reminder (delete path).
    /// Running jobs are left alone — the reminder CAS makes their
    /// completion a no-op.
    pub fn cancel_reminder_jobs(&self, reminder_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM jobs WHERE reminder_id = ?1 AND status = 'pending'",
            rusqlite::params![reminder_id],
        )?;
        if removed > 0 {
            info!(reminder_id, removed, "pending delivery jobs cancelled");
        }
        Ok(removed)
    }

    /// Claim all due pending jobs (marking them running) and return them.
    pub fn claim_due(&self, limit: usize) -> Result<Vec<Job>> {
        let now = self.clock.now_utc().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let jobs: Vec<Job> = {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs
                 WHERE status = 'pending' AND run_at_utc <= ?1
                 ORDER BY run_at_utc ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![now, limit as i64], row_to_job)?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };
        for job in &jobs {
            conn.execute(
                "UPDATE jobs SET status = 'running', updated_at = ?2 WHERE id = ?1",
                rusqlite::params![job.id, now],
            )?;
        }
        Ok(jobs)
    }

    pub fn mark_completed(&self, job_id: &str) -> Result<()> {
        self.set_status(job_id, JobStatus::Completed)
    }

    pub fn mark_failed(&self, job_id: &str) -> Result<()> {
        self.set_status(job_id, JobStatus::Failed)
    }

    /// Requeue a failed attempt for a later retry.
    pub fn requeue_for_retry(
        &self,
        job_id: &str,
        attempts: u32,
        retry_at: DateTime<Utc>,
    ) -> Result<()> {
        let now = self.clock.now_utc().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE jobs SET status = 'pending', attempts = ?2, run_at_utc = ?3,
                    updated_at = ?4
             WHERE id = ?1",
            rusqlite::params![job_id, attempts, retry_at.to_rfc3339(), now],
        )?;
        if changed == 0 {
            return Err(SchedulerError::JobNotFound {
                id: job_id.to_string(),
            });
        }
        Ok(())
    }

    /// On startup, return crash-orphaned `running` jobs to `pending` so
    /// they run again. Double delivery is prevented by the reminder CAS,
    /// not by the queue.
    pub fn reset_stale_running(&self) -> Result<usize> {
        let now = self.clock.now_utc().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let reset = conn.execute(
            "UPDATE jobs SET status = 'pending', updated_at = ?1 WHERE status = 'running'",
            rusqlite::params![now],
        )?;
        if reset > 0 {
            warn!(count = reset, "stale running jobs reset on startup");
        }
        Ok(reset)
    }

    /// A job by id, mostly for tests and diagnostics.
    pub fn get(&self, job_id: &str) -> Result<Job> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            rusqlite::params![job_id],
            row_to_job,
        )
        .map_err(|_| SchedulerError::JobNotFound {
            id: job_id.to_string(),
        })
    }

    /// Pending jobs, soonest first.
    pub fn list_pending(&self) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = 'pending'
             ORDER BY run_at_utc ASC"
        ))?;
        let jobs = stmt
            .query_map([], row_to_job)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(jobs)
    }

    fn set_status(&self, job_id: &str, status: JobStatus) -> Result<()> {
        let now = self.clock.now_utc().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE jobs SET status = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![job_id, status.to_string(), now],
        )?;
        if changed == 0 {
            return Err(SchedulerError::JobNotFound {
                id: job_id.to_string(),
            });
        }
        Ok(())
    }
}

/// Engine loop: polls every second and forwards due jobs to the worker
/// pool channel until shutdown.
pub struct SchedulerEngine {
    handle: SchedulerHandle,
    fired_tx: mpsc::Sender<Job>,
}

impl SchedulerEngine {
    pub fn new(handle: SchedulerHandle, fired_tx: mpsc::Sender<Job>) -> Self {
        Self { handle, fired_tx }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler engine started");
        if let Err(e) = self.handle.reset_stale_running() {
            error!("stale-job reset failed: {e}");
        }

        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let due = self.handle.claim_due(64)?;
        for job in due {
            // send (not try_send) so a saturated worker pool backpressures
            // the tick instead of dropping deliveries.
            if self.fired_tx.send(job).await.is_err() {
                warn!("worker channel closed — engine stopping dispatch");
                break;
            }
        }
        Ok(())
    }
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    use std::str::FromStr;
    let kind: JobKind = serde_json::from_str(&row.get::<_, String>(1)?).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status = JobStatus::from_str(&row.get::<_, String>(3)?).unwrap_or(JobStatus::Pending);
    let parse = |s: String| s.parse().unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    Ok(Job {
        id: row.get(0)?,
        kind,
        run_at_utc: parse(row.get(2)?),
        status,
        attempts: row.get::<_, i64>(4)? as u32,
        created_at: parse(row.get(5)?),
        updated_at: parse(row.get(6)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use yoman_core::clock::FixedClock;

    fn handle() -> (Arc<FixedClock>, SchedulerHandle) {
        let clock = Arc::new(FixedClock::new("2025-10-10T07:00:00Z".parse().unwrap()));
        let handle =
            SchedulerHandle::new(Connection::open_in_memory().unwrap(), clock.clone()).unwrap();
        (clock, handle)
    }

    fn delivery(reminder_id: &str, occ: &str) -> JobKind {
        JobKind::ReminderDelivery {
            reminder_id: reminder_id.to_string(),
            user_id: "u-1".to_string(),
            occurrence_utc: occ.parse().unwrap(),
        }
    }

    #[test]
    fn enqueue_same_occurrence_is_idempotent() {
        let (_, h) = handle();
        let at = "2025-10-11T10:00:00Z".parse().unwrap();
        let a = h.enqueue(delivery("r-1", "2025-10-11T10:00:00Z"), at).unwrap();
        let b = h.enqueue(delivery("r-1", "2025-10-11T10:00:00Z"), at).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(h.list_pending().unwrap().len(), 1);
    }

    #[test]
    fn different_occurrences_queue_separately() {
        let (_, h) = handle();
        let at = "2025-10-11T10:00:00Z".parse().unwrap();
        h.enqueue(delivery("r-1", "2025-10-11T10:00:00Z"), at).unwrap();
        h.enqueue(delivery("r-1", "2025-10-12T10:00:00Z"), at).unwrap();
        assert_eq!(h.list_pending().unwrap().len(), 2);
    }

    #[test]
    fn claim_due_respects_run_at_and_marks_running() {
        let (clock, h) = handle();
        h.enqueue(delivery("r-1", "2025-10-10T08:00:00Z"), "2025-10-10T08:00:00Z".parse().unwrap())
            .unwrap();
        assert!(h.claim_due(10).unwrap().is_empty());

        clock.advance(chrono::Duration::hours(2));
        let due = h.claim_due(10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(h.get(&due[0].id).unwrap().status, JobStatus::Running);
        // Claimed jobs are not claimed twice.
        assert!(h.claim_due(10).unwrap().is_empty());
    }

    #[test]
    fn cancel_removes_only_pending() {
        let (clock, h) = handle();
        let at = "2025-10-10T08:00:00Z".parse().unwrap();
        h.enqueue(delivery("r-1", "2025-10-10T08:00:00Z"), at).unwrap();
        h.enqueue(delivery("r-1", "2025-10-11T08:00:00Z"), at).unwrap();
        clock.advance(chrono::Duration::hours(2));
        let claimed = h.claim_due(1).unwrap();
        assert_eq!(claimed.len(), 1);

        let removed = h.cancel_reminder_jobs("r-1").unwrap();
        assert_eq!(removed, 1);
        // The running one survives; its completion is a CAS no-op.
        assert_eq!(h.get(&claimed[0].id).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn retry_requeue_roundtrip() {
        let (clock, h) = handle();
        let job = h
            .enqueue(delivery("r-1", "2025-10-10T07:00:00Z"), "2025-10-10T07:00:00Z".parse().unwrap())
            .unwrap();
        let claimed = h.claim_due(10).unwrap();
        assert_eq!(claimed.len(), 1);

        let retry_at = clock.now_utc() + chrono::Duration::seconds(2);
        h.requeue_for_retry(&job.id, 1, retry_at).unwrap();
        assert!(h.claim_due(10).unwrap().is_empty());
        clock.advance(chrono::Duration::seconds(3));
        let due = h.claim_due(10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempts, 1);
    }

    #[test]
    fn stale_running_reset_on_startup() {
        let (clock, h) = handle();
        h.enqueue(delivery("r-1", "2025-10-10T07:00:00Z"), "2025-10-10T07:00:00Z".parse().unwrap())
            .unwrap();
        clock.advance(chrono::Duration::seconds(1));
        let claimed = h.claim_due(10).unwrap();
        assert_eq!(claimed.len(), 1);

        // Simulated crash + restart.
        assert_eq!(h.reset_stale_running().unwrap(), 1);
        assert_eq!(h.claim_due(10).unwrap().len(), 1);
    }

    #[test]
    fn non_delivery_jobs_have_no_idempotence_key() {
        let (_, h) = handle();
        let at = "2025-10-11T09:00:00Z".parse().unwrap();
        h.enqueue(JobKind::DailyRollout, at).unwrap();
        h.enqueue(JobKind::DailyRollout, at).unwrap();
        assert_eq!(h.list_pending().unwrap().len(), 2);
    }
}
