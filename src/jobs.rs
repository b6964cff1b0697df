//! Postgres-backed outbox for background work.
//!
//! Rows move `queued -> processing -> succeeded | failed`, or back to `queued`
//! with a later `run_after` when a handler asks for a retry. Workers claim rows
//! with `FOR UPDATE SKIP LOCKED`, so several processes can poll the same table.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Job, NewJob};
use crate::schema::jobs;
use crate::utils::time::now;

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_FAILED: &str = "failed";

pub const JOB_SEND_NOTIFICATION: &str = "send-notification";

/// Delay before the next attempt of a failed job: 30s doubling per attempt,
/// capped at one hour.
pub fn backoff_delay(attempts: i32) -> Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 7) as u32;
    Duration::from_secs((30u64 << exponent).min(3600))
}

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type JobQueueResult<T> = Result<T, JobQueueError>;

/// Final state written back for a reserved job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Settlement<'a> {
    Succeeded,
    RetryAfter { delay: Duration, error: &'a str },
    Failed { error: &'a str },
}

pub fn enqueue_job(
    conn: &mut PgConnection,
    job_type: &str,
    payload: Value,
    run_after: Option<NaiveDateTime>,
) -> JobQueueResult<Job> {
    let new_job = NewJob {
        id: Uuid::new_v4(),
        job_type: job_type.to_string(),
        payload,
        status: STATUS_QUEUED.to_string(),
        run_after: run_after.unwrap_or_else(now),
    };

    let job = diesel::insert_into(jobs::table)
        .values(&new_job)
        .get_result(conn)?;
    Ok(job)
}

/// Claims the oldest due job of one of `job_types` and bumps its attempt count.
pub fn reserve_job(conn: &mut PgConnection, job_types: &[&str]) -> JobQueueResult<Option<Job>> {
    let reserved_at = now();

    let reserved = conn.transaction(|conn| {
        let candidate = jobs::table
            .select(jobs::id)
            .filter(jobs::status.eq(STATUS_QUEUED))
            .filter(jobs::run_after.le(reserved_at))
            .filter(jobs::job_type.eq_any(job_types))
            .order((jobs::run_after.asc(), jobs::created_at.asc()))
            .for_update()
            .skip_locked()
            .first::<Uuid>(conn)
            .optional()?;

        let Some(job_id) = candidate else {
            return Ok::<_, diesel::result::Error>(None);
        };
        diesel::update(jobs::table.find(job_id))
            .set((
                jobs::status.eq(STATUS_PROCESSING),
                jobs::attempts.eq(jobs::attempts + 1),
                jobs::updated_at.eq(reserved_at),
            ))
            .get_result::<Job>(conn)
            .map(Some)
    })?;
    Ok(reserved)
}

pub fn settle_job(
    conn: &mut PgConnection,
    job_id: Uuid,
    settlement: Settlement<'_>,
) -> JobQueueResult<()> {
    let settled_at = now();
    let target = jobs::table
        .filter(jobs::id.eq(job_id))
        .filter(jobs::status.eq(STATUS_PROCESSING));

    match settlement {
        Settlement::Succeeded => {
            diesel::update(target)
                .set((
                    jobs::status.eq(STATUS_SUCCEEDED),
                    jobs::last_error.eq(None::<String>),
                    jobs::updated_at.eq(settled_at),
                ))
                .execute(conn)?;
        }
        Settlement::RetryAfter { delay, error } => {
            let delay = ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::hours(1));
            diesel::update(target)
                .set((
                    jobs::status.eq(STATUS_QUEUED),
                    jobs::run_after.eq(settled_at + delay),
                    jobs::last_error.eq(Some(error)),
                    jobs::updated_at.eq(settled_at),
                ))
                .execute(conn)?;
        }
        Settlement::Failed { error } => {
            diesel::update(target)
                .set((
                    jobs::status.eq(STATUS_FAILED),
                    jobs::last_error.eq(Some(error)),
                    jobs::updated_at.eq(settled_at),
                ))
                .execute(conn)?;
        }
    }
    Ok(())
}

/// Puts jobs that have sat in `processing` longer than `stale_after` back in the
/// queue. Their attempt is counted already.
pub fn requeue_stale_jobs(conn: &mut PgConnection, stale_after: Duration) -> JobQueueResult<usize> {
    let reference = now();
    let cutoff = reference - ChronoDuration::from_std(stale_after).unwrap_or(ChronoDuration::hours(1));
    let count = diesel::update(
        jobs::table
            .filter(jobs::status.eq(STATUS_PROCESSING))
            .filter(jobs::updated_at.lt(cutoff)),
    )
    .set((
        jobs::status.eq(STATUS_QUEUED),
        jobs::run_after.eq(reference),
        jobs::last_error.eq(Some("worker stopped while processing")),
        jobs::updated_at.eq(reference),
    ))
    .execute(conn)?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::backoff_delay;
    use std::time::Duration;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(30));
        assert_eq!(backoff_delay(2), Duration::from_secs(60));
        assert_eq!(backoff_delay(4), Duration::from_secs(240));
        assert_eq!(backoff_delay(20), Duration::from_secs(3600));
        assert_eq!(backoff_delay(0), Duration::from_secs(30));
    }
}
