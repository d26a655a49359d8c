//! Calendar triggers.
//!
//! Each trigger is an apalis-cron stream whose worker body only enqueues the
//! corresponding maintenance job onto its lane. Timing therefore stays
//! decoupled from worker availability and backpressure; the one exception is
//! the queue-health probe, which reads queue state inline because it is
//! observability rather than business logic.

use std::str::FromStr;
use std::sync::Arc;

use apalis::prelude::{Data, Error as ApalisError};
use cron::Schedule;
use metrics::gauge;
use tracing::{info, warn};

use crate::{
    application::repos::JobsRepo,
    domain::types::{JobState, JobType},
};

use super::{
    DEFAULT_MAX_ATTEMPTS, MAINTENANCE_JOB_PRIORITY,
    maintenance::{
        CleanupExpiredOrdersJobPayload, GenerateDailyReportJobPayload, LowStockSweepJobPayload,
        UpdatePopularityJobPayload, WeeklySummaryJobPayload,
    },
    queue::enqueue_job,
};

const METRIC_JOBS_PENDING: &str = "bottega_jobs_pending";
const METRIC_JOBS_FAILED: &str = "bottega_jobs_failed";

/// Context for the scheduler workers: only the queue client, by design.
#[derive(Clone)]
pub struct SchedulerContext {
    pub jobs: Arc<dyn JobsRepo>,
}

macro_rules! cron_tick {
    ($name:ident) => {
        /// Marker for a cron-triggered tick. Must implement
        /// `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
        #[derive(Default, Debug, Clone)]
        pub struct $name;

        impl From<chrono::DateTime<chrono::Utc>> for $name {
            fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
                Self
            }
        }
    };
}

cron_tick!(DailyReportTick);
cron_tick!(CleanupTick);
cron_tick!(LowStockTick);
cron_tick!(PopularityTick);
cron_tick!(WeeklySummaryTick);
cron_tick!(QueueHealthTick);

async fn enqueue_maintenance<P: serde::Serialize>(
    ctx: &SchedulerContext,
    job_type: JobType,
    payload: &P,
) -> Result<(), ApalisError> {
    match enqueue_job(
        ctx.jobs.as_ref(),
        job_type,
        payload,
        None,
        DEFAULT_MAX_ATTEMPTS,
        MAINTENANCE_JOB_PRIORITY,
    )
    .await
    {
        Ok(job_id) => {
            info!(
                target = "application::jobs::schedule",
                job_type = job_type.as_str(),
                lane = job_type.lane().as_str(),
                job_id = %job_id,
                "maintenance job enqueued"
            );
        }
        Err(err) => {
            // The trigger fires again on the next calendar slot; a missed
            // enqueue is logged, not retried inline.
            warn!(
                target = "application::jobs::schedule",
                job_type = job_type.as_str(),
                error = %err,
                "failed to enqueue maintenance job"
            );
        }
    }
    Ok(())
}

pub async fn process_daily_report_tick(
    _tick: DailyReportTick,
    ctx: Data<SchedulerContext>,
) -> Result<(), ApalisError> {
    enqueue_maintenance(
        &ctx,
        JobType::GenerateDailyReport,
        &GenerateDailyReportJobPayload::default(),
    )
    .await
}

pub async fn process_cleanup_tick(
    _tick: CleanupTick,
    ctx: Data<SchedulerContext>,
) -> Result<(), ApalisError> {
    enqueue_maintenance(
        &ctx,
        JobType::CleanupExpiredOrders,
        &CleanupExpiredOrdersJobPayload::default(),
    )
    .await
}

pub async fn process_low_stock_tick(
    _tick: LowStockTick,
    ctx: Data<SchedulerContext>,
) -> Result<(), ApalisError> {
    enqueue_maintenance(
        &ctx,
        JobType::LowStockSweep,
        &LowStockSweepJobPayload::default(),
    )
    .await
}

pub async fn process_popularity_tick(
    _tick: PopularityTick,
    ctx: Data<SchedulerContext>,
) -> Result<(), ApalisError> {
    enqueue_maintenance(
        &ctx,
        JobType::UpdatePopularity,
        &UpdatePopularityJobPayload::default(),
    )
    .await
}

pub async fn process_weekly_summary_tick(
    _tick: WeeklySummaryTick,
    ctx: Data<SchedulerContext>,
) -> Result<(), ApalisError> {
    enqueue_maintenance(
        &ctx,
        JobType::WeeklySummary,
        &WeeklySummaryJobPayload::default(),
    )
    .await
}

/// Surface queue state through metrics and logs. Exhausted jobs are never
/// silently dropped: they show up here as Failed/Killed counts.
pub async fn process_queue_health_tick(
    _tick: QueueHealthTick,
    ctx: Data<SchedulerContext>,
) -> Result<(), ApalisError> {
    let pending = ctx.jobs.count_jobs_by_state(JobState::Pending).await;
    let failed = ctx.jobs.count_jobs_by_state(JobState::Failed).await;
    let killed = ctx.jobs.count_jobs_by_state(JobState::Killed).await;

    match (pending, failed, killed) {
        (Ok(pending), Ok(failed), Ok(killed)) => {
            gauge!(METRIC_JOBS_PENDING).set(pending as f64);
            gauge!(METRIC_JOBS_FAILED).set((failed + killed) as f64);
            if failed + killed > 0 {
                warn!(
                    target = "application::jobs::schedule",
                    pending, failed, killed, "queue has permanently failed jobs"
                );
            }
        }
        (pending, failed, killed) => {
            for result in [pending, failed, killed] {
                if let Err(err) = result {
                    warn!(
                        target = "application::jobs::schedule",
                        error = %err,
                        "queue health probe failed"
                    );
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Daily at 01:30 UTC.
pub fn daily_report_schedule() -> Schedule {
    Schedule::from_str("0 30 1 * * *").expect("invalid cron expression for daily_report")
}

/// Daily at 02:00 UTC.
pub fn cleanup_schedule() -> Schedule {
    Schedule::from_str("0 0 2 * * *").expect("invalid cron expression for cleanup")
}

/// Daily at 07:00 UTC.
pub fn low_stock_schedule() -> Schedule {
    Schedule::from_str("0 0 7 * * *").expect("invalid cron expression for low_stock")
}

/// Daily at 03:15 UTC.
pub fn popularity_schedule() -> Schedule {
    Schedule::from_str("0 15 3 * * *").expect("invalid cron expression for popularity")
}

/// Mondays at 06:00 UTC.
pub fn weekly_summary_schedule() -> Schedule {
    Schedule::from_str("0 0 6 * * MON").expect("invalid cron expression for weekly_summary")
}

/// Every five minutes.
pub fn queue_health_schedule() -> Schedule {
    Schedule::from_str("0 */5 * * * *").expect("invalid cron expression for queue_health")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedules_parse_and_produce_upcoming_slots() {
        for schedule in [
            daily_report_schedule(),
            cleanup_schedule(),
            low_stock_schedule(),
            popularity_schedule(),
            weekly_summary_schedule(),
            queue_health_schedule(),
        ] {
            let upcoming: Vec<_> = schedule.upcoming(chrono::Utc).take(3).collect();
            assert_eq!(upcoming.len(), 3);
        }
    }

    #[test]
    fn weekly_summary_fires_on_mondays() {
        let schedule = weekly_summary_schedule();
        for slot in schedule.upcoming(chrono::Utc).take(4) {
            use chrono::Datelike;
            assert_eq!(slot.weekday(), chrono::Weekday::Mon);
        }
    }
}
