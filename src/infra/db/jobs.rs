//! Job queue persistence over the apalis Postgres schema.
//!
//! Enqueueing goes through `apalis.push_job` so rows are visible to the
//! worker storages registered in `main`; reads over `apalis.jobs` back the
//! result-polling and queue-health surfaces.

use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;

use crate::{
    application::repos::{JobsRepo, NewJobRecord, RepoError},
    domain::{
        entities::JobRecord,
        types::{JobState, JobType},
    },
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    job_type: String,
    job: serde_json::Value,
    status: String,
    attempts: i32,
    max_attempts: i32,
    run_at: OffsetDateTime,
    last_error: Option<String>,
    done_at: Option<OffsetDateTime>,
    priority: Option<i32>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = RepoError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let job_type = JobType::try_from(row.job_type.as_str()).map_err(|_| {
            RepoError::from_persistence(format!("unknown job type `{}`", row.job_type))
        })?;

        let state = JobState::try_from(row.status.as_str()).map_err(|_| {
            RepoError::from_persistence(format!("unknown job state `{}`", row.status))
        })?;

        Ok(Self {
            id: row.id,
            job_type,
            payload: row.job,
            state,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            run_at: row.run_at,
            done_at: row.done_at,
            last_error: row.last_error,
            priority: row.priority.unwrap_or(0),
        })
    }
}

const JOB_COLUMNS: &str =
    "id, job_type, job, status, attempts, max_attempts, run_at, last_error, done_at, priority";

#[async_trait]
impl JobsRepo for PostgresRepositories {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError> {
        let mut qb = QueryBuilder::new("SELECT (apalis.push_job(");
        qb.push_bind(job.job_type.as_str());
        qb.push(", ");
        qb.push_bind(job.payload);
        qb.push("::json, ");
        qb.push_bind(JobState::Pending.as_str());
        qb.push(", ");
        qb.push_bind(job.run_at);
        qb.push(", ");
        qb.push_bind(job.max_attempts);
        qb.push(", ");
        qb.push_bind(job.priority);
        qb.push(")).id");

        let id: String = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(id)
    }

    async fn find_job(&self, id: &str) -> Result<Option<JobRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(JOB_COLUMNS);
        qb.push(" FROM apalis.jobs WHERE id = ");
        qb.push_bind(id);

        let row = qb
            .build_query_as::<JobRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => JobRecord::try_from(row).map(Some),
            None => Ok(None),
        }
    }

    async fn count_jobs_by_state(&self, state: JobState) -> Result<i64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM apalis.jobs WHERE status = ");
        qb.push_bind(state.as_str());

        qb.build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}
