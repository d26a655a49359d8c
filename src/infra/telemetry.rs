use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "bottega_cache_hit_total",
            Unit::Count,
            "Total number of cache hits."
        );
        describe_counter!(
            "bottega_cache_miss_total",
            Unit::Count,
            "Total number of cache misses."
        );
        describe_counter!(
            "bottega_cache_error_total",
            Unit::Count,
            "Total number of cache operations degraded to miss/no-op after a store failure."
        );
        describe_counter!(
            "bottega_cache_invalidate_total",
            Unit::Count,
            "Total number of cache keys removed by invalidation."
        );
        describe_counter!(
            "bottega_orders_fulfilled_total",
            Unit::Count,
            "Orders transitioned from pending to completed."
        );
        describe_counter!(
            "bottega_orders_cancelled_total",
            Unit::Count,
            "Orders cancelled after a fulfillment conflict."
        );
        describe_counter!(
            "bottega_orders_expired_total",
            Unit::Count,
            "Pending orders cancelled by the expiry cleanup."
        );
        describe_counter!(
            "bottega_stock_conflict_total",
            Unit::Count,
            "Fulfillment attempts that observed insufficient stock."
        );
        describe_gauge!(
            "bottega_jobs_pending",
            Unit::Count,
            "Jobs currently waiting in the queue."
        );
        describe_gauge!(
            "bottega_jobs_failed",
            Unit::Count,
            "Jobs that exhausted their retries."
        );
        describe_histogram!(
            "bottega_job_duration_ms",
            Unit::Milliseconds,
            "Job execution latency in milliseconds."
        );
    });
}
