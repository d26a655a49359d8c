//! Background jobs: the fulfillment pipeline and scheduled maintenance.
//!
//! Jobs are pushed onto per-type apalis storages (grouped into lanes) and
//! consumed by the worker pool wired in `main`. Calendar triggers enqueue
//! through the same client; they never run business logic inline.

mod context;
mod fulfill;
mod maintenance;
mod notify;
pub mod queue;
mod schedule;

pub use context::{JobWorkerContext, job_failed};
pub use fulfill::{ProcessOrderJobPayload, process_order_job};
pub use maintenance::{
    BulkUpdatePricesJobPayload, CleanupExpiredOrdersJobPayload, GenerateDailyReportJobPayload,
    LowStockSweepJobPayload, PriceUpdate, PriceUpdateOutcome, PriceUpdateStatus,
    UpdatePopularityJobPayload, WeeklySummaryJobPayload, apply_price_updates,
    process_bulk_update_prices_job, process_cleanup_expired_orders_job,
    process_generate_daily_report_job, process_low_stock_sweep_job, process_update_popularity_job,
    process_weekly_summary_job,
};
pub use notify::{
    SendLowStockAlertJobPayload, SendOrderConfirmationJobPayload,
    process_send_low_stock_alert_job, process_send_order_confirmation_job,
};
pub use queue::{enqueue_job, wait_for_job_completion};
pub use schedule::{
    CleanupTick, DailyReportTick, LowStockTick, PopularityTick, QueueHealthTick, SchedulerContext,
    WeeklySummaryTick, cleanup_schedule, daily_report_schedule, low_stock_schedule,
    popularity_schedule, process_cleanup_tick, process_daily_report_tick, process_low_stock_tick,
    process_popularity_tick, process_queue_health_tick, process_weekly_summary_tick,
    queue_health_schedule, weekly_summary_schedule,
};

/// Bounded retries for queued jobs; exhausted jobs surface as Failed rows.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;
/// Fulfillment outranks maintenance when a lane drains a backlog.
pub const ORDER_JOB_PRIORITY: i32 = 10;
pub const MAINTENANCE_JOB_PRIORITY: i32 = 0;

/// Stock level at or below which a product raises an alert.
pub const LOW_STOCK_THRESHOLD: i32 = 5;
/// How many products the popularity recompute marks featured.
pub const FEATURED_TOP_N: i64 = 10;
/// Pending orders older than this are expired by the cleanup job.
pub const PENDING_ORDER_MAX_AGE: time::Duration = time::Duration::hours(24);
/// Sales window for the popularity ranking.
pub const POPULARITY_WINDOW: time::Duration = time::Duration::days(30);
/// Trailing window for the weekly summary.
pub const WEEKLY_SUMMARY_WINDOW: time::Duration = time::Duration::days(7);
