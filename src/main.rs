use std::{process, sync::Arc, time::Duration};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_cron::CronStream;
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use bottega::{
    application::{
        catalog::CatalogService,
        error::AppError,
        jobs::{
            JobWorkerContext, SchedulerContext, cleanup_schedule, daily_report_schedule,
            low_stock_schedule, popularity_schedule, process_bulk_update_prices_job,
            process_cleanup_expired_orders_job, process_cleanup_tick, process_daily_report_tick,
            process_generate_daily_report_job, process_low_stock_sweep_job, process_low_stock_tick,
            process_order_job, process_popularity_tick, process_queue_health_tick,
            process_send_low_stock_alert_job, process_send_order_confirmation_job,
            process_update_popularity_job, process_weekly_summary_job,
            process_weekly_summary_tick, queue_health_schedule, weekly_summary_schedule,
        },
        reports::ReportService,
        repos::{CategoriesRepo, JobsRepo, OrdersRepo, ProductsRepo, ReportsRepo},
    },
    cache::{CacheCoordinator, MemoryCacheStore},
    config,
    domain::types::JobType,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        notify::TracingDispatcher,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Worker(Box::<config::WorkerArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Worker(_) => run_worker(settings).await,
    }
}

async fn run_worker(settings: config::Settings) -> Result<(), AppError> {
    let (service_repositories, job_repositories) = init_repositories(&settings).await?;

    let cache_store = Arc::new(MemoryCacheStore::new());
    let job_context = build_job_context(&service_repositories, cache_store.clone(), &settings);
    let scheduler_jobs: Arc<dyn JobsRepo> = service_repositories.clone();
    let scheduler_context = SchedulerContext {
        jobs: scheduler_jobs,
    };

    // Reclaim expired cache entries between reads.
    let purge_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_PURGE_INTERVAL);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            let purged = cache_store.purge_expired();
            if purged > 0 {
                info!(purged, "expired cache entries reclaimed");
            }
        }
    });

    info!("starting worker pool and scheduler");

    let result = run_job_monitor(
        job_repositories,
        job_context,
        scheduler_context,
        &settings.jobs,
    )
    .await;

    purge_handle.abort();
    let _ = purge_handle.await;

    result
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<(Arc<PostgresRepositories>, Arc<PostgresRepositories>), AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let service_pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let jobs_pool =
        PostgresRepositories::connect(database_url, settings.database.jobs_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok((
        Arc::new(PostgresRepositories::new(service_pool)),
        Arc::new(PostgresRepositories::new(jobs_pool)),
    ))
}

fn build_job_context(
    repositories: &Arc<PostgresRepositories>,
    cache_store: Arc<MemoryCacheStore>,
    settings: &config::Settings,
) -> JobWorkerContext {
    let categories: Arc<dyn CategoriesRepo> = repositories.clone();
    let products: Arc<dyn ProductsRepo> = repositories.clone();
    let orders: Arc<dyn OrdersRepo> = repositories.clone();
    let reports: Arc<dyn ReportsRepo> = repositories.clone();
    let jobs: Arc<dyn JobsRepo> = repositories.clone();

    let cache = Arc::new(CacheCoordinator::new(settings.cache.clone(), cache_store));
    let catalog = Arc::new(CatalogService::new(categories, products.clone(), cache));
    let report_service = Arc::new(ReportService::new(reports));

    JobWorkerContext {
        orders,
        products,
        jobs,
        catalog,
        reports: report_service,
        notifier: Arc::new(TracingDispatcher),
    }
}

async fn run_job_monitor(
    repositories: Arc<PostgresRepositories>,
    context: JobWorkerContext,
    scheduler_context: SchedulerContext,
    jobs: &config::JobsSettings,
) -> Result<(), AppError> {
    let pool = repositories.pool().clone();
    let process_order_storage = PostgresStorage::new_with_config(
        pool.clone(),
        ApalisSqlConfig::new(JobType::ProcessOrder.as_str()),
    );
    let confirmation_storage = PostgresStorage::new_with_config(
        pool.clone(),
        ApalisSqlConfig::new(JobType::SendOrderConfirmation.as_str()),
    );
    let low_stock_alert_storage = PostgresStorage::new_with_config(
        pool.clone(),
        ApalisSqlConfig::new(JobType::SendLowStockAlert.as_str()),
    );
    let daily_report_storage = PostgresStorage::new_with_config(
        pool.clone(),
        ApalisSqlConfig::new(JobType::GenerateDailyReport.as_str()),
    );
    let weekly_summary_storage = PostgresStorage::new_with_config(
        pool.clone(),
        ApalisSqlConfig::new(JobType::WeeklySummary.as_str()),
    );
    let cleanup_storage = PostgresStorage::new_with_config(
        pool.clone(),
        ApalisSqlConfig::new(JobType::CleanupExpiredOrders.as_str()),
    );
    let low_stock_sweep_storage = PostgresStorage::new_with_config(
        pool.clone(),
        ApalisSqlConfig::new(JobType::LowStockSweep.as_str()),
    );
    let popularity_storage = PostgresStorage::new_with_config(
        pool.clone(),
        ApalisSqlConfig::new(JobType::UpdatePopularity.as_str()),
    );
    let bulk_prices_storage = PostgresStorage::new_with_config(
        pool.clone(),
        ApalisSqlConfig::new(JobType::BulkUpdatePrices.as_str()),
    );

    let orders_concurrency = jobs.orders_concurrency.get() as usize;
    let emails_concurrency = jobs.emails_concurrency.get() as usize;
    let reports_concurrency = jobs.reports_concurrency.get() as usize;
    let default_concurrency = jobs.default_concurrency.get() as usize;
    let monitoring_concurrency = jobs.monitoring_concurrency.get() as usize;

    let process_order_worker = WorkerBuilder::new("process-order-worker")
        .concurrency(orders_concurrency)
        .data(context.clone())
        .backend(process_order_storage)
        .build_fn(process_order_job);
    let confirmation_worker = WorkerBuilder::new("order-confirmation-worker")
        .concurrency(emails_concurrency)
        .data(context.clone())
        .backend(confirmation_storage)
        .build_fn(process_send_order_confirmation_job);
    let low_stock_alert_worker = WorkerBuilder::new("low-stock-alert-worker")
        .concurrency(monitoring_concurrency)
        .data(context.clone())
        .backend(low_stock_alert_storage)
        .build_fn(process_send_low_stock_alert_job);
    let daily_report_worker = WorkerBuilder::new("daily-report-worker")
        .concurrency(reports_concurrency)
        .data(context.clone())
        .backend(daily_report_storage)
        .build_fn(process_generate_daily_report_job);
    let weekly_summary_worker = WorkerBuilder::new("weekly-summary-worker")
        .concurrency(reports_concurrency)
        .data(context.clone())
        .backend(weekly_summary_storage)
        .build_fn(process_weekly_summary_job);
    let cleanup_worker = WorkerBuilder::new("cleanup-expired-orders-worker")
        .concurrency(default_concurrency)
        .data(context.clone())
        .backend(cleanup_storage)
        .build_fn(process_cleanup_expired_orders_job);
    let low_stock_sweep_worker = WorkerBuilder::new("low-stock-sweep-worker")
        .concurrency(default_concurrency)
        .data(context.clone())
        .backend(low_stock_sweep_storage)
        .build_fn(process_low_stock_sweep_job);
    let popularity_worker = WorkerBuilder::new("update-popularity-worker")
        .concurrency(default_concurrency)
        .data(context.clone())
        .backend(popularity_storage)
        .build_fn(process_update_popularity_job);
    let bulk_prices_worker = WorkerBuilder::new("bulk-update-prices-worker")
        .concurrency(default_concurrency)
        .data(context.clone())
        .backend(bulk_prices_storage)
        .build_fn(process_bulk_update_prices_job);

    // Calendar triggers enqueue onto the lanes above; they never run the
    // maintenance bodies inline.
    let daily_report_trigger = WorkerBuilder::new("daily-report-trigger")
        .data(scheduler_context.clone())
        .backend(CronStream::new(daily_report_schedule()))
        .build_fn(process_daily_report_tick);
    let cleanup_trigger = WorkerBuilder::new("cleanup-trigger")
        .data(scheduler_context.clone())
        .backend(CronStream::new(cleanup_schedule()))
        .build_fn(process_cleanup_tick);
    let low_stock_trigger = WorkerBuilder::new("low-stock-trigger")
        .data(scheduler_context.clone())
        .backend(CronStream::new(low_stock_schedule()))
        .build_fn(process_low_stock_tick);
    let popularity_trigger = WorkerBuilder::new("popularity-trigger")
        .data(scheduler_context.clone())
        .backend(CronStream::new(popularity_schedule()))
        .build_fn(process_popularity_tick);
    let weekly_summary_trigger = WorkerBuilder::new("weekly-summary-trigger")
        .data(scheduler_context.clone())
        .backend(CronStream::new(weekly_summary_schedule()))
        .build_fn(process_weekly_summary_tick);
    let queue_health_trigger = WorkerBuilder::new("queue-health-trigger")
        .data(scheduler_context.clone())
        .backend(CronStream::new(queue_health_schedule()))
        .build_fn(process_queue_health_tick);

    let monitor = Monitor::new()
        .register(process_order_worker)
        .register(confirmation_worker)
        .register(low_stock_alert_worker)
        .register(daily_report_worker)
        .register(weekly_summary_worker)
        .register(cleanup_worker)
        .register(low_stock_sweep_worker)
        .register(popularity_worker)
        .register(bulk_prices_worker)
        .register(daily_report_trigger)
        .register(cleanup_trigger)
        .register(low_stock_trigger)
        .register(popularity_trigger)
        .register(weekly_summary_trigger)
        .register(queue_health_trigger);

    monitor
        .run()
        .await
        .map_err(|err| AppError::unexpected(format!("job monitor stopped: {err}")))
}
