//! Maintenance jobs: expiry cleanup, low-stock sweep, popularity recompute,
//! bulk price updates, summary and report generation.

use apalis::prelude::{Data, Error as ApalisError};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    application::catalog::CatalogService,
    application::error::AppError,
    application::reports::{Report, ReportParams},
    domain::types::{JobType, ReportKind},
    infra::notify::TemplateKind,
};

use super::{
    DEFAULT_MAX_ATTEMPTS, FEATURED_TOP_N, LOW_STOCK_THRESHOLD, MAINTENANCE_JOB_PRIORITY,
    PENDING_ORDER_MAX_AGE, POPULARITY_WINDOW, WEEKLY_SUMMARY_WINDOW,
    context::{JobWorkerContext, job_failed},
    notify::SendLowStockAlertJobPayload,
    queue::enqueue_job,
};

const METRIC_ORDERS_EXPIRED: &str = "bottega_orders_expired_total";

// ----------------------------------------------------------------------
// Expired-order cleanup
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupExpiredOrdersJobPayload {}

/// Cancel pending orders older than the expiry threshold.
///
/// Stock is decremented at fulfillment only, so expiry restores nothing.
/// Cleanup only touches orders still `pending`; a concurrent fulfillment
/// that already completed an order makes this a no-op for that order.
pub async fn process_cleanup_expired_orders_job(
    _payload: CleanupExpiredOrdersJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;
    let cutoff = OffsetDateTime::now_utc() - PENDING_ORDER_MAX_AGE;

    let cancelled = ctx
        .orders
        .cancel_expired_pending(cutoff)
        .await
        .map_err(job_failed)?;

    if !cancelled.is_empty() {
        counter!(METRIC_ORDERS_EXPIRED).increment(cancelled.len() as u64);
        info!(
            target = "application::jobs::process_cleanup_expired_orders_job",
            count = cancelled.len(),
            "expired pending orders cancelled"
        );
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Low-stock sweep
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LowStockSweepJobPayload {}

/// Enqueue one alert per active product at or below the threshold. The
/// sweep cadence is the rate limit: a product alerts at most once per sweep.
pub async fn process_low_stock_sweep_job(
    _payload: LowStockSweepJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;

    let products = ctx
        .products
        .list_active_low_stock(LOW_STOCK_THRESHOLD)
        .await
        .map_err(job_failed)?;

    let mut alerts = 0usize;
    for product in &products {
        match enqueue_job(
            ctx.jobs.as_ref(),
            JobType::SendLowStockAlert,
            &SendLowStockAlertJobPayload {
                product_id: product.id,
                remaining_stock: product.stock,
            },
            None,
            DEFAULT_MAX_ATTEMPTS,
            MAINTENANCE_JOB_PRIORITY,
        )
        .await
        {
            Ok(_) => alerts += 1,
            Err(err) => warn!(
                product_id = product.id,
                error = %err,
                "failed to enqueue low-stock alert"
            ),
        }
    }

    info!(
        target = "application::jobs::process_low_stock_sweep_job",
        scanned = products.len(),
        alerts,
        "low-stock sweep complete"
    );
    Ok(())
}

// ----------------------------------------------------------------------
// Popularity recompute
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePopularityJobPayload {}

/// Full-replace recompute of the featured set from recent completed sales.
/// Products dropping out of the top list lose the flag in the same UPDATE,
/// so no stale `is_featured` survives.
pub async fn process_update_popularity_job(
    _payload: UpdatePopularityJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;
    let since = OffsetDateTime::now_utc() - POPULARITY_WINDOW;

    let changed = ctx
        .products
        .recompute_featured(FEATURED_TOP_N, since)
        .await
        .map_err(job_failed)?;

    if changed > 0 {
        // Membership of the list and featured views moved; drop them all.
        ctx.catalog
            .cache()
            .invalidate(crate::cache::EntityKind::Product, None)
            .await;
    }

    info!(
        target = "application::jobs::process_update_popularity_job",
        changed, "product popularity recomputed"
    );
    Ok(())
}

// ----------------------------------------------------------------------
// Bulk price updates
// ----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub product_id: i64,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum PriceUpdateStatus {
    Applied,
    /// Business-rule rejection; never retried.
    Rejected(String),
    /// Infrastructure failure while applying this item.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdateOutcome {
    pub product_id: i64,
    pub status: PriceUpdateStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUpdatePricesJobPayload {
    pub updates: Vec<PriceUpdate>,
}

/// Apply a batch of independent price changes. Each item validates on its
/// own; one invalid entry does not abort the rest, and the result is
/// reported per item.
pub async fn apply_price_updates(
    catalog: &CatalogService,
    updates: &[PriceUpdate],
) -> Vec<PriceUpdateOutcome> {
    let mut outcomes = Vec::with_capacity(updates.len());

    for update in updates {
        let status = match catalog
            .update_price(update.product_id, update.price, update.discount_price)
            .await
        {
            Ok(_) => PriceUpdateStatus::Applied,
            Err(err @ (AppError::Validation(_) | AppError::Domain(_))) => {
                PriceUpdateStatus::Rejected(err.to_string())
            }
            Err(AppError::NotFound) => {
                PriceUpdateStatus::Rejected("product not found".to_string())
            }
            Err(err) => PriceUpdateStatus::Failed(err.to_string()),
        };
        outcomes.push(PriceUpdateOutcome {
            product_id: update.product_id,
            status,
        });
    }

    outcomes
}

pub async fn process_bulk_update_prices_job(
    payload: BulkUpdatePricesJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;

    let outcomes = apply_price_updates(&ctx.catalog, &payload.updates).await;

    let applied = outcomes
        .iter()
        .filter(|o| o.status == PriceUpdateStatus::Applied)
        .count();
    for outcome in &outcomes {
        if let PriceUpdateStatus::Rejected(reason) | PriceUpdateStatus::Failed(reason) =
            &outcome.status
        {
            warn!(
                product_id = outcome.product_id,
                reason, "price update not applied"
            );
        }
    }

    info!(
        target = "application::jobs::process_bulk_update_prices_job",
        total = outcomes.len(),
        applied,
        "bulk price update complete"
    );
    Ok(())
}

// ----------------------------------------------------------------------
// Weekly summary
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeeklySummaryJobPayload {}

pub async fn process_weekly_summary_job(
    _payload: WeeklySummaryJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;
    let since = OffsetDateTime::now_utc() - WEEKLY_SUMMARY_WINDOW;

    let summary = ctx.orders.sales_summary(since).await.map_err(job_failed)?;

    ctx.notifier
        .dispatch(
            TemplateKind::WeeklySummary,
            None,
            json!({
                "orders_completed": summary.orders_completed,
                "units_sold": summary.units_sold,
                "total_revenue": summary.total_revenue,
            }),
        )
        .await
        .map_err(job_failed)?;

    info!(
        target = "application::jobs::process_weekly_summary_job",
        orders = summary.orders_completed,
        units = summary.units_sold,
        "weekly summary dispatched"
    );
    Ok(())
}

// ----------------------------------------------------------------------
// Daily report generation
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateDailyReportJobPayload {
    pub kind: ReportKind,
    pub limit: Option<u32>,
}

impl Default for GenerateDailyReportJobPayload {
    fn default() -> Self {
        Self {
            kind: ReportKind::SalesByCategory,
            limit: None,
        }
    }
}

pub async fn process_generate_daily_report_job(
    payload: GenerateDailyReportJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;

    let report = ctx
        .reports
        .generate(ReportParams {
            kind: payload.kind,
            limit: payload.limit,
        })
        .await
        .map_err(job_failed)?;

    let rows = match &report {
        Report::SalesByCategory(rows) => rows.len(),
        Report::ProfitMargin(rows) => rows.len(),
        Report::Combined(rows) => rows.len(),
    };
    let report_payload = serde_json::to_value(&report).map_err(|err| {
        job_failed(crate::application::repos::RepoError::from_persistence(err))
    })?;

    ctx.notifier
        .dispatch(TemplateKind::DailyReport, None, report_payload)
        .await
        .map_err(job_failed)?;

    info!(
        target = "application::jobs::process_generate_daily_report_job",
        kind = ?payload.kind,
        rows,
        "daily report dispatched"
    );
    Ok(())
}
