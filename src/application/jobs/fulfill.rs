//! Order fulfillment job.
//!
//! The state machine per order is `pending → completed` on the happy path,
//! `pending → cancelled` on insufficient stock. Both transitions are
//! conditional on the order still being `pending`, which gives per-order
//! mutual exclusion against concurrent cleanup: whichever mutation lands
//! first wins and the other becomes a no-op.

use apalis::prelude::{Data, Error as ApalisError};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    application::repos::{FulfillmentOutcome, RepoError},
    domain::types::JobType,
};

use super::{
    DEFAULT_MAX_ATTEMPTS, LOW_STOCK_THRESHOLD, MAINTENANCE_JOB_PRIORITY, ORDER_JOB_PRIORITY,
    context::{JobWorkerContext, job_failed},
    notify::{SendLowStockAlertJobPayload, SendOrderConfirmationJobPayload},
    queue::enqueue_job,
};

const METRIC_ORDERS_FULFILLED: &str = "bottega_orders_fulfilled_total";
const METRIC_ORDERS_CANCELLED: &str = "bottega_orders_cancelled_total";
const METRIC_STOCK_CONFLICTS: &str = "bottega_stock_conflict_total";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOrderJobPayload {
    pub order_id: i64,
}

pub async fn process_order_job(
    payload: ProcessOrderJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;
    let order_id = payload.order_id;

    let outcome = ctx
        .orders
        .complete_pending_order(order_id)
        .await
        .map_err(job_failed)?;

    match outcome {
        FulfillmentOutcome::Completed { remaining } => {
            counter!(METRIC_ORDERS_FULFILLED).increment(1);

            // The decrement committed inside the fulfillment transaction;
            // invalidate the affected product keys now.
            for (product_id, _) in &remaining {
                ctx.catalog.invalidate_product(*product_id).await;
            }

            enqueue_job(
                ctx.jobs.as_ref(),
                JobType::SendOrderConfirmation,
                &SendOrderConfirmationJobPayload { order_id },
                None,
                DEFAULT_MAX_ATTEMPTS,
                ORDER_JOB_PRIORITY,
            )
            .await
            .map_err(job_failed)?;

            for (product_id, stock) in remaining {
                if stock <= LOW_STOCK_THRESHOLD {
                    if let Err(err) = enqueue_job(
                        ctx.jobs.as_ref(),
                        JobType::SendLowStockAlert,
                        &SendLowStockAlertJobPayload {
                            product_id,
                            remaining_stock: stock,
                        },
                        None,
                        DEFAULT_MAX_ATTEMPTS,
                        MAINTENANCE_JOB_PRIORITY,
                    )
                    .await
                    {
                        // The order itself completed; a missed alert is
                        // recoverable by the next sweep.
                        warn!(
                            order_id,
                            product_id,
                            error = %err,
                            "failed to enqueue low-stock alert"
                        );
                    }
                }
            }

            info!(
                target = "application::jobs::process_order_job",
                order_id, "order fulfilled"
            );
            Ok(())
        }
        FulfillmentOutcome::InsufficientStock { product_id } => {
            counter!(METRIC_STOCK_CONFLICTS).increment(1);

            // A real business outcome, not an infrastructure failure: the
            // order cancels and the job must not be retried.
            let cancelled = ctx
                .orders
                .cancel_pending_order(order_id)
                .await
                .map_err(job_failed)?;
            if cancelled {
                counter!(METRIC_ORDERS_CANCELLED).increment(1);
            }

            info!(
                target = "application::jobs::process_order_job",
                order_id, product_id, "order cancelled, insufficient stock"
            );
            Ok(())
        }
        FulfillmentOutcome::AlreadyTransitioned => {
            debug!(
                target = "application::jobs::process_order_job",
                order_id, "order already left pending, nothing to do"
            );
            Ok(())
        }
        FulfillmentOutcome::NotFound => Err(job_failed(RepoError::from_persistence(format!(
            "order `{order_id}` not found"
        )))),
    }
}
