//! Notification jobs.
//!
//! These jobs only assemble arguments and hand off to the dispatcher; the
//! delivery transport is an external collaborator.

use apalis::prelude::{Data, Error as ApalisError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{application::repos::RepoError, infra::notify::TemplateKind};

use super::context::{JobWorkerContext, job_failed};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOrderConfirmationJobPayload {
    pub order_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendLowStockAlertJobPayload {
    pub product_id: i64,
    pub remaining_stock: i32,
}

pub async fn process_send_order_confirmation_job(
    payload: SendOrderConfirmationJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;

    let order = ctx
        .orders
        .find_order(payload.order_id)
        .await
        .map_err(job_failed)?
        .ok_or_else(|| {
            job_failed(RepoError::from_persistence(format!(
                "order `{}` not found",
                payload.order_id
            )))
        })?;
    let items = ctx
        .orders
        .list_order_items(order.id)
        .await
        .map_err(job_failed)?;

    let context_payload = json!({
        "customer_name": order.customer_name,
        "customer_email": order.customer_email,
        "total_amount": order.total_amount,
        "status": order.status,
        "item_count": items.len(),
    });

    ctx.notifier
        .dispatch(TemplateKind::OrderConfirmation, Some(order.id), context_payload)
        .await
        .map_err(job_failed)?;

    info!(
        target = "application::jobs::process_send_order_confirmation_job",
        order_id = order.id,
        "order confirmation dispatched"
    );
    Ok(())
}

pub async fn process_send_low_stock_alert_job(
    payload: SendLowStockAlertJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;

    let product = ctx
        .products
        .find_product(payload.product_id)
        .await
        .map_err(job_failed)?
        .ok_or_else(|| {
            job_failed(RepoError::from_persistence(format!(
                "product `{}` not found",
                payload.product_id
            )))
        })?;

    let context_payload = json!({
        "product_name": product.name,
        "sku": product.sku,
        "remaining_stock": payload.remaining_stock,
    });

    ctx.notifier
        .dispatch(TemplateKind::LowStockAlert, Some(product.id), context_payload)
        .await
        .map_err(job_failed)?;

    info!(
        target = "application::jobs::process_send_low_stock_alert_job",
        product_id = product.id,
        remaining_stock = payload.remaining_stock,
        "low-stock alert dispatched"
    );
    Ok(())
}
