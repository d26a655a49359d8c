//! Order intake: price snapshots, totals, and fulfillment hand-off.
//!
//! Order creation is synchronous up to the enqueue; stock is not touched
//! here. Fulfillment decrements stock later, in the worker, so there is
//! exactly one decrement point in the order lifecycle.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::application::error::AppError;
use crate::application::jobs::queue::enqueue_job;
use crate::application::jobs::{DEFAULT_MAX_ATTEMPTS, ORDER_JOB_PRIORITY};
use crate::application::repos::{
    CreateOrderParams, JobsRepo, OrderItemSnapshot, OrdersRepo, ProductsRepo,
};
use crate::domain::entities::{OrderItemRecord, OrderRecord, ProductRecord};
use crate::domain::error::DomainError;
use crate::domain::types::JobType;

#[derive(Debug, Clone)]
pub struct OrderLineRequest {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_name: String,
    pub customer_email: String,
    pub lines: Vec<OrderLineRequest>,
}

/// Build the per-line price snapshots and the derived total.
///
/// `unit_price` freezes the product's list price; `discount` is the absolute
/// amount off the line, `(price − discount_price) × quantity` when a
/// discount price exists. The total equals the sum of line subtotals at this
/// moment and is never recomputed from the catalog again.
pub fn build_order_lines(
    products: &[ProductRecord],
    requested: &[OrderLineRequest],
) -> Result<(Vec<OrderItemSnapshot>, Decimal), DomainError> {
    if requested.is_empty() {
        return Err(DomainError::validation("order must contain at least one item"));
    }

    let mut items = Vec::with_capacity(requested.len());
    let mut total = Decimal::ZERO;

    for line in requested {
        if line.quantity <= 0 {
            return Err(DomainError::validation("quantity must be greater than 0"));
        }

        let product = products
            .iter()
            .find(|p| p.id == line.product_id)
            .ok_or(DomainError::not_found("product"))?;

        if !product.is_active {
            return Err(DomainError::validation(format!(
                "product `{}` is not available",
                product.slug
            )));
        }

        let quantity = Decimal::from(line.quantity);
        let discount = product
            .discount_price
            .map(|discounted| (product.price - discounted) * quantity)
            .unwrap_or(Decimal::ZERO);

        total += quantity * product.price - discount;
        items.push(OrderItemSnapshot {
            product_id: product.id,
            quantity: line.quantity,
            unit_price: product.price,
            discount,
        });
    }

    Ok((items, total))
}

pub struct OrderService {
    orders: Arc<dyn OrdersRepo>,
    products: Arc<dyn ProductsRepo>,
    jobs: Arc<dyn JobsRepo>,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrdersRepo>,
        products: Arc<dyn ProductsRepo>,
        jobs: Arc<dyn JobsRepo>,
    ) -> Self {
        Self {
            orders,
            products,
            jobs,
        }
    }

    /// Create a pending order and enqueue its fulfillment job on the orders
    /// lane. The caller observes only the enqueue outcome; fulfillment runs
    /// in the worker pool.
    #[instrument(skip(self, order), fields(customer = %order.customer_name))]
    pub async fn create_order(&self, order: NewOrder) -> Result<OrderRecord, AppError> {
        if order.customer_name.trim().is_empty() {
            return Err(AppError::validation("customer name is required"));
        }
        if !order.customer_email.contains('@') {
            return Err(AppError::validation("customer email is invalid"));
        }

        let mut products = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            if let Some(product) = self.products.find_product(line.product_id).await? {
                products.push(product);
            }
        }

        let (items, total_amount) = build_order_lines(&products, &order.lines)?;

        let created = self
            .orders
            .create_order(CreateOrderParams {
                customer_name: order.customer_name,
                customer_email: order.customer_email,
                total_amount,
                items,
            })
            .await?;

        let payload = serde_json::json!({ "order_id": created.id });
        let job_id = enqueue_job(
            self.jobs.as_ref(),
            JobType::ProcessOrder,
            &payload,
            None,
            DEFAULT_MAX_ATTEMPTS,
            ORDER_JOB_PRIORITY,
        )
        .await?;

        info!(
            order_id = created.id,
            job_id = %job_id,
            total = %created.total_amount,
            "order accepted, fulfillment enqueued"
        );

        Ok(created)
    }

    pub async fn get_order(
        &self,
        id: i64,
    ) -> Result<(OrderRecord, Vec<OrderItemRecord>), AppError> {
        let order = self.orders.find_order(id).await?.ok_or(AppError::NotFound)?;
        let items = self.orders.list_order_items(id).await?;
        Ok((order, items))
    }

    /// Explicit cancellation: a conditional `pending → cancelled` transition.
    /// Orders that already completed (or were cancelled) are a conflict.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, id: i64) -> Result<(), AppError> {
        let cancelled = self.orders.cancel_pending_order(id).await?;
        if !cancelled {
            let order = self.orders.find_order(id).await?.ok_or(AppError::NotFound)?;
            return Err(AppError::conflict(format!(
                "order {id} is already {}",
                order.status.as_str()
            )));
        }
        info!(order_id = id, "order cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;

    fn product(id: i64, price: Decimal, discount_price: Option<Decimal>) -> ProductRecord {
        let now = OffsetDateTime::now_utc();
        ProductRecord {
            id,
            name: format!("Product {id}"),
            slug: format!("product-{id}"),
            description: String::new(),
            price,
            discount_price,
            stock: 10,
            category_id: 1,
            is_active: true,
            is_featured: false,
            sku: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn snapshot_freezes_prices_and_totals() {
        let products = vec![
            product(1, Decimal::new(120000, 2), None),
            product(3, Decimal::new(2500, 2), Some(Decimal::new(2000, 2))),
        ];
        let requested = vec![
            OrderLineRequest {
                product_id: 1,
                quantity: 1,
            },
            OrderLineRequest {
                product_id: 3,
                quantity: 1,
            },
        ];

        let (items, total) = build_order_lines(&products, &requested).expect("lines");

        assert_eq!(items[0].unit_price, Decimal::new(120000, 2));
        assert_eq!(items[0].discount, Decimal::ZERO);
        assert_eq!(items[1].unit_price, Decimal::new(2500, 2));
        assert_eq!(items[1].discount, Decimal::new(500, 2));
        // 1200.00 + (25.00 - 5.00)
        assert_eq!(total, Decimal::new(122000, 2));
    }

    #[test]
    fn discount_scales_with_quantity() {
        let products = vec![product(3, Decimal::new(2500, 2), Some(Decimal::new(2000, 2)))];
        let requested = vec![OrderLineRequest {
            product_id: 3,
            quantity: 4,
        }];

        let (items, total) = build_order_lines(&products, &requested).expect("lines");

        assert_eq!(items[0].discount, Decimal::new(2000, 2));
        // 4 × 25.00 − 20.00
        assert_eq!(total, Decimal::new(8000, 2));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let products = vec![product(1, Decimal::new(1000, 2), None)];
        let requested = vec![OrderLineRequest {
            product_id: 1,
            quantity: 0,
        }];

        assert!(matches!(
            build_order_lines(&products, &requested),
            Err(DomainError::Validation { .. })
        ));
    }

    #[test]
    fn unknown_product_is_rejected() {
        let requested = vec![OrderLineRequest {
            product_id: 99,
            quantity: 1,
        }];

        assert!(matches!(
            build_order_lines(&[], &requested),
            Err(DomainError::NotFound { .. })
        ));
    }

    #[test]
    fn inactive_product_is_rejected() {
        let mut inactive = product(1, Decimal::new(1000, 2), None);
        inactive.is_active = false;
        let requested = vec![OrderLineRequest {
            product_id: 1,
            quantity: 1,
        }];

        assert!(matches!(
            build_order_lines(&[inactive], &requested),
            Err(DomainError::Validation { .. })
        ));
    }

    #[test]
    fn later_price_changes_do_not_alter_snapshot() {
        let mut catalog = vec![product(1, Decimal::new(120000, 2), None)];
        let requested = vec![OrderLineRequest {
            product_id: 1,
            quantity: 1,
        }];

        let (items, total) = build_order_lines(&catalog, &requested).expect("lines");

        // Catalog price changes after the order was built.
        catalog[0].price = Decimal::new(99999, 2);

        assert_eq!(items[0].unit_price, Decimal::new(120000, 2));
        assert_eq!(total, Decimal::new(120000, 2));
    }

    #[test]
    fn empty_order_is_rejected() {
        assert!(matches!(
            build_order_lines(&[], &[]),
            Err(DomainError::Validation { .. })
        ));
    }
}
