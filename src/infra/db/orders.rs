use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::QueryBuilder;
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CreateOrderParams, FulfillmentOutcome, OrdersRepo, RepoError, SalesSummary,
    },
    domain::entities::{OrderItemRecord, OrderRecord},
    domain::types::OrderStatus,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    customer_name: String,
    customer_email: String,
    total_amount: Decimal,
    status: OrderStatus,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<OrderRow> for OrderRecord {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            total_amount: row.total_amount,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: i64,
    order_id: i64,
    product_id: i64,
    quantity: i32,
    unit_price: Decimal,
    discount: Decimal,
}

impl From<OrderItemRow> for OrderItemRecord {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            discount: row.discount,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PendingItemRow {
    product_id: i64,
    quantity: i32,
}

const ORDER_COLUMNS: &str =
    "id, customer_name, customer_email, total_amount, status, created_at, updated_at";

#[async_trait]
impl OrdersRepo for PostgresRepositories {
    async fn create_order(&self, params: CreateOrderParams) -> Result<OrderRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new(
            "INSERT INTO orders (customer_name, customer_email, total_amount, status, \
             created_at, updated_at) VALUES (",
        );
        let mut values = qb.separated(", ");
        values.push_bind(params.customer_name);
        values.push_bind(params.customer_email);
        values.push_bind(params.total_amount);
        values.push_bind(OrderStatus::Pending);
        qb.push(", now(), now()) RETURNING ");
        qb.push(ORDER_COLUMNS);

        let order_row = qb
            .build_query_as::<OrderRow>()
            .fetch_one(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;

        if !params.items.is_empty() {
            let mut items_qb = QueryBuilder::new(
                "INSERT INTO order_items (order_id, product_id, quantity, unit_price, discount) ",
            );
            items_qb.push_values(params.items.iter(), |mut row, item| {
                row.push_bind(order_row.id)
                    .push_bind(item.product_id)
                    .push_bind(item.quantity)
                    .push_bind(item.unit_price)
                    .push_bind(item.discount);
            });
            items_qb
                .build()
                .execute(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(OrderRecord::from(order_row))
    }

    async fn find_order(&self, id: i64) -> Result<Option<OrderRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(ORDER_COLUMNS);
        qb.push(" FROM orders WHERE id = ");
        qb.push_bind(id);

        let row = qb
            .build_query_as::<OrderRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(OrderRecord::from))
    }

    async fn list_order_items(&self, order_id: i64) -> Result<Vec<OrderItemRecord>, RepoError> {
        let mut qb = QueryBuilder::new(
            "SELECT id, order_id, product_id, quantity, unit_price, discount \
             FROM order_items WHERE order_id = ",
        );
        qb.push_bind(order_id);
        qb.push(" ORDER BY id");

        let rows = qb
            .build_query_as::<OrderItemRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(OrderItemRecord::from).collect())
    }

    async fn complete_pending_order(
        &self,
        order_id: i64,
    ) -> Result<FulfillmentOutcome, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        // The conditional transition is the per-order mutual exclusion:
        // whichever writer moves the order out of `pending` first wins.
        let mut transition_qb = QueryBuilder::new("UPDATE orders SET status = ");
        transition_qb.push_bind(OrderStatus::Completed);
        transition_qb.push(", updated_at = now() WHERE id = ");
        transition_qb.push_bind(order_id);
        transition_qb.push(" AND status = ");
        transition_qb.push_bind(OrderStatus::Pending);
        transition_qb.push(" RETURNING id");

        let transitioned: Option<i64> = transition_qb
            .build_query_scalar()
            .fetch_optional(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;

        if transitioned.is_none() {
            tx.rollback().await.map_err(map_sqlx_error)?;
            let mut exists_qb = QueryBuilder::new("SELECT COUNT(*) FROM orders WHERE id = ");
            exists_qb.push_bind(order_id);
            let exists: i64 = exists_qb
                .build_query_scalar()
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;
            return Ok(if exists > 0 {
                FulfillmentOutcome::AlreadyTransitioned
            } else {
                FulfillmentOutcome::NotFound
            });
        }

        let mut items_qb = QueryBuilder::new(
            "SELECT product_id, quantity FROM order_items WHERE order_id = ",
        );
        items_qb.push_bind(order_id);
        let items = items_qb
            .build_query_as::<PendingItemRow>()
            .fetch_all(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;

        // All-or-nothing: any shortfall rolls back the transition and every
        // decrement made so far.
        let mut remaining = Vec::with_capacity(items.len());
        for item in &items {
            let mut decrement_qb = QueryBuilder::new("UPDATE products SET stock = stock - ");
            decrement_qb.push_bind(item.quantity);
            decrement_qb.push(", updated_at = now() WHERE id = ");
            decrement_qb.push_bind(item.product_id);
            decrement_qb.push(" AND stock >= ");
            decrement_qb.push_bind(item.quantity);
            decrement_qb.push(" RETURNING stock");

            let stock_left: Option<i32> = decrement_qb
                .build_query_scalar()
                .fetch_optional(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;

            match stock_left {
                Some(stock) => remaining.push((item.product_id, stock)),
                None => {
                    tx.rollback().await.map_err(map_sqlx_error)?;
                    return Ok(FulfillmentOutcome::InsufficientStock {
                        product_id: item.product_id,
                    });
                }
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(FulfillmentOutcome::Completed { remaining })
    }

    async fn cancel_pending_order(&self, order_id: i64) -> Result<bool, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE orders SET status = ");
        qb.push_bind(OrderStatus::Cancelled);
        qb.push(", updated_at = now() WHERE id = ");
        qb.push_bind(order_id);
        qb.push(" AND status = ");
        qb.push_bind(OrderStatus::Pending);

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel_expired_pending(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<i64>, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE orders SET status = ");
        qb.push_bind(OrderStatus::Cancelled);
        qb.push(", updated_at = now() WHERE status = ");
        qb.push_bind(OrderStatus::Pending);
        qb.push(" AND created_at < ");
        qb.push_bind(cutoff);
        qb.push(" RETURNING id");

        let ids: Vec<i64> = qb
            .build_query_scalar()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(ids)
    }

    async fn sales_summary(&self, since: OffsetDateTime) -> Result<SalesSummary, RepoError> {
        #[derive(sqlx::FromRow)]
        struct SummaryRow {
            orders_completed: i64,
            units_sold: Option<i64>,
            total_revenue: Option<Decimal>,
        }

        let mut qb = QueryBuilder::new(
            "SELECT COUNT(DISTINCT o.id) AS orders_completed, \
                    SUM(oi.quantity) AS units_sold, \
                    SUM(oi.quantity * oi.unit_price - oi.discount) AS total_revenue \
               FROM orders o \
               LEFT JOIN order_items oi ON oi.order_id = o.id \
              WHERE o.status = 'completed' AND o.updated_at >= ",
        );
        qb.push_bind(since);

        let row = qb
            .build_query_as::<SummaryRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(SalesSummary {
            orders_completed: row.orders_completed,
            units_sold: row.units_sold.unwrap_or(0),
            total_revenue: row.total_revenue.unwrap_or(Decimal::ZERO),
        })
    }
}
