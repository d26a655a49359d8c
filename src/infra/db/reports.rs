//! Read-only report aggregates.
//!
//! Every query joins through `orders` with `status = 'completed'` so pending
//! and cancelled orders never distort the figures, and revenue is computed
//! as `quantity × unit_price − discount` to match the order-total invariant.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::QueryBuilder;

use crate::application::repos::{
    CombinedRow, ProfitMarginRow, RepoError, ReportsRepo, SalesByCategoryRow,
};

use super::{PostgresRepositories, map_sqlx_error};

/// Assumed cost basis as a fraction of list price.
const COST_BASIS_EXPR: &str = "p.price * 0.7";

#[derive(sqlx::FromRow)]
struct SalesByCategorySqlRow {
    category: String,
    total_sold: Option<i64>,
    total_revenue: Option<Decimal>,
}

#[derive(sqlx::FromRow)]
struct ProfitMarginSqlRow {
    product: String,
    total_sold: Option<i64>,
    total_revenue: Option<Decimal>,
    profit_margin: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct CombinedSqlRow {
    category: String,
    product_count: Option<i64>,
    total_sold: Option<i64>,
    avg_price: Option<Decimal>,
    total_revenue: Option<Decimal>,
}

#[async_trait]
impl ReportsRepo for PostgresRepositories {
    async fn sales_by_category(&self, limit: i64) -> Result<Vec<SalesByCategoryRow>, RepoError> {
        let mut qb = QueryBuilder::new(
            "SELECT c.name AS category, \
                    SUM(oi.quantity) AS total_sold, \
                    SUM(oi.quantity * oi.unit_price - oi.discount) AS total_revenue \
               FROM order_items oi \
               JOIN orders o ON o.id = oi.order_id AND o.status = 'completed' \
               JOIN products p ON p.id = oi.product_id \
               JOIN categories c ON c.id = p.category_id \
              GROUP BY c.name \
              ORDER BY total_sold DESC \
              LIMIT ",
        );
        qb.push_bind(limit);

        let rows = qb
            .build_query_as::<SalesByCategorySqlRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| SalesByCategoryRow {
                category: row.category,
                total_sold: row.total_sold.unwrap_or(0),
                total_revenue: row.total_revenue.unwrap_or(Decimal::ZERO),
            })
            .collect())
    }

    async fn profit_margin(&self, limit: i64) -> Result<Vec<ProfitMarginRow>, RepoError> {
        // Completed-order items are pre-filtered in the subquery so products
        // with no completed sales keep a row (zero sold, zero margin).
        let mut qb = QueryBuilder::new(
            "SELECT p.name AS product, \
                    COALESCE(SUM(coi.quantity), 0) AS total_sold, \
                    COALESCE(SUM(coi.quantity * coi.unit_price - coi.discount), 0) AS total_revenue, \
                    CASE \
                      WHEN COALESCE(SUM(coi.quantity * coi.unit_price - coi.discount), 0) > 0 THEN \
                        ((SUM(coi.quantity * coi.unit_price - coi.discount) \
                          - SUM(coi.quantity) * ",
        );
        qb.push(COST_BASIS_EXPR);
        qb.push(
            ") \
                         / SUM(coi.quantity * coi.unit_price - coi.discount) * 100.0)::float8 \
                      ELSE 0.0 \
                    END AS profit_margin \
               FROM products p \
               LEFT JOIN (SELECT oi.product_id, oi.quantity, oi.unit_price, oi.discount \
                            FROM order_items oi \
                            JOIN orders o ON o.id = oi.order_id \
                           WHERE o.status = 'completed') coi ON coi.product_id = p.id \
              GROUP BY p.id, p.name, p.price \
              ORDER BY profit_margin DESC \
              LIMIT ",
        );
        qb.push_bind(limit);

        let rows = qb
            .build_query_as::<ProfitMarginSqlRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| ProfitMarginRow {
                product: row.product,
                total_sold: row.total_sold.unwrap_or(0),
                total_revenue: row.total_revenue.unwrap_or(Decimal::ZERO),
                profit_margin: row.profit_margin.unwrap_or(0.0),
            })
            .collect())
    }

    async fn combined(&self, limit: i64) -> Result<Vec<CombinedRow>, RepoError> {
        let mut qb = QueryBuilder::new(
            "SELECT c.name AS category, \
                    COUNT(DISTINCT p.id) AS product_count, \
                    COALESCE(SUM(coi.quantity), 0) AS total_sold, \
                    AVG(p.price) AS avg_price, \
                    COALESCE(SUM(coi.quantity * coi.unit_price - coi.discount), 0) AS total_revenue \
               FROM categories c \
               LEFT JOIN products p ON p.category_id = c.id \
               LEFT JOIN (SELECT oi.product_id, oi.quantity, oi.unit_price, oi.discount \
                            FROM order_items oi \
                            JOIN orders o ON o.id = oi.order_id \
                           WHERE o.status = 'completed') coi ON coi.product_id = p.id \
              GROUP BY c.id, c.name \
              ORDER BY total_revenue DESC \
              LIMIT ",
        );
        qb.push_bind(limit);

        let rows = qb
            .build_query_as::<CombinedSqlRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| CombinedRow {
                category: row.category,
                product_count: row.product_count.unwrap_or(0),
                total_sold: row.total_sold.unwrap_or(0),
                avg_price: row.avg_price,
                total_revenue: row.total_revenue.unwrap_or(Decimal::ZERO),
            })
            .collect())
    }
}
