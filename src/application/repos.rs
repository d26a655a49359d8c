//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use time::OffsetDateTime;

use crate::cache::ListQuery;
use crate::domain::entities::{
    CategoryRecord, JobRecord, OrderItemRecord, OrderRecord, ProductRecord,
};
use crate::domain::types::{JobState, JobType};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateCategoryParams {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub is_active: bool,
    pub featured: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateCategoryParams {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub featured: bool,
}

#[async_trait]
pub trait CategoriesRepo: Send + Sync {
    /// Active categories; `include_inactive` widens the scope for admin use.
    async fn list_categories(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<CategoryRecord>, RepoError>;

    async fn find_category(&self, id: i64) -> Result<Option<CategoryRecord>, RepoError>;

    async fn category_slug_exists(&self, slug: &str) -> Result<bool, RepoError>;

    async fn create_category(
        &self,
        params: CreateCategoryParams,
    ) -> Result<CategoryRecord, RepoError>;

    async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError>;

    /// Fails with [`RepoError::Integrity`] while any product references the
    /// category.
    async fn delete_category(&self, id: i64) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateProductParams {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    pub stock: i32,
    pub category_id: i64,
    pub is_active: bool,
    pub is_featured: bool,
    pub sku: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateProductParams {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    pub stock: i32,
    pub category_id: i64,
    pub is_active: bool,
    pub is_featured: bool,
    pub sku: Option<String>,
}

#[async_trait]
pub trait ProductsRepo: Send + Sync {
    /// Active products matching the normalized query shape.
    async fn list_products(&self, query: &ListQuery) -> Result<Vec<ProductRecord>, RepoError>;

    async fn find_product(&self, id: i64) -> Result<Option<ProductRecord>, RepoError>;

    async fn product_slug_exists(&self, slug: &str) -> Result<bool, RepoError>;

    async fn create_product(&self, params: CreateProductParams)
    -> Result<ProductRecord, RepoError>;

    async fn update_product(&self, params: UpdateProductParams)
    -> Result<ProductRecord, RepoError>;

    /// Fails with [`RepoError::Integrity`] while any order item references
    /// the product.
    async fn delete_product(&self, id: i64) -> Result<(), RepoError>;

    async fn list_featured(&self) -> Result<Vec<ProductRecord>, RepoError>;

    async fn list_discounted(&self) -> Result<Vec<ProductRecord>, RepoError>;

    /// Conditional, stock-floor-respecting decrement: succeeds only when the
    /// resulting stock stays non-negative. Returns the remaining stock on
    /// success, `None` when stock was insufficient.
    async fn decrement_stock_if_available(
        &self,
        product_id: i64,
        quantity: i32,
    ) -> Result<Option<i32>, RepoError>;

    async fn list_active_low_stock(&self, threshold: i32) -> Result<Vec<ProductRecord>, RepoError>;

    /// Full-replace featured recompute: the top `top_n` products by units
    /// sold in completed orders since `since` become featured, everything
    /// else is unfeatured. Returns the number of rows whose flag changed.
    async fn recompute_featured(&self, top_n: i64, since: OffsetDateTime)
    -> Result<u64, RepoError>;

    async fn update_price(
        &self,
        product_id: i64,
        price: Decimal,
        discount_price: Option<Decimal>,
    ) -> Result<ProductRecord, RepoError>;
}

/// Price snapshot for one order line, captured at creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItemSnapshot {
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount: Decimal,
}

#[derive(Debug, Clone)]
pub struct CreateOrderParams {
    pub customer_name: String,
    pub customer_email: String,
    pub total_amount: Decimal,
    pub items: Vec<OrderItemSnapshot>,
}

/// Result of attempting to fulfill a pending order.
#[derive(Debug, Clone, PartialEq)]
pub enum FulfillmentOutcome {
    /// Order completed; carries `(product_id, remaining_stock)` per line so
    /// the worker can raise low-stock alerts.
    Completed { remaining: Vec<(i64, i32)> },
    /// A line could not be covered; nothing was decremented.
    InsufficientStock { product_id: i64 },
    /// The order already left `pending` (concurrent fulfillment or cleanup).
    AlreadyTransitioned,
    NotFound,
}

#[async_trait]
pub trait OrdersRepo: Send + Sync {
    /// Insert the order and its items in one transaction.
    async fn create_order(&self, params: CreateOrderParams) -> Result<OrderRecord, RepoError>;

    async fn find_order(&self, id: i64) -> Result<Option<OrderRecord>, RepoError>;

    async fn list_order_items(&self, order_id: i64) -> Result<Vec<OrderItemRecord>, RepoError>;

    /// Atomically transition `pending → completed` and decrement stock for
    /// every line, all-or-nothing. Any shortfall leaves stock untouched.
    async fn complete_pending_order(&self, order_id: i64)
    -> Result<FulfillmentOutcome, RepoError>;

    /// Conditional `pending → cancelled`; false when the order already
    /// transitioned.
    async fn cancel_pending_order(&self, order_id: i64) -> Result<bool, RepoError>;

    /// Cancel every pending order created before `cutoff`, returning the ids.
    async fn cancel_expired_pending(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<i64>, RepoError>;

    /// Completed-order totals since `since` for the weekly summary.
    async fn sales_summary(&self, since: OffsetDateTime) -> Result<SalesSummary, RepoError>;
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SalesSummary {
    pub orders_completed: i64,
    pub units_sold: i64,
    pub total_revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SalesByCategoryRow {
    pub category: String,
    pub total_sold: i64,
    pub total_revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ProfitMarginRow {
    pub product: String,
    pub total_sold: i64,
    pub total_revenue: Decimal,
    pub profit_margin: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CombinedRow {
    pub category: String,
    pub product_count: i64,
    pub total_sold: i64,
    pub avg_price: Option<Decimal>,
    pub total_revenue: Decimal,
}

/// Read-only aggregation queries. Only completed orders contribute to
/// sold/revenue figures.
#[async_trait]
pub trait ReportsRepo: Send + Sync {
    async fn sales_by_category(&self, limit: i64) -> Result<Vec<SalesByCategoryRow>, RepoError>;

    async fn profit_margin(&self, limit: i64) -> Result<Vec<ProfitMarginRow>, RepoError>;

    async fn combined(&self, limit: i64) -> Result<Vec<CombinedRow>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewJobRecord {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub run_at: OffsetDateTime,
    pub max_attempts: i32,
    pub priority: i32,
}

#[async_trait]
pub trait JobsRepo: Send + Sync {
    /// Push a job onto its lane, returning the assigned id. Fire-and-forget
    /// from the caller's perspective: enqueue success is the only guarantee.
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError>;

    /// The separate result store callers may poll.
    async fn find_job(&self, id: &str) -> Result<Option<JobRecord>, RepoError>;

    /// State distribution across the queue, for the health probe.
    async fn count_jobs_by_state(&self, state: JobState) -> Result<i64, RepoError>;
}
