//! End-to-end pipeline over in-memory fakes: order intake, fulfillment,
//! cache coherence, and expiry cleanup, without a live database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use apalis::prelude::Data;
use async_trait::async_trait;
use rust_decimal::Decimal;
use time::OffsetDateTime;

use bottega::application::catalog::CatalogService;
use bottega::application::jobs::{
    CleanupExpiredOrdersJobPayload, JobWorkerContext, ProcessOrderJobPayload,
    SendOrderConfirmationJobPayload, process_cleanup_expired_orders_job, process_order_job,
    process_send_order_confirmation_job,
};
use bottega::application::orders::{NewOrder, OrderLineRequest, OrderService};
use bottega::application::reports::ReportService;
use bottega::application::repos::{
    CategoriesRepo, CombinedRow, CreateCategoryParams, CreateOrderParams, CreateProductParams,
    FulfillmentOutcome, JobsRepo, NewJobRecord, OrderItemSnapshot, OrdersRepo, ProductsRepo,
    ProfitMarginRow, RepoError, ReportsRepo, SalesByCategoryRow, SalesSummary,
    UpdateCategoryParams, UpdateProductParams,
};
use bottega::cache::{
    CacheConfig, CacheCoordinator, CacheKey, EntityKind, ListQuery, MemoryCacheStore,
};
use bottega::domain::entities::{
    CategoryRecord, JobRecord, OrderItemRecord, OrderRecord, ProductRecord,
};
use bottega::domain::types::{JobState, JobType, OrderStatus};
use bottega::infra::notify::{NotificationDispatcher, NotifyError, TemplateKind};

// ----------------------------------------------------------------------
// Fakes
// ----------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    products: HashMap<i64, ProductRecord>,
    orders: HashMap<i64, OrderRecord>,
    items: HashMap<i64, Vec<OrderItemRecord>>,
    next_order_id: i64,
    next_item_id: i64,
}

struct FakeStore {
    state: Mutex<StoreState>,
    product_list_calls: AtomicUsize,
}

impl FakeStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(StoreState {
                next_order_id: 1,
                next_item_id: 1,
                ..Default::default()
            }),
            product_list_calls: AtomicUsize::new(0),
        })
    }

    fn seed_product(&self, id: i64, price: Decimal, stock: i32) {
        let now = OffsetDateTime::now_utc();
        let product = ProductRecord {
            id,
            name: format!("Product {id}"),
            slug: format!("product-{id}"),
            description: String::new(),
            price,
            discount_price: None,
            stock,
            category_id: 1,
            is_active: true,
            is_featured: false,
            sku: None,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().products.insert(id, product);
    }

    fn seed_pending_order(&self, age: time::Duration) -> i64 {
        let mut state = self.state.lock().unwrap();
        let id = state.next_order_id;
        state.next_order_id += 1;
        let created_at = OffsetDateTime::now_utc() - age;
        state.orders.insert(
            id,
            OrderRecord {
                id,
                customer_name: "Jane Smith".to_string(),
                customer_email: "jane@example.com".to_string(),
                total_amount: Decimal::ZERO,
                status: OrderStatus::Pending,
                created_at,
                updated_at: created_at,
            },
        );
        id
    }

    fn stock_of(&self, product_id: i64) -> i32 {
        self.state.lock().unwrap().products[&product_id].stock
    }

    fn order_status(&self, order_id: i64) -> OrderStatus {
        self.state.lock().unwrap().orders[&order_id].status
    }
}

#[async_trait]
impl CategoriesRepo for FakeStore {
    async fn list_categories(
        &self,
        _include_inactive: bool,
    ) -> Result<Vec<CategoryRecord>, RepoError> {
        Ok(Vec::new())
    }

    async fn find_category(&self, id: i64) -> Result<Option<CategoryRecord>, RepoError> {
        Ok(Some(CategoryRecord {
            id,
            name: "Electronics".to_string(),
            slug: "electronics".to_string(),
            description: String::new(),
            is_active: true,
            featured: false,
        }))
    }

    async fn category_slug_exists(&self, _slug: &str) -> Result<bool, RepoError> {
        Ok(false)
    }

    async fn create_category(
        &self,
        _params: CreateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        Err(RepoError::from_persistence("not used in this test"))
    }

    async fn update_category(
        &self,
        _params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        Err(RepoError::from_persistence("not used in this test"))
    }

    async fn delete_category(&self, _id: i64) -> Result<(), RepoError> {
        Err(RepoError::from_persistence("not used in this test"))
    }
}

#[async_trait]
impl ProductsRepo for FakeStore {
    async fn list_products(&self, _query: &ListQuery) -> Result<Vec<ProductRecord>, RepoError> {
        self.product_list_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        let mut products: Vec<_> = state
            .products
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        products.sort_by_key(|p| std::cmp::Reverse(p.id));
        Ok(products)
    }

    async fn find_product(&self, id: i64) -> Result<Option<ProductRecord>, RepoError> {
        Ok(self.state.lock().unwrap().products.get(&id).cloned())
    }

    async fn product_slug_exists(&self, _slug: &str) -> Result<bool, RepoError> {
        Ok(false)
    }

    async fn create_product(
        &self,
        _params: CreateProductParams,
    ) -> Result<ProductRecord, RepoError> {
        Err(RepoError::from_persistence("not used in this test"))
    }

    async fn update_product(
        &self,
        _params: UpdateProductParams,
    ) -> Result<ProductRecord, RepoError> {
        Err(RepoError::from_persistence("not used in this test"))
    }

    async fn delete_product(&self, _id: i64) -> Result<(), RepoError> {
        Err(RepoError::from_persistence("not used in this test"))
    }

    async fn list_featured(&self) -> Result<Vec<ProductRecord>, RepoError> {
        Ok(Vec::new())
    }

    async fn list_discounted(&self) -> Result<Vec<ProductRecord>, RepoError> {
        Ok(Vec::new())
    }

    async fn decrement_stock_if_available(
        &self,
        product_id: i64,
        quantity: i32,
    ) -> Result<Option<i32>, RepoError> {
        let mut state = self.state.lock().unwrap();
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or(RepoError::NotFound)?;
        if product.stock >= quantity {
            product.stock -= quantity;
            Ok(Some(product.stock))
        } else {
            Ok(None)
        }
    }

    async fn list_active_low_stock(&self, threshold: i32) -> Result<Vec<ProductRecord>, RepoError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .products
            .values()
            .filter(|p| p.is_active && p.stock <= threshold)
            .cloned()
            .collect())
    }

    async fn recompute_featured(
        &self,
        _top_n: i64,
        _since: OffsetDateTime,
    ) -> Result<u64, RepoError> {
        Ok(0)
    }

    async fn update_price(
        &self,
        product_id: i64,
        price: Decimal,
        discount_price: Option<Decimal>,
    ) -> Result<ProductRecord, RepoError> {
        let mut state = self.state.lock().unwrap();
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or(RepoError::NotFound)?;
        product.price = price;
        product.discount_price = discount_price;
        Ok(product.clone())
    }
}

#[async_trait]
impl OrdersRepo for FakeStore {
    async fn create_order(&self, params: CreateOrderParams) -> Result<OrderRecord, RepoError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_order_id;
        state.next_order_id += 1;
        let now = OffsetDateTime::now_utc();
        let order = OrderRecord {
            id,
            customer_name: params.customer_name,
            customer_email: params.customer_email,
            total_amount: params.total_amount,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(id, order.clone());

        let mut items = Vec::with_capacity(params.items.len());
        for OrderItemSnapshot {
            product_id,
            quantity,
            unit_price,
            discount,
        } in params.items
        {
            let item_id = state.next_item_id;
            state.next_item_id += 1;
            items.push(OrderItemRecord {
                id: item_id,
                order_id: id,
                product_id,
                quantity,
                unit_price,
                discount,
            });
        }
        state.items.insert(id, items);

        Ok(order)
    }

    async fn find_order(&self, id: i64) -> Result<Option<OrderRecord>, RepoError> {
        Ok(self.state.lock().unwrap().orders.get(&id).cloned())
    }

    async fn list_order_items(&self, order_id: i64) -> Result<Vec<OrderItemRecord>, RepoError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .items
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn complete_pending_order(
        &self,
        order_id: i64,
    ) -> Result<FulfillmentOutcome, RepoError> {
        // Single lock scope mirrors the single database transaction: the
        // transition, the guarded decrements, and any rollback are atomic.
        let mut state = self.state.lock().unwrap();

        let Some(order) = state.orders.get(&order_id) else {
            return Ok(FulfillmentOutcome::NotFound);
        };
        if order.status != OrderStatus::Pending {
            return Ok(FulfillmentOutcome::AlreadyTransitioned);
        }

        let items = state.items.get(&order_id).cloned().unwrap_or_default();
        for item in &items {
            let stock = state
                .products
                .get(&item.product_id)
                .map(|p| p.stock)
                .unwrap_or(0);
            if stock < item.quantity {
                return Ok(FulfillmentOutcome::InsufficientStock {
                    product_id: item.product_id,
                });
            }
        }

        let mut remaining = Vec::with_capacity(items.len());
        for item in &items {
            let product = state.products.get_mut(&item.product_id).unwrap();
            product.stock -= item.quantity;
            remaining.push((item.product_id, product.stock));
        }
        let order = state.orders.get_mut(&order_id).unwrap();
        order.status = OrderStatus::Completed;
        order.updated_at = OffsetDateTime::now_utc();

        Ok(FulfillmentOutcome::Completed { remaining })
    }

    async fn cancel_pending_order(&self, order_id: i64) -> Result<bool, RepoError> {
        let mut state = self.state.lock().unwrap();
        match state.orders.get_mut(&order_id) {
            Some(order) if order.status == OrderStatus::Pending => {
                order.status = OrderStatus::Cancelled;
                order.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(RepoError::NotFound),
        }
    }

    async fn cancel_expired_pending(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<i64>, RepoError> {
        let mut state = self.state.lock().unwrap();
        let mut cancelled = Vec::new();
        for order in state.orders.values_mut() {
            if order.status == OrderStatus::Pending && order.created_at < cutoff {
                order.status = OrderStatus::Cancelled;
                order.updated_at = OffsetDateTime::now_utc();
                cancelled.push(order.id);
            }
        }
        Ok(cancelled)
    }

    async fn sales_summary(&self, _since: OffsetDateTime) -> Result<SalesSummary, RepoError> {
        Ok(SalesSummary::default())
    }
}

#[async_trait]
impl ReportsRepo for FakeStore {
    async fn sales_by_category(&self, _limit: i64) -> Result<Vec<SalesByCategoryRow>, RepoError> {
        Ok(Vec::new())
    }

    async fn profit_margin(&self, _limit: i64) -> Result<Vec<ProfitMarginRow>, RepoError> {
        Ok(Vec::new())
    }

    async fn combined(&self, _limit: i64) -> Result<Vec<CombinedRow>, RepoError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct FakeQueue {
    jobs: Mutex<Vec<(JobType, serde_json::Value)>>,
    next_id: AtomicI64,
}

impl FakeQueue {
    fn enqueued(&self, job_type: JobType) -> Vec<serde_json::Value> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|(jt, _)| *jt == job_type)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl JobsRepo for FakeQueue {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError> {
        self.jobs.lock().unwrap().push((job.job_type, job.payload));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("job-{id}"))
    }

    async fn find_job(&self, _id: &str) -> Result<Option<JobRecord>, RepoError> {
        Ok(None)
    }

    async fn count_jobs_by_state(&self, state: JobState) -> Result<i64, RepoError> {
        if state == JobState::Pending {
            Ok(self.jobs.lock().unwrap().len() as i64)
        } else {
            Ok(0)
        }
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    dispatched: Mutex<Vec<(TemplateKind, Option<i64>)>>,
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        template: TemplateKind,
        entity_id: Option<i64>,
        _context: serde_json::Value,
    ) -> Result<(), NotifyError> {
        self.dispatched.lock().unwrap().push((template, entity_id));
        Ok(())
    }
}

struct Harness {
    store: Arc<FakeStore>,
    queue: Arc<FakeQueue>,
    cache: Arc<CacheCoordinator>,
    catalog: Arc<CatalogService>,
    orders: OrderService,
    notifier: Arc<RecordingDispatcher>,
    context: JobWorkerContext,
}

fn harness() -> Harness {
    let store = FakeStore::new();
    let queue = Arc::new(FakeQueue::default());
    let cache = Arc::new(CacheCoordinator::new(
        CacheConfig::default(),
        Arc::new(MemoryCacheStore::new()),
    ));
    let catalog = Arc::new(CatalogService::new(
        store.clone(),
        store.clone(),
        cache.clone(),
    ));
    let orders = OrderService::new(store.clone(), store.clone(), queue.clone());
    let notifier = Arc::new(RecordingDispatcher::default());
    let context = JobWorkerContext {
        orders: store.clone(),
        products: store.clone(),
        jobs: queue.clone(),
        catalog: catalog.clone(),
        reports: Arc::new(ReportService::new(store.clone())),
        notifier: notifier.clone(),
    };

    Harness {
        store,
        queue,
        cache,
        catalog,
        orders,
        notifier,
        context,
    }
}

// ----------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------

#[tokio::test]
async fn order_flow_decrements_stock_and_invalidates_cache() {
    let h = harness();
    h.store.seed_product(1, Decimal::new(120000, 2), 10);

    // Prime the cached product list.
    let listed = h.catalog.list_products(&ListQuery::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(h
        .cache
        .get_json::<Vec<ProductRecord>>(&CacheKey::List(EntityKind::Product))
        .await
        .is_some());

    let order = h
        .orders
        .create_order(NewOrder {
            customer_name: "John Doe".to_string(),
            customer_email: "john@example.com".to_string(),
            lines: vec![OrderLineRequest {
                product_id: 1,
                quantity: 2,
            }],
        })
        .await
        .expect("order created");
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount, Decimal::new(240000, 2));
    assert_eq!(h.queue.enqueued(JobType::ProcessOrder).len(), 1);

    process_order_job(
        ProcessOrderJobPayload { order_id: order.id },
        Data::new(h.context.clone()),
    )
    .await
    .expect("fulfillment");

    assert_eq!(h.store.order_status(order.id), OrderStatus::Completed);
    assert_eq!(h.store.stock_of(1), 8);
    assert_eq!(h.queue.enqueued(JobType::SendOrderConfirmation).len(), 1);
    // Stock stayed above the threshold, no alert.
    assert!(h.queue.enqueued(JobType::SendLowStockAlert).is_empty());

    // The fulfillment mutation invalidated the product list key.
    assert!(h
        .cache
        .get_json::<Vec<ProductRecord>>(&CacheKey::List(EntityKind::Product))
        .await
        .is_none());

    // Drain the confirmation job; the dispatcher receives the template and
    // entity id, delivery itself being someone else's problem.
    process_send_order_confirmation_job(
        SendOrderConfirmationJobPayload { order_id: order.id },
        Data::new(h.context.clone()),
    )
    .await
    .expect("confirmation dispatch");
    let dispatched = h.notifier.dispatched.lock().unwrap();
    assert_eq!(
        *dispatched,
        vec![(TemplateKind::OrderConfirmation, Some(order.id))]
    );
}

#[tokio::test]
async fn fulfillment_crossing_threshold_enqueues_low_stock_alert() {
    let h = harness();
    h.store.seed_product(1, Decimal::new(15000, 2), 6);

    let order = h
        .orders
        .create_order(NewOrder {
            customer_name: "John Doe".to_string(),
            customer_email: "john@example.com".to_string(),
            lines: vec![OrderLineRequest {
                product_id: 1,
                quantity: 2,
            }],
        })
        .await
        .unwrap();

    process_order_job(
        ProcessOrderJobPayload { order_id: order.id },
        Data::new(h.context.clone()),
    )
    .await
    .unwrap();

    let alerts = h.queue.enqueued(JobType::SendLowStockAlert);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["product_id"], 1);
    assert_eq!(alerts[0]["remaining_stock"], 4);
}

#[tokio::test]
async fn insufficient_stock_cancels_without_touching_stock() {
    let h = harness();
    h.store.seed_product(1, Decimal::new(15000, 2), 1);

    let order = h
        .orders
        .create_order(NewOrder {
            customer_name: "John Doe".to_string(),
            customer_email: "john@example.com".to_string(),
            lines: vec![OrderLineRequest {
                product_id: 1,
                quantity: 5,
            }],
        })
        .await
        .unwrap();

    process_order_job(
        ProcessOrderJobPayload { order_id: order.id },
        Data::new(h.context.clone()),
    )
    .await
    .expect("conflict is a business outcome, not a job failure");

    assert_eq!(h.store.order_status(order.id), OrderStatus::Cancelled);
    assert_eq!(h.store.stock_of(1), 1);
    assert!(h.queue.enqueued(JobType::SendOrderConfirmation).is_empty());
}

#[tokio::test]
async fn concurrent_fulfillment_never_oversells() {
    let h = harness();
    h.store.seed_product(1, Decimal::new(15000, 2), 3);

    let mut order_ids = Vec::new();
    for _ in 0..2 {
        let order = h
            .orders
            .create_order(NewOrder {
                customer_name: "John Doe".to_string(),
                customer_email: "john@example.com".to_string(),
                lines: vec![OrderLineRequest {
                    product_id: 1,
                    quantity: 2,
                }],
            })
            .await
            .unwrap();
        order_ids.push(order.id);
    }

    let mut handles = Vec::new();
    for order_id in order_ids.clone() {
        let context = h.context.clone();
        handles.push(tokio::spawn(async move {
            process_order_job(ProcessOrderJobPayload { order_id }, Data::new(context)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let statuses: Vec<_> = order_ids
        .iter()
        .map(|id| h.store.order_status(*id))
        .collect();
    let completed = statuses
        .iter()
        .filter(|s| **s == OrderStatus::Completed)
        .count();
    let cancelled = statuses
        .iter()
        .filter(|s| **s == OrderStatus::Cancelled)
        .count();

    // Aggregate demand (4) exceeds stock (3): exactly one order completes
    // and the loser cancels with no stock change.
    assert_eq!(completed, 1);
    assert_eq!(cancelled, 1);
    assert_eq!(h.store.stock_of(1), 1);
}

#[tokio::test]
async fn duplicate_fulfillment_is_a_noop() {
    let h = harness();
    h.store.seed_product(1, Decimal::new(15000, 2), 10);

    let order = h
        .orders
        .create_order(NewOrder {
            customer_name: "John Doe".to_string(),
            customer_email: "john@example.com".to_string(),
            lines: vec![OrderLineRequest {
                product_id: 1,
                quantity: 2,
            }],
        })
        .await
        .unwrap();

    // At-least-once delivery: the same job body may run twice.
    for _ in 0..2 {
        process_order_job(
            ProcessOrderJobPayload { order_id: order.id },
            Data::new(h.context.clone()),
        )
        .await
        .unwrap();
    }

    assert_eq!(h.store.stock_of(1), 8);
    assert_eq!(h.queue.enqueued(JobType::SendOrderConfirmation).len(), 1);
}

#[tokio::test]
async fn cached_list_read_skips_second_datastore_computation() {
    let h = harness();
    h.store.seed_product(1, Decimal::new(15000, 2), 10);

    let first = h.catalog.list_products(&ListQuery::default()).await.unwrap();
    let second = h.catalog.list_products(&ListQuery::default()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.store.product_list_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn parameterized_list_bypasses_cache() {
    let h = harness();
    h.store.seed_product(1, Decimal::new(15000, 2), 10);

    let query = ListQuery {
        search: Some("product".to_string()),
        ..Default::default()
    };
    h.catalog.list_products(&query).await.unwrap();
    h.catalog.list_products(&query).await.unwrap();

    // Both parameterized reads computed from the datastore.
    assert_eq!(h.store.product_list_calls.load(Ordering::SeqCst), 2);
    assert!(h
        .cache
        .get_json::<Vec<ProductRecord>>(&CacheKey::List(EntityKind::Product))
        .await
        .is_none());
}

#[tokio::test]
async fn bulk_price_update_reports_per_item_outcomes() {
    use bottega::application::jobs::{PriceUpdate, PriceUpdateStatus, apply_price_updates};

    let h = harness();
    h.store.seed_product(1, Decimal::new(10000, 2), 10);
    h.store.seed_product(2, Decimal::new(20000, 2), 10);

    let outcomes = apply_price_updates(
        &h.catalog,
        &[
            PriceUpdate {
                product_id: 1,
                price: Decimal::new(12000, 2),
                discount_price: Some(Decimal::new(9000, 2)),
            },
            // Invalid: discount at price.
            PriceUpdate {
                product_id: 2,
                price: Decimal::new(20000, 2),
                discount_price: Some(Decimal::new(20000, 2)),
            },
            // Unknown product.
            PriceUpdate {
                product_id: 99,
                price: Decimal::new(5000, 2),
                discount_price: None,
            },
        ],
    )
    .await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].status, PriceUpdateStatus::Applied);
    assert!(matches!(outcomes[1].status, PriceUpdateStatus::Rejected(_)));
    assert!(matches!(outcomes[2].status, PriceUpdateStatus::Rejected(_)));

    // The invalid entry did not abort the batch and touched nothing.
    let state_price_1 = h.store.state.lock().unwrap().products[&1].price;
    let state_price_2 = h.store.state.lock().unwrap().products[&2].price;
    assert_eq!(state_price_1, Decimal::new(12000, 2));
    assert_eq!(state_price_2, Decimal::new(20000, 2));
}

#[tokio::test]
async fn cleanup_cancels_only_stale_pending_orders() {
    let h = harness();
    let stale = h.store.seed_pending_order(time::Duration::hours(25));
    let fresh = h.store.seed_pending_order(time::Duration::hours(1));

    process_cleanup_expired_orders_job(
        CleanupExpiredOrdersJobPayload::default(),
        Data::new(h.context.clone()),
    )
    .await
    .unwrap();

    assert_eq!(h.store.order_status(stale), OrderStatus::Cancelled);
    assert_eq!(h.store.order_status(fresh), OrderStatus::Pending);
}
