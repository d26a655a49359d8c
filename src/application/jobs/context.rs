use std::sync::Arc;

use apalis::prelude::Error as ApalisError;

use crate::{
    application::catalog::CatalogService,
    application::reports::ReportService,
    application::repos::{JobsRepo, OrdersRepo, ProductsRepo},
    infra::notify::NotificationDispatcher,
};

/// Shared context passed to job workers so they can reach the repositories,
/// the catalog service (the cache-invalidation funnel), and the notifier.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub orders: Arc<dyn OrdersRepo>,
    pub products: Arc<dyn ProductsRepo>,
    pub jobs: Arc<dyn JobsRepo>,
    pub catalog: Arc<CatalogService>,
    pub reports: Arc<ReportService>,
    pub notifier: Arc<dyn NotificationDispatcher>,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`].
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}
