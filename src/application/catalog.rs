//! Catalog service: category/product CRUD with cached reads.
//!
//! All catalog writes, synchronous API calls and background jobs alike,
//! funnel through this service so the post-commit cache invalidation has a
//! single home and cannot be missed as call sites grow.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::instrument;

use crate::application::error::AppError;
use crate::application::repos::{
    CategoriesRepo, CreateCategoryParams, CreateProductParams, ProductsRepo,
    UpdateCategoryParams, UpdateProductParams,
};
use crate::cache::{CacheCoordinator, CacheKey, EntityKind, ListQuery, SpecialView};
use crate::domain::entities::{CategoryRecord, ProductRecord};
use crate::domain::error::DomainError;
use crate::domain::slug::generate_unique_slug_async;

/// Validate the price pair invariant: price non-negative, discount strictly
/// below price when present.
pub fn validate_pricing(price: Decimal, discount_price: Option<Decimal>) -> Result<(), DomainError> {
    if price.is_sign_negative() {
        return Err(DomainError::validation("price cannot be negative"));
    }
    if let Some(discount) = discount_price {
        if discount.is_sign_negative() {
            return Err(DomainError::validation("discount price cannot be negative"));
        }
        if discount >= price {
            return Err(DomainError::validation(
                "discount price must be lower than regular price",
            ));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub featured: bool,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    pub stock: i32,
    pub category_id: i64,
    pub is_active: bool,
    pub sku: Option<String>,
}

pub struct CatalogService {
    categories: Arc<dyn CategoriesRepo>,
    products: Arc<dyn ProductsRepo>,
    cache: Arc<CacheCoordinator>,
}

impl CatalogService {
    pub fn new(
        categories: Arc<dyn CategoriesRepo>,
        products: Arc<dyn ProductsRepo>,
        cache: Arc<CacheCoordinator>,
    ) -> Self {
        Self {
            categories,
            products,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<CacheCoordinator> {
        &self.cache
    }

    // ------------------------------------------------------------------
    // Category reads
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<CategoryRecord>, AppError> {
        let key = CacheKey::List(EntityKind::Category);
        if let Some(cached) = self.cache.get_json::<Vec<CategoryRecord>>(&key).await {
            return Ok(cached);
        }

        let rows = self.categories.list_categories(false).await?;
        self.cache.put_json(&key, &rows).await;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn get_category(&self, id: i64) -> Result<CategoryRecord, AppError> {
        let key = CacheKey::Detail(EntityKind::Category, id);
        if let Some(cached) = self.cache.get_json::<CategoryRecord>(&key).await {
            return Ok(cached);
        }

        let category = self
            .categories
            .find_category(id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.cache.put_json(&key, &category).await;
        Ok(category)
    }

    // ------------------------------------------------------------------
    // Category writes
    // ------------------------------------------------------------------

    #[instrument(skip(self, category), fields(name = %category.name))]
    pub async fn create_category(&self, category: NewCategory) -> Result<CategoryRecord, AppError> {
        let slug = self.unique_category_slug(&category.name).await?;
        let created = self
            .categories
            .create_category(CreateCategoryParams {
                name: category.name,
                slug,
                description: category.description,
                is_active: category.is_active,
                featured: category.featured,
            })
            .await?;

        self.cache.invalidate(EntityKind::Category, None).await;
        Ok(created)
    }

    #[instrument(skip(self, params), fields(id = params.id))]
    pub async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, AppError> {
        let id = params.id;
        let updated = self.categories.update_category(params).await?;
        self.cache.invalidate(EntityKind::Category, Some(id)).await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_category(&self, id: i64) -> Result<(), AppError> {
        self.categories.delete_category(id).await?;
        self.cache.invalidate(EntityKind::Category, Some(id)).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Product reads
    // ------------------------------------------------------------------

    /// List products. Unparameterized queries are served read-through; any
    /// search/filter/sort parameter bypasses the cache entirely.
    #[instrument(skip(self, query))]
    pub async fn list_products(&self, query: &ListQuery) -> Result<Vec<ProductRecord>, AppError> {
        let Some(key) = query.list_key(EntityKind::Product) else {
            return Ok(self.products.list_products(query).await?);
        };

        if let Some(cached) = self.cache.get_json::<Vec<ProductRecord>>(&key).await {
            return Ok(cached);
        }

        let rows = self.products.list_products(query).await?;
        self.cache.put_json(&key, &rows).await;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, id: i64) -> Result<ProductRecord, AppError> {
        let key = CacheKey::Detail(EntityKind::Product, id);
        if let Some(cached) = self.cache.get_json::<ProductRecord>(&key).await {
            return Ok(cached);
        }

        let product = self
            .products
            .find_product(id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.cache.put_json(&key, &product).await;
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn featured_products(&self) -> Result<Vec<ProductRecord>, AppError> {
        self.special_view(SpecialView::Featured).await
    }

    #[instrument(skip(self))]
    pub async fn discounted_products(&self) -> Result<Vec<ProductRecord>, AppError> {
        self.special_view(SpecialView::Discounted).await
    }

    async fn special_view(&self, view: SpecialView) -> Result<Vec<ProductRecord>, AppError> {
        let key = CacheKey::Special(EntityKind::Product, view);
        if let Some(cached) = self.cache.get_json::<Vec<ProductRecord>>(&key).await {
            return Ok(cached);
        }

        let rows = match view {
            SpecialView::Featured => self.products.list_featured().await?,
            SpecialView::Discounted => self.products.list_discounted().await?,
        };
        self.cache.put_json(&key, &rows).await;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Product writes
    // ------------------------------------------------------------------

    #[instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create_product(&self, product: NewProduct) -> Result<ProductRecord, AppError> {
        validate_pricing(product.price, product.discount_price)?;
        if product.stock < 0 {
            return Err(AppError::validation("stock cannot be negative"));
        }
        self.categories
            .find_category(product.category_id)
            .await?
            .ok_or_else(|| DomainError::not_found("category"))?;

        let slug = self.unique_product_slug(&product.name).await?;
        let created = self
            .products
            .create_product(CreateProductParams {
                name: product.name,
                slug,
                description: product.description,
                price: product.price,
                discount_price: product.discount_price,
                stock: product.stock,
                category_id: product.category_id,
                is_active: product.is_active,
                is_featured: false,
                sku: product.sku,
            })
            .await?;

        self.cache.invalidate(EntityKind::Product, None).await;
        Ok(created)
    }

    #[instrument(skip(self, params), fields(id = params.id))]
    pub async fn update_product(
        &self,
        params: UpdateProductParams,
    ) -> Result<ProductRecord, AppError> {
        validate_pricing(params.price, params.discount_price)?;
        let id = params.id;
        let updated = self.products.update_product(params).await?;
        self.cache.invalidate(EntityKind::Product, Some(id)).await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: i64) -> Result<(), AppError> {
        self.products.delete_product(id).await?;
        self.cache.invalidate(EntityKind::Product, Some(id)).await;
        Ok(())
    }

    /// Guarded stock decrement used by fulfillment paths that operate one
    /// product at a time. Returns the remaining stock on success.
    #[instrument(skip(self))]
    pub async fn decrement_stock(&self, product_id: i64, quantity: i32) -> Result<Option<i32>, AppError> {
        let remaining = self
            .products
            .decrement_stock_if_available(product_id, quantity)
            .await?;
        if remaining.is_some() {
            self.cache
                .invalidate(EntityKind::Product, Some(product_id))
                .await;
        }
        Ok(remaining)
    }

    /// Apply one price update; used by the bulk-update job per item.
    #[instrument(skip(self))]
    pub async fn update_price(
        &self,
        product_id: i64,
        price: Decimal,
        discount_price: Option<Decimal>,
    ) -> Result<ProductRecord, AppError> {
        validate_pricing(price, discount_price)?;
        let updated = self
            .products
            .update_price(product_id, price, discount_price)
            .await?;
        self.cache
            .invalidate(EntityKind::Product, Some(product_id))
            .await;
        Ok(updated)
    }

    /// Invalidate product keys after a worker mutation that bypassed the
    /// service-level write methods (e.g. the fulfillment transaction).
    pub async fn invalidate_product(&self, product_id: i64) {
        self.cache
            .invalidate(EntityKind::Product, Some(product_id))
            .await;
    }

    async fn unique_category_slug(&self, name: &str) -> Result<String, AppError> {
        let repo = self.categories.clone();
        generate_unique_slug_async(name, |candidate| {
            let repo = repo.clone();
            let candidate = candidate.to_string();
            async move {
                repo.category_slug_exists(&candidate)
                    .await
                    .map(|exists| !exists)
            }
        })
        .await
        .map_err(|err| match err {
            crate::domain::slug::SlugAsyncError::Slug(slug_err) => {
                AppError::validation(slug_err.to_string())
            }
            crate::domain::slug::SlugAsyncError::Predicate(repo_err) => repo_err.into(),
        })
    }

    async fn unique_product_slug(&self, name: &str) -> Result<String, AppError> {
        let repo = self.products.clone();
        generate_unique_slug_async(name, |candidate| {
            let repo = repo.clone();
            let candidate = candidate.to_string();
            async move {
                repo.product_slug_exists(&candidate)
                    .await
                    .map(|exists| !exists)
            }
        })
        .await
        .map_err(|err| match err {
            crate::domain::slug::SlugAsyncError::Slug(slug_err) => {
                AppError::validation(slug_err.to_string())
            }
            crate::domain::slug::SlugAsyncError::Predicate(repo_err) => repo_err.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn pricing_accepts_discount_below_price() {
        assert!(validate_pricing(Decimal::new(2500, 2), Some(Decimal::new(2000, 2))).is_ok());
        assert!(validate_pricing(Decimal::new(2500, 2), None).is_ok());
    }

    #[test]
    fn pricing_rejects_discount_at_or_above_price() {
        assert!(validate_pricing(Decimal::new(2500, 2), Some(Decimal::new(2500, 2))).is_err());
        assert!(validate_pricing(Decimal::new(2500, 2), Some(Decimal::new(3000, 2))).is_err());
    }

    #[test]
    fn pricing_rejects_negative_values() {
        assert!(validate_pricing(Decimal::new(-100, 2), None).is_err());
        assert!(validate_pricing(Decimal::new(2500, 2), Some(Decimal::new(-1, 2))).is_err());
    }
}
