use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::QueryBuilder;
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CreateProductParams, ProductsRepo, RepoError, UpdateProductParams,
    },
    cache::{ListQuery, ListSort},
    domain::entities::ProductRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    slug: String,
    description: String,
    price: Decimal,
    discount_price: Option<Decimal>,
    stock: i32,
    category_id: i64,
    is_active: bool,
    is_featured: bool,
    sku: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ProductRow> for ProductRecord {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            price: row.price,
            discount_price: row.discount_price,
            stock: row.stock,
            category_id: row.category_id,
            is_active: row.is_active,
            is_featured: row.is_featured,
            sku: row.sku,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const PRODUCT_COLUMNS: &str = "p.id, p.name, p.slug, p.description, p.price, p.discount_price, \
     p.stock, p.category_id, p.is_active, p.is_featured, p.sku, p.created_at, p.updated_at";

fn push_list_filter<'q>(qb: &mut QueryBuilder<'q, sqlx::Postgres>, query: &'q ListQuery) {
    if let Some(search) = query.search.as_ref() {
        qb.push(" AND (");
        qb.push("p.name ILIKE ");
        qb.push_bind(format!("%{search}%"));
        qb.push(" OR p.description ILIKE ");
        qb.push_bind(format!("%{search}%"));
        qb.push(" OR p.sku ILIKE ");
        qb.push_bind(format!("%{search}%"));
        qb.push(")");
    }

    if let Some(category_slug) = query.category_slug.as_ref() {
        qb.push(" AND EXISTS (SELECT 1 FROM categories c WHERE c.id = p.category_id AND c.slug = ");
        qb.push_bind(category_slug);
        qb.push(")");
    }
}

fn order_clause(sort: Option<ListSort>) -> &'static str {
    match sort {
        Some(ListSort::PriceAsc) => " ORDER BY p.price ASC, p.id DESC",
        Some(ListSort::PriceDesc) => " ORDER BY p.price DESC, p.id DESC",
        Some(ListSort::StockAsc) => " ORDER BY p.stock ASC, p.id DESC",
        Some(ListSort::StockDesc) => " ORDER BY p.stock DESC, p.id DESC",
        None => " ORDER BY p.id DESC",
    }
}

#[async_trait]
impl ProductsRepo for PostgresRepositories {
    async fn list_products(&self, query: &ListQuery) -> Result<Vec<ProductRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(PRODUCT_COLUMNS);
        qb.push(" FROM products p WHERE p.is_active = TRUE ");
        push_list_filter(&mut qb, query);
        qb.push(order_clause(query.sort));

        let rows = qb
            .build_query_as::<ProductRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ProductRecord::from).collect())
    }

    async fn find_product(&self, id: i64) -> Result<Option<ProductRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(PRODUCT_COLUMNS);
        qb.push(" FROM products p WHERE p.id = ");
        qb.push_bind(id);

        let row = qb
            .build_query_as::<ProductRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(ProductRecord::from))
    }

    async fn product_slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM products WHERE slug = ");
        qb.push_bind(slug);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(count > 0)
    }

    async fn create_product(
        &self,
        params: CreateProductParams,
    ) -> Result<ProductRecord, RepoError> {
        let mut qb = QueryBuilder::new(
            "INSERT INTO products (name, slug, description, price, discount_price, stock, \
             category_id, is_active, is_featured, sku, created_at, updated_at) VALUES (",
        );
        let mut values = qb.separated(", ");
        values.push_bind(params.name);
        values.push_bind(params.slug);
        values.push_bind(params.description);
        values.push_bind(params.price);
        values.push_bind(params.discount_price);
        values.push_bind(params.stock);
        values.push_bind(params.category_id);
        values.push_bind(params.is_active);
        values.push_bind(params.is_featured);
        values.push_bind(params.sku);
        qb.push(", now(), now()) RETURNING ");
        qb.push(product_columns_unprefixed());

        let row = qb
            .build_query_as::<ProductRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(ProductRecord::from(row))
    }

    async fn update_product(
        &self,
        params: UpdateProductParams,
    ) -> Result<ProductRecord, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE products SET name = ");
        qb.push_bind(params.name);
        qb.push(", description = ");
        qb.push_bind(params.description);
        qb.push(", price = ");
        qb.push_bind(params.price);
        qb.push(", discount_price = ");
        qb.push_bind(params.discount_price);
        qb.push(", stock = ");
        qb.push_bind(params.stock);
        qb.push(", category_id = ");
        qb.push_bind(params.category_id);
        qb.push(", is_active = ");
        qb.push_bind(params.is_active);
        qb.push(", is_featured = ");
        qb.push_bind(params.is_featured);
        qb.push(", sku = ");
        qb.push_bind(params.sku);
        qb.push(", updated_at = now() WHERE id = ");
        qb.push_bind(params.id);
        qb.push(" RETURNING ");
        qb.push(product_columns_unprefixed());

        let row = qb
            .build_query_as::<ProductRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        Ok(ProductRecord::from(row))
    }

    async fn delete_product(&self, id: i64) -> Result<(), RepoError> {
        let mut count_qb =
            QueryBuilder::new("SELECT COUNT(*) FROM order_items WHERE product_id = ");
        count_qb.push_bind(id);
        let references: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if references > 0 {
            return Err(RepoError::integrity(
                "product is referenced by order items and cannot be deleted",
            ));
        }

        let mut qb = QueryBuilder::new("DELETE FROM products WHERE id = ");
        qb.push_bind(id);

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list_featured(&self) -> Result<Vec<ProductRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(PRODUCT_COLUMNS);
        qb.push(" FROM products p WHERE p.is_active = TRUE AND p.is_featured = TRUE ORDER BY p.id DESC");

        let rows = qb
            .build_query_as::<ProductRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ProductRecord::from).collect())
    }

    async fn list_discounted(&self) -> Result<Vec<ProductRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(PRODUCT_COLUMNS);
        qb.push(
            " FROM products p WHERE p.is_active = TRUE AND p.discount_price IS NOT NULL \
             AND p.discount_price < p.price ORDER BY p.id DESC",
        );

        let rows = qb
            .build_query_as::<ProductRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ProductRecord::from).collect())
    }

    async fn decrement_stock_if_available(
        &self,
        product_id: i64,
        quantity: i32,
    ) -> Result<Option<i32>, RepoError> {
        // Guarded decrement: the WHERE clause keeps stock non-negative even
        // under concurrent fulfillment, the row lock serializes writers.
        let mut qb = QueryBuilder::new("UPDATE products SET stock = stock - ");
        qb.push_bind(quantity);
        qb.push(", updated_at = now() WHERE id = ");
        qb.push_bind(product_id);
        qb.push(" AND stock >= ");
        qb.push_bind(quantity);
        qb.push(" RETURNING stock");

        let remaining: Option<i32> = qb
            .build_query_scalar()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(remaining)
    }

    async fn list_active_low_stock(&self, threshold: i32) -> Result<Vec<ProductRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(PRODUCT_COLUMNS);
        qb.push(" FROM products p WHERE p.is_active = TRUE AND p.stock <= ");
        qb.push_bind(threshold);
        qb.push(" ORDER BY p.stock ASC, p.id");

        let rows = qb
            .build_query_as::<ProductRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ProductRecord::from).collect())
    }

    async fn recompute_featured(
        &self,
        top_n: i64,
        since: OffsetDateTime,
    ) -> Result<u64, RepoError> {
        // Full replace in one statement: products outside the ranking lose
        // the flag in the same UPDATE that sets it on the winners.
        let mut qb = QueryBuilder::new(
            "WITH ranked AS ( \
               SELECT oi.product_id AS id \
                 FROM order_items oi \
                 JOIN orders o ON o.id = oi.order_id \
                WHERE o.status = 'completed' AND o.created_at >= ",
        );
        qb.push_bind(since);
        qb.push(
            " GROUP BY oi.product_id \
              ORDER BY SUM(oi.quantity) DESC \
              LIMIT ",
        );
        qb.push_bind(top_n);
        qb.push(
            ") \
            UPDATE products \
               SET is_featured = EXISTS (SELECT 1 FROM ranked r WHERE r.id = products.id), \
                   updated_at = now() \
             WHERE is_featured IS DISTINCT FROM \
                   EXISTS (SELECT 1 FROM ranked r WHERE r.id = products.id)",
        );

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn update_price(
        &self,
        product_id: i64,
        price: Decimal,
        discount_price: Option<Decimal>,
    ) -> Result<ProductRecord, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE products SET price = ");
        qb.push_bind(price);
        qb.push(", discount_price = ");
        qb.push_bind(discount_price);
        qb.push(", updated_at = now() WHERE id = ");
        qb.push_bind(product_id);
        qb.push(" RETURNING ");
        qb.push(product_columns_unprefixed());

        let row = qb
            .build_query_as::<ProductRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        Ok(ProductRecord::from(row))
    }
}

fn product_columns_unprefixed() -> &'static str {
    "id, name, slug, description, price, discount_price, stock, category_id, \
     is_active, is_featured, sku, created_at, updated_at"
}
