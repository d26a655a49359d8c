use async_trait::async_trait;
use sqlx::QueryBuilder;

use crate::{
    application::repos::{
        CategoriesRepo, CreateCategoryParams, RepoError, UpdateCategoryParams,
    },
    domain::entities::CategoryRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
    slug: String,
    description: String,
    is_active: bool,
    featured: bool,
}

impl From<CategoryRow> for CategoryRecord {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            is_active: row.is_active,
            featured: row.featured,
        }
    }
}

const CATEGORY_COLUMNS: &str = "id, name, slug, description, is_active, featured";

#[async_trait]
impl CategoriesRepo for PostgresRepositories {
    async fn list_categories(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<CategoryRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(CATEGORY_COLUMNS);
        qb.push(" FROM categories WHERE 1=1 ");
        if !include_inactive {
            qb.push("AND is_active = TRUE ");
        }
        qb.push("ORDER BY name");

        let rows = qb
            .build_query_as::<CategoryRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CategoryRecord::from).collect())
    }

    async fn find_category(&self, id: i64) -> Result<Option<CategoryRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(CATEGORY_COLUMNS);
        qb.push(" FROM categories WHERE id = ");
        qb.push_bind(id);

        let row = qb
            .build_query_as::<CategoryRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(CategoryRecord::from))
    }

    async fn category_slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM categories WHERE slug = ");
        qb.push_bind(slug);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(count > 0)
    }

    async fn create_category(
        &self,
        params: CreateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let mut qb = QueryBuilder::new(
            "INSERT INTO categories (name, slug, description, is_active, featured) VALUES (",
        );
        let mut values = qb.separated(", ");
        values.push_bind(params.name);
        values.push_bind(params.slug);
        values.push_bind(params.description);
        values.push_bind(params.is_active);
        values.push_bind(params.featured);
        qb.push(") RETURNING ");
        qb.push(CATEGORY_COLUMNS);

        let row = qb
            .build_query_as::<CategoryRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(CategoryRecord::from(row))
    }

    async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE categories SET name = ");
        qb.push_bind(params.name);
        qb.push(", description = ");
        qb.push_bind(params.description);
        qb.push(", is_active = ");
        qb.push_bind(params.is_active);
        qb.push(", featured = ");
        qb.push_bind(params.featured);
        qb.push(" WHERE id = ");
        qb.push_bind(params.id);
        qb.push(" RETURNING ");
        qb.push(CATEGORY_COLUMNS);

        let row = qb
            .build_query_as::<CategoryRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        Ok(CategoryRecord::from(row))
    }

    async fn delete_category(&self, id: i64) -> Result<(), RepoError> {
        // Guard before delete so the error message carries the business
        // meaning instead of a bare foreign-key violation.
        let mut count_qb =
            QueryBuilder::new("SELECT COUNT(*) FROM products WHERE category_id = ");
        count_qb.push_bind(id);
        let dependents: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if Self::convert_count(dependents)? > 0 {
            return Err(RepoError::integrity(
                "category has dependent products and cannot be deleted",
            ));
        }

        let mut qb = QueryBuilder::new("DELETE FROM categories WHERE id = ");
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
}
