//! Cache key grammar and eligibility.
//!
//! Keys render to a fixed wire format so an external store shared with other
//! processes sees stable names:
//!
//! - `{base}_list:` for the unparameterized listing
//! - `{base}_detail:{id}` for a single entity
//! - `{base}_featured` / `{base}_discounted` for the curated product views
//!
//! Parameterized listings are never cached: they have combinatorially many
//! variants and low reuse, so caching them risks unbounded key growth and
//! stale-result leakage across filters sharing a prefix. Eligibility is a
//! pure function of the normalized query shape, not an ad hoc string check.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The two cached entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Category,
    Product,
}

impl EntityKind {
    pub fn base_key(self) -> &'static str {
        match self {
            EntityKind::Category => "categories",
            EntityKind::Product => "products",
        }
    }
}

/// Curated product views with fixed, parameterless keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialView {
    Featured,
    Discounted,
}

impl SpecialView {
    fn suffix(self) -> &'static str {
        match self {
            SpecialView::Featured => "featured",
            SpecialView::Discounted => "discounted",
        }
    }

    pub const ALL: [SpecialView; 2] = [SpecialView::Featured, SpecialView::Discounted];
}

/// A typed cache key; `render()` yields the wire name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    List(EntityKind),
    Detail(EntityKind, i64),
    Special(EntityKind, SpecialView),
}

impl CacheKey {
    pub fn render(&self) -> String {
        match self {
            CacheKey::List(kind) => format!("{}_list:", kind.base_key()),
            CacheKey::Detail(kind, id) => format!("{}_detail:{id}", kind.base_key()),
            CacheKey::Special(kind, view) => {
                format!("{}_{}", kind.base_key(), view.suffix())
            }
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Sort orders accepted by product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListSort {
    PriceAsc,
    PriceDesc,
    StockAsc,
    StockDesc,
}

/// Normalized shape of list-request parameters.
///
/// Order-independent by construction: each parameter has one slot, so two
/// requests that differ only in parameter order normalize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub category_slug: Option<String>,
    pub sort: Option<ListSort>,
}

impl ListQuery {
    /// Cache eligibility: true iff no search/filter/sort parameter is present.
    pub fn is_cacheable(&self) -> bool {
        self.search.is_none() && self.category_slug.is_none() && self.sort.is_none()
    }

    /// The cache key for this listing, or `None` when the query must bypass
    /// the cache.
    pub fn list_key(&self, kind: EntityKind) -> Option<CacheKey> {
        self.is_cacheable().then_some(CacheKey::List(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_render_wire_format() {
        assert_eq!(CacheKey::List(EntityKind::Product).render(), "products_list:");
        assert_eq!(
            CacheKey::List(EntityKind::Category).render(),
            "categories_list:"
        );
        assert_eq!(
            CacheKey::Detail(EntityKind::Product, 42).render(),
            "products_detail:42"
        );
        assert_eq!(
            CacheKey::Special(EntityKind::Product, SpecialView::Featured).render(),
            "products_featured"
        );
        assert_eq!(
            CacheKey::Special(EntityKind::Product, SpecialView::Discounted).render(),
            "products_discounted"
        );
    }

    #[test]
    fn empty_query_is_cacheable() {
        let query = ListQuery::default();
        assert!(query.is_cacheable());
        assert_eq!(
            query.list_key(EntityKind::Product),
            Some(CacheKey::List(EntityKind::Product))
        );
    }

    #[test]
    fn any_parameter_bypasses_cache() {
        let search = ListQuery {
            search: Some("laptop".to_string()),
            ..Default::default()
        };
        let filter = ListQuery {
            category_slug: Some("electronics".to_string()),
            ..Default::default()
        };
        let sort = ListQuery {
            sort: Some(ListSort::PriceAsc),
            ..Default::default()
        };

        for query in [search, filter, sort] {
            assert!(!query.is_cacheable());
            assert_eq!(query.list_key(EntityKind::Product), None);
        }
    }
}
