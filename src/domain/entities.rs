//! Domain entities mirrored from persistent storage.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::types::OrderStatus;

// Category and Product round-trip through the cache as JSON, so they carry
// both serde directions; the order records are never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub is_active: bool,
    pub featured: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: i64,
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
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ProductRecord {
    /// A product is discounted when a discount price exists; the strict
    /// `discount_price < price` invariant is enforced at write time.
    pub fn is_discounted(&self) -> bool {
        self.discount_price.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub id: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Line item with the price snapshot captured at order creation.
///
/// `unit_price` and `discount` are immune to later catalog price changes;
/// historical orders never change value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItemRecord {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount: Decimal,
}

impl OrderItemRecord {
    pub fn subtotal(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price - self.discount
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub job_type: crate::domain::types::JobType,
    pub payload: serde_json::Value,
    pub state: crate::domain::types::JobState,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: OffsetDateTime,
    pub done_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    pub priority: i32,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use time::OffsetDateTime;

    use super::*;

    #[test]
    fn order_item_subtotal_applies_discount() {
        let item = OrderItemRecord {
            id: 1,
            order_id: 1,
            product_id: 3,
            quantity: 2,
            unit_price: Decimal::new(2500, 2),
            discount: Decimal::new(1000, 2),
        };
        assert_eq!(item.subtotal(), Decimal::new(4000, 2));
    }

    #[test]
    fn discounted_flag_follows_discount_price() {
        let now = OffsetDateTime::now_utc();
        let mut product = ProductRecord {
            id: 1,
            name: "The Great Novel".to_string(),
            slug: "the-great-novel".to_string(),
            description: String::new(),
            price: Decimal::new(2500, 2),
            discount_price: None,
            stock: 20,
            category_id: 2,
            is_active: true,
            is_featured: false,
            sku: Some("NOV001".to_string()),
            created_at: now,
            updated_at: now,
        };
        assert!(!product.is_discounted());
        product.discount_price = Some(Decimal::new(2000, 2));
        assert!(product.is_discounted());
    }
}
