use sqlx::FromRow;
use chrono::{DateTime, Utc};
use crate::money::Money;

/// Columns selected for every product read, joined with catalog names.
pub const PRODUCT_COLUMNS: &str = r#"
    p.id, p.name, p.description, p.size, p.color, p.base_code, p.sku,
    p.sale_price, p.cost_price, p.stock_cached, p.stock_min, p.is_active,
    p.brand_id, b.name AS brand_name,
    p.category_id, c.name AS category_name,
    p.supplier_id, s.name AS supplier_name,
    p.created_at, p.updated_at
"#;

pub const PRODUCT_JOINS: &str = r#"
    FROM products p
    LEFT JOIN brands b ON p.brand_id = b.id
    LEFT JOIN categories c ON p.category_id = c.id
    LEFT JOIN suppliers s ON p.supplier_id = s.id
"#;

#[derive(Debug, Clone, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub base_code: Option<String>,
    pub sku: String,
    pub sale_price: Money,
    pub cost_price: Money,
    pub stock_cached: i32,
    pub stock_min: i32,
    pub is_active: bool,
    pub brand_id: Option<i64>,
    pub brand_name: Option<String>,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub supplier_id: Option<i64>,
    pub supplier_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_low_stock(&self) -> bool {
        self.stock_cached <= self.stock_min
    }
}

/// Rows that tie a product to historical records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct ProductHistory {
    pub movements: i64,
    pub sales: i64,
    pub purchases: i64,
}

impl ProductHistory {
    pub fn has_history(&self) -> bool {
        self.movements > 0 || self.sales > 0 || self.purchases > 0
    }

    pub fn can_be_deleted(&self) -> bool {
        !self.has_history()
    }
}
