use chrono::{DateTime, Utc};
use sqlx::FromRow;
use crate::money::Money;

#[derive(Debug, FromRow)]
pub struct Sale {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub tax_included: bool,
    pub tax_rate_bps: i32,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub total: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct SaleItem {
    pub id: i64,
    pub sale_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub sku: String,
    pub brand_name: Option<String>,
    pub category_name: Option<String>,
    pub quantity: i32,
    pub unit_price: Money,
    pub discount: Money,
}

impl SaleItem {
    pub fn line_total(&self) -> Money {
        (self.unit_price - self.discount).saturating_mul(self.quantity)
    }
}
