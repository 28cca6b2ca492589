use chrono::{DateTime, Utc};
use sqlx::FromRow;
use crate::money::Money;

#[derive(Debug, FromRow)]
pub struct Purchase {
    pub id: i64,
    pub supplier_id: Option<i64>,
    pub supplier_name: Option<String>,
    pub user_id: i64,
    pub username: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct PurchaseItem {
    pub id: i64,
    pub purchase_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_cost: Money,
}
