use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::money::Money;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchaseRequest {
    pub supplier_id: Option<i64>,
    pub notes: Option<String>,
    pub items: Vec<PurchaseLineRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseLineRequest {
    pub product_id: i64,
    pub quantity: i32,
    pub unit_cost: Money,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub id: i64,
    pub supplier_id: Option<i64>,
    pub supplier_name: Option<String>,
    pub user_id: i64,
    pub username: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<PurchaseItemResponse>,
    pub total_cost: Money,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseItemResponse {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_cost: Money,
    pub line_cost: Money,
}
