use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};
use crate::money::{Money, TaxRate};
use crate::models::sale::{Sale, SaleItem};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSaleRequest {
    pub items: Vec<SaleLineRequest>,
    pub tax_included: Option<bool>,
    pub tax_rate: Option<TaxRate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLineRequest {
    pub product_id: i64,
    pub quantity: i32,
    pub price: Option<Money>, // Optional - checked against the catalog price when present
    pub discount: Option<Money>, // Per unit
}

#[derive(Debug, Default, Deserialize)]
pub struct ListSalesQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct CreateSaleResponse {
    pub folio: i64,
    pub sale: SaleResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleResponse {
    pub id: i64,
    pub folio: i64,
    pub user_id: i64,
    pub username: String,
    pub tax_included: bool,
    pub tax_rate: TaxRate,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub total: Money,
    pub created_at: DateTime<Utc>,
    pub items: Vec<SaleItemResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItemResponse {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub sku: String,
    pub brand_name: Option<String>,
    pub category_name: Option<String>,
    pub quantity: i32,
    pub unit_price: Money,
    pub discount: Money,
    pub line_total: Money,
}

impl From<SaleItem> for SaleItemResponse {
    fn from(item: SaleItem) -> Self {
        Self {
            line_total: item.line_total(),
            id: item.id,
            product_id: item.product_id,
            product_name: item.product_name,
            sku: item.sku,
            brand_name: item.brand_name,
            category_name: item.category_name,
            quantity: item.quantity,
            unit_price: item.unit_price,
            discount: item.discount,
        }
    }
}

impl SaleResponse {
    pub fn from_parts(sale: Sale, items: Vec<SaleItem>) -> Self {
        Self {
            id: sale.id,
            folio: sale.id,
            user_id: sale.user_id,
            username: sale.username,
            tax_included: sale.tax_included,
            tax_rate: TaxRate::from_bps(sale.tax_rate_bps.max(0) as u32),
            subtotal: sale.subtotal,
            tax_amount: sale.tax_amount,
            total: sale.total,
            created_at: sale.created_at,
            items: items.into_iter().map(SaleItemResponse::from).collect(),
        }
    }
}
