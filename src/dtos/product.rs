// src/dtos/product.rs
use serde::{Deserialize, Deserializer, Serialize};
use chrono::{DateTime, Utc};
use crate::models::product::{Product, ProductHistory};
use crate::models::stock_movement::{StockMovement, StockMovementType};
use crate::money::Money;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub base_code: Option<String>,
    pub sku: String,
    pub sale_price: Money,
    pub cost_price: Option<Money>,
    pub stock: Option<i32>,
    pub stock_min: Option<i32>,
    pub brand_id: Option<i64>,
    pub category_id: Option<i64>,
    pub supplier_id: Option<i64>,
}

/// Absent key stays `None`; an explicit `null` becomes `Some(None)` and clears the column.
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub size: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub color: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub base_code: Option<Option<String>>,
    pub sku: Option<String>,
    pub sale_price: Option<Money>,
    pub cost_price: Option<Money>,
    pub stock_min: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    pub brand_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub category_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub supplier_id: Option<Option<i64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProductsQuery {
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
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
    pub low_stock: bool,
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

// Convert from Model to Response DTO
impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            low_stock: product.is_low_stock(),
            id: product.id,
            name: product.name,
            description: product.description,
            size: product.size,
            color: product.color,
            base_code: product.base_code,
            sku: product.sku,
            sale_price: product.sale_price,
            cost_price: product.cost_price,
            stock_cached: product.stock_cached,
            stock_min: product.stock_min,
            is_active: product.is_active,
            brand_id: product.brand_id,
            brand_name: product.brand_name,
            category_id: product.category_id,
            category_name: product.category_name,
            supplier_id: product.supplier_id,
            supplier_name: product.supplier_name,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteOutcome {
    Deleted,
    Deactivated,
}

#[derive(Debug, Serialize)]
pub struct DeleteProductResponse {
    #[serde(rename = "type")]
    pub outcome: DeleteOutcome,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletabilityResponse {
    pub can_be_deleted: bool,
    pub has_history: bool,
    pub details: ProductHistoryDetails,
}

#[derive(Debug, Serialize)]
pub struct ProductHistoryDetails {
    pub movements: i64,
    pub sales: i64,
    pub purchases: i64,
}

impl From<ProductHistory> for DeletabilityResponse {
    fn from(history: ProductHistory) -> Self {
        Self {
            can_be_deleted: history.can_be_deleted(),
            has_history: history.has_history(),
            details: ProductHistoryDetails {
                movements: history.movements,
                sales: history.sales,
                purchases: history.purchases,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: i32,
    pub notes: Option<String>,
}

/// Signed correction, e.g. `-2` after a count finds two units missing.
#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub quantity: i32,
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct BarcodePrintRequest {
    pub copies: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovementResponse {
    pub id: i64,
    pub product_id: i64,
    pub movement_type: StockMovementType,
    pub quantity: i32,
    pub reference_id: Option<i64>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
    pub created_by_username: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<StockMovement> for StockMovementResponse {
    fn from(m: StockMovement) -> Self {
        Self {
            id: m.id,
            product_id: m.product_id,
            movement_type: m.movement_type,
            quantity: m.quantity,
            reference_id: m.reference_id,
            notes: m.notes,
            created_by: m.created_by,
            created_by_username: m.created_by_username,
            created_at: m.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deletability_uses_camel_case_keys() {
        let response = DeletabilityResponse::from(ProductHistory { movements: 0, sales: 3, purchases: 0 });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["canBeDeleted"], false);
        assert_eq!(json["hasHistory"], true);
        assert_eq!(json["details"]["sales"], 3);
    }

    #[test]
    fn delete_response_reports_type() {
        let response = DeleteProductResponse { outcome: DeleteOutcome::Deactivated, message: String::new() };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "deactivated");
    }

    #[test]
    fn include_inactive_parses_from_query_string() {
        let q: ListProductsQuery = parse_query("includeInactive=true");
        assert_eq!(q.include_inactive, Some(true));
    }

    #[test]
    fn update_distinguishes_null_from_absent() {
        let req: UpdateProductRequest =
            serde_json::from_value(serde_json::json!({ "description": null, "brandId": 4 })).unwrap();
        assert_eq!(req.description, Some(None));
        assert_eq!(req.brand_id, Some(Some(4)));
        assert_eq!(req.color, None);
        assert_eq!(req.category_id, None);
    }

    fn parse_query(raw: &str) -> ListProductsQuery {
        let uri: http::Uri = format!("/api/products?{raw}").parse().unwrap();
        axum::extract::Query::<ListProductsQuery>::try_from_uri(&uri).unwrap().0
    }
}
