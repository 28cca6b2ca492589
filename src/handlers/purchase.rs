use std::collections::HashMap;
use axum::{extract::State, http::StatusCode, Extension, Json};
use sqlx::PgPool;
use tracing::{info, instrument};
use crate::activity_log::{self, ActivityEntry};
use crate::auth::roles::Permission;
use crate::dtos::purchase::{CreatePurchaseRequest, PurchaseItemResponse, PurchaseLineRequest, PurchaseResponse};
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::activity::ActivityAction;
use crate::models::purchase::{Purchase, PurchaseItem};
use crate::models::stock_movement::StockMovementType;
use crate::money::Money;
use crate::pricing::amount_too_large;
use crate::state::AppState;

const PURCHASE_COLUMNS: &str = r#"
    SELECT pu.id, pu.supplier_id, s.name AS supplier_name, pu.user_id, u.username,
           pu.notes, pu.created_at
    FROM purchases pu
    JOIN users u ON pu.user_id = u.id
    LEFT JOIN suppliers s ON pu.supplier_id = s.id
"#;

const PURCHASE_ITEM_COLUMNS: &str = r#"
    SELECT pi.id, pi.purchase_id, pi.product_id, p.name AS product_name,
           pi.quantity, pi.unit_cost
    FROM purchase_items pi
    JOIN products p ON pi.product_id = p.id
"#;

fn validate_purchase(items: &[PurchaseLineRequest]) -> Result<(), AppError> {
    if items.is_empty() {
        return Err(AppError::validation("Purchase must contain at least one item"));
    }
    for (idx, item) in items.iter().enumerate() {
        if item.quantity <= 0 {
            return Err(AppError::validation(format!("Line {}: quantity must be greater than 0", idx + 1)));
        }
        if item.unit_cost.is_negative() {
            return Err(AppError::validation(format!("Line {}: unit cost cannot be negative", idx + 1)));
        }
    }
    let line_costs = items
        .iter()
        .map(|i| i.unit_cost.checked_mul(i.quantity))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(amount_too_large)?;
    Money::checked_sum(line_costs).ok_or_else(amount_too_large)?;
    Ok(())
}

fn to_response(purchase: Purchase, items: Vec<PurchaseItem>) -> PurchaseResponse {
    let items: Vec<PurchaseItemResponse> = items
        .into_iter()
        .map(|i| PurchaseItemResponse {
            id: i.id,
            product_id: i.product_id,
            product_name: i.product_name,
            quantity: i.quantity,
            unit_cost: i.unit_cost,
            line_cost: i.unit_cost.saturating_mul(i.quantity),
        })
        .collect();
    let total_cost = items.iter().fold(Money::ZERO, |acc, i| acc.saturating_add(i.line_cost));

    PurchaseResponse {
        id: purchase.id,
        supplier_id: purchase.supplier_id,
        supplier_name: purchase.supplier_name,
        user_id: purchase.user_id,
        username: purchase.username,
        notes: purchase.notes,
        created_at: purchase.created_at,
        items,
        total_cost,
    }
}

// POST /purchases - Receive supplier goods into stock
#[instrument(skip_all, fields(user_id = auth.user_id, lines = req.items.len()))]
pub async fn create_purchase(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreatePurchaseRequest>,
) -> Result<(StatusCode, Json<PurchaseResponse>), AppError> {
    auth.require(Permission::ManagePurchases)?;
    validate_purchase(&req.items)?;

    let mut tx = db_pool.begin().await?;

    if let Some(supplier_id) = req.supplier_id {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM suppliers WHERE id = $1)")
            .bind(supplier_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(AppError::not_found("Supplier not found"));
        }
    }

    // Lock in id order, as sales do, so concurrent purchases cannot deadlock
    let mut product_ids: Vec<i64> = req.items.iter().map(|i| i.product_id).collect();
    product_ids.sort_unstable();
    product_ids.dedup();

    let locked: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(&product_ids)
    .fetch_all(&mut *tx)
    .await?;

    if let Some(missing) = product_ids.iter().find(|id| !locked.contains(id)) {
        return Err(AppError::not_found(format!("Product {missing} not found")));
    }

    let purchase_id: i64 = sqlx::query_scalar(
        "INSERT INTO purchases (supplier_id, user_id, notes) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(req.supplier_id)
    .bind(auth.user_id)
    .bind(&req.notes)
    .fetch_one(&mut *tx)
    .await?;

    for item in &req.items {
        sqlx::query(
            "UPDATE products SET stock_cached = stock_cached + $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(item.quantity)
        .bind(item.product_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO purchase_items (purchase_id, product_id, quantity, unit_cost) VALUES ($1, $2, $3, $4)",
        )
        .bind(purchase_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.unit_cost)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO stock_movements (product_id, movement_type, quantity, reference_id, notes, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(item.product_id)
        .bind(StockMovementType::PurchaseIn)
        .bind(item.quantity)
        .bind(purchase_id)
        .bind(format!("Purchase #{purchase_id}"))
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let purchase = fetch_purchase_by_id(&db_pool, purchase_id).await?;
    info!(purchase_id, total_cost = %purchase.total_cost, "Purchase registered");

    activity_log::record(
        &db_pool,
        ActivityEntry::new(Some(auth.user_id), ActivityAction::CreatePurchase).details(format!(
            "Purchase #{purchase_id}: {} line(s), cost {}",
            purchase.items.len(),
            purchase.total_cost
        )),
    )
    .await;

    Ok((StatusCode::CREATED, Json(purchase)))
}

// GET /purchases
pub async fn list_purchases(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<PurchaseResponse>>, AppError> {
    auth.require(Permission::ManagePurchases)?;

    let purchases = sqlx::query_as::<_, Purchase>(&format!(
        "{PURCHASE_COLUMNS} ORDER BY pu.created_at DESC, pu.id DESC"
    ))
    .fetch_all(&db_pool)
    .await?;

    let ids: Vec<i64> = purchases.iter().map(|p| p.id).collect();
    let items = sqlx::query_as::<_, PurchaseItem>(&format!(
        "{PURCHASE_ITEM_COLUMNS} WHERE pi.purchase_id = ANY($1) ORDER BY pi.purchase_id, pi.id"
    ))
    .bind(&ids)
    .fetch_all(&db_pool)
    .await?;

    let mut items_by_purchase: HashMap<i64, Vec<PurchaseItem>> = HashMap::new();
    for item in items {
        items_by_purchase.entry(item.purchase_id).or_default().push(item);
    }

    Ok(Json(
        purchases
            .into_iter()
            .map(|p| {
                let items = items_by_purchase.remove(&p.id).unwrap_or_default();
                to_response(p, items)
            })
            .collect(),
    ))
}

async fn fetch_purchase_by_id(db_pool: &PgPool, id: i64) -> Result<PurchaseResponse, AppError> {
    let purchase = sqlx::query_as::<_, Purchase>(&format!("{PURCHASE_COLUMNS} WHERE pu.id = $1"))
        .bind(id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("Purchase not found"))?;

    let items = sqlx::query_as::<_, PurchaseItem>(&format!(
        "{PURCHASE_ITEM_COLUMNS} WHERE pi.purchase_id = $1 ORDER BY pi.id"
    ))
    .bind(id)
    .fetch_all(db_pool)
    .await?;

    Ok(to_response(purchase, items))
}
