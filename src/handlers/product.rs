// src/handlers/product.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use sqlx::Postgres;
use crate::activity_log::{self, ActivityEntry};
use crate::auth::roles::Permission;
use crate::dtos::product::{
    AdjustStockRequest, BarcodePrintRequest, CreateProductRequest, DeletabilityResponse, DeleteOutcome,
    DeleteProductResponse, ListProductsQuery, ProductResponse, RestockRequest,
    StockMovementResponse, UpdateProductRequest,
};
use crate::error::{map_constraint_violation, AppError};
use crate::middleware::auth::AuthContext;
use crate::models::activity::ActivityAction;
use crate::models::product::{Product, ProductHistory, PRODUCT_COLUMNS, PRODUCT_JOINS};
use crate::models::stock_movement::{StockMovement, StockMovementType};
use crate::money::Money;
use crate::state::AppState;
use tracing::{error, info, instrument};

const MAX_BARCODE_COPIES: i32 = 500;

fn validate_new_product(payload: &CreateProductRequest) -> Result<(), AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::validation("Product name is required"));
    }
    if payload.sku.trim().is_empty() {
        return Err(AppError::validation("SKU is required"));
    }
    validate_prices(Some(payload.sale_price), payload.cost_price)?;
    if payload.stock.is_some_and(|s| s < 0) {
        return Err(AppError::validation("Initial stock cannot be negative"));
    }
    if payload.stock_min.is_some_and(|s| s < 0) {
        return Err(AppError::validation("Minimum stock cannot be negative"));
    }
    Ok(())
}

fn validate_product_update(payload: &UpdateProductRequest) -> Result<(), AppError> {
    if payload.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::validation("Product name cannot be empty"));
    }
    if payload.sku.as_deref().is_some_and(|s| s.trim().is_empty()) {
        return Err(AppError::validation("SKU cannot be empty"));
    }
    validate_prices(payload.sale_price, payload.cost_price)?;
    if payload.stock_min.is_some_and(|s| s < 0) {
        return Err(AppError::validation("Minimum stock cannot be negative"));
    }
    Ok(())
}

fn validate_prices(sale_price: Option<Money>, cost_price: Option<Money>) -> Result<(), AppError> {
    if sale_price.is_some_and(Money::is_negative) {
        return Err(AppError::validation("Sale price cannot be negative"));
    }
    if cost_price.is_some_and(Money::is_negative) {
        return Err(AppError::validation("Cost price cannot be negative"));
    }
    Ok(())
}

async fn fetch_product<'e, E>(executor: E, id: i64) -> Result<Product, AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Product>(&format!("SELECT {PRODUCT_COLUMNS} {PRODUCT_JOINS} WHERE p.id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))
}

async fn fetch_history<'e, E>(executor: E, id: i64) -> Result<ProductHistory, AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let history = sqlx::query_as::<_, ProductHistory>(
        r#"SELECT
            (SELECT COUNT(*) FROM stock_movements WHERE product_id = $1) AS movements,
            (SELECT COUNT(*) FROM sale_items     WHERE product_id = $1) AS sales,
            (SELECT COUNT(*) FROM purchase_items WHERE product_id = $1) AS purchases"#,
    )
    .bind(id)
    .fetch_one(executor)
    .await?;

    Ok(history)
}

// GET /products - List products, active only unless includeInactive=true
#[instrument(skip(db_pool, auth))]
pub async fn get_products(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<ListProductsQuery>,
) -> Result<Json<Vec<ProductResponse>>, AppError> {
    auth.require(Permission::ViewProducts)?;

    let include_inactive = params.include_inactive.unwrap_or(false);
    match sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} {PRODUCT_JOINS}
         WHERE ($1 OR p.is_active)
         ORDER BY p.name, p.sku"
    ))
    .bind(include_inactive)
    .fetch_all(&db_pool)
    .await
    {
        Ok(products) => Ok(Json(products.into_iter().map(ProductResponse::from).collect())),
        Err(e) => {
            error!(?e, "Failed to fetch products");
            Err(e.into())
        }
    }
}

// GET /products/low-stock - Active products at or below their minimum
pub async fn get_low_stock_products(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ProductResponse>>, AppError> {
    auth.require(Permission::ViewProducts)?;

    let products = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} {PRODUCT_JOINS}
         WHERE p.is_active AND p.stock_cached <= p.stock_min
         ORDER BY (p.stock_cached - p.stock_min), p.name"
    ))
    .fetch_all(&db_pool)
    .await?;

    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

// GET /products/:id - Get single product
#[instrument(skip(db_pool, auth))]
pub async fn get_product(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<ProductResponse>, AppError> {
    auth.require(Permission::ViewProducts)?;

    let product = fetch_product(&db_pool, id).await?;

    activity_log::record(
        &db_pool,
        ActivityEntry::new(Some(auth.user_id), ActivityAction::ViewProduct).product(product.id, &product.sku),
    )
    .await;

    Ok(Json(ProductResponse::from(product)))
}

// POST /products - Create new product
#[instrument(skip(db_pool, auth, payload), fields(sku = %payload.sku))]
pub async fn create_product(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), AppError> {
    auth.require(Permission::ManageProducts)?;
    validate_new_product(&payload)?;

    let id: i64 = sqlx::query_scalar(
        r#"INSERT INTO products
            (name, description, size, color, base_code, sku, sale_price, cost_price,
             stock_cached, stock_min, brand_id, category_id, supplier_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING id"#,
    )
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(&payload.size)
    .bind(&payload.color)
    .bind(&payload.base_code)
    .bind(payload.sku.trim())
    .bind(payload.sale_price)
    .bind(payload.cost_price.unwrap_or(Money::ZERO))
    .bind(payload.stock.unwrap_or(0))
    .bind(payload.stock_min.unwrap_or(0))
    .bind(payload.brand_id)
    .bind(payload.category_id)
    .bind(payload.supplier_id)
    .fetch_one(&db_pool)
    .await
    .map_err(|e| map_constraint_violation(e, "SKU already exists"))?;

    let product = fetch_product(&db_pool, id).await?;
    info!(product_id = id, "Product created");

    activity_log::record(
        &db_pool,
        ActivityEntry::new(Some(auth.user_id), ActivityAction::CreateProduct)
            .product(product.id, &product.sku)
            .details(product.name.clone()),
    )
    .await;

    Ok((StatusCode::CREATED, Json(ProductResponse::from(product))))
}

// PUT /products/:id - Update product
#[instrument(skip(db_pool, auth, payload))]
pub async fn update_product(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, AppError> {
    auth.require(Permission::ManageProducts)?;
    validate_product_update(&payload)?;

    // Stock is not editable here; it moves through sales, restocks, adjustments and purchases.
    // Optional columns take a (present, value) pair so that `null` clears them.
    let updated: Option<i64> = sqlx::query_scalar(
        r#"UPDATE products SET
            name = COALESCE($1, name),
            description = CASE WHEN $2 THEN $3 ELSE description END,
            size = CASE WHEN $4 THEN $5 ELSE size END,
            color = CASE WHEN $6 THEN $7 ELSE color END,
            base_code = CASE WHEN $8 THEN $9 ELSE base_code END,
            sku = COALESCE($10, sku),
            sale_price = COALESCE($11, sale_price),
            cost_price = COALESCE($12, cost_price),
            stock_min = COALESCE($13, stock_min),
            brand_id = CASE WHEN $14 THEN $15 ELSE brand_id END,
            category_id = CASE WHEN $16 THEN $17 ELSE category_id END,
            supplier_id = CASE WHEN $18 THEN $19 ELSE supplier_id END,
            updated_at = NOW()
        WHERE id = $20
        RETURNING id"#,
    )
    .bind(payload.name.as_deref().map(str::trim))
    .bind(payload.description.is_some())
    .bind(payload.description.clone().flatten())
    .bind(payload.size.is_some())
    .bind(payload.size.clone().flatten())
    .bind(payload.color.is_some())
    .bind(payload.color.clone().flatten())
    .bind(payload.base_code.is_some())
    .bind(payload.base_code.clone().flatten())
    .bind(payload.sku.as_deref().map(str::trim))
    .bind(payload.sale_price)
    .bind(payload.cost_price)
    .bind(payload.stock_min)
    .bind(payload.brand_id.is_some())
    .bind(payload.brand_id.flatten())
    .bind(payload.category_id.is_some())
    .bind(payload.category_id.flatten())
    .bind(payload.supplier_id.is_some())
    .bind(payload.supplier_id.flatten())
    .bind(id)
    .fetch_optional(&db_pool)
    .await
    .map_err(|e| map_constraint_violation(e, "SKU already exists"))?;

    if updated.is_none() {
        return Err(AppError::not_found("Product not found"));
    }

    let product = fetch_product(&db_pool, id).await?;

    activity_log::record(
        &db_pool,
        ActivityEntry::new(Some(auth.user_id), ActivityAction::UpdateProduct).product(product.id, &product.sku),
    )
    .await;

    Ok(Json(ProductResponse::from(product)))
}

// DELETE /products/:id - Hard delete without history, deactivate otherwise
#[instrument(skip(db_pool, auth))]
pub async fn delete_product(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteProductResponse>, AppError> {
    auth.require(Permission::ManageProducts)?;

    let mut tx = db_pool.begin().await?;

    let sku: String = sqlx::query_scalar("SELECT sku FROM products WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))?;

    let history = fetch_history(&mut *tx, id).await?;

    let (outcome, entry) = if history.can_be_deleted() {
        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        (
            DeleteOutcome::Deleted,
            ActivityEntry::new(Some(auth.user_id), ActivityAction::DeleteProduct).sku(&sku),
        )
    } else {
        sqlx::query("UPDATE products SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        (
            DeleteOutcome::Deactivated,
            ActivityEntry::new(Some(auth.user_id), ActivityAction::DeactivateProduct).product(id, &sku),
        )
    };

    tx.commit().await?;
    info!(product_id = id, ?outcome, "Product removed");

    activity_log::record(&db_pool, entry).await;

    let message = match outcome {
        DeleteOutcome::Deleted => "Product deleted".to_string(),
        DeleteOutcome::Deactivated => format!(
            "Product has history ({} movements, {} sales, {} purchases) and was deactivated",
            history.movements, history.sales, history.purchases
        ),
    };

    Ok(Json(DeleteProductResponse { outcome, message }))
}

// PATCH /products/:id/reactivate
pub async fn reactivate_product(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<ProductResponse>, AppError> {
    auth.require(Permission::ManageProducts)?;

    let result = sqlx::query("UPDATE products SET is_active = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Product not found"));
    }

    let product = fetch_product(&db_pool, id).await?;

    activity_log::record(
        &db_pool,
        ActivityEntry::new(Some(auth.user_id), ActivityAction::ReactivateProduct).product(product.id, &product.sku),
    )
    .await;

    Ok(Json(ProductResponse::from(product)))
}

// GET /products/:id/deletability
pub async fn get_deletability(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<DeletabilityResponse>, AppError> {
    auth.require(Permission::ViewProducts)?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
        .bind(id)
        .fetch_one(&db_pool)
        .await?;
    if !exists {
        return Err(AppError::not_found("Product not found"));
    }

    let history = fetch_history(&db_pool, id).await?;
    Ok(Json(DeletabilityResponse::from(history)))
}

// POST /products/:id/restock
#[instrument(skip(db_pool, auth, req))]
pub async fn restock_product(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(req): Json<RestockRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), AppError> {
    auth.require(Permission::AdjustStock)?;

    if req.quantity <= 0 {
        return Err(AppError::validation("Quantity must be greater than 0"));
    }

    let mut tx = db_pool.begin().await?;

    let sku: String = sqlx::query_scalar(
        "UPDATE products SET stock_cached = stock_cached + $1, updated_at = NOW() WHERE id = $2 RETURNING sku",
    )
    .bind(req.quantity)
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("Product not found"))?;

    sqlx::query(
        r#"INSERT INTO stock_movements (product_id, movement_type, quantity, notes, created_by)
        VALUES ($1, $2, $3, $4, $5)"#,
    )
    .bind(id)
    .bind(StockMovementType::RestockIn)
    .bind(req.quantity)
    .bind(&req.notes)
    .bind(auth.user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    activity_log::record(
        &db_pool,
        ActivityEntry::new(Some(auth.user_id), ActivityAction::RestockProduct)
            .product(id, sku)
            .details(format!("+{} units", req.quantity)),
    )
    .await;

    let product = fetch_product(&db_pool, id).await?;
    Ok((StatusCode::CREATED, Json(ProductResponse::from(product))))
}

// POST /products/:id/adjustments - Signed correction after a physical count
#[instrument(skip(db_pool, auth, req))]
pub async fn adjust_stock(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(req): Json<AdjustStockRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), AppError> {
    auth.require(Permission::AdjustStock)?;

    if req.quantity == 0 {
        return Err(AppError::validation("Adjustment quantity cannot be 0"));
    }
    let notes = req.notes.trim();
    if notes.is_empty() {
        return Err(AppError::validation("A reason is required for stock adjustments"));
    }

    let mut tx = db_pool.begin().await?;

    // Same guard as the sale decrement: stock never goes below zero
    let sku: Option<String> = sqlx::query_scalar(
        r#"UPDATE products SET stock_cached = stock_cached + $1, updated_at = NOW()
        WHERE id = $2 AND stock_cached + $1 >= 0
        RETURNING sku"#,
    )
    .bind(req.quantity)
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(sku) = sku else {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        return Err(if exists {
            AppError::conflict(format!("Adjustment of {} would leave negative stock", req.quantity))
        } else {
            AppError::not_found("Product not found")
        });
    };

    sqlx::query(
        r#"INSERT INTO stock_movements (product_id, movement_type, quantity, notes, created_by)
        VALUES ($1, $2, $3, $4, $5)"#,
    )
    .bind(id)
    .bind(StockMovementType::Adjustment)
    .bind(req.quantity)
    .bind(notes)
    .bind(auth.user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(product_id = id, quantity = req.quantity, "Stock adjusted");

    activity_log::record(
        &db_pool,
        ActivityEntry::new(Some(auth.user_id), ActivityAction::AdjustStock)
            .product(id, sku)
            .details(format!("{:+} units: {notes}", req.quantity)),
    )
    .await;

    let product = fetch_product(&db_pool, id).await?;
    Ok((StatusCode::CREATED, Json(ProductResponse::from(product))))
}

// GET /products/:id/movements - Stock ledger, newest first
pub async fn get_product_movements(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<StockMovementResponse>>, AppError> {
    auth.require(Permission::ViewProducts)?;

    let movements = sqlx::query_as::<_, StockMovement>(
        r#"SELECT sm.id, sm.product_id, sm.movement_type, sm.quantity, sm.reference_id,
                  sm.notes, sm.created_by, u.username AS created_by_username, sm.created_at
           FROM stock_movements sm
           LEFT JOIN users u ON sm.created_by = u.id
           WHERE sm.product_id = $1
           ORDER BY sm.created_at DESC, sm.id DESC"#,
    )
    .bind(id)
    .fetch_all(&db_pool)
    .await?;

    Ok(Json(movements.into_iter().map(StockMovementResponse::from).collect()))
}

// POST /products/:id/barcode-prints - Audit a label print job
pub async fn record_barcode_print(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(req): Json<BarcodePrintRequest>,
) -> Result<StatusCode, AppError> {
    auth.require(Permission::PrintBarcodes)?;

    let copies = req.copies.unwrap_or(1);
    if !(1..=MAX_BARCODE_COPIES).contains(&copies) {
        return Err(AppError::validation(format!("Copies must be between 1 and {MAX_BARCODE_COPIES}")));
    }

    let sku: String = sqlx::query_scalar("SELECT sku FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))?;

    activity_log::record(
        &db_pool,
        ActivityEntry::new(Some(auth.user_id), ActivityAction::PrintBarcode)
            .product(id, sku)
            .details(format!("{copies} label(s)")),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
