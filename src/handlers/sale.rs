use std::collections::HashMap;
use axum::{extract::{Path, Query, State}, Json, Extension};
use axum::http::StatusCode;
use sqlx::{PgPool, Postgres};
use tracing::{info, instrument};
use crate::activity_log::{self, ActivityEntry};
use crate::auth::roles::Permission;
use crate::dtos::sale::{
    CreateSaleRequest, CreateSaleResponse, ListSalesQuery, SaleResponse,
};
use crate::error::AppError;
use crate::handlers::config::load_tax_defaults;
use crate::middleware::auth::AuthContext;
use crate::models::activity::ActivityAction;
use crate::models::sale::{Sale, SaleItem};
use crate::models::stock_movement::StockMovementType;
use crate::money::{Money, TaxRate};
use crate::pricing::{build_quote, price_line, validate_cart, CatalogPrice, Quote};
use crate::state::AppState;

const SALE_COLUMNS: &str = r#"
    SELECT s.id, s.user_id, u.username, s.tax_included, s.tax_rate_bps,
           s.subtotal, s.tax_amount, s.total, s.created_at
    FROM sales s
    JOIN users u ON s.user_id = u.id
"#;

const SALE_ITEM_COLUMNS: &str = r#"
    SELECT si.id, si.sale_id, si.product_id, p.name AS product_name, p.sku,
           b.name AS brand_name, c.name AS category_name,
           si.quantity, si.unit_price, si.discount
    FROM sale_items si
    JOIN products p ON si.product_id = p.id
    LEFT JOIN brands b ON p.brand_id = b.id
    LEFT JOIN categories c ON p.category_id = c.id
"#;

#[derive(sqlx::FromRow)]
struct CatalogRow {
    id: i64,
    name: String,
    sku: String,
    sale_price: Money,
    is_active: bool,
}

// POST /sales - Register a sale and take its units out of stock
#[instrument(skip_all, fields(user_id = auth.user_id, lines = req.items.len()))]
pub async fn create_sale(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateSaleRequest>,
) -> Result<(StatusCode, Json<CreateSaleResponse>), AppError> {
    auth.require(Permission::CreateSales)?;
    validate_cart(&req.items)?;

    let (tax_included, tax_rate) = resolve_tax(&db_pool, req.tax_included, req.tax_rate).await;

    // Start transaction
    let mut tx = db_pool.begin().await?;

    // Lock every referenced product in id order so concurrent sales cannot interleave stock updates
    let catalog = load_catalog(&mut *tx, &req.items, true).await?;

    let mut lines = Vec::with_capacity(req.items.len());
    for item in &req.items {
        let row = &catalog[&item.product_id];
        lines.push(price_line(item, &catalog_price(row))?);
    }
    let quote = build_quote(lines, tax_included, tax_rate)?;

    // Create sale record
    let sale_id: i64 = sqlx::query_scalar(
        r#"INSERT INTO sales (user_id, tax_included, tax_rate_bps, subtotal, tax_amount, total)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id"#,
    )
    .bind(auth.user_id)
    .bind(quote.tax_included)
    .bind(quote.tax_rate.bps() as i32)
    .bind(quote.breakdown.subtotal)
    .bind(quote.breakdown.tax_amount)
    .bind(quote.breakdown.total)
    .fetch_one(&mut *tx)
    .await?;

    for line in &quote.lines {
        sqlx::query(
            r#"INSERT INTO sale_items (sale_id, product_id, quantity, unit_price, discount)
            VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(sale_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.discount)
        .execute(&mut *tx)
        .await?;
    }

    for line in &quote.lines {
        // Conditional decrement: never lets stock go negative
        let updated = sqlx::query(
            r#"UPDATE products
            SET stock_cached = stock_cached - $1, updated_at = NOW()
            WHERE id = $2 AND stock_cached >= $1"#,
        )
        .bind(line.quantity)
        .bind(line.product_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls back the sale and earlier decrements
            let row = &catalog[&line.product_id];
            return Err(AppError::conflict(format!(
                "Insufficient stock for '{}' ({})",
                row.name, row.sku
            )));
        }

        sqlx::query(
            r#"INSERT INTO stock_movements (product_id, movement_type, quantity, reference_id, notes, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(line.product_id)
        .bind(StockMovementType::SaleOut)
        .bind(-line.quantity)
        .bind(sale_id)
        .bind(format!("Sale #{sale_id}"))
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await?;
    }

    // Commit transaction
    tx.commit().await?;

    info!(sale_id, total = %quote.breakdown.total, "Sale registered");

    activity_log::record(
        &db_pool,
        ActivityEntry::new(Some(auth.user_id), ActivityAction::CreateSale).details(format!(
            "Sale #{sale_id}: {} line(s), total {}",
            quote.lines.len(),
            quote.breakdown.total
        )),
    )
    .await;

    let sale = fetch_sale_by_id(&db_pool, sale_id).await?;
    Ok((StatusCode::CREATED, Json(CreateSaleResponse { folio: sale_id, sale })))
}

// POST /sales/quote - Price a cart without persisting anything
#[instrument(skip_all, fields(lines = req.items.len()))]
pub async fn quote_sale(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateSaleRequest>,
) -> Result<Json<Quote>, AppError> {
    auth.require(Permission::CreateSales)?;
    validate_cart(&req.items)?;

    let (tax_included, tax_rate) = resolve_tax(&db_pool, req.tax_included, req.tax_rate).await;
    let catalog = load_catalog(&db_pool, &req.items, false).await?;

    let lines = req
        .items
        .iter()
        .map(|item| price_line(item, &catalog_price(&catalog[&item.product_id])))
        .collect::<Result<Vec<_>, _>>()?;

    build_quote(lines, tax_included, tax_rate).map(Json)
}

// GET /sales - Sales history with nested items
#[instrument(skip(db_pool))]
pub async fn list_sales(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<ListSalesQuery>,
) -> Result<Json<Vec<SaleResponse>>, AppError> {
    auth.require(Permission::ViewSales)?;

    if let (Some(from), Some(to)) = (params.from, params.to) {
        if from > to {
            return Err(AppError::validation("'from' must not be after 'to'"));
        }
    }

    let sales = sqlx::query_as::<_, Sale>(&format!(
        "{SALE_COLUMNS}
        WHERE ($1::DATE IS NULL OR s.created_at::DATE >= $1)
          AND ($2::DATE IS NULL OR s.created_at::DATE <= $2)
        ORDER BY s.created_at DESC, s.id DESC"
    ))
    .bind(params.from)
    .bind(params.to)
    .fetch_all(&db_pool)
    .await?;

    let sale_ids: Vec<i64> = sales.iter().map(|s| s.id).collect();
    let items = sqlx::query_as::<_, SaleItem>(&format!(
        "{SALE_ITEM_COLUMNS} WHERE si.sale_id = ANY($1) ORDER BY si.sale_id, si.id"
    ))
    .bind(&sale_ids)
    .fetch_all(&db_pool)
    .await?;

    let mut items_by_sale: HashMap<i64, Vec<SaleItem>> = HashMap::new();
    for item in items {
        items_by_sale.entry(item.sale_id).or_default().push(item);
    }

    Ok(Json(
        sales
            .into_iter()
            .map(|sale| {
                let items = items_by_sale.remove(&sale.id).unwrap_or_default();
                SaleResponse::from_parts(sale, items)
            })
            .collect(),
    ))
}

// GET /sales/:id
pub async fn get_sale(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<SaleResponse>, AppError> {
    auth.require(Permission::ViewSales)?;
    fetch_sale_by_id(&db_pool, id).await.map(Json)
}

// Helper function to fetch full sale details
async fn fetch_sale_by_id(db_pool: &PgPool, id: i64) -> Result<SaleResponse, AppError> {
    let sale = sqlx::query_as::<_, Sale>(&format!("{SALE_COLUMNS} WHERE s.id = $1"))
        .bind(id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("Sale not found"))?;

    let items = sqlx::query_as::<_, SaleItem>(&format!("{SALE_ITEM_COLUMNS} WHERE si.sale_id = $1 ORDER BY si.id"))
        .bind(id)
        .fetch_all(db_pool)
        .await?;

    Ok(SaleResponse::from_parts(sale, items))
}

/// Request values win; store settings fill the gaps.
async fn resolve_tax(
    db_pool: &PgPool,
    tax_included: Option<bool>,
    tax_rate: Option<TaxRate>,
) -> (bool, TaxRate) {
    if let (Some(included), Some(rate)) = (tax_included, tax_rate) {
        return (included, rate);
    }
    let defaults = load_tax_defaults(db_pool).await;
    (
        tax_included.unwrap_or(defaults.tax_included),
        tax_rate.unwrap_or(defaults.tax_rate),
    )
}

/// Loads every product the cart references; any unknown id is a 404.
async fn load_catalog<'e, E>(
    executor: E,
    items: &[crate::dtos::sale::SaleLineRequest],
    lock: bool,
) -> Result<HashMap<i64, CatalogRow>, AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let mut ids: Vec<i64> = items.iter().map(|i| i.product_id).collect();
    ids.sort_unstable();
    ids.dedup();

    let sql = if lock {
        "SELECT id, name, sku, sale_price, is_active FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
    } else {
        "SELECT id, name, sku, sale_price, is_active FROM products WHERE id = ANY($1)"
    };

    let rows = sqlx::query_as::<_, CatalogRow>(sql)
        .bind(&ids)
        .fetch_all(executor)
        .await?;

    let catalog: HashMap<i64, CatalogRow> = rows.into_iter().map(|r| (r.id, r)).collect();
    if let Some(missing) = ids.iter().find(|id| !catalog.contains_key(id)) {
        return Err(AppError::not_found(format!("Product {missing} not found")));
    }
    Ok(catalog)
}

fn catalog_price(row: &CatalogRow) -> CatalogPrice {
    CatalogPrice {
        product_id: row.id,
        name: row.name.clone(),
        sale_price: row.sale_price,
        is_active: row.is_active,
    }
}
