use axum::{extract::{Path, State}, Json, Extension};
use axum::http::StatusCode;
use sqlx::PgPool;
use crate::auth::roles::Permission;
use crate::dtos::catalog::{BrandRequest, CategoryRequest, SupplierRequest};
use crate::error::{map_constraint_violation, AppError};
use crate::middleware::auth::AuthContext;
use crate::models::catalog::{Brand, Category, Supplier};
use crate::state::AppState;

fn required_name(name: &str, what: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation(format!("{what} name is required")));
    }
    Ok(name.to_string())
}

/// Removes a catalog row unless a product still points at it.
async fn delete_unreferenced(
    db_pool: &PgPool,
    table: &'static str,
    fk_column: &'static str,
    id: i64,
    what: &str,
) -> Result<StatusCode, AppError> {
    let in_use: bool = sqlx::query_scalar(&format!(
        "SELECT EXISTS(SELECT 1 FROM products WHERE {fk_column} = $1)"
    ))
    .bind(id)
    .fetch_one(db_pool)
    .await?;

    if in_use {
        return Err(AppError::conflict(format!("Cannot delete {what} that is assigned to products")));
    }

    let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
        .bind(id)
        .execute(db_pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|d| d.code().as_deref() == Some("23503")) {
                return AppError::conflict(format!("Cannot delete {what} that is referenced by other records"));
            }
            AppError::db(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found(format!("{what} not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ==================== Brands ====================

pub async fn list_brands(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Brand>>, AppError> {
    auth.require(Permission::ViewProducts)?;

    let brands = sqlx::query_as::<_, Brand>("SELECT id, name, created_at FROM brands ORDER BY name")
        .fetch_all(&db_pool)
        .await?;
    Ok(Json(brands))
}

pub async fn create_brand(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<BrandRequest>,
) -> Result<(StatusCode, Json<Brand>), AppError> {
    auth.require(Permission::ManageCatalog)?;
    let name = required_name(&req.name, "Brand")?;

    let brand = sqlx::query_as::<_, Brand>(
        "INSERT INTO brands (name) VALUES ($1) RETURNING id, name, created_at",
    )
    .bind(name)
    .fetch_one(&db_pool)
    .await
    .map_err(|e| map_constraint_violation(e, "Brand name already exists"))?;

    Ok((StatusCode::CREATED, Json(brand)))
}

pub async fn update_brand(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(req): Json<BrandRequest>,
) -> Result<Json<Brand>, AppError> {
    auth.require(Permission::ManageCatalog)?;
    let name = required_name(&req.name, "Brand")?;

    let brand = sqlx::query_as::<_, Brand>(
        "UPDATE brands SET name = $1 WHERE id = $2 RETURNING id, name, created_at",
    )
    .bind(name)
    .bind(id)
    .fetch_optional(&db_pool)
    .await
    .map_err(|e| map_constraint_violation(e, "Brand name already exists"))?
    .ok_or_else(|| AppError::not_found("Brand not found"))?;

    Ok(Json(brand))
}

pub async fn delete_brand(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    auth.require(Permission::ManageCatalog)?;
    delete_unreferenced(&db_pool, "brands", "brand_id", id, "Brand").await
}

// ==================== Categories ====================

pub async fn list_categories(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Category>>, AppError> {
    auth.require(Permission::ViewProducts)?;

    let categories = sqlx::query_as::<_, Category>(
        "SELECT id, name, description, created_at FROM categories ORDER BY name",
    )
    .fetch_all(&db_pool)
    .await?;
    Ok(Json(categories))
}

pub async fn create_category(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    auth.require(Permission::ManageCatalog)?;
    let name = required_name(&req.name, "Category")?;

    let category = sqlx::query_as::<_, Category>(
        "INSERT INTO categories (name, description) VALUES ($1, $2)
         RETURNING id, name, description, created_at",
    )
    .bind(name)
    .bind(req.description)
    .fetch_one(&db_pool)
    .await
    .map_err(|e| map_constraint_violation(e, "Category name already exists"))?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(req): Json<CategoryRequest>,
) -> Result<Json<Category>, AppError> {
    auth.require(Permission::ManageCatalog)?;
    let name = required_name(&req.name, "Category")?;

    let category = sqlx::query_as::<_, Category>(
        "UPDATE categories SET name = $1, description = COALESCE($2, description) WHERE id = $3
         RETURNING id, name, description, created_at",
    )
    .bind(name)
    .bind(req.description)
    .bind(id)
    .fetch_optional(&db_pool)
    .await
    .map_err(|e| map_constraint_violation(e, "Category name already exists"))?
    .ok_or_else(|| AppError::not_found("Category not found"))?;

    Ok(Json(category))
}

pub async fn delete_category(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    auth.require(Permission::ManageCatalog)?;
    delete_unreferenced(&db_pool, "categories", "category_id", id, "Category").await
}

// ==================== Suppliers ====================

pub async fn list_suppliers(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Supplier>>, AppError> {
    auth.require(Permission::ViewProducts)?;

    let suppliers = sqlx::query_as::<_, Supplier>(
        "SELECT id, name, contact_name, phone, email, created_at FROM suppliers ORDER BY name",
    )
    .fetch_all(&db_pool)
    .await?;
    Ok(Json(suppliers))
}

pub async fn create_supplier(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<SupplierRequest>,
) -> Result<(StatusCode, Json<Supplier>), AppError> {
    auth.require(Permission::ManageCatalog)?;
    let name = required_name(&req.name, "Supplier")?;

    let supplier = sqlx::query_as::<_, Supplier>(
        "INSERT INTO suppliers (name, contact_name, phone, email) VALUES ($1, $2, $3, $4)
         RETURNING id, name, contact_name, phone, email, created_at",
    )
    .bind(name)
    .bind(req.contact_name)
    .bind(req.phone)
    .bind(req.email)
    .fetch_one(&db_pool)
    .await
    .map_err(|e| map_constraint_violation(e, "Supplier name already exists"))?;

    Ok((StatusCode::CREATED, Json(supplier)))
}

pub async fn update_supplier(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(req): Json<SupplierRequest>,
) -> Result<Json<Supplier>, AppError> {
    auth.require(Permission::ManageCatalog)?;
    let name = required_name(&req.name, "Supplier")?;

    let supplier = sqlx::query_as::<_, Supplier>(
        "UPDATE suppliers SET
            name = $1,
            contact_name = COALESCE($2, contact_name),
            phone = COALESCE($3, phone),
            email = COALESCE($4, email)
         WHERE id = $5
         RETURNING id, name, contact_name, phone, email, created_at",
    )
    .bind(name)
    .bind(req.contact_name)
    .bind(req.phone)
    .bind(req.email)
    .bind(id)
    .fetch_optional(&db_pool)
    .await
    .map_err(|e| map_constraint_violation(e, "Supplier name already exists"))?
    .ok_or_else(|| AppError::not_found("Supplier not found"))?;

    Ok(Json(supplier))
}

pub async fn delete_supplier(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    auth.require(Permission::ManageCatalog)?;
    delete_unreferenced(&db_pool, "suppliers", "supplier_id", id, "Supplier").await
}
