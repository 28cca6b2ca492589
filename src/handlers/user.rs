use bcrypt::{hash, verify, DEFAULT_COST};
use axum::{extract::{Path, State}, http::StatusCode, Extension, Json};
use tracing::{info, instrument};
use crate::activity_log::{self, ActivityEntry};
use crate::auth::jwt::{sign_token, TOKEN_TTL_HOURS};
use crate::auth::roles::Permission;
use crate::dtos::user::{CreateUserRequest, LoginRequest, LoginResponse, UpdateUserRequest, UserResponse};
use crate::error::{map_constraint_violation, AppError};
use crate::middleware::auth::AuthContext;
use crate::models::activity::ActivityAction;
use crate::models::user::User;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 6;
const USER_COLUMNS: &str = "id, username, password_hash, role, is_active, created_at";

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, DEFAULT_COST).map_err(|e| AppError::internal(format!("Hash error: {e}")))
}

// POST /auth/login
#[instrument(skip_all, fields(username = %payload.username))]
pub async fn login_user(
    State(AppState { db_pool, config }): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    if payload.username.trim().is_empty() {
        return Err(AppError::validation("Username required"));
    }
    if payload.password.is_empty() {
        return Err(AppError::validation("Password required"));
    }

    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
        .bind(payload.username.trim())
        .fetch_optional(&db_pool)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid credentials"))?;

    if !user.is_active {
        return Err(AppError::forbidden("User inactive"));
    }

    let ok = verify(&payload.password, &user.password_hash)
        .map_err(|e| AppError::internal(format!("Password verify error: {e}")))?;

    if !ok {
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    let token = sign_token(user.id, user.role, &user.username, &config.jwt_secret)?;

    activity_log::record(&db_pool, ActivityEntry::new(Some(user.id), ActivityAction::Login)).await;
    info!(user_id = user.id, "User logged in");

    Ok(Json(LoginResponse {
        access_token: token,
        token_type: "Bearer",
        expires_in_seconds: TOKEN_TTL_HOURS * 60 * 60,
        user: UserResponse::from(user),
    }))
}

// Authenticated endpoint: returns full user profile from DB using the id in AuthContext
pub async fn get_me(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UserResponse>, AppError> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(auth.user_id)
        .fetch_optional(&db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(Json(UserResponse::from(user)))
}

// GET /users
pub async fn list_users(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    auth.require(Permission::ManageUsers)?;

    let users = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY username"))
        .fetch_all(&db_pool)
        .await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

// POST /users
#[instrument(skip_all, fields(username = %payload.username, role = %payload.role))]
pub async fn create_user(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    auth.require(Permission::ManageUsers)?;

    let username = payload.username.trim();
    if username.is_empty() {
        return Err(AppError::validation("Username required"));
    }
    validate_password(&payload.password)?;
    let password_hash = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (username, password_hash, role) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
    ))
    .bind(username)
    .bind(password_hash)
    .bind(payload.role)
    .fetch_one(&db_pool)
    .await
    .map_err(|e| map_constraint_violation(e, "Username already exists"))?;

    activity_log::record(
        &db_pool,
        ActivityEntry::new(Some(auth.user_id), ActivityAction::CreateUser)
            .details(format!("{} ({})", user.username, user.role)),
    )
    .await;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

// PATCH /users/:id - Change role, activation or password
#[instrument(skip(db_pool, auth, payload))]
pub async fn update_user(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    auth.require(Permission::ManageUsers)?;

    // An admin locking themselves out leaves nobody to undo it
    if id == auth.user_id && (payload.is_active == Some(false) || payload.role.is_some_and(|r| r != auth.role)) {
        return Err(AppError::validation("You cannot deactivate or demote your own account"));
    }

    let password_hash = match payload.password.as_deref() {
        Some(password) => {
            validate_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET
            role = COALESCE($1, role),
            is_active = COALESCE($2, is_active),
            password_hash = COALESCE($3, password_hash)
         WHERE id = $4
         RETURNING {USER_COLUMNS}"
    ))
    .bind(payload.role)
    .bind(payload.is_active)
    .bind(password_hash)
    .bind(id)
    .fetch_optional(&db_pool)
    .await?
    .ok_or_else(|| AppError::not_found("User not found"))?;

    activity_log::record(
        &db_pool,
        ActivityEntry::new(Some(auth.user_id), ActivityAction::UpdateUser).details(format!(
            "{}: role={}, active={}",
            user.username, user.role, user.is_active
        )),
    )
    .await;

    Ok(Json(UserResponse::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_length_is_enforced() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn hashes_verify() {
        // Low cost keeps the test fast; production uses DEFAULT_COST
        let hashed = bcrypt::hash("s3cret!", 4).unwrap();
        assert!(verify("s3cret!", &hashed).unwrap());
        assert!(!verify("wrong", &hashed).unwrap());
    }
}
