use axum::{extract::{Query, State}, Extension, Json};
use crate::auth::roles::Permission;
use crate::dtos::activity::{ActivityLogResponse, ActivityQuery};
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::activity::ActivityLog;
use crate::state::AppState;

// GET /activity - Audit trail, newest first
pub async fn list_activity(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityLogResponse>>, AppError> {
    auth.require(Permission::ViewActivity)?;

    let logs = sqlx::query_as::<_, ActivityLog>(
        r#"SELECT a.id, a.user_id, u.username, a.action, a.product_id, a.sku, a.details, a.created_at
           FROM activity_logs a
           LEFT JOIN users u ON a.user_id = u.id
           WHERE ($1::BIGINT IS NULL OR a.user_id = $1)
             AND ($2::activity_action IS NULL OR a.action = $2)
             AND ($3::BIGINT IS NULL OR a.product_id = $3)
           ORDER BY a.created_at DESC, a.id DESC
           LIMIT $4"#,
    )
    .bind(params.user_id)
    .bind(params.action)
    .bind(params.product_id)
    .bind(params.effective_limit())
    .fetch_all(&db_pool)
    .await?;

    Ok(Json(logs.into_iter().map(ActivityLogResponse::from).collect()))
}
