use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use crate::auth::jwt::verify_token;
use crate::auth::roles::{Permission, Role};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: i64,
    pub role: Role,
    pub username: String,
}

impl AuthContext {
    /// Single policy check for a handler: the caller's role must grant `permission`.
    pub fn require(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.can(permission) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = self.user_id,
                username = %self.username,
                role = %self.role,
                ?permission,
                "Permission denied"
            );
            Err(AppError::forbidden(format!("Role '{}' is not allowed to perform this action", self.role)))
        }
    }
}

pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let auth_header = match req.headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok()) {
        Some(h) => h,
        None => return unauthorized("Missing Authorization header"),
    };

    // Expect "Bearer <token>"
    let token = match auth_header.strip_prefix("Bearer ") {
        Some(t) => t,
        None => return unauthorized("Invalid Authorization format"),
    };

    let claims = match verify_token(token, &state.config.jwt_secret) {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    // The token only proves identity; role and activation come from the current row
    let user = sqlx::query_as::<_, (String, Role, bool)>(
        "SELECT username, role, is_active FROM users WHERE id = $1",
    )
    .bind(claims.sub)
    .fetch_optional(&state.db_pool)
    .await;

    let (username, role) = match user {
        Ok(Some((username, role, true))) => (username, role),
        Ok(Some((_, _, false))) => return unauthorized("User inactive"),
        Ok(None) => return unauthorized("User no longer exists"),
        Err(e) => return AppError::db(e).into_response(),
    };

    if role != claims.role {
        tracing::info!(user_id = claims.sub, token_role = %claims.role, %role, "Role changed since token was issued");
    }

    // Attach context
    req.extensions_mut().insert(AuthContext {
        user_id: claims.sub,
        role,
        username,
    });

    next.run(req).await
}

fn unauthorized(msg: &str) -> Response {
    AppError::unauthorized(msg).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_checks_capability_table() {
        let cashier = AuthContext { user_id: 7, role: Role::Cashier, username: "ana".into() };
        assert!(cashier.require(Permission::CreateSales).is_ok());
        assert!(matches!(cashier.require(Permission::ManageProducts), Err(AppError::Forbidden(_))));
    }
}
