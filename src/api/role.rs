use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;
use sqlx::MySqlPool;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::error::ApiError;
use crate::model::role::Role;

#[derive(Serialize, ToSchema)]
pub struct RoleResponse {
    #[schema(example = 42)]
    pub user_id: u64,
    pub role: Role,
}

/// Role assigned to a user, if any.
pub async fn get_user_role(pool: &MySqlPool, user_id: u64) -> Result<Option<Role>, sqlx::Error> {
    let stored = sqlx::query_scalar::<_, String>("SELECT role FROM user_roles WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(stored.and_then(|r| match Role::from_str(&r) {
        Ok(role) => Some(role),
        Err(_) => {
            tracing::warn!(user_id, role = %r, "Unknown role stored for user");
            None
        }
    }))
}

pub async fn has_role(pool: &MySqlPool, user_id: u64, role: Role) -> Result<bool, sqlx::Error> {
    Ok(get_user_role(pool, user_id).await? == Some(role))
}

/// Role lookup (admin)
#[utoipa::path(
    get,
    path = "/api/roles/{user_id}",
    params(
        ("user_id" = u64, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Role found", body = RoleResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User has no role", body = Object, example = json!({
            "message": "Role not found"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn get_role(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let user_id = path.into_inner();

    let role = get_user_role(pool.get_ref(), user_id)
        .await
        .map_err(|e| ApiError::database(e, "Failed to look up role"))?
        .ok_or_else(|| ApiError::not_found("Role not found"))?;

    Ok(HttpResponse::Ok().json(RoleResponse { user_id, role }))
}
