use crate::{
    api::role::get_user_role,
    auth::{
        auth::AuthUser,
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    error::ApiError,
    model::role::Role,
    models::{Claims, LoginReqDto, LoginResponse, SessionResponse, SignupReq, TokenType, UserSql},
    utils::{
        email_cache, email_filter,
        query_cache::{Mutation, StatsCache},
    },
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use std::str::FromStr;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

/// true  => email AVAILABLE
/// false => email TAKEN
pub async fn is_email_available(email: &str, pool: &MySqlPool) -> Result<bool, sqlx::Error> {
    let email = email_filter::normalize(email);

    // Cuckoo filter: a miss means the email was never registered
    if !email_filter::might_exist(&email) {
        return Ok(true);
    }

    // Moka cache: a hit means it is taken
    if email_cache::is_taken(&email).await {
        return Ok(false);
    }

    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? LIMIT 1)",
    )
    .bind(&email)
    .fetch_one(pool)
    .await?;

    if exists {
        email_cache::mark_taken(&email).await;
    }

    Ok(!exists)
}

/// Creates the account, its profile and its role in one transaction.
async fn insert_account(pool: &MySqlPool, req: &SignupReq, email: &str, hashed: &str) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let user_id = sqlx::query("INSERT INTO users (email, password) VALUES (?, ?)")
        .bind(email)
        .bind(hashed)
        .execute(&mut *tx)
        .await?
        .last_insert_id();

    sqlx::query(
        r#"
        INSERT INTO profiles (user_id, email, full_name, join_date, status)
        VALUES (?, ?, ?, CURDATE(), 'active')
        "#,
    )
    .bind(user_id)
    .bind(email)
    .bind(req.full_name.trim())
    .execute(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO user_roles (user_id, role) VALUES (?, ?)")
        .bind(user_id)
        .bind(req.role.as_ref())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(user_id)
}

/// Sign up
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupReq,
    responses(
        (status = 201, description = "Account created", body = Object, example = json!({
            "message": "Account created successfully",
            "user_id": 42,
            "role": "employee"
        })),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Invalid fields", body = Object, example = json!({
            "message": "Validation failed",
            "errors": { "confirm_password": "Passwords do not match" }
        }))
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_signup",
    skip(pool, cache, req),
    fields(email = %req.email)
)]
pub async fn signup(
    req: web::Json<SignupReq>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
) -> actix_web::Result<impl Responder> {
    info!("Signup request received");

    req.validate().map_err(ApiError::from)?;

    let email = email_filter::normalize(&req.email);

    let available = is_email_available(&email, pool.get_ref())
        .await
        .map_err(|e| ApiError::database(e, "Failed to check email availability"))?;
    if !available {
        info!("Email already registered");
        return Err(ApiError::Conflict("Email already registered".into()).into());
    }

    let hashed = hash_password(&req.password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        ApiError::Internal
    })?;

    let user_id = insert_account(pool.get_ref(), &req, &email, &hashed)
        .await
        .map_err(|e| match ApiError::database(e, "Failed to register user") {
            // lost a race with a concurrent signup for the same email
            ApiError::Conflict(_) => ApiError::Conflict("Email already registered".into()),
            other => other,
        })?;

    email_filter::insert(&email);
    email_cache::mark_taken(&email).await;
    cache.invalidate(Mutation::Employee { user_id }).await;

    info!(user_id, role = %req.role, "Account created");

    Ok(HttpResponse::Created().json(json!({
        "message": "Account created successfully",
        "user_id": user_id,
        "role": req.role
    })))
}

async fn store_refresh_token(pool: &MySqlPool, claims: &Claims) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(claims.user_id)
    .bind(&claims.jti)
    .bind(claims.exp as i64)
    .execute(pool)
    .await?;

    Ok(())
}

fn token_error(e: jsonwebtoken::errors::Error) -> ApiError {
    error!(error = %e, "Failed to sign token");
    ApiError::Internal
}

/// Log in
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Tokens and dashboard for the account's role", body = LoginResponse),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials", body = Object, example = json!({
            "message": "Invalid credentials"
        })),
        (status = 403, description = "Account has no role")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(email = %user.email)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> actix_web::Result<impl Responder> {
    info!("Login request received");

    let email = email_filter::normalize(&user.email);
    if email.is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return Err(ApiError::bad_request("Email and password are required").into());
    }

    debug!("Fetching user from database");

    let db_user = sqlx::query_as::<_, UserSql>(
        r#"
        SELECT u.id, u.email, u.password, r.role
        FROM users u
        LEFT JOIN user_roles r ON r.user_id = u.id
        WHERE u.email = ?
        "#,
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| ApiError::database(e, "Database error while fetching user"))?
    .ok_or_else(|| {
        info!("Invalid credentials: user not found");
        ApiError::Unauthorized("Invalid credentials".into())
    })?;

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(ApiError::Unauthorized("Invalid credentials".into()).into());
    }

    let role = db_user
        .role
        .as_deref()
        .and_then(|r| Role::from_str(r).ok())
        .ok_or_else(|| {
            warn!(user_id = db_user.id, "Login refused: no valid role assigned");
            ApiError::forbidden("No role assigned to this account")
        })?;

    let access_token = generate_access_token(
        db_user.id,
        db_user.email.clone(),
        role,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(token_error)?;

    let (refresh_token, refresh_claims) = generate_refresh_token(
        db_user.id,
        db_user.email.clone(),
        role,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(token_error)?;

    debug!(user_id = db_user.id, jti = %refresh_claims.jti, "Storing refresh token");
    store_refresh_token(pool.get_ref(), &refresh_claims)
        .await
        .map_err(|e| ApiError::database(e, "Failed to store refresh token"))?;

    // last login is informational, a failure does not block the login
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = db_user.id, role = %role, "Login successful");

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token,
        refresh_token,
        role,
        dashboard: role.dashboard_path().to_string(),
    }))
}

/// Current session
#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Who the bearer token belongs to", body = SessionResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
#[instrument(name = "auth_session", skip(auth, pool), fields(user_id = auth.user_id))]
pub async fn session(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    let full_name = sqlx::query_scalar::<_, Option<String>>(
        "SELECT full_name FROM profiles WHERE user_id = ?",
    )
    .bind(auth.user_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| ApiError::database(e, "Failed to fetch profile"))?
    .flatten();

    Ok(HttpResponse::Ok().json(SessionResponse {
        user_id: auth.user_id,
        email: auth.email,
        full_name,
        role: auth.role,
        dashboard: auth.role.dashboard_path().to_string(),
    }))
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Rotate refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair; the presented refresh token is revoked", body = RefreshResponse),
        (status = 401, description = "Missing, expired or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
#[instrument(name = "auth_refresh", skip(req, pool, config))]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> actix_web::Result<impl Responder> {
    let token = bearer(&req).ok_or_else(|| ApiError::Unauthorized("Missing token".into()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))?;

    if claims.token_type != TokenType::Refresh {
        return Err(ApiError::Unauthorized("Refresh token required".into()).into());
    }

    // revoking with a predicate on `revoked` makes each refresh token single-use
    let revoked = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = TRUE
        WHERE jti = ?
        AND revoked = FALSE
        AND expires_at > NOW()
        "#,
    )
    .bind(&claims.jti)
    .execute(pool.get_ref())
    .await
    .map_err(|e| ApiError::database(e, "Failed to revoke refresh token"))?;

    if revoked.rows_affected() == 0 {
        warn!(user_id = claims.user_id, jti = %claims.jti, "Refresh token unknown or already used");
        return Err(ApiError::Unauthorized("Refresh token revoked".into()).into());
    }

    // pick up role changes made since the last login
    let role = get_user_role(pool.get_ref(), claims.user_id)
        .await
        .map_err(|e| ApiError::database(e, "Failed to look up role"))?
        .ok_or_else(|| ApiError::Unauthorized("No role assigned to this account".into()))?;

    let (new_refresh_token, new_claims) = generate_refresh_token(
        claims.user_id,
        claims.sub.clone(),
        role,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(token_error)?;

    store_refresh_token(pool.get_ref(), &new_claims)
        .await
        .map_err(|e| ApiError::database(e, "Failed to store refresh token"))?;

    let access_token = generate_access_token(
        claims.user_id,
        claims.sub,
        role,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(token_error)?;

    Ok(HttpResponse::Ok().json(RefreshResponse {
        access_token,
        refresh_token: new_refresh_token,
    }))
}

/// Log out
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Refresh token revoked, or nothing to revoke")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
#[instrument(name = "auth_logout", skip(req, pool, config))]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let Some(token) = bearer(&req) else {
        return HttpResponse::NoContent().finish();
    };

    // only a valid refresh token has anything to revoke
    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, jti = %claims.jti, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}
