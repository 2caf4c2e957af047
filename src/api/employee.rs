use crate::{
    auth::auth::AuthUser,
    error::ApiError,
    model::profile::{EmployeeSortKey, EmployeeStatus, Profile},
    utils::{
        db_utils::{SqlValue, build_update_sql, execute_update},
        email_cache, email_filter,
        listing::{Page, Pagination, SortOrder, apply, equality_filter},
        query_cache::{Mutation, StatsCache},
        validation::FieldErrors,
    },
};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use std::str::FromStr;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

/// Columns an admin may edit on a profile
const EDITABLE_COLUMNS: &[&str] = &[
    "full_name",
    "department",
    "designation",
    "salary",
    "status",
    "join_date",
];

const PROFILE_COLUMNS: &str = "p.id, p.user_id, p.email, p.full_name, p.department, p.designation, \
     p.salary, p.join_date, p.status, p.created_at, p.updated_at";

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct EmployeeQuery {
    /// Page number, starting at 1
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Exact department, `all` for any
    pub department: Option<String>,
    /// `active`, `inactive` or `all`
    pub status: Option<String>,
    /// Matches name, email or department
    pub search: Option<String>,
    pub sort_by: Option<EmployeeSortKey>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub data: Vec<Profile>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub page_size: u32,
    #[schema(example = 24)]
    pub total: usize,
    #[schema(example = 3)]
    pub total_pages: u32,
}

impl From<Page<Profile>> for EmployeeListResponse {
    fn from(page: Page<Profile>) -> Self {
        Self {
            data: page.data,
            page: page.page,
            page_size: page.page_size,
            total: page.total,
            total_pages: page.total_pages,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[allow(dead_code)]
pub struct UpdateEmployee {
    pub full_name: Option<String>,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub salary: Option<f64>,
    pub status: Option<EmployeeStatus>,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub join_date: Option<NaiveDate>,
}

/// Checks the values of a partial profile update before it reaches SQL.
fn validate_update(payload: &Value) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    if let Some(status) = payload.get("status") {
        let valid = status
            .as_str()
            .is_some_and(|s| EmployeeStatus::from_str(s).is_ok());
        if !valid {
            errors.add("status", "Status must be active or inactive");
        }
    }

    if let Some(salary) = payload.get("salary") {
        match salary.as_f64() {
            Some(v) if v >= 0.0 => {}
            _ if salary.is_null() => {}
            _ => errors.add("salary", "Salary must be zero or more"),
        }
    }

    match payload.get("full_name") {
        Some(Value::String(name)) if name.trim().chars().count() < 2 => {
            errors.add("full_name", "Name must be at least 2 characters");
        }
        Some(Value::String(_) | Value::Null) | None => {}
        Some(_) => errors.add("full_name", "Name must be text"),
    }

    if let Some(join_date) = payload.get("join_date") {
        let valid = join_date.is_null()
            || join_date
                .as_str()
                .is_some_and(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").is_ok());
        if !valid {
            errors.add("join_date", "Join date must be formatted as YYYY-MM-DD");
        }
    }

    errors.into_result()
}

// Helper enum for typed SQLx binding
enum FilterValue<'a> {
    Str(&'a str),
}

/// Profiles holding the employee role, with equality filters applied in SQL.
pub async fn fetch_employees(
    pool: &MySqlPool,
    department: Option<&str>,
    status: Option<&str>,
) -> Result<Vec<Profile>, sqlx::Error> {
    let mut where_sql = String::from(" WHERE r.role = 'employee'");
    let mut args: Vec<FilterValue> = Vec::new();

    if let Some(department) = department {
        where_sql.push_str(" AND p.department = ?");
        args.push(FilterValue::Str(department));
    }

    if let Some(status) = status {
        where_sql.push_str(" AND p.status = ?");
        args.push(FilterValue::Str(status));
    }

    let sql = format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles p JOIN user_roles r ON r.user_id = p.user_id{where_sql}"
    );
    debug!(sql = %sql, "Fetching employees");

    let mut query = sqlx::query_as::<_, Profile>(&sql);
    for arg in args {
        query = match arg {
            FilterValue::Str(s) => query.bind(s),
        };
    }

    query.fetch_all(pool).await
}

pub async fn fetch_profile(pool: &MySqlPool, user_id: u64) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as::<_, Profile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.user_id = ?"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// List employees
#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let rows = fetch_employees(
        pool.get_ref(),
        equality_filter(query.department.as_deref()),
        equality_filter(query.status.as_deref()),
    )
    .await
    .map_err(|e| ApiError::database(e, "Failed to fetch employees"))?;

    let page = apply(
        rows,
        query.search.as_deref(),
        query.sort_by.unwrap_or_default(),
        query.sort_order.unwrap_or_default(),
        Pagination::new(query.page, query.page_size),
    );

    Ok(HttpResponse::Ok().json(EmployeeListResponse::from(page)))
}

/// Get employee by user ID
#[utoipa::path(
    get,
    path = "/api/employees/{user_id}",
    params(
        ("user_id" = u64, Path, description = "Employee user ID")
    ),
    responses(
        (status = 200, description = "Employee found", body = Profile),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let user_id = path.into_inner();

    let profile = fetch_profile(pool.get_ref(), user_id)
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch employee"))?
        .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    Ok(HttpResponse::Ok().json(profile))
}

/// Own profile of the signed-in user
#[utoipa::path(
    get,
    path = "/api/profile",
    responses(
        (status = 200, description = "Profile of the caller", body = Profile),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_own_profile(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    let profile = fetch_profile(pool.get_ref(), auth.user_id)
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch profile"))?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;

    Ok(HttpResponse::Ok().json(profile))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/employees/{user_id}",
    params(
        ("user_id" = u64, Path, description = "Employee user ID")
    ),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Employee updated", body = Profile),
        (status = 400, description = "Unknown field"),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "Employee not found"
        })),
        (status = 422, description = "Invalid field values")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let user_id = path.into_inner();

    validate_update(&body).map_err(ApiError::from)?;
    let update = build_update_sql(
        "profiles",
        &body,
        EDITABLE_COLUMNS,
        &[("user_id", SqlValue::U64(user_id))],
    )?;

    execute_update(pool.get_ref(), update)
        .await
        .map_err(|e| ApiError::database(e, "Failed to update employee"))?;

    // MySQL reports unchanged rows as unaffected, so re-read instead
    let profile = fetch_profile(pool.get_ref(), user_id)
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch employee"))?
        .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    cache.invalidate(Mutation::Employee { user_id }).await;

    Ok(HttpResponse::Ok().json(profile))
}

/// Delete Employee
#[utoipa::path(
    delete,
    path = "/api/employees/{user_id}",
    params(
        ("user_id" = u64, Path, description = "Employee user ID")
    ),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 400, description = "Cannot delete own account"),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let user_id = path.into_inner();

    if user_id == auth.user_id {
        return Err(ApiError::bad_request("You cannot delete your own account").into());
    }

    let profile = fetch_profile(pool.get_ref(), user_id)
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch employee"))?
        .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    // the account row owns the profile; its role, slips and expenses cascade
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| ApiError::database(e, "Failed to delete employee"))?;

    email_filter::remove(&profile.email);
    email_cache::forget(&profile.email).await;
    cache.invalidate(Mutation::Employee { user_id }).await;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Successfully deleted"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_must_be_known() {
        let errors = validate_update(&json!({"status": "fired"})).unwrap_err();
        assert!(errors.get("status").is_some());
        assert!(validate_update(&json!({"status": "inactive"})).is_ok());
    }

    #[test]
    fn salary_must_not_be_negative() {
        assert!(validate_update(&json!({"salary": -10})).is_err());
        assert!(validate_update(&json!({"salary": "lots"})).is_err());
        assert!(validate_update(&json!({"salary": 45000.5})).is_ok());
        assert!(validate_update(&json!({"salary": null})).is_ok());
    }

    #[test]
    fn short_names_are_rejected() {
        let errors = validate_update(&json!({"full_name": " J "})).unwrap_err();
        assert_eq!(errors.get("full_name"), Some("Name must be at least 2 characters"));
    }

    #[test]
    fn full_name_must_be_text() {
        let errors = validate_update(&json!({"full_name": 123})).unwrap_err();
        assert_eq!(errors.get("full_name"), Some("Name must be text"));
        assert!(validate_update(&json!({"full_name": null})).is_ok());
    }

    #[test]
    fn join_date_must_be_a_calendar_date() {
        for bad in [json!("not-a-date"), json!("2026-02-30"), json!(20260101)] {
            let errors = validate_update(&json!({"join_date": bad})).unwrap_err();
            assert_eq!(
                errors.get("join_date"),
                Some("Join date must be formatted as YYYY-MM-DD")
            );
        }
        assert!(validate_update(&json!({"join_date": "2026-01-15"})).is_ok());
        assert!(validate_update(&json!({"join_date": null})).is_ok());
    }
}
