use crate::{
    api::role::has_role,
    auth::auth::{AuthUser, Scope},
    error::ApiError,
    model::{
        role::Role,
        salary_slip::{
            MAX_YEAR, MIN_YEAR, SalarySlip, SalarySlipSortKey, SlipStatus, canonical_month,
            net_salary,
        },
    },
    utils::{
        listing::{Page, Pagination, SortOrder, apply, equality_filter},
        query_cache::{Mutation, StatsCache},
        validation::{FieldErrors, require_non_negative},
    },
};
use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

const SLIP_SELECT: &str = r#"
    SELECT
        s.id, s.employee_id, s.month, s.year,
        s.basic_salary, s.allowances, s.deductions, s.net_salary,
        s.status,
        p.full_name AS employee_name,
        p.department,
        s.created_at, s.updated_at
    FROM salary_slips s
    LEFT JOIN profiles p ON p.user_id = s.employee_id
"#;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSalarySlip {
    #[schema(example = 42)]
    pub employee_id: u64,
    #[schema(example = "January")]
    pub month: String,
    #[schema(example = 2026)]
    pub year: i32,
    #[serde(default)]
    #[schema(example = 50000.0)]
    pub basic_salary: f64,
    #[serde(default)]
    #[schema(example = 5000.0)]
    pub allowances: f64,
    #[serde(default)]
    #[schema(example = 2000.0)]
    pub deductions: f64,
}

impl CreateSalarySlip {
    /// Returns the canonical month name on success.
    fn validate(&self) -> Result<&'static str, FieldErrors> {
        let mut errors = FieldErrors::new();

        let month = canonical_month(&self.month).unwrap_or_else(|| {
            errors.add("month", "Month must be a calendar month name");
            ""
        });

        if !(MIN_YEAR..=MAX_YEAR).contains(&self.year) {
            errors.add("year", format!("Year must be between {MIN_YEAR} and {MAX_YEAR}"));
        }

        require_non_negative(&mut errors, "basic_salary", self.basic_salary, "Basic salary");
        require_non_negative(&mut errors, "allowances", self.allowances, "Allowances");
        require_non_negative(&mut errors, "deductions", self.deductions, "Deductions");

        errors.into_result().map(|()| month)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateSalarySlip {
    pub basic_salary: Option<f64>,
    pub allowances: Option<f64>,
    pub deductions: Option<f64>,
}

impl UpdateSalarySlip {
    fn is_empty(&self) -> bool {
        self.basic_salary.is_none() && self.allowances.is_none() && self.deductions.is_none()
    }

    /// Amounts after applying this edit to `slip`, as (basic, allowances, deductions).
    fn merged_with(&self, slip: &SalarySlip) -> Result<(f64, f64, f64), FieldErrors> {
        let basic = self.basic_salary.unwrap_or(slip.basic_salary);
        let allowances = self.allowances.unwrap_or(slip.allowances);
        let deductions = self.deductions.unwrap_or(slip.deductions);

        let mut errors = FieldErrors::new();
        require_non_negative(&mut errors, "basic_salary", basic, "Basic salary");
        require_non_negative(&mut errors, "allowances", allowances, "Allowances");
        require_non_negative(&mut errors, "deductions", deductions, "Deductions");
        errors.into_result()?;

        Ok((basic, allowances, deductions))
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSlipStatus {
    pub status: SlipStatus,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct SalarySlipQuery {
    /// Page number, starting at 1
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// `pending`, `approved`, `paid` or `all`
    pub status: Option<String>,
    #[schema(example = "January")]
    pub month: Option<String>,
    #[schema(example = 2026)]
    pub year: Option<i32>,
    /// Only honoured for admins
    pub employee_id: Option<u64>,
    /// Matches employee name, department or month
    pub search: Option<String>,
    pub sort_by: Option<SalarySlipSortKey>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Serialize, ToSchema)]
pub struct SalarySlipListResponse {
    pub data: Vec<SalarySlip>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub page_size: u32,
    #[schema(example = 12)]
    pub total: usize,
    #[schema(example = 2)]
    pub total_pages: u32,
}

impl From<Page<SalarySlip>> for SalarySlipListResponse {
    fn from(page: Page<SalarySlip>) -> Self {
        Self {
            data: page.data,
            page: page.page,
            page_size: page.page_size,
            total: page.total,
            total_pages: page.total_pages,
        }
    }
}

// Helper enum for typed SQLx binding
enum FilterValue<'a> {
    U64(u64),
    I32(i32),
    Str(&'a str),
}

#[derive(Debug, Default)]
pub struct SlipFilter<'a> {
    pub employee_id: Option<u64>,
    pub status: Option<&'a str>,
    pub month: Option<&'a str>,
    pub year: Option<i32>,
}

pub async fn fetch_salary_slips(
    pool: &MySqlPool,
    filter: &SlipFilter<'_>,
) -> Result<Vec<SalarySlip>, sqlx::Error> {
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    if let Some(employee_id) = filter.employee_id {
        where_sql.push_str(" AND s.employee_id = ?");
        args.push(FilterValue::U64(employee_id));
    }

    if let Some(status) = filter.status {
        where_sql.push_str(" AND s.status = ?");
        args.push(FilterValue::Str(status));
    }

    if let Some(month) = filter.month {
        where_sql.push_str(" AND s.month = ?");
        args.push(FilterValue::Str(month));
    }

    if let Some(year) = filter.year {
        where_sql.push_str(" AND s.year = ?");
        args.push(FilterValue::I32(year));
    }

    let sql = format!("{SLIP_SELECT}{where_sql}");
    debug!(sql = %sql, "Fetching salary slips");

    let mut query = sqlx::query_as::<_, SalarySlip>(&sql);
    for arg in args {
        query = match arg {
            FilterValue::U64(v) => query.bind(v),
            FilterValue::I32(v) => query.bind(v),
            FilterValue::Str(v) => query.bind(v),
        };
    }

    query.fetch_all(pool).await
}

/// One slip, limited to the caller's scope.
pub async fn fetch_salary_slip(
    pool: &MySqlPool,
    id: u64,
    scope: Scope,
) -> Result<Option<SalarySlip>, sqlx::Error> {
    let slip = sqlx::query_as::<_, SalarySlip>(&format!("{SLIP_SELECT} WHERE s.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(slip.filter(|s| scope.permits(s.employee_id)))
}

/// Create salary slip
#[utoipa::path(
    post,
    path = "/api/salary-slips",
    request_body = CreateSalarySlip,
    responses(
        (status = 201, description = "Salary slip created", body = SalarySlip),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "A slip already exists for this period", body = Object, example = json!({
            "message": "A salary slip for this employee and period already exists"
        })),
        (status = 422, description = "Invalid fields")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Salary Slips"
)]
pub async fn create_salary_slip(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
    payload: web::Json<CreateSalarySlip>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let month = payload.validate().map_err(ApiError::from)?;

    let is_employee = has_role(pool.get_ref(), payload.employee_id, Role::Employee)
        .await
        .map_err(|e| ApiError::database(e, "Failed to check employee role"))?;
    if !is_employee {
        let mut errors = FieldErrors::new();
        errors.add("employee_id", "Selected user is not an employee");
        return Err(ApiError::from(errors).into());
    }

    let net = net_salary(payload.basic_salary, payload.allowances, payload.deductions);

    let result = sqlx::query(
        r#"
        INSERT INTO salary_slips
            (employee_id, month, year, basic_salary, allowances, deductions, net_salary, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, 'pending')
        "#,
    )
    .bind(payload.employee_id)
    .bind(month)
    .bind(payload.year)
    .bind(payload.basic_salary)
    .bind(payload.allowances)
    .bind(payload.deductions)
    .bind(net)
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::database(e, "Failed to create salary slip") {
        ApiError::Conflict(_) => ApiError::Conflict(
            "A salary slip for this employee and period already exists".to_string(),
        ),
        other => other,
    })?;

    let slip = fetch_salary_slip(pool.get_ref(), result.last_insert_id(), Scope::All)
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch salary slip"))?
        .ok_or(ApiError::Internal)?;

    info!(slip_id = slip.id, employee_id = slip.employee_id, "Salary slip created");
    cache
        .invalidate(Mutation::SalarySlip { employee_id: slip.employee_id })
        .await;

    Ok(HttpResponse::Created().json(slip))
}

/// List salary slips
#[utoipa::path(
    get,
    path = "/api/salary-slips",
    params(SalarySlipQuery),
    responses(
        (status = 200, description = "Paginated salary slips", body = SalarySlipListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Salary Slips"
)]
pub async fn list_salary_slips(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SalarySlipQuery>,
) -> actix_web::Result<impl Responder> {
    let month = equality_filter(query.month.as_deref());
    let filter = SlipFilter {
        employee_id: auth.scope().employee_id().or(query.employee_id),
        status: equality_filter(query.status.as_deref()),
        month: month.map(|m| canonical_month(m).unwrap_or(m)),
        year: query.year,
    };

    let rows = fetch_salary_slips(pool.get_ref(), &filter)
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch salary slips"))?;

    let page = apply(
        rows,
        query.search.as_deref(),
        query.sort_by.unwrap_or_default(),
        query.sort_order.unwrap_or_default(),
        Pagination::new(query.page, query.page_size),
    );

    Ok(HttpResponse::Ok().json(SalarySlipListResponse::from(page)))
}

/// Get salary slip by ID
#[utoipa::path(
    get,
    path = "/api/salary-slips/{id}",
    params(
        ("id" = u64, Path, description = "Salary slip ID")
    ),
    responses(
        (status = 200, description = "Salary slip found", body = SalarySlip),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Salary slip not found", body = Object, example = json!({
            "message": "Salary slip not found"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Salary Slips"
)]
pub async fn get_salary_slip(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();

    let slip = fetch_salary_slip(pool.get_ref(), id, auth.scope())
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch salary slip"))?
        .ok_or_else(|| ApiError::not_found("Salary slip not found"))?;

    Ok(HttpResponse::Ok().json(slip))
}

fn ensure_editable(slip: &SalarySlip) -> Result<(), ApiError> {
    if slip.status == SlipStatus::Pending.to_string() {
        Ok(())
    } else {
        Err(ApiError::bad_request("Only pending salary slips can be edited"))
    }
}

/// Edit amounts of a pending slip
#[utoipa::path(
    put,
    path = "/api/salary-slips/{id}",
    params(
        ("id" = u64, Path, description = "Salary slip ID")
    ),
    request_body = UpdateSalarySlip,
    responses(
        (status = 200, description = "Salary slip updated", body = SalarySlip),
        (status = 400, description = "Slip is no longer pending"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Salary slip not found"),
        (status = 422, description = "Invalid amounts")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Salary Slips"
)]
pub async fn update_salary_slip(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
    path: web::Path<u64>,
    payload: web::Json<UpdateSalarySlip>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let id = path.into_inner();

    if payload.is_empty() {
        return Err(ApiError::bad_request("No fields provided for update").into());
    }

    let slip = fetch_salary_slip(pool.get_ref(), id, Scope::All)
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch salary slip"))?
        .ok_or_else(|| ApiError::not_found("Salary slip not found"))?;

    ensure_editable(&slip)?;

    let (basic, allowances, deductions) = payload.merged_with(&slip).map_err(ApiError::from)?;

    let result = sqlx::query(
        r#"
        UPDATE salary_slips
        SET basic_salary = ?, allowances = ?, deductions = ?, net_salary = ?
        WHERE id = ?
        AND status = 'pending'
        "#,
    )
    .bind(basic)
    .bind(allowances)
    .bind(deductions)
    .bind(net_salary(basic, allowances, deductions))
    .bind(id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| ApiError::database(e, "Failed to update salary slip"))?;

    let updated = fetch_salary_slip(pool.get_ref(), id, Scope::All)
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch salary slip"))?
        .ok_or_else(|| ApiError::not_found("Salary slip not found"))?;

    // nothing changed: either the amounts were identical or the status moved on meanwhile
    if result.rows_affected() == 0 {
        ensure_editable(&updated)?;
    }

    cache
        .invalidate(Mutation::SalarySlip { employee_id: updated.employee_id })
        .await;

    Ok(HttpResponse::Ok().json(updated))
}

/// Advance salary slip status
#[utoipa::path(
    put,
    path = "/api/salary-slips/{id}/status",
    params(
        ("id" = u64, Path, description = "Salary slip ID")
    ),
    request_body = UpdateSlipStatus,
    responses(
        (status = 200, description = "Status updated", body = SalarySlip),
        (status = 400, description = "Status cannot move there", body = Object, example = json!({
            "message": "Cannot move a paid salary slip to approved"
        })),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Salary slip not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Salary Slips"
)]
pub async fn update_salary_slip_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
    path: web::Path<u64>,
    payload: web::Json<UpdateSlipStatus>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let id = path.into_inner();
    let target = payload.status;

    let Some(required) = target.previous() else {
        return Err(ApiError::bad_request("Salary slip status can only move forward").into());
    };

    // the predicate on the current status keeps the transition one step
    let result = sqlx::query(
        r#"
        UPDATE salary_slips
        SET status = ?
        WHERE id = ?
        AND status = ?
        "#,
    )
    .bind(target.as_ref())
    .bind(id)
    .bind(required.as_ref())
    .execute(pool.get_ref())
    .await
    .map_err(|e| ApiError::database(e, "Failed to update salary slip status"))?;

    let slip = fetch_salary_slip(pool.get_ref(), id, Scope::All)
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch salary slip"))?
        .ok_or_else(|| ApiError::not_found("Salary slip not found"))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::bad_request(format!(
            "Cannot move a {} salary slip to {}",
            slip.status, target
        ))
        .into());
    }

    info!(slip_id = id, status = %target, "Salary slip status changed");
    cache
        .invalidate(Mutation::SalarySlip { employee_id: slip.employee_id })
        .await;

    Ok(HttpResponse::Ok().json(slip))
}
