use crate::{
    auth::auth::{AuthUser, Scope},
    error::ApiError,
    model::expense::{Expense, ExpenseCategory, ExpenseSortKey, ExpenseStatus, ExpenseSummary},
    utils::{
        db_utils::{SqlValue, build_update_sql, execute_update},
        listing::{Page, Pagination, SortOrder, apply, equality_filter, search_rows},
        query_cache::{Mutation, StatsCache},
        validation::{FieldErrors, require_text},
    },
};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use std::str::FromStr;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

const EXPENSE_SELECT: &str = r#"
    SELECT
        e.id, e.employee_id, e.title, e.category, e.amount, e.date,
        e.description, e.status,
        p.full_name AS employee_name,
        e.created_at, e.updated_at
    FROM expenses e
    LEFT JOIN profiles p ON p.user_id = e.employee_id
"#;

/// Fields the owner may change on a pending claim
const EDITABLE_COLUMNS: &[&str] = &["title", "category", "amount", "date", "description"];

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateExpense {
    #[serde(default)]
    #[schema(example = "Client lunch meeting")]
    pub title: String,
    #[serde(default)]
    #[schema(example = "Meals")]
    pub category: String,
    #[serde(default)]
    #[schema(example = 1200.0)]
    pub amount: f64,
    #[schema(example = "2026-01-15", format = "date", value_type = String)]
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
}

/// A create request that passed validation.
#[derive(Debug, PartialEq)]
struct NewExpense {
    title: String,
    category: ExpenseCategory,
    amount: f64,
    date: NaiveDate,
    description: Option<String>,
}

fn check_category(errors: &mut FieldErrors, raw: &str) -> Option<ExpenseCategory> {
    if !require_text(errors, "category", raw, "Category") {
        return None;
    }
    let parsed = ExpenseCategory::from_str(raw.trim()).ok();
    if parsed.is_none() {
        errors.add("category", "Please select a valid category");
    }
    parsed
}

fn check_amount(errors: &mut FieldErrors, amount: f64) {
    if !amount.is_finite() || amount <= 0.0 {
        errors.add("amount", "Amount must be greater than zero");
    }
}

impl CreateExpense {
    fn validate(&self) -> Result<NewExpense, FieldErrors> {
        let mut errors = FieldErrors::new();

        require_text(&mut errors, "title", &self.title, "Title");
        let category = check_category(&mut errors, &self.category);
        check_amount(&mut errors, self.amount);
        if self.date.is_none() {
            errors.add("date", "Date is required");
        }

        // a missing category or date has already been recorded in `errors`
        let (Some(category), Some(date)) = (category, self.date) else {
            return Err(errors);
        };
        errors.into_result()?;

        Ok(NewExpense {
            title: self.title.trim().to_string(),
            category,
            amount: self.amount,
            date,
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        })
    }
}

/// Checks a partial expense edit and returns it with text trimmed and the
/// category in its canonical spelling, matching what a create stores.
fn validate_update(payload: &Value) -> Result<Value, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut normalised = payload.clone();

    if let Some(title) = payload.get("title") {
        let title = title.as_str().unwrap_or("");
        if require_text(&mut errors, "title", title, "Title") {
            normalised["title"] = json!(title.trim());
        }
    }

    if let Some(category) = payload.get("category") {
        if let Some(category) = check_category(&mut errors, category.as_str().unwrap_or("")) {
            normalised["category"] = json!(category.to_string());
        }
    }

    if let Some(amount) = payload.get("amount") {
        check_amount(&mut errors, amount.as_f64().unwrap_or(0.0));
    }

    if let Some(date) = payload.get("date") {
        let valid = date
            .as_str()
            .is_some_and(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").is_ok());
        if !valid {
            errors.add("date", "Date must be formatted as YYYY-MM-DD");
        }
    }

    match payload.get("description") {
        Some(Value::String(text)) => {
            let text = text.trim();
            normalised["description"] = if text.is_empty() { Value::Null } else { json!(text) };
        }
        Some(Value::Null) | None => {}
        Some(_) => errors.add("description", "Description must be text"),
    }

    errors.into_result().map(|()| normalised)
}

#[derive(Deserialize, ToSchema)]
#[allow(dead_code)]
pub struct UpdateExpense {
    pub title: Option<String>,
    pub category: Option<ExpenseCategory>,
    pub amount: Option<f64>,
    #[schema(example = "2026-01-15", format = "date", value_type = String)]
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ExpenseQuery {
    /// Page number, starting at 1
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// `pending`, `approved`, `rejected` or `all`
    pub status: Option<String>,
    #[schema(example = "Travel")]
    pub category: Option<String>,
    /// Only honoured for admins
    pub employee_id: Option<u64>,
    /// Matches title, category, description or employee name
    pub search: Option<String>,
    pub sort_by: Option<ExpenseSortKey>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Serialize, ToSchema)]
pub struct ExpenseListResponse {
    pub data: Vec<Expense>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub page_size: u32,
    #[schema(example = 2)]
    pub total: usize,
    #[schema(example = 1)]
    pub total_pages: u32,
    /// Totals over every row matching the filters and search
    pub summary: ExpenseSummary,
}

impl ExpenseListResponse {
    fn new(page: Page<Expense>, summary: ExpenseSummary) -> Self {
        Self {
            data: page.data,
            page: page.page,
            page_size: page.page_size,
            total: page.total,
            total_pages: page.total_pages,
            summary,
        }
    }
}

// Helper enum for typed SQLx binding
enum FilterValue<'a> {
    U64(u64),
    Str(&'a str),
}

#[derive(Debug, Default)]
pub struct ExpenseFilter<'a> {
    pub employee_id: Option<u64>,
    pub status: Option<&'a str>,
    pub category: Option<&'a str>,
}

pub async fn fetch_expenses(
    pool: &MySqlPool,
    filter: &ExpenseFilter<'_>,
) -> Result<Vec<Expense>, sqlx::Error> {
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    if let Some(employee_id) = filter.employee_id {
        where_sql.push_str(" AND e.employee_id = ?");
        args.push(FilterValue::U64(employee_id));
    }

    if let Some(status) = filter.status {
        where_sql.push_str(" AND e.status = ?");
        args.push(FilterValue::Str(status));
    }

    if let Some(category) = filter.category {
        where_sql.push_str(" AND e.category = ?");
        args.push(FilterValue::Str(category));
    }

    let sql = format!("{EXPENSE_SELECT}{where_sql}");
    debug!(sql = %sql, "Fetching expenses");

    let mut query = sqlx::query_as::<_, Expense>(&sql);
    for arg in args {
        query = match arg {
            FilterValue::U64(v) => query.bind(v),
            FilterValue::Str(v) => query.bind(v),
        };
    }

    query.fetch_all(pool).await
}

/// Unknown stored statuses count as decided.
fn is_decided(expense: &Expense) -> bool {
    ExpenseStatus::from_str(&expense.status).map_or(true, |s| s.is_decided())
}

/// One expense, limited to the caller's scope.
pub async fn fetch_expense(
    pool: &MySqlPool,
    id: u64,
    scope: Scope,
) -> Result<Option<Expense>, sqlx::Error> {
    let expense = sqlx::query_as::<_, Expense>(&format!("{EXPENSE_SELECT} WHERE e.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(expense.filter(|e| scope.permits(e.employee_id)))
}

/// Submit expense claim
#[utoipa::path(
    post,
    path = "/api/expenses",
    request_body(
        content = CreateExpense,
        description = "Expense claim payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Expense submitted", body = Expense),
        (status = 401, description = "Unauthorized"),
        (status = 422, description = "Invalid fields", body = Object, example = json!({
            "message": "Validation failed",
            "errors": { "amount": "Amount must be greater than zero" }
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Expenses"
)]
pub async fn create_expense(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
    payload: web::Json<CreateExpense>,
) -> actix_web::Result<impl Responder> {
    let expense = payload.validate().map_err(ApiError::from)?;

    let result = sqlx::query(
        r#"
        INSERT INTO expenses
            (employee_id, title, category, amount, date, description, status)
        VALUES (?, ?, ?, ?, ?, ?, 'pending')
        "#,
    )
    .bind(auth.user_id)
    .bind(&expense.title)
    .bind(expense.category.as_ref())
    .bind(expense.amount)
    .bind(expense.date)
    .bind(&expense.description)
    .execute(pool.get_ref())
    .await
    .map_err(|e| ApiError::database(e, "Failed to create expense"))?;

    let created = fetch_expense(pool.get_ref(), result.last_insert_id(), Scope::All)
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch expense"))?
        .ok_or(ApiError::Internal)?;

    info!(expense_id = created.id, employee_id = auth.user_id, "Expense submitted");
    cache
        .invalidate(Mutation::Expense { employee_id: auth.user_id })
        .await;

    Ok(HttpResponse::Created().json(created))
}

/// List expenses
#[utoipa::path(
    get,
    path = "/api/expenses",
    params(ExpenseQuery),
    responses(
        (status = 200, description = "Paginated expenses with totals", body = ExpenseListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Expenses"
)]
pub async fn list_expenses(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ExpenseQuery>,
) -> actix_web::Result<impl Responder> {
    let filter = ExpenseFilter {
        employee_id: auth.scope().employee_id().or(query.employee_id),
        status: equality_filter(query.status.as_deref()),
        category: equality_filter(query.category.as_deref()),
    };

    let rows = fetch_expenses(pool.get_ref(), &filter)
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch expenses"))?;

    // summary covers the whole matching set, not just the current page
    let rows = search_rows(rows, query.search.as_deref());
    let summary = ExpenseSummary::from_expenses(&rows);

    let page = apply(
        rows,
        None,
        query.sort_by.unwrap_or_default(),
        query.sort_order.unwrap_or_default(),
        Pagination::new(query.page, query.page_size),
    );

    Ok(HttpResponse::Ok().json(ExpenseListResponse::new(page, summary)))
}

/// Get expense by ID
#[utoipa::path(
    get,
    path = "/api/expenses/{id}",
    params(
        ("id" = u64, Path, description = "Expense ID")
    ),
    responses(
        (status = 200, description = "Expense found", body = Expense),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Expense not found", body = Object, example = json!({
            "message": "Expense not found"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Expenses"
)]
pub async fn get_expense(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();

    let expense = fetch_expense(pool.get_ref(), id, auth.scope())
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch expense"))?
        .ok_or_else(|| ApiError::not_found("Expense not found"))?;

    Ok(HttpResponse::Ok().json(expense))
}

/// Edit own pending expense
#[utoipa::path(
    put,
    path = "/api/expenses/{id}",
    params(
        ("id" = u64, Path, description = "Expense ID")
    ),
    request_body = UpdateExpense,
    responses(
        (status = 200, description = "Expense updated", body = Expense),
        (status = 400, description = "Unknown field or expense already decided"),
        (status = 404, description = "Expense not found"),
        (status = 422, description = "Invalid field values")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Expenses"
)]
pub async fn update_expense(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();

    // only the owner edits, admins included
    let expense = fetch_expense(pool.get_ref(), id, Scope::Employee(auth.user_id))
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch expense"))?
        .ok_or_else(|| ApiError::not_found("Expense not found"))?;

    if is_decided(&expense) {
        return Err(ApiError::bad_request("Only pending expenses can be edited").into());
    }

    let changes = validate_update(&body).map_err(ApiError::from)?;
    let update = build_update_sql(
        "expenses",
        &changes,
        EDITABLE_COLUMNS,
        &[
            ("id", SqlValue::U64(id)),
            ("employee_id", SqlValue::U64(auth.user_id)),
            ("status", SqlValue::String(ExpenseStatus::Pending.to_string())),
        ],
    )?;

    execute_update(pool.get_ref(), update)
        .await
        .map_err(|e| ApiError::database(e, "Failed to update expense"))?;

    let updated = fetch_expense(pool.get_ref(), id, Scope::All)
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch expense"))?
        .ok_or_else(|| ApiError::not_found("Expense not found"))?;

    cache
        .invalidate(Mutation::Expense { employee_id: updated.employee_id })
        .await;

    Ok(HttpResponse::Ok().json(updated))
}

fn already_processed() -> ApiError {
    ApiError::bad_request("Expense not found or already processed")
}

async fn decide_expense(
    pool: &MySqlPool,
    cache: &StatsCache,
    id: u64,
    decision: ExpenseStatus,
) -> Result<HttpResponse, ApiError> {
    // the owner never changes, so it is read before the decision lands
    let employee_id =
        sqlx::query_scalar::<_, u64>("SELECT employee_id FROM expenses WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| ApiError::database(e, "Failed to fetch expense owner"))?
            .ok_or_else(already_processed)?;

    let result = sqlx::query(
        r#"
        UPDATE expenses
        SET status = ?
        WHERE id = ?
        AND status = 'pending'
        "#,
    )
    .bind(decision.as_ref())
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| ApiError::database(e, "Failed to decide expense"))?;

    if result.rows_affected() == 0 {
        return Err(already_processed());
    }

    info!(expense_id = id, employee_id, status = %decision, "Expense decided");
    cache.invalidate(Mutation::Expense { employee_id }).await;

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Expense {decision}"),
        "status": decision
    })))
}

/// Approve expense (admin)
#[utoipa::path(
    put,
    path = "/api/expenses/{id}/approve",
    params(
        ("id" = u64, Path, description = "ID of the expense to approve")
    ),
    responses(
        (status = 200, description = "Expense approved", body = Object, example = json!({
            "message": "Expense approved",
            "status": "approved"
        })),
        (status = 400, description = "Expense not found or already processed", body = Object, example = json!({
            "message": "Expense not found or already processed"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Expenses"
)]
pub async fn approve_expense(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    Ok(decide_expense(pool.get_ref(), cache.get_ref(), path.into_inner(), ExpenseStatus::Approved).await?)
}

/// Reject expense (admin)
#[utoipa::path(
    put,
    path = "/api/expenses/{id}/reject",
    params(
        ("id" = u64, Path, description = "ID of the expense to reject")
    ),
    responses(
        (status = 200, description = "Expense rejected", body = Object, example = json!({
            "message": "Expense rejected",
            "status": "rejected"
        })),
        (status = 400, description = "Expense not found or already processed", body = Object, example = json!({
            "message": "Expense not found or already processed"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Expenses"
)]
pub async fn reject_expense(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    Ok(decide_expense(pool.get_ref(), cache.get_ref(), path.into_inner(), ExpenseStatus::Rejected).await?)
}

/// Delete expense
#[utoipa::path(
    delete,
    path = "/api/expenses/{id}",
    params(
        ("id" = u64, Path, description = "Expense ID")
    ),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 400, description = "Employees can only delete pending claims"),
        (status = 404, description = "Expense not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Expenses"
)]
pub async fn delete_expense(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();

    let expense = fetch_expense(pool.get_ref(), id, auth.scope())
        .await
        .map_err(|e| ApiError::database(e, "Failed to fetch expense"))?
        .ok_or_else(|| ApiError::not_found("Expense not found"))?;

    if !auth.is_admin() && is_decided(&expense) {
        return Err(ApiError::bad_request("Only pending expenses can be deleted").into());
    }

    sqlx::query("DELETE FROM expenses WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| ApiError::database(e, "Failed to delete expense"))?;

    cache
        .invalidate(Mutation::Expense { employee_id: expense.employee_id })
        .await;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Successfully deleted"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(title: &str, category: &str, amount: f64, date: Option<&str>) -> CreateExpense {
        CreateExpense {
            title: title.to_string(),
            category: category.to_string(),
            amount,
            date: date.map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()),
            description: None,
        }
    }

    #[test]
    fn valid_claim_is_normalised() {
        let mut req = claim("  Taxi to airport ", "Office Supplies", 45.5, Some("2026-01-15"));
        req.description = Some("   ".to_string());
        let expense = req.validate().unwrap();
        assert_eq!(expense.title, "Taxi to airport");
        assert_eq!(expense.category, ExpenseCategory::OfficeSupplies);
        assert_eq!(expense.description, None);
    }

    #[test]
    fn amount_must_be_positive() {
        for amount in [0.0, -10.0, f64::NAN] {
            let errors = claim("Taxi", "Travel", amount, Some("2026-01-15")).validate().unwrap_err();
            assert_eq!(errors.get("amount"), Some("Amount must be greater than zero"));
        }
    }

    #[test]
    fn missing_fields_are_each_reported() {
        let errors = CreateExpense::default().validate().unwrap_err();
        assert_eq!(errors.get("title"), Some("Title is required"));
        assert_eq!(errors.get("category"), Some("Category is required"));
        assert_eq!(errors.get("date"), Some("Date is required"));
        assert!(errors.get("amount").is_some());
    }

    #[test]
    fn unknown_category_is_rejected() {
        let errors = claim("Snacks", "Snacks", 5.0, Some("2026-01-15")).validate().unwrap_err();
        assert_eq!(errors.get("category"), Some("Please select a valid category"));
    }

    #[test]
    fn edit_values_are_checked() {
        assert!(validate_update(&json!({"amount": 12.5, "category": "Travel"})).is_ok());
        assert!(validate_update(&json!({"amount": 0})).is_err());
        assert!(validate_update(&json!({"title": "  "})).is_err());
        assert!(validate_update(&json!({"date": "15/01/2026"})).is_err());
        assert!(validate_update(&json!({"category": "Snacks"})).is_err());
    }

    #[test]
    fn edits_are_stored_in_the_same_form_as_creates() {
        let changes = validate_update(&json!({
            "title": "  Taxi  ",
            "category": "  Office Supplies",
            "description": "   "
        }))
        .unwrap();
        assert_eq!(changes["title"], "Taxi");
        assert_eq!(changes["category"], "Office Supplies");
        assert_eq!(changes["description"], Value::Null);

        let update = build_update_sql(
            "expenses",
            &changes,
            EDITABLE_COLUMNS,
            &[("id", SqlValue::U64(1))],
        )
        .unwrap();
        assert!(update.values.contains(&SqlValue::String("Taxi".to_string())));
        assert!(update.values.contains(&SqlValue::String("Office Supplies".to_string())));
        assert!(!update.values.contains(&SqlValue::String("  Taxi  ".to_string())));
    }

    #[test]
    fn description_must_be_text() {
        let errors = validate_update(&json!({"description": 42})).unwrap_err();
        assert_eq!(errors.get("description"), Some("Description must be text"));
        assert!(validate_update(&json!({"description": null})).is_ok());
    }

    #[test]
    fn missing_and_decided_expenses_answer_alike() {
        use actix_web::ResponseError;

        let err = already_processed();
        assert_eq!(err.status_code(), actix_web::http::StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Expense not found or already processed");
    }

    #[test]
    fn status_is_not_an_editable_column() {
        let err = build_update_sql(
            "expenses",
            &json!({"status": "approved"}),
            EDITABLE_COLUMNS,
            &[("id", SqlValue::U64(1))],
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
