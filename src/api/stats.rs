//! Dashboard aggregates. Every result is served through [`StatsCache`] and
//! dropped again by the writes that change it.

use crate::{
    auth::auth::AuthUser,
    error::ApiError,
    model::{
        expense::ExpenseStatus,
        stats::{AdminStats, EmployeeStats, SalaryHistoryEntry, TrendPoint},
    },
    utils::query_cache::StatsCache,
};
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use std::str::FromStr;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

/// Calendar order for the month names stored on salary slips
const MONTH_ORDER: &str = "FIELD(month, 'January', 'February', 'March', 'April', 'May', 'June', \
     'July', 'August', 'September', 'October', 'November', 'December')";

pub async fn load_admin_stats(pool: &MySqlPool) -> Result<AdminStats, sqlx::Error> {
    let employees = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM user_roles WHERE role = 'employee'",
    )
    .fetch_one(pool);

    let payroll = sqlx::query_scalar::<_, f64>(
        "SELECT COALESCE(SUM(net_salary), 0) FROM salary_slips",
    )
    .fetch_one(pool);

    let pending_expenses = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM expenses WHERE status = 'pending'",
    )
    .fetch_one(pool);

    let approved_slips = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM salary_slips WHERE status = 'approved'",
    )
    .fetch_one(pool);

    let (total_employees, total_payroll, pending_expenses, approved_slips) =
        futures::try_join!(employees, payroll, pending_expenses, approved_slips)?;

    Ok(AdminStats {
        total_employees,
        total_payroll,
        pending_expenses,
        approved_slips,
    })
}

/// Folds (status, amount) rows of one employee's expenses into their stats.
fn expense_stats(current_salary: f64, expenses: &[(String, f64)]) -> EmployeeStats {
    expenses.iter().fold(
        EmployeeStats {
            current_salary,
            ..Default::default()
        },
        |mut acc, (status, amount)| {
            acc.total_expenses += 1;
            match ExpenseStatus::from_str(status) {
                Ok(ExpenseStatus::Pending) => acc.pending_expenses += 1,
                Ok(ExpenseStatus::Approved) => acc.approved_expenses += amount,
                _ => {}
            }
            acc
        },
    )
}

pub async fn load_employee_stats(pool: &MySqlPool, employee_id: u64) -> Result<EmployeeStats, sqlx::Error> {
    let latest_sql = format!(
        "SELECT net_salary FROM salary_slips WHERE employee_id = ? \
         ORDER BY year DESC, {MONTH_ORDER} DESC, created_at DESC LIMIT 1"
    );
    let latest = sqlx::query_scalar::<_, f64>(&latest_sql)
        .bind(employee_id)
        .fetch_optional(pool);

    let expenses = sqlx::query_as::<_, (String, f64)>(
        "SELECT status, amount FROM expenses WHERE employee_id = ?",
    )
    .bind(employee_id)
    .fetch_all(pool);

    let (latest, expenses) = futures::try_join!(latest, expenses)?;

    Ok(expense_stats(latest.unwrap_or(0.0), &expenses))
}

pub async fn load_payroll_trend(pool: &MySqlPool) -> Result<Vec<TrendPoint>, sqlx::Error> {
    sqlx::query_as::<_, TrendPoint>(&format!(
        r#"
        SELECT s.month AS month, CAST(s.year AS SIGNED) AS year, COALESCE(SUM(s.net_salary), 0) AS total
        FROM salary_slips s
        GROUP BY s.year, s.month
        ORDER BY s.year, {MONTH_ORDER}
        "#
    ))
    .fetch_all(pool)
    .await
}

/// Monthly totals of every expense that was not rejected.
pub async fn load_expense_trend(pool: &MySqlPool) -> Result<Vec<TrendPoint>, sqlx::Error> {
    sqlx::query_as::<_, TrendPoint>(
        r#"
        SELECT month, CAST(yr AS SIGNED) AS year, COALESCE(SUM(amount), 0) AS total
        FROM (
            SELECT MONTHNAME(date) AS month, YEAR(date) AS yr, MONTH(date) AS mo, amount
            FROM expenses
            WHERE status <> 'rejected'
        ) monthly
        GROUP BY yr, mo, month
        ORDER BY yr, mo
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn load_salary_history(
    pool: &MySqlPool,
    employee_id: u64,
) -> Result<Vec<SalaryHistoryEntry>, sqlx::Error> {
    sqlx::query_as::<_, SalaryHistoryEntry>(&format!(
        "SELECT month, year, net_salary, status FROM salary_slips \
         WHERE employee_id = ? ORDER BY year, {MONTH_ORDER}"
    ))
    .bind(employee_id)
    .fetch_all(pool)
    .await
}

/// Admin dashboard totals
#[utoipa::path(
    get,
    path = "/api/stats/admin",
    responses(
        (status = 200, description = "Admin dashboard totals", body = AdminStats),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Stats"
)]
pub async fn admin_stats(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let stats = cache
        .admin_stats(|| load_admin_stats(pool.get_ref()))
        .await
        .map_err(|e| ApiError::database(e, "Failed to load admin stats"))?;

    Ok(HttpResponse::Ok().json(stats))
}

/// Employee dashboard totals for the caller
#[utoipa::path(
    get,
    path = "/api/stats/employee",
    responses(
        (status = 200, description = "Caller's salary and expense totals", body = EmployeeStats),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Stats"
)]
pub async fn employee_stats(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
) -> actix_web::Result<impl Responder> {
    let stats = cache
        .employee_stats(auth.user_id, || load_employee_stats(pool.get_ref(), auth.user_id))
        .await
        .map_err(|e| ApiError::database(e, "Failed to load employee stats"))?;

    Ok(HttpResponse::Ok().json(stats))
}

/// Monthly net payroll
#[utoipa::path(
    get,
    path = "/api/stats/payroll-trend",
    responses(
        (status = 200, description = "Net payroll per month, oldest first", body = [TrendPoint]),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Stats"
)]
pub async fn payroll_trend(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let trend = cache
        .payroll_trend(|| async { load_payroll_trend(pool.get_ref()).await.map(Arc::new) })
        .await
        .map_err(|e| ApiError::database(e, "Failed to load payroll trend"))?;

    Ok(HttpResponse::Ok().json(trend.as_slice()))
}

/// Monthly expense totals
#[utoipa::path(
    get,
    path = "/api/stats/expense-trend",
    responses(
        (status = 200, description = "Non-rejected expense totals per month, oldest first", body = [TrendPoint]),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Stats"
)]
pub async fn expense_trend(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let trend = cache
        .expense_trend(|| async { load_expense_trend(pool.get_ref()).await.map(Arc::new) })
        .await
        .map_err(|e| ApiError::database(e, "Failed to load expense trend"))?;

    Ok(HttpResponse::Ok().json(trend.as_slice()))
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct SalaryHistoryQuery {
    /// Employee to report on; admins only, defaults to the caller
    pub employee_id: Option<u64>,
}

/// Salary history
#[utoipa::path(
    get,
    path = "/api/stats/salary-history",
    params(SalaryHistoryQuery),
    responses(
        (status = 200, description = "Slips of one employee, oldest first", body = [SalaryHistoryEntry]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Stats"
)]
pub async fn salary_history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<StatsCache>,
    query: web::Query<SalaryHistoryQuery>,
) -> actix_web::Result<impl Responder> {
    // employees always get their own history
    let employee_id = auth
        .scope()
        .employee_id()
        .or(query.employee_id)
        .unwrap_or(auth.user_id);

    let history = cache
        .salary_history(employee_id, || async {
            load_salary_history(pool.get_ref(), employee_id)
                .await
                .map(Arc::new)
        })
        .await
        .map_err(|e| ApiError::database(e, "Failed to load salary history"))?;

    Ok(HttpResponse::Ok().json(history.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn employee_stats_count_every_claim_but_sum_only_approved() {
        let rows = vec![
            ("pending".to_string(), 500.0),
            ("approved".to_string(), 1200.0),
            ("approved".to_string(), 300.0),
            ("rejected".to_string(), 80.0),
        ];
        let stats = expense_stats(53000.0, &rows);
        assert_eq!(
            stats,
            EmployeeStats {
                current_salary: 53000.0,
                pending_expenses: 1,
                approved_expenses: 1500.0,
                total_expenses: 4,
            }
        );
    }

    #[test]
    fn employee_without_history_reports_zeroes() {
        assert_eq!(expense_stats(0.0, &[]), EmployeeStats::default());
    }

    #[test]
    fn month_order_lists_all_twelve_months() {
        assert_eq!(MONTH_ORDER.matches('\'').count(), 24);
        assert!(MONTH_ORDER.starts_with("FIELD(month, 'January'"));
    }
}
