use crate::api::employee::{EmployeeListResponse, EmployeeQuery, UpdateEmployee};
use crate::api::expense::{CreateExpense, ExpenseListResponse, ExpenseQuery, UpdateExpense};
use crate::api::role::RoleResponse;
use crate::api::salary_slip::{
    CreateSalarySlip, SalarySlipListResponse, SalarySlipQuery, UpdateSalarySlip, UpdateSlipStatus,
};
use crate::api::stats::SalaryHistoryQuery;
use crate::auth::handlers::RefreshResponse;
use crate::model::expense::{Expense, ExpenseCategory, ExpenseSortKey, ExpenseStatus, ExpenseSummary};
use crate::model::profile::{EmployeeSortKey, EmployeeStatus, Profile};
use crate::model::role::Role;
use crate::model::salary_slip::{SalarySlip, SalarySlipSortKey, SlipStatus};
use crate::model::stats::{AdminStats, EmployeeStats, SalaryHistoryEntry, TrendPoint};
use crate::models::{LoginReqDto, LoginResponse, SessionResponse, SignupReq};
use crate::utils::listing::SortOrder;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

/// Registers the JWT bearer scheme the handlers reference as `bearer_auth`.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Payroll & Expense API",
        version = "1.0.0",
        description = r#"
## Payroll & Expense Management

Role-gated management of salary slips, expense claims and the employee roster.

### 🔹 Key Features
- **Employees**
  - List, view, edit and remove employee profiles (admin)
- **Salary Slips**
  - Issue slips, edit pending amounts, move slips from pending to approved to paid
- **Expenses**
  - Submit claims, edit pending claims, approve or reject (admin)
- **Dashboards**
  - Admin totals, employee totals, payroll and expense trends, salary history

### 🔐 Security
Protected endpoints take a **JWT Bearer** access token from `/auth/login`.
Employees only ever see their own slips and claims; admins see everything.

### 📦 Response Format
- JSON bodies; errors are `{"message": ...}`, validation errors add `errors` per field
- List endpoints accept `search`, `sort_by`, `sort_order`, `page` and `page_size`

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::auth::handlers::signup,
        crate::auth::handlers::login,
        crate::auth::handlers::session,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::get_own_profile,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,

        crate::api::salary_slip::create_salary_slip,
        crate::api::salary_slip::list_salary_slips,
        crate::api::salary_slip::get_salary_slip,
        crate::api::salary_slip::update_salary_slip,
        crate::api::salary_slip::update_salary_slip_status,

        crate::api::expense::create_expense,
        crate::api::expense::list_expenses,
        crate::api::expense::get_expense,
        crate::api::expense::update_expense,
        crate::api::expense::approve_expense,
        crate::api::expense::reject_expense,
        crate::api::expense::delete_expense,

        crate::api::stats::admin_stats,
        crate::api::stats::employee_stats,
        crate::api::stats::payroll_trend,
        crate::api::stats::expense_trend,
        crate::api::stats::salary_history,

        crate::api::role::get_role
    ),
    components(
        schemas(
            SignupReq,
            LoginReqDto,
            LoginResponse,
            SessionResponse,
            RefreshResponse,
            Role,
            RoleResponse,
            SortOrder,
            Profile,
            EmployeeStatus,
            EmployeeSortKey,
            EmployeeQuery,
            EmployeeListResponse,
            UpdateEmployee,
            SalarySlip,
            SlipStatus,
            SalarySlipSortKey,
            SalarySlipQuery,
            SalarySlipListResponse,
            CreateSalarySlip,
            UpdateSalarySlip,
            UpdateSlipStatus,
            Expense,
            ExpenseStatus,
            ExpenseCategory,
            ExpenseSortKey,
            ExpenseSummary,
            ExpenseQuery,
            ExpenseListResponse,
            CreateExpense,
            UpdateExpense,
            AdminStats,
            EmployeeStats,
            TrendPoint,
            SalaryHistoryEntry,
            SalaryHistoryQuery
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Sign up, login and session APIs"),
        (name = "Employee", description = "Employee roster APIs"),
        (name = "Salary Slips", description = "Salary slip APIs"),
        (name = "Expenses", description = "Expense claim APIs"),
        (name = "Stats", description = "Dashboard aggregate APIs"),
        (name = "Roles", description = "Role lookup APIs"),
    )
)]
pub struct ApiDoc;
