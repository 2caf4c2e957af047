use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AdminStats {
    #[schema(example = 24)]
    pub total_employees: i64,
    #[schema(example = 1250000.0)]
    pub total_payroll: f64,
    #[schema(example = 3)]
    pub pending_expenses: i64,
    #[schema(example = 12)]
    pub approved_slips: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EmployeeStats {
    /// Net salary of the most recent slip, 0 when none exists
    #[schema(example = 53000.0)]
    pub current_salary: f64,
    #[schema(example = 2)]
    pub pending_expenses: usize,
    #[schema(example = 1200.0)]
    pub approved_expenses: f64,
    #[schema(example = 5)]
    pub total_expenses: usize,
}

/// One month of a payroll or expense trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct TrendPoint {
    #[schema(example = "January")]
    pub month: String,
    #[schema(example = 2026)]
    pub year: i64,
    #[schema(example = 250000.0)]
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct SalaryHistoryEntry {
    #[schema(example = "January")]
    pub month: String,
    #[schema(example = 2026)]
    pub year: i32,
    #[schema(example = 53000.0)]
    pub net_salary: f64,
    #[schema(example = "paid")]
    pub status: String,
}
