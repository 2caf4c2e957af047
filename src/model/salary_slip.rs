use chrono::{DateTime, Month, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::utils::listing::{Listable, SortValue};

pub const MIN_YEAR: i32 = 2020;
pub const MAX_YEAR: i32 = 2030;

/// Salary slip joined with the owner's name and department.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct SalarySlip {
    pub id: u64,
    pub employee_id: u64,

    #[schema(example = "January")]
    pub month: String,

    #[schema(example = 2026)]
    pub year: i32,

    #[schema(example = 50000.0)]
    pub basic_salary: f64,

    #[schema(example = 5000.0)]
    pub allowances: f64,

    #[schema(example = 2000.0)]
    pub deductions: f64,

    #[schema(example = 53000.0)]
    pub net_salary: f64,

    #[schema(example = "pending")]
    pub status: String,

    #[schema(example = "Jane Smith")]
    pub employee_name: Option<String>,

    #[schema(example = "Design")]
    pub department: Option<String>,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,

    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SlipStatus {
    Pending,
    Approved,
    Paid,
}

impl SlipStatus {
    /// Status a slip must currently hold to move to `self`.
    pub fn previous(&self) -> Option<SlipStatus> {
        match self {
            SlipStatus::Pending => None,
            SlipStatus::Approved => Some(SlipStatus::Pending),
            SlipStatus::Paid => Some(SlipStatus::Approved),
        }
    }
}

pub fn net_salary(basic_salary: f64, allowances: f64, deductions: f64) -> f64 {
    basic_salary + allowances - deductions
}

/// Canonical English month name, accepting any case and three-letter forms.
pub fn canonical_month(raw: &str) -> Option<&'static str> {
    Month::from_str(raw.trim()).ok().map(|m| m.name())
}

/// 1..=12 for a recognised month name, 0 otherwise.
pub fn month_index(name: &str) -> u32 {
    Month::from_str(name.trim())
        .map(|m| m.number_from_month())
        .unwrap_or(0)
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SalarySlipSortKey {
    Period,
    Year,
    NetSalary,
    BasicSalary,
    EmployeeName,
    #[default]
    CreatedAt,
}

impl SalarySlip {
    fn period(&self) -> f64 {
        f64::from(self.year) * 12.0 + f64::from(month_index(&self.month))
    }
}

impl Listable for SalarySlip {
    type SortKey = SalarySlipSortKey;

    fn search_fields(&self) -> Vec<Option<&str>> {
        vec![
            self.employee_name.as_deref(),
            self.department.as_deref(),
            Some(self.month.as_str()),
        ]
    }

    fn sort_value(&self, key: SalarySlipSortKey) -> SortValue<'_> {
        match key {
            SalarySlipSortKey::Period => SortValue::Number(self.period()),
            SalarySlipSortKey::Year => SortValue::Number(f64::from(self.year)),
            SalarySlipSortKey::NetSalary => self.net_salary.into(),
            SalarySlipSortKey::BasicSalary => self.basic_salary.into(),
            SalarySlipSortKey::EmployeeName => self.employee_name.as_deref().into(),
            SalarySlipSortKey::CreatedAt => {
                SortValue::Number(self.created_at.timestamp_millis() as f64)
            }
        }
    }
}
