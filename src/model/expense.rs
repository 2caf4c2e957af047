use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::utils::listing::{Listable, SortValue};

/// Expense claim joined with the owner's name.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Expense {
    pub id: u64,
    pub employee_id: u64,

    #[schema(example = "Client lunch meeting")]
    pub title: String,

    #[schema(example = "Meals")]
    pub category: String,

    #[schema(example = 1200.0)]
    pub amount: f64,

    #[schema(example = "2026-01-15", value_type = String, format = "date")]
    pub date: NaiveDate,

    pub description: Option<String>,

    #[schema(example = "pending")]
    pub status: String,

    #[schema(example = "Jane Smith")]
    pub employee_name: Option<String>,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,

    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExpenseStatus {
    Pending,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    /// Approved and rejected claims are final.
    pub fn is_decided(&self) -> bool {
        !matches!(self, ExpenseStatus::Pending)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr, EnumIter)]
pub enum ExpenseCategory {
    Travel,
    Meals,
    Equipment,
    Software,
    #[serde(rename = "Office Supplies")]
    #[strum(serialize = "Office Supplies")]
    OfficeSupplies,
    Training,
    Other,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseSortKey {
    Date,
    Amount,
    Title,
    Category,
    #[default]
    CreatedAt,
}

impl Listable for Expense {
    type SortKey = ExpenseSortKey;

    fn search_fields(&self) -> Vec<Option<&str>> {
        vec![
            Some(self.title.as_str()),
            Some(self.category.as_str()),
            self.description.as_deref(),
            self.employee_name.as_deref(),
        ]
    }

    fn sort_value(&self, key: ExpenseSortKey) -> SortValue<'_> {
        match key {
            ExpenseSortKey::Date => SortValue::Text(Cow::Owned(self.date.to_string())),
            ExpenseSortKey::Amount => self.amount.into(),
            ExpenseSortKey::Title => self.title.as_str().into(),
            ExpenseSortKey::Category => self.category.as_str().into(),
            ExpenseSortKey::CreatedAt => SortValue::Number(self.created_at.timestamp_millis() as f64),
        }
    }
}

/// Totals shown above an expense list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct ExpenseSummary {
    pub pending_total: f64,
    pub approved_total: f64,
    pub pending_count: usize,
    pub total_count: usize,
}

impl ExpenseSummary {
    pub fn from_expenses<'a>(expenses: impl IntoIterator<Item = &'a Expense>) -> Self {
        expenses
            .into_iter()
            .fold(ExpenseSummary::default(), |mut acc, expense| {
                acc.total_count += 1;
                match expense.status.as_str() {
                    "pending" => {
                        acc.pending_total += expense.amount;
                        acc.pending_count += 1;
                    }
                    "approved" => acc.approved_total += expense.amount,
                    _ => {}
                }
                acc
            })
    }
}
