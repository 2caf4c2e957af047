use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::utils::listing::{Listable, SortValue};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "user_id": 42,
        "email": "jane.smith@company.com",
        "full_name": "Jane Smith",
        "department": "Design",
        "designation": "Product Designer",
        "salary": 65000.0,
        "join_date": "2024-01-01",
        "status": "active",
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z"
    })
)]
pub struct Profile {
    pub id: u64,
    pub user_id: u64,
    pub email: String,
    pub full_name: Option<String>,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub salary: Option<f64>,

    #[schema(value_type = Option<String>, format = "date")]
    pub join_date: Option<NaiveDate>,

    #[schema(example = "active")]
    pub status: String,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,

    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EmployeeStatus {
    Active,
    Inactive,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeSortKey {
    FullName,
    Department,
    Salary,
    JoinDate,
    #[default]
    CreatedAt,
}

impl Listable for Profile {
    type SortKey = EmployeeSortKey;

    fn search_fields(&self) -> Vec<Option<&str>> {
        vec![
            self.full_name.as_deref(),
            Some(self.email.as_str()),
            self.department.as_deref(),
        ]
    }

    fn sort_value(&self, key: EmployeeSortKey) -> SortValue<'_> {
        match key {
            EmployeeSortKey::FullName => self.full_name.as_deref().into(),
            EmployeeSortKey::Department => self.department.as_deref().into(),
            EmployeeSortKey::Salary => self.salary.into(),
            EmployeeSortKey::JoinDate => self
                .join_date
                .map_or(SortValue::Missing, |d| SortValue::Text(Cow::Owned(d.to_string()))),
            EmployeeSortKey::CreatedAt => SortValue::Number(self.created_at.timestamp_millis() as f64),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn profile(user_id: u64, name: &str, department: &str, salary: Option<f64>) -> Profile {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::days(user_id as i64);
        Profile {
            id: user_id,
            user_id,
            email: format!("{}@company.com", name.to_lowercase().replace(' ', ".")),
            full_name: Some(name.to_string()),
            department: Some(department.to_string()),
            designation: None,
            salary,
            join_date: NaiveDate::from_ymd_opt(2024, 1, user_id as u32 % 28 + 1),
            status: "active".to_string(),
            created_at: created,
            updated_at: created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::profile;
    use super::*;
    use crate::utils::listing::{Pagination, SortOrder, apply};
    use std::str::FromStr;

    #[test]
    fn search_looks_at_name_email_and_department() {
        let rows = vec![
            profile(1, "Jane Smith", "Design", Some(65000.0)),
            profile(2, "John Doe", "Engineering", Some(80000.0)),
            profile(3, "Sarah Williams", "HR", None),
        ];

        let by_dept = apply(rows.clone(), Some("engin"), EmployeeSortKey::CreatedAt, SortOrder::Desc, Pagination::default());
        assert_eq!(by_dept.data.len(), 1);
        assert_eq!(by_dept.data[0].user_id, 2);

        let by_email = apply(rows, Some("sarah.williams@"), EmployeeSortKey::CreatedAt, SortOrder::Desc, Pagination::default());
        assert_eq!(by_email.data[0].user_id, 3);
    }

    #[test]
    fn default_sort_is_newest_first() {
        let rows = vec![
            profile(1, "Jane Smith", "Design", None),
            profile(3, "Sarah Williams", "HR", None),
            profile(2, "John Doe", "Engineering", None),
        ];
        let page = apply(rows, None, EmployeeSortKey::default(), SortOrder::default(), Pagination::default());
        let ids: Vec<u64> = page.data.iter().map(|p| p.user_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn salary_sorts_numerically() {
        let rows = vec![
            profile(1, "A", "X", Some(9000.0)),
            profile(2, "B", "X", Some(10000.0)),
            profile(3, "C", "X", Some(800.0)),
        ];
        let page = apply(rows, None, EmployeeSortKey::Salary, SortOrder::Asc, Pagination::default());
        let salaries: Vec<f64> = page.data.iter().filter_map(|p| p.salary).collect();
        assert_eq!(salaries, vec![800.0, 9000.0, 10000.0]);
    }

    #[test]
    fn status_parses() {
        assert_eq!(EmployeeStatus::from_str("inactive").unwrap(), EmployeeStatus::Inactive);
        assert!(EmployeeStatus::from_str("fired").is_err());
    }
}
