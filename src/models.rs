use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::model::role::Role;
use crate::utils::validation::{FieldErrors, is_valid_email};

pub const MIN_NAME_LEN: usize = 2;
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Deserialize, ToSchema)]
pub struct SignupReq {
    #[schema(example = "jane.smith@company.com")]
    pub email: String,
    #[schema(example = "secret123")]
    pub password: String,
    #[schema(example = "secret123")]
    pub confirm_password: String,
    #[schema(example = "Jane Smith")]
    pub full_name: String,
    /// Requested role, `employee` when omitted
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Employee
}

impl SignupReq {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        let name = self.full_name.trim();
        if name.is_empty() {
            errors.add("full_name", "Name is required");
        } else if name.chars().count() < MIN_NAME_LEN {
            errors.add("full_name", "Name must be at least 2 characters");
        }

        let email = self.email.trim();
        if email.is_empty() {
            errors.add("email", "Email is required");
        } else if !is_valid_email(email) {
            errors.add("email", "Please enter a valid email");
        }

        if self.password.is_empty() {
            errors.add("password", "Password is required");
        } else if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.add("password", "Password must be at least 6 characters");
        }

        if self.confirm_password.is_empty() {
            errors.add("confirm_password", "Please confirm your password");
        } else if self.password != self.confirm_password {
            errors.add("confirm_password", "Passwords do not match");
        }

        errors.into_result()
    }
}

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "jane.smith@company.com")]
    pub email: String,
    #[schema(example = "secret123")]
    pub password: String,
}

#[derive(FromRow)]
pub struct UserSql {
    pub id: u64,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub role: Role,
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub role: Role,
    #[schema(example = "/employee")]
    pub dashboard: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub user_id: u64,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    #[schema(example = "/employee")]
    pub dashboard: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(name: &str, email: &str, password: &str, confirm: &str) -> SignupReq {
        SignupReq {
            email: email.into(),
            password: password.into(),
            confirm_password: confirm.into(),
            full_name: name.into(),
            role: Role::Employee,
        }
    }

    #[test]
    fn valid_signup_passes() {
        assert!(signup("Jane Smith", "jane@company.com", "secret1", "secret1").validate().is_ok());
    }

    #[test]
    fn every_field_reports_its_own_error() {
        let errors = signup("J", "jane@", "123", "124").validate().unwrap_err();
        assert_eq!(errors.get("full_name"), Some("Name must be at least 2 characters"));
        assert_eq!(errors.get("email"), Some("Please enter a valid email"));
        assert_eq!(errors.get("password"), Some("Password must be at least 6 characters"));
        assert_eq!(errors.get("confirm_password"), Some("Passwords do not match"));
    }

    #[test]
    fn empty_fields_are_required() {
        let errors = signup("", "", "", "").validate().unwrap_err();
        assert_eq!(errors.get("full_name"), Some("Name is required"));
        assert_eq!(errors.get("email"), Some("Email is required"));
        assert_eq!(errors.get("password"), Some("Password is required"));
        assert_eq!(errors.get("confirm_password"), Some("Please confirm your password"));
    }

    #[test]
    fn role_defaults_to_employee() {
        let req: SignupReq = serde_json::from_value(serde_json::json!({
            "email": "a@b.co",
            "password": "secret1",
            "confirm_password": "secret1",
            "full_name": "Al"
        }))
        .unwrap();
        assert_eq!(req.role, Role::Employee);
    }
}
