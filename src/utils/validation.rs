use serde::Serialize;
use std::collections::BTreeMap;

/// Per-field validation messages, keyed by the request field name.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        // first message per field wins, like an inline form hint
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

/// Loose shape check: one `@`, a non-empty local part, a dotted domain, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

pub fn require_text(errors: &mut FieldErrors, field: &str, value: &str, label: &str) -> bool {
    if value.trim().is_empty() {
        errors.add(field, format!("{label} is required"));
        false
    } else {
        true
    }
}

pub fn require_non_negative(errors: &mut FieldErrors, field: &str, value: f64, label: &str) {
    if !value.is_finite() || value < 0.0 {
        errors.add(field, format!("{label} must be zero or more"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(is_valid_email("jane@company.com"));
        assert!(is_valid_email("a.b+c@mail.example.org"));
        assert!(!is_valid_email("jane@company"));
        assert!(!is_valid_email("@company.com"));
        assert!(!is_valid_email("jane@@company.com"));
        assert!(!is_valid_email("jane doe@company.com"));
        assert!(!is_valid_email("jane@.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn first_message_per_field_is_kept() {
        let mut errors = FieldErrors::new();
        errors.add("email", "Email is required");
        errors.add("email", "Please enter a valid email");
        assert_eq!(errors.get("email"), Some("Email is required"));
    }

    #[test]
    fn serializes_as_flat_map() {
        let mut errors = FieldErrors::new();
        errors.add("amount", "Amount must be greater than zero");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["amount"], "Amount must be greater than zero");
    }

    #[test]
    fn negative_and_nan_amounts_are_rejected() {
        let mut errors = FieldErrors::new();
        require_non_negative(&mut errors, "allowances", -1.0, "Allowances");
        require_non_negative(&mut errors, "deductions", f64::NAN, "Deductions");
        require_non_negative(&mut errors, "basic_salary", 0.0, "Basic salary");
        assert!(errors.get("allowances").is_some());
        assert!(errors.get("deductions").is_some());
        assert!(errors.get("basic_salary").is_none());
    }
}
