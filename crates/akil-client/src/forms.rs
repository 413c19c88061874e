//! Input checks run before credentials or codes leave the process.

use std::collections::BTreeMap;

/// Field name -> message. Empty when the form is valid.
pub type FieldErrors = BTreeMap<&'static str, String>;

#[derive(Debug, Clone, Default)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

impl SignInForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if let Some(msg) = check_email(&self.email) {
            errors.insert("email", msg);
        }
        if self.password.is_empty() {
            errors.insert("password", "Password is required".to_string());
        }
        errors
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerifyEmailForm {
    pub email: String,
    pub otp: String,
}

impl VerifyEmailForm {
    pub fn new(email: impl Into<String>, otp: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            otp: otp.into(),
        }
    }

    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if let Some(msg) = check_email(&self.email) {
            errors.insert("email", msg);
        }
        if self.otp.trim().is_empty() {
            errors.insert("otp", "Verification code is required".to_string());
        }
        errors
    }
}

/// One line per field, for error messages.
pub fn describe(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, msg)| format!("{}: {}", field, msg))
        .collect::<Vec<_>>()
        .join("; ")
}

fn check_email(email: &str) -> Option<String> {
    let email = email.trim();
    if email.is_empty() {
        return Some("Email is required".to_string());
    }
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.') =>
        {
            None
        }
        _ => Some("Email is invalid".to_string()),
    }
}
