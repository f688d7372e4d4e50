//! Input checks for registration and login. All violations are collected and
//! reported together, before any store access.

use validator::ValidateEmail;

use crate::err::Error;
use crate::models::Role;

const MAX_FIELD_LEN: usize = 255;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RegistrationForm {
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "confirm-password", alias = "confirm_password")]
    pub confirm_password: String,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub fullname: String,
    pub email: String,
    pub role: Role,
    pub password: String,
}

/// Trims and lower-cases an identity.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn is_email(email: &str) -> bool {
    email.to_string().validate_email()
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphabetic() || ch.is_whitespace() || ch == '-' || ch == '\''
}

fn check_email(email: &str, domain: &str, errors: &mut Vec<String>) {
    if email.chars().count() > MAX_FIELD_LEN {
        errors.push("Email cannot exceed 255 characters.".to_string());
    }
    if !is_email(email) {
        errors.push("Please provide a valid email address.".to_string());
    }
    if !email.ends_with(&format!("@{}", domain)) {
        errors.push(format!("Only emails ending in @{} are allowed.", domain));
    }
}

fn check_password_strength(password: &str, errors: &mut Vec<String>) {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        errors.push("Password must be at least 8 characters long.".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number.".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter.".to_string());
    }
    if len > MAX_PASSWORD_LEN {
        errors.push("Password cannot exceed 128 characters.".to_string());
    }
}

impl RegistrationForm {
    pub fn validate(self, domain: &str) -> Result<Registration, Error> {
        let fullname = self.fullname.trim().to_string();
        let email = normalize_email(&self.email);
        let role = self.role.trim().to_string();
        let mut errors = Vec::new();

        if fullname.is_empty()
            || email.is_empty()
            || role.is_empty()
            || self.password.is_empty()
            || self.confirm_password.is_empty()
        {
            errors.push("All fields must be filled out.".to_string());
        }

        if !fullname.is_empty() {
            if fullname.chars().count() > MAX_FIELD_LEN {
                errors.push("Full name cannot exceed 255 characters.".to_string());
            }
            if !fullname.chars().all(is_name_char) {
                errors.push("Full name contains invalid characters.".to_string());
            }
        }

        if !email.is_empty() {
            check_email(&email, domain, &mut errors);
        }

        let parsed_role = match role.as_str() {
            "" => None,
            "student" | "fi" | "faculty" => role.parse::<Role>().ok(),
            _ => {
                errors.push("Invalid user role selected.".to_string());
                None
            }
        };

        if self.password != self.confirm_password {
            errors.push("Passwords do not match.".to_string());
        }
        if !self.password.is_empty() {
            check_password_strength(&self.password, &mut errors);
        }

        match parsed_role {
            Some(role) if errors.is_empty() => Ok(Registration {
                fullname,
                email,
                role,
                password: self.password,
            }),
            _ => Err(Error::validation(errors.join(" "))),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct LoginForm {
    #[serde(default, alias = "email")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub remember: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Login {
    pub email: String,
    pub password: String,
    pub remember: bool,
}

impl LoginForm {
    pub fn validate(self, domain: &str) -> Result<Login, Error> {
        let email = normalize_email(&self.username);
        let mut errors = Vec::new();

        if email.is_empty() || self.password.is_empty() {
            errors.push("Email and password are required.".to_string());
        }
        if !email.is_empty() {
            if !is_email(&email) {
                errors.push("Invalid email format.".to_string());
            }
            if !email.ends_with(&format!("@{}", domain)) {
                errors.push(format!("Only @{} emails are allowed.", domain));
            }
        }
        if self.password.chars().count() > MAX_PASSWORD_LEN {
            errors.push("Invalid password provided.".to_string());
        }

        let remember = matches!(self.remember.as_deref(), Some("1") | Some("true") | Some("on"));
        if !errors.is_empty() {
            return Err(Error::validation(errors.join(" ")));
        }
        Ok(Login {
            email,
            password: self.password,
            remember,
        })
    }
}
