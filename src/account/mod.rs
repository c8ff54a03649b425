/// Account management
///
/// Request and response shapes for the account endpoints, field validation,
/// and the lifecycle operations in [`AccountManager`].
mod manager;

pub use manager::AccountManager;

use crate::db::account::{Account, Gender};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

pub const MAX_LOGIN_LENGTH: usize = 64;
pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_AGE: u32 = 150;

/// Logins that would shadow fixed routes under `/api/application`
const RESERVED_LOGINS: &[&str] = &["login", "createNewUser"];

/// Registration request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(custom(function = "validate_login"))]
    pub login: String,
    #[validate(length(min = 1, max = 128, message = "must be 1 to 128 characters"))]
    pub password: String,
    #[validate(custom(function = "validate_name"))]
    pub name: String,
    pub gender: Gender,
    #[serde(default, deserialize_with = "birthday::deserialize")]
    #[validate(custom(function = "validate_birthday"))]
    pub birthday: Option<NaiveDate>,
    #[serde(default)]
    pub admin: bool,
}

/// Login request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub login: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

/// Profile update request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(custom(function = "validate_name"))]
    pub name: String,
    pub gender: Gender,
    #[serde(default, deserialize_with = "birthday::deserialize")]
    #[validate(custom(function = "validate_birthday"))]
    pub birthday: Option<NaiveDate>,
}

/// Password change request; `old_password` is ignored for admin callers
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    #[validate(length(max = 128, message = "must be at most 128 characters"))]
    pub old_password: String,
    #[validate(length(min = 1, max = 128, message = "must be 1 to 128 characters"))]
    pub new_password: String,
}

/// Login change request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLoginRequest {
    #[validate(custom(function = "validate_login"))]
    pub new_login: String,
}

/// Self-authentication request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SelfAuthenticateRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

/// Uniform success envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: "OK".to_string(),
            data: Some(data),
        }
    }
}

/// Login success body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
}

/// Entry of the active-user listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListItem {
    pub id: Uuid,
    pub login: String,
    pub created_on: DateTime<Utc>,
}

impl From<&Account> for UserListItem {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            login: account.login.clone(),
            created_on: account.created_on,
        }
    }
}

/// Profile projection returned to admins and to self-authenticated owners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub login: String,
    pub name: String,
    pub gender: Gender,
    pub birthday: Option<NaiveDate>,
    pub is_active: bool,
}

impl From<&Account> for UserInfo {
    fn from(account: &Account) -> Self {
        Self {
            login: account.login.clone(),
            name: account.name.clone(),
            gender: account.gender,
            birthday: account.birthday,
            is_active: account.is_active(),
        }
    }
}

fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

/// Login rule: 1 to 64 ASCII letters or digits, not a reserved route segment
pub fn validate_login(login: &str) -> Result<(), ValidationError> {
    if login.is_empty() || login.len() > MAX_LOGIN_LENGTH {
        return Err(validation_error("login_length", "must be 1 to 64 characters"));
    }
    if !login.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(validation_error(
            "login_charset",
            "may contain only Latin letters and digits",
        ));
    }
    if RESERVED_LOGINS.contains(&login) {
        return Err(validation_error("login_reserved", "is reserved"));
    }
    Ok(())
}

/// Name rule: 1 to 100 letters of any script
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let count = name.chars().count();
    if count == 0 || count > MAX_NAME_LENGTH {
        return Err(validation_error("name_length", "must be 1 to 100 characters"));
    }
    if !name.chars().all(char::is_alphabetic) {
        return Err(validation_error("name_charset", "may contain only letters"));
    }
    Ok(())
}

pub fn validate_birthday(birthday: &NaiveDate) -> Result<(), ValidationError> {
    if *birthday > Utc::now().date_naive() {
        return Err(validation_error("birthday_future", "cannot be in the future"));
    }
    Ok(())
}

/// Parse a birthday given as a calendar date or a timestamp.
///
/// Timestamps with an offset are converted to UTC before the date is taken;
/// timestamps without one are read as UTC.
pub fn parse_birthday(raw: &str) -> Result<NaiveDate, String> {
    let raw = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp.with_timezone(&Utc).date_naive());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc().date_naive());
    }

    Err(format!(
        "invalid birthday '{}', expected YYYY-MM-DD or an RFC 3339 timestamp",
        raw
    ))
}

mod birthday {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => super::parse_birthday(&raw).map(Some).map_err(de::Error::custom),
        }
    }
}
