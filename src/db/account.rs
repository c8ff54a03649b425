/// Account database model
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Gender, persisted and serialized as 0, 1 or 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Gender {
    Male,
    Female,
    Unspecified,
}

impl From<Gender> for i64 {
    fn from(value: Gender) -> Self {
        match value {
            Gender::Male => 0,
            Gender::Female => 1,
            Gender::Unspecified => 2,
        }
    }
}

impl TryFrom<i64> for Gender {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Gender::Male),
            1 => Ok(Gender::Female),
            2 => Ok(Gender::Unspecified),
            other => Err(format!("gender must be 0, 1 or 2, got {}", other)),
        }
    }
}

/// Account record in the database
///
/// `revoked_on` and `revoked_by` are always both set or both empty; the
/// mutators below are the only code that touches them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub login: String,
    pub password_hash: String,
    pub name: String,
    pub gender: Gender,
    pub birthday: Option<NaiveDate>,
    pub admin: bool,
    pub created_on: DateTime<Utc>,
    pub created_by: String,
    pub modified_on: DateTime<Utc>,
    pub modified_by: String,
    pub revoked_on: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
}

impl Account {
    pub fn is_revoked(&self) -> bool {
        self.revoked_on.is_some()
    }

    pub fn is_active(&self) -> bool {
        !self.is_revoked()
    }

    /// Stamp a modification; never moves `modified_on` before `created_on`
    pub fn touch(&mut self, modified_by: &str, now: DateTime<Utc>) {
        self.modified_on = now.max(self.created_on);
        self.modified_by = modified_by.to_string();
    }

    /// Soft-delete. Already revoked accounts keep their original stamps.
    pub fn revoke(&mut self, revoked_by: &str, now: DateTime<Utc>) {
        if self.is_revoked() {
            return;
        }
        self.revoked_on = Some(now.max(self.created_on));
        self.revoked_by = Some(revoked_by.to_string());
    }

    /// Clear revocation and record who restored the account
    pub fn restore(&mut self, restored_by: &str, now: DateTime<Utc>) {
        self.revoked_on = None;
        self.revoked_by = None;
        self.touch(restored_by, now);
    }
}
