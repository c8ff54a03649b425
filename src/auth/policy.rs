/// Identity and authorization policy
///
/// Pure decision logic: given an operation, the caller (absent for anonymous
/// requests) and the target account when there is one, decide whether the
/// operation may proceed. Nothing here touches the store or the clock.
use crate::{
    db::account::Account,
    error::{ApiError, ApiResult},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

/// Role carried in the session token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Admin => "Admin",
        }
    }

    /// Role granted by an account's admin flag
    pub fn for_account(account: &Account) -> Self {
        if account.admin {
            Role::Admin
        } else {
            Role::User
        }
    }
}

impl FromStr for Role {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(Role::User),
            "Admin" => Ok(Role::Admin),
            _ => Err(ApiError::Validation(format!("Invalid role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated subject performing a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Account id from the token; `None` when the token carried an unusable subject
    pub id: Option<Uuid>,
    pub login: String,
    pub role: Role,
}

impl CallerIdentity {
    pub fn new(id: Option<Uuid>, login: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            login: login.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Operations subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Register { admin: bool },
    Login,
    UpdateProfile,
    ChangePassword,
    ChangeLogin,
    SelfAuthenticate,
    ListActive,
    GetByLogin,
    QueryByMinimumAge,
    SoftDelete,
    HardDelete,
    Restore,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Register { .. } => "register",
            Operation::Login => "login",
            Operation::UpdateProfile => "update_profile",
            Operation::ChangePassword => "change_password",
            Operation::ChangeLogin => "change_login",
            Operation::SelfAuthenticate => "self_authenticate",
            Operation::ListActive => "list_active",
            Operation::GetByLogin => "get_by_login",
            Operation::QueryByMinimumAge => "query_by_minimum_age",
            Operation::SoftDelete => "soft_delete",
            Operation::HardDelete => "hard_delete",
            Operation::Restore => "restore",
        }
    }
}

/// Why an operation was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DenyReason {
    #[error("no caller identity")]
    Unauthenticated,
    #[error("admin role required")]
    AdminRequired,
    #[error("caller does not own the target account")]
    NotOwner,
    #[error("caller identity does not match the target account")]
    IdentityMismatch,
    #[error("target account does not exist")]
    TargetMissing,
    #[error("target account is missing or revoked")]
    TargetRevoked,
    #[error("target account is missing or not revoked")]
    TargetNotRevoked,
}

impl From<DenyReason> for ApiError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::Unauthenticated => {
                ApiError::Unauthenticated("Caller identity required".to_string())
            }
            DenyReason::AdminRequired => ApiError::Forbidden("Admin role required".to_string()),
            DenyReason::NotOwner => {
                ApiError::Forbidden("Only the account owner or an admin may do this".to_string())
            }
            DenyReason::IdentityMismatch => ApiError::InvalidCredential,
            DenyReason::TargetMissing => ApiError::NotFound,
            DenyReason::TargetRevoked => ApiError::NotFoundOrRevoked,
            DenyReason::TargetNotRevoked => ApiError::NotFoundOrNotRevoked,
        }
    }
}

/// Policy decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> ApiResult<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason.into()),
        }
    }
}

macro_rules! deny {
    ($reason:ident) => {
        return Decision::Deny(DenyReason::$reason)
    };
}

/// Decide whether `caller` may perform `op` on `target`.
///
/// Check order fixes which reason wins when several apply: for per-account
/// mutations a missing or revoked target is reported before ownership, for
/// admin operations the role is checked before the target.
pub fn authorize(
    op: Operation,
    caller: Option<&CallerIdentity>,
    target: Option<&Account>,
) -> Decision {
    match op {
        Operation::Register { admin: false } => Decision::Allow,

        Operation::Login => match target {
            None => Decision::Deny(DenyReason::TargetMissing),
            Some(account) if account.is_revoked() => Decision::Deny(DenyReason::TargetRevoked),
            Some(_) => Decision::Allow,
        },

        Operation::Register { admin: true } => {
            let Some(caller) = caller else { deny!(Unauthenticated) };
            if !caller.is_admin() {
                deny!(AdminRequired);
            }
            Decision::Allow
        }

        Operation::UpdateProfile | Operation::ChangePassword | Operation::ChangeLogin => {
            let Some(caller) = caller else { deny!(Unauthenticated) };
            let Some(account) = target.filter(|a| a.is_active()) else { deny!(TargetRevoked) };
            // Logins can be freed and reused, so the token's account id must match too
            if caller.is_admin() || (caller.login == account.login && caller.id == Some(account.id)) {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotOwner)
            }
        }

        Operation::SelfAuthenticate => {
            let Some(caller) = caller else { deny!(Unauthenticated) };
            let Some(account) = target.filter(|a| a.is_active()) else { deny!(TargetRevoked) };
            if caller.id == Some(account.id) {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::IdentityMismatch)
            }
        }

        Operation::ListActive | Operation::QueryByMinimumAge => {
            let Some(caller) = caller else { deny!(Unauthenticated) };
            if !caller.is_admin() {
                deny!(AdminRequired);
            }
            Decision::Allow
        }

        Operation::GetByLogin | Operation::SoftDelete | Operation::HardDelete => {
            let Some(caller) = caller else { deny!(Unauthenticated) };
            if !caller.is_admin() {
                deny!(AdminRequired);
            }
            if target.is_none() {
                deny!(TargetMissing);
            }
            Decision::Allow
        }

        Operation::Restore => {
            let Some(caller) = caller else { deny!(Unauthenticated) };
            if !caller.is_admin() {
                deny!(AdminRequired);
            }
            match target {
                Some(account) if account.is_revoked() => Decision::Allow,
                _ => Decision::Deny(DenyReason::TargetNotRevoked),
            }
        }
    }
}
