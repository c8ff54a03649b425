/// Request authentication
///
/// Bearer-token extractors that turn the `Authorization` header into an
/// explicit [`CallerIdentity`] for handlers.
pub mod password;
pub mod policy;
pub mod token;

pub use password::{hash_password, verify_dummy_password, verify_password};
pub use policy::{authorize, CallerIdentity, Decision, DenyReason, Operation, Role};
pub use token::{Claims, TokenIssuer};

use crate::{context::AppContext, error::ApiError};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authenticated caller; rejects the request when no valid token is present
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub caller: CallerIdentity,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthenticated("Missing authorization header".to_string()))?;

        let caller = state.token_issuer.verify(token)?;

        Ok(AuthContext { caller })
    }
}

/// Optional caller - anonymous when the token is absent or does not verify
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub caller: Option<CallerIdentity>,
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let caller = extract_bearer_token(&parts.headers)
            .and_then(|token| state.token_issuer.verify(token).ok());

        Ok(OptionalAuthContext { caller })
    }
}
