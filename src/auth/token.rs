/// Session token issuing and verification (HS256 JWT)
use crate::{
    auth::policy::{CallerIdentity, Role},
    config::AuthConfig,
    db::account::Account,
    error::{ApiError, ApiResult},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed validity window of an issued token
pub fn token_lifetime() -> Duration {
    Duration::days(2)
}

/// Claims embedded in every session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub login: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies session tokens with the configured symmetric key
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.jwt_issuer.as_str()]);
        validation.set_audience(&[config.jwt_audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = 60;

        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
        }
    }

    /// Issue a token for `account`, valid from now
    pub fn issue(&self, account: &Account) -> ApiResult<String> {
        self.issue_at(account, Utc::now())
    }

    pub fn issue_at(&self, account: &Account, issued_at: DateTime<Utc>) -> ApiResult<String> {
        let claims = Claims {
            sub: account.id.to_string(),
            role: Role::for_account(account),
            login: account.login.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: issued_at.timestamp(),
            exp: (issued_at + token_lifetime()).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Token(format!("Failed to sign token: {}", e)))
    }

    /// Verify signature, issuer, audience and expiry, and expose the caller
    pub fn verify(&self, token: &str) -> ApiResult<CallerIdentity> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "token verification failed");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::Unauthenticated("Token has expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    ApiError::Unauthenticated("Invalid token signature".to_string())
                }
                _ => ApiError::Unauthenticated("Invalid token".to_string()),
            }
        })?;

        let claims = data.claims;
        let id = Uuid::parse_str(&claims.sub).ok();
        if id.is_none() {
            tracing::warn!(login = %claims.login, "token subject is not an account id");
        }

        Ok(CallerIdentity::new(id, claims.login, claims.role))
    }
}
