/// API routes and handlers
pub mod accounts;
pub mod health;
pub mod users;

use crate::{context::AppContext, error::ApiError};
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json, Router,
};
use serde::de::DeserializeOwned;

/// Build account API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(accounts::routes())
        .merge(users::routes())
}

/// JSON body extractor whose rejections use the service error body
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
        Ok(ApiJson(value))
    }
}
