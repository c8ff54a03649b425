/// Anonymous entry points: registration and login
use crate::{
    account::{ApiResponse, CreateUserRequest, LoginRequest, LoginResponse},
    api::ApiJson,
    auth::OptionalAuthContext,
    context::AppContext,
    error::ApiResult,
};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

/// Build registration and login routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/application/createNewUser", post(create_user))
        .route("/api/application/login", post(login))
}

/// Register an account; an admin token is needed to create another admin
async fn create_user(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<()>>)> {
    ctx.account_manager
        .register(req, auth.caller.as_ref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::message("User registered successfully")),
    ))
}

async fn login(
    State(ctx): State<AppContext>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let (_, token) = ctx.account_manager.authenticate(req).await?;

    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".to_string(),
        token,
    }))
}
