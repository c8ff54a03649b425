/// Per-account and admin endpoints under /api/application
use crate::{
    account::{
        ApiResponse, ChangeLoginRequest, ChangePasswordRequest, SelfAuthenticateRequest,
        UpdateProfileRequest, UserInfo, UserListItem, MAX_AGE,
    },
    api::ApiJson,
    auth::AuthContext,
    context::AppContext,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Deserialize;

/// Build user routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/application", get(list_active))
        .route("/api/application/older-than/:age", get(older_than))
        .route("/api/application/:login", delete(delete_user))
        .route("/api/application/:login/profile", patch(update_profile))
        .route("/api/application/:login/password", patch(change_password))
        .route("/api/application/:login/login", patch(change_login))
        .route("/api/application/:login/info", get(get_info))
        .route("/api/application/:login/authenticate-self", post(authenticate_self))
        .route("/api/application/:login/restore", post(restore_user))
}

async fn update_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(login): Path<String>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    ctx.account_manager
        .update_profile(&login, req, &auth.caller)
        .await?;
    Ok(Json(ApiResponse::message("Profile updated")))
}

async fn change_password(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(login): Path<String>,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    ctx.account_manager
        .change_password(&login, req, &auth.caller)
        .await?;
    Ok(Json(ApiResponse::message("Password changed")))
}

async fn change_login(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(login): Path<String>,
    ApiJson(req): ApiJson<ChangeLoginRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    ctx.account_manager
        .change_login(&login, req, &auth.caller)
        .await?;
    Ok(Json(ApiResponse::message("Login changed")))
}

/// Active accounts, oldest first (admin only)
async fn list_active(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<Vec<UserListItem>>>> {
    let users = ctx.account_manager.list_active(&auth.caller).await?;
    Ok(Json(ApiResponse::ok(users)))
}

/// Profile and status of any account (admin only)
async fn get_info(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(login): Path<String>,
) -> ApiResult<Json<ApiResponse<UserInfo>>> {
    let info = ctx.account_manager.get_by_login(&login, &auth.caller).await?;
    Ok(Json(ApiResponse::ok(info)))
}

async fn authenticate_self(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(login): Path<String>,
    ApiJson(req): ApiJson<SelfAuthenticateRequest>,
) -> ApiResult<Json<ApiResponse<UserInfo>>> {
    let info = ctx
        .account_manager
        .self_authenticate(&login, req, &auth.caller)
        .await?;
    Ok(Json(ApiResponse::ok(info)))
}

/// Active accounts at least `age` years old (admin only)
async fn older_than(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(age): Path<String>,
) -> ApiResult<Json<ApiResponse<Vec<UserInfo>>>> {
    let age: u32 = age.parse().map_err(|_| {
        ApiError::Validation(format!("age: must be a whole number between 0 and {}", MAX_AGE))
    })?;

    let users = ctx
        .account_manager
        .users_older_than(age, &auth.caller)
        .await?;
    Ok(Json(ApiResponse::ok(users)))
}

#[derive(Debug, Deserialize)]
struct DeleteParams {
    #[serde(default)]
    hard: bool,
}

/// Soft delete by default; `?hard=true` removes the record (admin only)
async fn delete_user(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(login): Path<String>,
    params: Result<Query<DeleteParams>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let Query(params) = params.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;

    ctx.account_manager
        .delete_account(&login, params.hard, &auth.caller)
        .await?;

    let message = if params.hard {
        "User permanently deleted"
    } else {
        "User deleted"
    };
    Ok(Json(ApiResponse::message(message)))
}

async fn restore_user(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(login): Path<String>,
) -> ApiResult<Json<ApiResponse<()>>> {
    ctx.account_manager
        .restore_account(&login, &auth.caller)
        .await?;
    Ok(Json(ApiResponse::message("User restored")))
}
