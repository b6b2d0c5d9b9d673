use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    utils::{Claims, generate_token, success_to_api_response},
};

use super::model::{
    CreateUserRequest, CreateUserResponse, EmployeeProfile, LoginRequest, LoginResponse,
    MeResponse, Role, User,
};

/// 授权人员创建账号，员工档案随账号一起创建
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    claims.require(Role::Authorized)?;

    let (user, profile) =
        User::create_with_profile(&state.pool, req, state.config.policy.annual_leave_days).await?;

    Ok((
        StatusCode::CREATED,
        success_to_api_response(CreateUserResponse {
            user_id: user.user_id,
            username: user.username,
            role: user.role,
            profile,
        }),
    ))
}

async fn login_as(state: &AppState, req: LoginRequest, role: Role) -> Result<LoginResponse, AppError> {
    let user = User::find_by_username(&state.pool, &req.username)
        .await?
        .ok_or(AppError::Unauthorized)?;

    user.verify_login(&req.password, role)?;

    let (token, expires_at) = generate_token(&user.user_id, user.role, &state.config)?;
    tracing::info!("User {} logged in as {}", user.username, role.as_str());

    Ok(LoginResponse {
        user_id: user.user_id,
        role: user.role,
        token,
        expires_at,
    })
}

#[axum::debug_handler]
pub async fn login_personnel(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let resp = login_as(&state, req, Role::Personnel).await?;
    Ok((StatusCode::OK, success_to_api_response(resp)))
}

#[axum::debug_handler]
pub async fn login_authorized(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let resp = login_as(&state, req, Role::Authorized).await?;
    Ok((StatusCode::OK, success_to_api_response(resp)))
}

#[axum::debug_handler]
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user = User::find_by_id(&state.pool, &claims.sub)
        .await?
        .ok_or(AppError::RecordNotFound("User"))?;
    let profile = EmployeeProfile::find(&state.pool, &user.user_id).await?;

    Ok((
        StatusCode::OK,
        success_to_api_response(MeResponse {
            user_id: user.user_id,
            username: user.username,
            role: user.role,
            profile,
        }),
    ))
}
