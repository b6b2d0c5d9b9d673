use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::model::{
    BalanceQuery, DecideLeaveRequest, LeaveRequest, SubmitLeaveRequest, SubmitLeaveResponse,
};
use crate::AppState;
use crate::accrual::BalanceSummary;
use crate::common::{PAGE_SIZE, PageQuery, PaginatedResponse, Pagination};
use crate::error::AppError;
use crate::routes::notification::PgDispatcher;
use crate::routes::user::{EmployeeProfile, Role};
use crate::utils::{Claims, message_to_api_response, success_to_api_response};

#[axum::debug_handler]
pub async fn submit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitLeaveRequest>,
) -> Result<impl IntoResponse, AppError> {
    claims.require(Role::Personnel)?;

    let submitted = LeaveRequest::submit(&state.pool, &claims.sub, req).await?;

    PgDispatcher::from_pool(&state.pool)
        .broadcast_to_authorized(&submitted.broadcast_message())
        .await;

    Ok((
        StatusCode::CREATED,
        message_to_api_response(
            "Leave request submitted.".to_string(),
            SubmitLeaveResponse {
                annual_leave_balance: submitted.profile.annual_leave_balance,
                request: submitted.request,
            },
        ),
    ))
}

#[axum::debug_handler]
pub async fn decide(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DecideLeaveRequest>,
) -> Result<impl IntoResponse, AppError> {
    claims.require(Role::Authorized)?;

    let decided = LeaveRequest::decide(&state.pool, &req.request_id, req.action).await?;

    PgDispatcher::from_pool(&state.pool)
        .notify_user(&decided.request.employee_id, &decided.employee_message())
        .await;

    let msg = match decided.refunded_balance {
        Some(balance) => format!(
            "Leave request rejected; {} day(s) refunded, balance now {}.",
            decided.request.days, balance
        ),
        None => format!("Leave request {}.", decided.request.status.label()),
    };
    Ok((StatusCode::OK, message_to_api_response(msg, decided.request)))
}

#[axum::debug_handler]
pub async fn my_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    claims.require(Role::Personnel)?;

    let (items, total) = LeaveRequest::list_for_employee(&state.pool, &claims.sub, &query).await?;

    Ok((
        StatusCode::OK,
        success_to_api_response(PaginatedResponse {
            items,
            pagination: Pagination {
                page: query.page(),
                page_size: PAGE_SIZE,
                total,
            },
        }),
    ))
}

#[axum::debug_handler]
pub async fn pending(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    claims.require(Role::Authorized)?;

    let items = LeaveRequest::list_pending(&state.pool).await?;
    Ok((StatusCode::OK, success_to_api_response(items)))
}

/// 员工查看自己的余额；授权人员可以指定 employee_id 查看任意员工
#[axum::debug_handler]
pub async fn balance(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<BalanceQuery>,
) -> Result<impl IntoResponse, AppError> {
    let employee_id = match (claims.role, query.employee_id) {
        (Role::Authorized, Some(id)) => id,
        (_, Some(id)) if id != claims.sub => return Err(AppError::Forbidden),
        (_, _) => claims.sub.clone(),
    };

    let profile = EmployeeProfile::find(&state.pool, &employee_id)
        .await?
        .ok_or(AppError::RecordNotFound("Employee profile"))?;

    Ok((
        StatusCode::OK,
        success_to_api_response(BalanceSummary::new(
            state.config.policy.annual_leave_days,
            profile.annual_leave_balance,
        )),
    ))
}
