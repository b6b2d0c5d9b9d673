use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Local;

use super::model::{AttendanceRecord, CheckInRequest, CheckInResponse, CheckOutRequest};
use crate::AppState;
use crate::common::{PAGE_SIZE, PageQuery, PaginatedResponse, Pagination};
use crate::error::AppError;
use crate::routes::notification::PgDispatcher;
use crate::routes::user::Role;
use crate::utils::{Claims, message_to_api_response, parse_clock_time, success_to_api_response};

#[axum::debug_handler]
pub async fn check_in(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<CheckInRequest>>,
) -> Result<impl IntoResponse, AppError> {
    claims.require(Role::Personnel)?;

    // 请求体可省略，省略时按服务器当前时间打卡
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let now = Local::now().naive_local();
    let time = parse_clock_time(req.check_in_time.as_deref())?.unwrap_or(now.time());

    let outcome = AttendanceRecord::check_in(
        &state.pool,
        &state.config.policy,
        &claims.sub,
        now.date(),
        time,
    )
    .await?;

    // 事务已提交，通知失败不影响打卡结果
    let dispatcher = PgDispatcher::from_pool(&state.pool);
    for message in outcome.broadcast_messages(&state.config.policy) {
        dispatcher.broadcast_to_authorized(&message).await;
    }

    let msg = outcome.user_message();
    Ok((
        StatusCode::OK,
        message_to_api_response(
            msg,
            CheckInResponse {
                annual_leave_balance: outcome.profile.annual_leave_balance,
                record: outcome.record,
            },
        ),
    ))
}

#[axum::debug_handler]
pub async fn check_out(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<CheckOutRequest>>,
) -> Result<impl IntoResponse, AppError> {
    claims.require(Role::Personnel)?;

    let req = body.map(|Json(req)| req).unwrap_or_default();

    let now = Local::now().naive_local();
    let time = parse_clock_time(req.check_out_time.as_deref())?.unwrap_or(now.time());

    let record = AttendanceRecord::check_out(&state.pool, &claims.sub, now.date(), time).await?;

    Ok((
        StatusCode::OK,
        message_to_api_response("Check-Out successful.".to_string(), record),
    ))
}

#[axum::debug_handler]
pub async fn my_records(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    claims.require(Role::Personnel)?;

    let (items, total) =
        AttendanceRecord::list_for_employee(&state.pool, &claims.sub, &query).await?;

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

/// 授权人员查看所有考勤，支持按用户名或姓名搜索
#[axum::debug_handler]
pub async fn list_records(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    claims.require(Role::Authorized)?;

    let (items, total) = AttendanceRecord::search(&state.pool, &query).await?;

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
