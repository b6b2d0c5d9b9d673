use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::model::{MarkReadRequest, Notification, UnreadCountResponse};
use crate::common::{PAGE_SIZE, PageQuery, PaginatedResponse, Pagination};
use crate::error::AppError;
use crate::utils::{Claims, success_to_api_response};
use crate::AppState;

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (items, total) = Notification::list_for_user(&state.pool, &claims.sub, &query).await?;

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
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let unread = Notification::unread_count(&state.pool, &claims.sub).await?;
    Ok((StatusCode::OK, success_to_api_response(UnreadCountResponse { unread })))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, AppError> {
    let notification = Notification::mark_read(&state.pool, &claims.sub, &req.notification_id)
        .await?
        .ok_or(AppError::RecordNotFound("Notification"))?;
    Ok((StatusCode::OK, success_to_api_response(notification)))
}
