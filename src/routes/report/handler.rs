use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Local;

use super::model::{AggregationResponse, MonthQuery, MonthlyReport, ReportPeriod};
use crate::AppState;
use crate::error::AppError;
use crate::routes::user::Role;
use crate::utils::{Claims, success_to_api_response};

/// 手动触发月度汇总，未指定月份时汇总上个月
#[axum::debug_handler]
pub async fn run_monthly(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<MonthQuery>>,
) -> Result<impl IntoResponse, AppError> {
    claims.require(Role::Authorized)?;

    let req = body.map(|Json(req)| req).unwrap_or_default();

    let period = ReportPeriod::resolve(&req, Local::now().date_naive())?;
    let reports_written = MonthlyReport::aggregate(&state.pool, period).await?;

    Ok((
        StatusCode::OK,
        success_to_api_response(AggregationResponse {
            month: period.month,
            year: period.year,
            reports_written,
        }),
    ))
}

#[axum::debug_handler]
pub async fn list_monthly(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MonthQuery>,
) -> Result<impl IntoResponse, AppError> {
    let response = match claims.role {
        Role::Authorized => {
            let period = ReportPeriod::resolve(&query, Local::now().date_naive())?;
            let items = MonthlyReport::list_for_period(&state.pool, period).await?;
            serde_json::to_value(items)
        }
        Role::Personnel => {
            let items = MonthlyReport::list_for_employee(&state.pool, &claims.sub).await?;
            serde_json::to_value(items)
        }
    }
    .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((StatusCode::OK, success_to_api_response(response)))
}
