use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    AppState,
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit},
    routes,
};

pub fn create_router(state: AppState) -> Router {
    let rate_limiter = Arc::new(RateLimiter::new(state.redis.clone(), &state.config));

    // 公开路由：两个登录入口分别只接受对应角色
    let public_routes = Router::new()
        .route("/users/login/personnel", post(routes::user::login_personnel))
        .route("/users/login/authorized", post(routes::user::login_authorized));

    let protected_routes = Router::new()
        // 用户
        .route("/users/register", post(routes::user::register))
        .route("/users/me", get(routes::user::me))
        // 考勤
        .route("/attendance/check-in", post(routes::attendance::check_in))
        .route("/attendance/check-out", post(routes::attendance::check_out))
        .route("/attendance/mine", get(routes::attendance::my_records))
        .route("/attendance/records", get(routes::attendance::list_records))
        // 请假
        .route("/leave/balance", get(routes::leave::balance))
        .route("/leave/requests", post(routes::leave::submit))
        .route("/leave/requests/mine", get(routes::leave::my_requests))
        .route("/leave/requests/pending", get(routes::leave::pending))
        .route("/leave/requests/decide", post(routes::leave::decide))
        // 通知
        .route("/notifications", get(routes::notification::list_notifications))
        .route("/notifications/unread-count", get(routes::notification::unread_count))
        .route("/notifications/mark-read", post(routes::notification::mark_read))
        // 月度报表
        .route(
            "/reports/monthly",
            get(routes::report::list_monthly).post(routes::report::run_monthly),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api = Router::new().merge(public_routes).merge(protected_routes);
    // axum 不支持在根路径 nest
    let base = state.config.api_base_uri.trim_end_matches('/');
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(base, api)
    };

    router
        .layer(axum::middleware::from_fn(log_errors))
        .layer(axum::middleware::from_fn_with_state(rate_limiter, rate_limit))
        .with_state(state)
}
