use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;

use crate::utils::{error_codes, error_to_api_response};

/// 业务流程与基础设施的统一错误
///
/// 业务错误在接口层转换为用户可见的提示，不会破坏已存储的数据：
/// 所有写操作都在校验通过后、同一个事务内完成。
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("You have already checked in today.")]
    AlreadyCheckedIn,
    #[error("You haven't checked in today.")]
    NotCheckedIn,
    #[error("You have already checked out today.")]
    AlreadyCheckedOut,
    #[error("End date cannot be before start date.")]
    InvalidRange,
    #[error("Insufficient leave balance: {requested} day(s) requested, {available} available.")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },
    #[error("This leave request has already been decided.")]
    AlreadyDecided,
    #[error("{0} not found.")]
    RecordNotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("Invalid credentials or unauthorized access.")]
    Unauthorized,
    #[error("You do not have permission to perform this action.")]
    Forbidden,
    #[error("Username already exists.")]
    UserExists,
    #[error("Too many requests, retry in {0} seconds.")]
    RateLimited(u64),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, i32) {
        match self {
            // 重复打卡只是提示，不算失败
            AppError::AlreadyCheckedIn => (StatusCode::OK, error_codes::ALREADY_CHECKED_IN),
            AppError::AlreadyCheckedOut => (StatusCode::OK, error_codes::ALREADY_CHECKED_OUT),
            AppError::NotCheckedIn => (StatusCode::CONFLICT, error_codes::NOT_CHECKED_IN),
            AppError::InvalidRange => (StatusCode::BAD_REQUEST, error_codes::INVALID_RANGE),
            AppError::InsufficientBalance { .. } => {
                (StatusCode::CONFLICT, error_codes::INSUFFICIENT_BALANCE)
            }
            AppError::AlreadyDecided => (StatusCode::CONFLICT, error_codes::ALREADY_DECIDED),
            AppError::RecordNotFound(_) => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, error_codes::AUTH_FAILED),
            AppError::Forbidden => (StatusCode::FORBIDDEN, error_codes::PERMISSION_DENIED),
            AppError::UserExists => (StatusCode::CONFLICT, error_codes::USER_EXISTS),
            AppError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, error_codes::RATE_LIMIT),
            AppError::Database(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR)
            }
        }
    }

    /// 唯一约束冲突时转换为指定的业务错误
    pub fn on_unique_violation(err: sqlx::Error, conflict: AppError) -> AppError {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => conflict,
            _ => AppError::Database(err),
        }
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("Failed to hash password: {}", e))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AppError::Internal(format!("Failed to generate token: {}", e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let msg = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Internal server error".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, error_to_api_response::<()>(code, msg)).into_response()
    }
}
