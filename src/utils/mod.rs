use axum::Json;
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, NaiveTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::common::ApiResponse;
use crate::config::Config;
use crate::error::AppError;
use crate::routes::user::Role;

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 用户ID
    pub role: Role,
    pub exp: i64, // 过期时间
    pub iat: i64, // 签发时间
}

impl Claims {
    /// 校验调用者角色
    pub fn require(&self, role: Role) -> Result<(), AppError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

pub fn generate_token(
    user_id: &str,
    role: Role,
    config: &Config,
) -> Result<(String, i64), jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expiration = (now + Duration::seconds(config.jwt_expiration().as_secs() as i64)).timestamp();

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: expiration,
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;

    Ok((token, expiration))
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// 解析表单中的 HH:MM 时间，空值表示使用服务器当前时间
pub fn parse_clock_time(value: Option<&str>) -> Result<Option<NaiveTime>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => NaiveTime::parse_from_str(v, "%H:%M")
            .map(Some)
            .map_err(|_| AppError::Validation(format!("Invalid time '{}', expected HH:MM", v))),
    }
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: 0,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

/// 成功但需要向用户展示提示（例如迟到扣假被拒绝的警告）
pub fn message_to_api_response<T: Serialize>(msg: String, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: 0,
        msg,
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const USER_EXISTS: i32 = 1001;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const ALREADY_CHECKED_IN: i32 = 2001;
    pub const NOT_CHECKED_IN: i32 = 2002;
    pub const ALREADY_CHECKED_OUT: i32 = 2003;
    pub const INVALID_RANGE: i32 = 2004;
    pub const INSUFFICIENT_BALANCE: i32 = 2005;
    pub const ALREADY_DECIDED: i32 = 2006;
    pub const INTERNAL_ERROR: i32 = 5000;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LeavePolicy;

    fn test_config() -> Config {
        Config {
            database_url: String::new(),
            redis_url: String::new(),
            jwt_secret: "test-secret".into(),
            jwt_expiration_secs: 3600,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            server_host: "127.0.0.1".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            policy: LeavePolicy::default(),
        }
    }

    #[test]
    fn token_round_trip_keeps_role() {
        let config = test_config();
        let (token, exp) = generate_token("u-1", Role::Authorized, &config).unwrap();
        let claims = verify_token(&token, &config).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.role, Role::Authorized);
        assert_eq!(claims.exp, exp);
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let config = test_config();
        let (token, _) = generate_token("u-1", Role::Personnel, &config).unwrap();
        let other = Config {
            jwt_secret: "another".into(),
            ..test_config()
        };
        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn require_checks_role() {
        let claims = Claims {
            sub: "u-1".into(),
            role: Role::Personnel,
            exp: 0,
            iat: 0,
        };
        assert!(claims.require(Role::Personnel).is_ok());
        assert!(matches!(
            claims.require(Role::Authorized),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn clock_time_parsing() {
        assert_eq!(parse_clock_time(None).unwrap(), None);
        assert_eq!(parse_clock_time(Some("  ")).unwrap(), None);
        assert_eq!(
            parse_clock_time(Some("08:47")).unwrap(),
            NaiveTime::from_hms_opt(8, 47, 0)
        );
        assert!(matches!(
            parse_clock_time(Some("8.47")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn password_hash_verifies() {
        let hashed = hash_password("secret-pw").unwrap();
        assert!(verify_password("secret-pw", &hashed).unwrap());
        assert!(!verify_password("wrong", &hashed).unwrap());
    }
}
