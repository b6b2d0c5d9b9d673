use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::AppError;
use crate::utils::{hash_password, verify_password};

/// 用户角色：普通员工或授权人员（审批、查看报表）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Personnel,
    Authorized,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Personnel => "personnel",
            Role::Authorized => "authorized",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "personnel" => Ok(Role::Personnel),
            "authorized" => Ok(Role::Authorized),
            _ => Err(UnknownRole(value)),
        }
    }
}

#[derive(Debug, Serialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EmployeeProfile {
    pub user_id: String,
    pub full_name: String,
    pub department: String,
    pub position: String,
    pub annual_leave_balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub role: Role,
    pub full_name: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub profile: EmployeeProfile,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub role: Role,
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub profile: Option<EmployeeProfile>,
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.username.is_empty()
            || self.username.len() > 150
            || !self
                .username
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'))
        {
            return Err(AppError::Validation(
                "Username must be 1-150 characters of letters, digits and @/./+/-/_".into(),
            ));
        }
        if self.password.len() < 6 || self.password.len() > 64 {
            return Err(AppError::Validation(
                "Password must be between 6 and 64 characters".into(),
            ));
        }
        Ok(())
    }
}

impl User {
    /// 创建用户并在同一事务中创建员工档案
    pub async fn create_with_profile(
        pool: &PgPool,
        req: CreateUserRequest,
        initial_balance: Decimal,
    ) -> Result<(Self, EmployeeProfile), AppError> {
        req.validate()?;
        let password_hash = hash_password(&req.password)?;
        let user_id = Uuid::new_v4().to_string();

        let mut tx = pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, username, password_hash, role, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING user_id, username, password_hash, role, created_at
            "#,
        )
        .bind(&user_id)
        .bind(&req.username)
        .bind(&password_hash)
        .bind(req.role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::on_unique_violation(e, AppError::UserExists))?;

        // 未填写姓名时使用用户名
        let full_name = req
            .full_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| req.username.clone());

        let profile = sqlx::query_as::<_, EmployeeProfile>(
            r#"
            INSERT INTO employee_profiles
                (user_id, full_name, department, position, annual_leave_balance)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING user_id, full_name, department, position, annual_leave_balance
            "#,
        )
        .bind(&user_id)
        .bind(full_name)
        .bind(req.department.unwrap_or_default())
        .bind(req.position.unwrap_or_default())
        .bind(initial_balance)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Created {} user {} ({})",
            user.role.as_str(),
            user.username,
            user.user_id
        );
        Ok((user, profile))
    }

    pub async fn find_by_id(pool: &PgPool, user_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, username, password_hash, role, created_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_username(
        pool: &PgPool,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, username, password_hash, role, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(pool)
        .await
    }

    pub async fn ids_with_role(pool: &PgPool, role: Role) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>("SELECT user_id FROM users WHERE role = $1")
            .bind(role.as_str())
            .fetch_all(pool)
            .await
    }

    /// 校验密码和登录入口的角色，两者任一不符都返回同样的错误
    pub fn verify_login(&self, password: &str, expected_role: Role) -> Result<(), AppError> {
        if self.role != expected_role || !verify_password(password, &self.password_hash)? {
            return Err(AppError::Unauthorized);
        }
        Ok(())
    }
}

impl EmployeeProfile {
    pub async fn find(pool: &PgPool, user_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, EmployeeProfile>(
            r#"
            SELECT user_id, full_name, department, position, annual_leave_balance
            FROM employee_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// 在事务中锁定档案行，防止并发扣减余额
    pub async fn lock(conn: &mut PgConnection, user_id: &str) -> Result<Self, AppError> {
        sqlx::query_as::<_, EmployeeProfile>(
            r#"
            SELECT user_id, full_name, department, position, annual_leave_balance
            FROM employee_profiles
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(conn)
        .await?
        .ok_or(AppError::RecordNotFound("Employee profile"))
    }

    pub async fn set_balance(
        conn: &mut PgConnection,
        user_id: &str,
        balance: Decimal,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE employee_profiles SET annual_leave_balance = $1 WHERE user_id = $2")
            .bind(balance)
            .bind(user_id)
            .execute(conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, password: &str) -> CreateUserRequest {
        CreateUserRequest {
            username: username.into(),
            password: password.into(),
            role: Role::Personnel,
            full_name: None,
            department: None,
            position: None,
        }
    }

    #[test]
    fn role_text_round_trip() {
        for role in [Role::Personnel, Role::Authorized] {
            assert_eq!(Role::try_from(role.as_str().to_string()).unwrap(), role);
        }
        assert!(Role::try_from("admin".to_string()).is_err());
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Role::Authorized).unwrap(),
            "\"authorized\""
        );
        let role: Role = serde_json::from_str("\"personnel\"").unwrap();
        assert_eq!(role, Role::Personnel);
    }

    #[test]
    fn username_and_password_rules() {
        assert!(request("alice", "secret1").validate().is_ok());
        assert!(request("a.b+c@d-e_f", "secret1").validate().is_ok());
        assert!(request("", "secret1").validate().is_err());
        assert!(request("has space", "secret1").validate().is_err());
        assert!(request("alice", "short").validate().is_err());
    }

    #[test]
    fn login_rejects_wrong_role_and_password() {
        let user = User {
            user_id: "u-1".into(),
            username: "alice".into(),
            password_hash: hash_password("secret1").unwrap(),
            role: Role::Personnel,
            created_at: Utc::now(),
        };
        assert!(user.verify_login("secret1", Role::Personnel).is_ok());
        assert!(matches!(
            user.verify_login("secret1", Role::Authorized),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            user.verify_login("wrong", Role::Personnel),
            Err(AppError::Unauthorized)
        ));
    }
}
