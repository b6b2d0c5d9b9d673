use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::accrual::leave_days;
use crate::common::{PAGE_SIZE, PageQuery};
use crate::error::AppError;
use crate::routes::user::EmployeeProfile;

/// 请假状态，库中保存单字符代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown leave status: {0}")]
pub struct UnknownStatus(String);

impl LeaveStatus {
    pub fn code(&self) -> &'static str {
        match self {
            LeaveStatus::Pending => "P",
            LeaveStatus::Approved => "A",
            LeaveStatus::Rejected => "R",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LeaveStatus::Pending => "pending",
            LeaveStatus::Approved => "approved",
            LeaveStatus::Rejected => "rejected",
        }
    }
}

impl TryFrom<String> for LeaveStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "P" => Ok(LeaveStatus::Pending),
            "A" => Ok(LeaveStatus::Approved),
            "R" => Ok(LeaveStatus::Rejected),
            _ => Err(UnknownStatus(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveAction {
    Approve,
    Reject,
}

impl LeaveStatus {
    /// 只有待审批的申请可以被处理，且只能处理一次
    pub fn decide(self, action: LeaveAction) -> Result<LeaveStatus, AppError> {
        match self {
            LeaveStatus::Pending => Ok(match action {
                LeaveAction::Approve => LeaveStatus::Approved,
                LeaveAction::Reject => LeaveStatus::Rejected,
            }),
            LeaveStatus::Approved | LeaveStatus::Rejected => Err(AppError::AlreadyDecided),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LeaveRequest {
    pub request_id: String,
    pub employee_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    #[sqlx(try_from = "String")]
    pub status: LeaveStatus,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub days: i32,
}

/// 待审批列表行，带申请人信息
#[derive(Debug, Serialize, FromRow)]
pub struct PendingLeaveItem {
    pub username: String,
    pub full_name: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub request: LeaveRequest,
}

#[derive(Debug, Deserialize)]
pub struct SubmitLeaveRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct DecideLeaveRequest {
    pub request_id: String,
    pub action: LeaveAction,
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub employee_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitLeaveResponse {
    pub request: LeaveRequest,
    pub annual_leave_balance: Decimal,
}

/// 提交成功后的结果，用于事务外的通知
#[derive(Debug)]
pub struct Submitted {
    pub request: LeaveRequest,
    pub profile: EmployeeProfile,
}

impl Submitted {
    pub fn broadcast_message(&self) -> String {
        format!(
            "{} requested {} day(s) of leave from {} to {}: {}",
            self.profile.full_name,
            self.request.days,
            self.request.start_date,
            self.request.end_date,
            self.request.reason
        )
    }
}

#[derive(Debug)]
pub struct Decided {
    pub request: LeaveRequest,
    /// 拒绝时返还后的余额
    pub refunded_balance: Option<Decimal>,
}

impl Decided {
    pub fn employee_message(&self) -> String {
        format!(
            "Your leave request from {} to {} has been {}.",
            self.request.start_date,
            self.request.end_date,
            self.request.status.label()
        )
    }
}

impl SubmitLeaveRequest {
    pub fn validate(&self) -> Result<i32, AppError> {
        let days = leave_days(self.start_date, self.end_date)?;
        if self.reason.trim().is_empty() {
            return Err(AppError::Validation("A reason is required.".into()));
        }
        Ok(days)
    }
}

/// 余额是否足够预扣请假天数
pub fn reserve(balance: Decimal, days: i32) -> Result<Decimal, AppError> {
    let requested = Decimal::from(days);
    if balance < requested {
        return Err(AppError::InsufficientBalance {
            requested,
            available: balance,
        });
    }
    Ok(balance - requested)
}

/// 拒绝请假时返还预扣的天数
pub fn release(balance: Decimal, days: i32) -> Decimal {
    balance + Decimal::from(days)
}

const REQUEST_COLUMNS: &str = "request_id, employee_id, start_date, end_date, reason, status, \
                               requested_at, responded_at, days";

impl LeaveRequest {
    /// 提交请假：校验后预扣余额并保存为待审批，余额不足时不写入任何数据
    pub async fn submit(
        pool: &PgPool,
        employee_id: &str,
        req: SubmitLeaveRequest,
    ) -> Result<Submitted, AppError> {
        let days = req.validate()?;

        let mut tx = pool.begin().await?;

        let mut profile = EmployeeProfile::lock(&mut tx, employee_id).await?;
        let new_balance = reserve(profile.annual_leave_balance, days)?;

        EmployeeProfile::set_balance(&mut tx, employee_id, new_balance).await?;
        profile.annual_leave_balance = new_balance;

        let request = sqlx::query_as::<_, LeaveRequest>(&format!(
            r#"
            INSERT INTO leave_requests
                (request_id, employee_id, start_date, end_date, reason, status, requested_at, days)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), $7)
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(employee_id)
        .bind(req.start_date)
        .bind(req.end_date)
        .bind(req.reason.trim())
        .bind(LeaveStatus::Pending.code())
        .bind(days)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Leave request {} submitted by {} for {} day(s)",
            request.request_id,
            employee_id,
            days
        );
        Ok(Submitted { request, profile })
    }

    async fn lock(conn: &mut PgConnection, request_id: &str) -> Result<Self, AppError> {
        sqlx::query_as::<_, LeaveRequest>(&format!(
            "SELECT {} FROM leave_requests WHERE request_id = $1 FOR UPDATE",
            REQUEST_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(conn)
        .await?
        .ok_or(AppError::RecordNotFound("Leave request"))
    }

    /// 审批：批准不改余额（提交时已预扣），拒绝时返还天数
    pub async fn decide(
        pool: &PgPool,
        request_id: &str,
        action: LeaveAction,
    ) -> Result<Decided, AppError> {
        let mut tx = pool.begin().await?;

        let current = Self::lock(&mut tx, request_id).await?;
        let status = current.status.decide(action)?;

        let request = sqlx::query_as::<_, LeaveRequest>(&format!(
            r#"
            UPDATE leave_requests
            SET status = $2, responded_at = NOW()
            WHERE request_id = $1
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        ))
        .bind(request_id)
        .bind(status.code())
        .fetch_one(&mut *tx)
        .await?;

        let refunded_balance = match status {
            LeaveStatus::Rejected => {
                let profile = EmployeeProfile::lock(&mut tx, &request.employee_id).await?;
                let balance = release(profile.annual_leave_balance, request.days);
                EmployeeProfile::set_balance(&mut tx, &request.employee_id, balance).await?;
                Some(balance)
            }
            LeaveStatus::Approved | LeaveStatus::Pending => None,
        };

        tx.commit().await?;

        tracing::info!(
            "Leave request {} {}",
            request.request_id,
            request.status.label()
        );
        Ok(Decided {
            request,
            refunded_balance,
        })
    }

    pub async fn list_for_employee(
        pool: &PgPool,
        employee_id: &str,
        query: &PageQuery,
    ) -> Result<(Vec<Self>, u64), sqlx::Error> {
        let items = sqlx::query_as::<_, LeaveRequest>(&format!(
            r#"
            SELECT {}
            FROM leave_requests
            WHERE employee_id = $1
            ORDER BY requested_at DESC
            LIMIT $2 OFFSET $3
            "#,
            REQUEST_COLUMNS
        ))
        .bind(employee_id)
        .bind(i64::from(PAGE_SIZE))
        .bind(query.offset())
        .fetch_all(pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM leave_requests WHERE employee_id = $1")
                .bind(employee_id)
                .fetch_one(pool)
                .await?;

        Ok((items, total.max(0) as u64))
    }

    pub async fn list_pending(pool: &PgPool) -> Result<Vec<PendingLeaveItem>, sqlx::Error> {
        sqlx::query_as::<_, PendingLeaveItem>(
            r#"
            SELECT u.username, p.full_name,
                   r.request_id, r.employee_id, r.start_date, r.end_date, r.reason,
                   r.status, r.requested_at, r.responded_at, r.days
            FROM leave_requests r
            JOIN users u ON u.user_id = r.employee_id
            JOIN employee_profiles p ON p.user_id = r.employee_id
            WHERE r.status = $1
            ORDER BY r.requested_at
            "#,
        )
        .bind(LeaveStatus::Pending.code())
        .fetch_all(pool)
        .await
    }
}
