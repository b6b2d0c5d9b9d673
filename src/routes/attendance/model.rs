use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};

use crate::accrual::{Assessment, assess_checkin};
use crate::common::{PAGE_SIZE, PageQuery};
use crate::config::LeavePolicy;
use crate::error::AppError;
use crate::routes::user::EmployeeProfile;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AttendanceRecord {
    pub employee_id: String,
    pub date: NaiveDate,
    pub first_check_in: Option<NaiveTime>,
    pub last_check_out: Option<NaiveTime>,
    pub is_late: bool,
    pub lateness_seconds: Option<i64>,
    pub leave_deducted: Decimal,
}

/// 授权人员查看的考勤列表行
#[derive(Debug, Serialize, FromRow)]
pub struct AttendanceListItem {
    pub username: String,
    pub full_name: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub record: AttendanceRecord,
}

#[derive(Debug, Deserialize, Default)]
pub struct CheckInRequest {
    /// HH:MM，为空时使用服务器当前时间
    pub check_in_time: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CheckOutRequest {
    pub check_out_time: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckInResponse {
    pub record: AttendanceRecord,
    pub annual_leave_balance: Decimal,
}

/// 每位员工每天的打卡状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceState {
    NoRecord,
    CheckedIn,
    CheckedOut,
}

impl AttendanceState {
    pub fn of(record: Option<&AttendanceRecord>) -> Self {
        match record {
            Some(r) if r.last_check_out.is_some() => AttendanceState::CheckedOut,
            Some(r) if r.first_check_in.is_some() => AttendanceState::CheckedIn,
            _ => AttendanceState::NoRecord,
        }
    }

    pub fn check_in(self) -> Result<(), AppError> {
        match self {
            AttendanceState::NoRecord => Ok(()),
            AttendanceState::CheckedIn | AttendanceState::CheckedOut => {
                Err(AppError::AlreadyCheckedIn)
            }
        }
    }

    pub fn check_out(self) -> Result<(), AppError> {
        match self {
            AttendanceState::CheckedIn => Ok(()),
            AttendanceState::NoRecord => Err(AppError::NotCheckedIn),
            AttendanceState::CheckedOut => Err(AppError::AlreadyCheckedOut),
        }
    }
}

pub fn validate_check_out(first_check_in: NaiveTime, check_out: NaiveTime) -> Result<(), AppError> {
    if check_out < first_check_in {
        return Err(AppError::Validation(format!(
            "Check-out time {} is before check-in time {}",
            check_out.format("%H:%M"),
            first_check_in.format("%H:%M")
        )));
    }
    Ok(())
}

/// 打卡结果，事务提交后据此发送通知
#[derive(Debug)]
pub struct CheckInOutcome {
    pub record: AttendanceRecord,
    pub assessment: Assessment,
    pub profile: EmployeeProfile,
}

impl CheckInOutcome {
    /// 需要广播给授权人员的消息
    pub fn broadcast_messages(&self, policy: &LeavePolicy) -> Vec<String> {
        let mut messages = Vec::new();
        if self.assessment.is_late {
            messages.push(format!(
                "{} checked in late on {} at {}: {} late, {} leave day(s) deducted.",
                self.profile.full_name,
                self.record.date,
                self.record
                    .first_check_in
                    .map(|t| t.format("%H:%M").to_string())
                    .unwrap_or_default(),
                self.lateness_text(),
                self.assessment.deduction,
            ));
        }
        if self.assessment.is_low_balance(policy.low_balance_threshold) {
            messages.push(format!(
                "{}'s annual leave balance is low: {} day(s) remaining.",
                self.profile.full_name, self.assessment.new_balance
            ));
        }
        messages
    }

    /// 不足一分钟时按秒显示
    fn lateness_text(&self) -> String {
        match self.assessment.lateness_minutes() {
            Some(0) => format!(
                "{} second(s)",
                self.assessment.lateness_seconds().unwrap_or_default()
            ),
            minutes => format!("{} minute(s)", minutes.unwrap_or_default()),
        }
    }

    /// 返回给员工的提示
    pub fn user_message(&self) -> String {
        if self.assessment.insufficient_balance {
            "Check-In successful. Your leave balance is insufficient to cover the lateness \
             deduction, so no lateness penalty was recorded."
                .to_string()
        } else if self.assessment.is_late {
            format!(
                "Check-In successful. You were late; {} leave day(s) deducted.",
                self.assessment.deduction
            )
        } else {
            "Check-In successful.".to_string()
        }
    }
}

const RECORD_COLUMNS: &str = "employee_id, date, first_check_in, last_check_out, is_late, \
                              lateness_seconds, leave_deducted";

impl AttendanceRecord {
    async fn lock(
        conn: &mut PgConnection,
        employee_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AttendanceRecord>(&format!(
            "SELECT {} FROM attendance_records WHERE employee_id = $1 AND date = $2 FOR UPDATE",
            RECORD_COLUMNS
        ))
        .bind(employee_id)
        .bind(date)
        .fetch_optional(conn)
        .await
    }

    /// 上班打卡：评估迟到、扣减年假、写入考勤记录，全部在一个事务中完成
    pub async fn check_in(
        pool: &PgPool,
        policy: &LeavePolicy,
        employee_id: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<CheckInOutcome, AppError> {
        let mut tx = pool.begin().await?;

        // 先锁档案，同一员工的打卡与请假串行执行
        let mut profile = EmployeeProfile::lock(&mut tx, employee_id).await?;
        let existing = Self::lock(&mut tx, employee_id, date).await?;
        AttendanceState::of(existing.as_ref()).check_in()?;

        let assessment = assess_checkin(policy.work_start, time, profile.annual_leave_balance);

        let record = sqlx::query_as::<_, AttendanceRecord>(&format!(
            r#"
            INSERT INTO attendance_records
                (employee_id, date, first_check_in, is_late, lateness_seconds, leave_deducted)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (employee_id, date) DO UPDATE
            SET first_check_in = EXCLUDED.first_check_in,
                is_late = EXCLUDED.is_late,
                lateness_seconds = EXCLUDED.lateness_seconds,
                leave_deducted = EXCLUDED.leave_deducted
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(employee_id)
        .bind(date)
        .bind(time)
        .bind(assessment.is_late)
        .bind(assessment.lateness_seconds())
        .bind(assessment.deduction)
        .fetch_one(&mut *tx)
        .await?;

        if assessment.is_late && !assessment.deduction.is_zero() {
            EmployeeProfile::set_balance(&mut tx, employee_id, assessment.new_balance).await?;
            profile.annual_leave_balance = assessment.new_balance;
        }

        tx.commit().await?;

        tracing::info!(
            "Employee {} checked in at {} (late: {}, deducted: {})",
            employee_id,
            time,
            assessment.is_late,
            assessment.deduction
        );
        if assessment.insufficient_balance {
            tracing::warn!(
                "Lateness deduction skipped for {}: balance {} too low",
                employee_id,
                profile.annual_leave_balance
            );
        }

        Ok(CheckInOutcome {
            record,
            assessment,
            profile,
        })
    }

    pub async fn check_out(
        pool: &PgPool,
        employee_id: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Self, AppError> {
        let mut tx = pool.begin().await?;

        let existing = Self::lock(&mut tx, employee_id, date).await?;
        AttendanceState::of(existing.as_ref()).check_out()?;
        if let Some(first_check_in) = existing.as_ref().and_then(|r| r.first_check_in) {
            validate_check_out(first_check_in, time)?;
        }

        let record = sqlx::query_as::<_, AttendanceRecord>(&format!(
            r#"
            UPDATE attendance_records
            SET last_check_out = $3
            WHERE employee_id = $1 AND date = $2
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(employee_id)
        .bind(date)
        .bind(time)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!("Employee {} checked out at {}", employee_id, time);
        Ok(record)
    }

    pub async fn list_for_employee(
        pool: &PgPool,
        employee_id: &str,
        query: &PageQuery,
    ) -> Result<(Vec<Self>, u64), sqlx::Error> {
        let items = sqlx::query_as::<_, AttendanceRecord>(&format!(
            r#"
            SELECT {}
            FROM attendance_records
            WHERE employee_id = $1
            ORDER BY date DESC
            LIMIT $2 OFFSET $3
            "#,
            RECORD_COLUMNS
        ))
        .bind(employee_id)
        .bind(i64::from(PAGE_SIZE))
        .bind(query.offset())
        .fetch_all(pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM attendance_records WHERE employee_id = $1")
                .bind(employee_id)
                .fetch_one(pool)
                .await?;

        Ok((items, total.max(0) as u64))
    }

    /// 按用户名或姓名模糊搜索，日期倒序
    pub async fn search(
        pool: &PgPool,
        query: &PageQuery,
    ) -> Result<(Vec<AttendanceListItem>, u64), sqlx::Error> {
        let pattern = query.search().map(like_pattern);

        let items = sqlx::query_as::<_, AttendanceListItem>(
            r#"
            SELECT u.username, p.full_name,
                   a.employee_id, a.date, a.first_check_in, a.last_check_out,
                   a.is_late, a.lateness_seconds, a.leave_deducted
            FROM attendance_records a
            JOIN users u ON u.user_id = a.employee_id
            JOIN employee_profiles p ON p.user_id = a.employee_id
            WHERE $1::text IS NULL OR u.username ILIKE $1 OR p.full_name ILIKE $1
            ORDER BY a.date DESC, u.username
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(pattern.as_deref())
        .bind(i64::from(PAGE_SIZE))
        .bind(query.offset())
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM attendance_records a
            JOIN users u ON u.user_id = a.employee_id
            JOIN employee_profiles p ON p.user_id = a.employee_id
            WHERE $1::text IS NULL OR u.username ILIKE $1 OR p.full_name ILIKE $1
            "#,
        )
        .bind(pattern.as_deref())
        .fetch_one(pool)
        .await?;

        Ok((items, total.max(0) as u64))
    }
}

/// 包含匹配，转义 LIKE 通配符
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn record(check_in: Option<NaiveTime>, check_out: Option<NaiveTime>) -> AttendanceRecord {
        AttendanceRecord {
            employee_id: "u-1".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            first_check_in: check_in,
            last_check_out: check_out,
            is_late: false,
            lateness_seconds: None,
            leave_deducted: Decimal::ZERO,
        }
    }

    fn profile(balance: Decimal) -> EmployeeProfile {
        EmployeeProfile {
            user_id: "u-1".into(),
            full_name: "Alice Smith".into(),
            department: "Ops".into(),
            position: "Clerk".into(),
            annual_leave_balance: balance,
        }
    }

    #[test]
    fn state_follows_recorded_times() {
        assert_eq!(AttendanceState::of(None), AttendanceState::NoRecord);
        assert_eq!(
            AttendanceState::of(Some(&record(None, None))),
            AttendanceState::NoRecord
        );
        assert_eq!(
            AttendanceState::of(Some(&record(Some(t(8, 0)), None))),
            AttendanceState::CheckedIn
        );
        assert_eq!(
            AttendanceState::of(Some(&record(Some(t(8, 0)), Some(t(17, 0))))),
            AttendanceState::CheckedOut
        );
    }

    #[test]
    fn check_in_only_once_per_day() {
        assert!(AttendanceState::NoRecord.check_in().is_ok());
        assert!(matches!(
            AttendanceState::CheckedIn.check_in(),
            Err(AppError::AlreadyCheckedIn)
        ));
        assert!(matches!(
            AttendanceState::CheckedOut.check_in(),
            Err(AppError::AlreadyCheckedIn)
        ));
    }

    #[test]
    fn check_out_requires_check_in() {
        assert!(matches!(
            AttendanceState::NoRecord.check_out(),
            Err(AppError::NotCheckedIn)
        ));
        assert!(AttendanceState::CheckedIn.check_out().is_ok());
        assert!(matches!(
            AttendanceState::CheckedOut.check_out(),
            Err(AppError::AlreadyCheckedOut)
        ));
    }

    #[test]
    fn check_out_cannot_precede_check_in() {
        assert!(validate_check_out(t(9, 0), t(17, 30)).is_ok());
        assert!(validate_check_out(t(9, 0), t(9, 0)).is_ok());
        assert!(matches!(
            validate_check_out(t(9, 0), t(8, 59)),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn late_check_in_broadcasts_lateness_and_low_balance() {
        let policy = LeavePolicy::default();
        let assessment = assess_checkin(policy.work_start, t(8, 47), dec!(3.20));
        let outcome = CheckInOutcome {
            record: record(Some(t(8, 47)), None),
            assessment,
            profile: profile(dec!(2.81)),
        };

        let messages = outcome.broadcast_messages(&policy);
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0],
            "Alice Smith checked in late on 2024-05-06 at 08:47: 47 minute(s) late, 0.39 leave day(s) deducted."
        );
        assert_eq!(
            messages[1],
            "Alice Smith's annual leave balance is low: 2.81 day(s) remaining."
        );
        assert_eq!(
            outcome.user_message(),
            "Check-In successful. You were late; 0.39 leave day(s) deducted."
        );
    }

    #[test]
    fn sub_minute_lateness_is_reported_in_seconds() {
        let policy = LeavePolicy::default();
        let late = policy.work_start + TimeDelta::seconds(42);
        let outcome = CheckInOutcome {
            record: record(Some(late), None),
            assessment: assess_checkin(policy.work_start, late, dec!(15)),
            profile: profile(dec!(15)),
        };

        let messages = outcome.broadcast_messages(&policy);
        assert_eq!(messages.len(), 1);
        assert!(
            messages[0].starts_with("Alice Smith checked in late on 2024-05-06 at 08:00: 42 second(s) late,"),
            "{}",
            messages[0]
        );
        assert!(!messages[0].contains("minute"));
    }

    #[test]
    fn on_time_check_in_is_silent() {
        let policy = LeavePolicy::default();
        let outcome = CheckInOutcome {
            record: record(Some(t(7, 55)), None),
            assessment: assess_checkin(policy.work_start, t(7, 55), dec!(1)),
            profile: profile(dec!(1)),
        };
        assert!(outcome.broadcast_messages(&policy).is_empty());
        assert_eq!(outcome.user_message(), "Check-In successful.");
    }

    #[test]
    fn rejected_deduction_warns_the_employee_only() {
        let policy = LeavePolicy::default();
        let late = policy.work_start + TimeDelta::hours(3);
        let outcome = CheckInOutcome {
            record: record(Some(late), None),
            assessment: assess_checkin(policy.work_start, late, dec!(0.10)),
            profile: profile(dec!(0.10)),
        };
        assert!(outcome.broadcast_messages(&policy).is_empty());
        assert!(outcome.user_message().contains("insufficient"));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("alice"), "%alice%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
