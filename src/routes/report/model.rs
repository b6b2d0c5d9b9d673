use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::AppError;
use crate::routes::user::{Role, User};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MonthlyReport {
    pub employee_id: String,
    pub month: i32,
    pub year: i32,
    pub total_working_seconds: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct MonthlyReportItem {
    pub username: String,
    pub full_name: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub report: MonthlyReport,
}

#[derive(Debug, Default, Deserialize)]
pub struct MonthQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct AggregationResponse {
    pub month: u32,
    pub year: i32,
    pub reports_written: usize,
}

/// 统计周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    pub month: u32,
    pub year: i32,
}

impl ReportPeriod {
    /// 校验月份，同时保证下个月的第一天也能表示
    pub fn new(month: u32, year: i32) -> Result<Self, AppError> {
        let period = Self { month, year };
        period.bounds().map(|_| period)
    }

    /// 上一个自然月
    pub fn previous(today: NaiveDate) -> Self {
        if today.month() == 1 {
            Self {
                month: 12,
                year: today.year() - 1,
            }
        } else {
            Self {
                month: today.month() - 1,
                year: today.year(),
            }
        }
    }

    /// 未指定月份时默认上一个自然月
    pub fn resolve(query: &MonthQuery, today: NaiveDate) -> Result<Self, AppError> {
        match (query.month, query.year) {
            (None, None) => Ok(Self::previous(today)),
            (Some(month), Some(year)) => Self::new(month, year),
            _ => Err(AppError::Validation(
                "month and year must be given together".into(),
            )),
        }
    }

    /// 统计区间 [本月1日, 下月1日)
    fn bounds(&self) -> Result<(NaiveDate, NaiveDate), AppError> {
        let next = if self.month == 12 {
            self.year
                .checked_add(1)
                .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
        };
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .zip(next)
            .ok_or_else(|| {
                AppError::Validation(format!("Invalid month {}/{}", self.month, self.year))
            })
    }
}

/// 一天的工作时长（秒），缺少上班或下班打卡时不计
pub fn worked_seconds(first_check_in: Option<NaiveTime>, last_check_out: Option<NaiveTime>) -> i64 {
    match (first_check_in, last_check_out) {
        (Some(check_in), Some(check_out)) => (check_out - check_in).num_seconds(),
        _ => 0,
    }
}

pub fn total_worked_seconds<I>(records: I) -> i64
where
    I: IntoIterator<Item = (Option<NaiveTime>, Option<NaiveTime>)>,
{
    records
        .into_iter()
        .map(|(check_in, check_out)| worked_seconds(check_in, check_out))
        .sum()
}

impl MonthlyReport {
    /// 为每位员工汇总指定月份的工作时长并写入报表（重复执行结果相同）
    pub async fn aggregate(pool: &PgPool, period: ReportPeriod) -> Result<usize, AppError> {
        let (first, next) = period.bounds()?;
        let employees = User::ids_with_role(pool, Role::Personnel).await?;

        let mut written = 0;
        for employee_id in employees {
            let rows: Vec<(Option<NaiveTime>, Option<NaiveTime>)> = sqlx::query_as(
                r#"
                SELECT first_check_in, last_check_out
                FROM attendance_records
                WHERE employee_id = $1 AND date >= $2 AND date < $3
                "#,
            )
            .bind(&employee_id)
            .bind(first)
            .bind(next)
            .fetch_all(pool)
            .await?;

            let total = total_worked_seconds(rows);

            let created: bool = sqlx::query_scalar(
                r#"
                INSERT INTO monthly_reports (employee_id, month, year, total_working_seconds)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (employee_id, month, year) DO UPDATE
                SET total_working_seconds = EXCLUDED.total_working_seconds
                RETURNING (xmax = 0)
                "#,
            )
            .bind(&employee_id)
            .bind(period.month as i32)
            .bind(period.year)
            .bind(total)
            .fetch_one(pool)
            .await?;

            tracing::info!(
                "Report {} for {} for {}/{}: {}s",
                if created { "created" } else { "updated" },
                employee_id,
                period.month,
                period.year,
                total
            );
            written += 1;
        }

        Ok(written)
    }

    pub async fn list_for_period(
        pool: &PgPool,
        period: ReportPeriod,
    ) -> Result<Vec<MonthlyReportItem>, sqlx::Error> {
        sqlx::query_as::<_, MonthlyReportItem>(
            r#"
            SELECT u.username, p.full_name,
                   m.employee_id, m.month, m.year, m.total_working_seconds
            FROM monthly_reports m
            JOIN users u ON u.user_id = m.employee_id
            JOIN employee_profiles p ON p.user_id = m.employee_id
            WHERE m.month = $1 AND m.year = $2
            ORDER BY u.username
            "#,
        )
        .bind(period.month as i32)
        .bind(period.year)
        .fetch_all(pool)
        .await
    }

    pub async fn list_for_employee(
        pool: &PgPool,
        employee_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, MonthlyReport>(
            r#"
            SELECT employee_id, month, year, total_working_seconds
            FROM monthly_reports
            WHERE employee_id = $1
            ORDER BY year DESC, month DESC
            "#,
        )
        .bind(employee_id)
        .fetch_all(pool)
        .await
    }
}
