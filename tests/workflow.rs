//! 数据库层测试：打卡扣假、请假预扣与返还、月度汇总的事务行为
//!
//! 需要可建库的 Postgres：
//! `DATABASE_URL=postgres://... cargo test --test workflow -- --ignored`

use attendance_backend::{
    config::LeavePolicy,
    error::AppError,
    routes::{
        attendance::AttendanceRecord,
        leave::{LeaveAction, LeaveRequest, LeaveStatus, SubmitLeaveRequest},
        report::{MonthlyReport, ReportPeriod},
        user::{CreateUserRequest, EmployeeProfile, Role, User},
    },
};
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

async fn create_user(pool: &PgPool, username: &str, role: Role, balance: Decimal) -> String {
    let (user, _) = User::create_with_profile(
        pool,
        CreateUserRequest {
            username: username.into(),
            password: "secret-pw".into(),
            role,
            full_name: Some(format!("{} Example", username)),
            department: None,
            position: None,
        },
        balance,
    )
    .await
    .unwrap();
    user.user_id
}

async fn balance_of(pool: &PgPool, user_id: &str) -> Decimal {
    EmployeeProfile::find(pool, user_id)
        .await
        .unwrap()
        .unwrap()
        .annual_leave_balance
}

async fn leave_request_count(pool: &PgPool, user_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM leave_requests WHERE employee_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn leave(start: NaiveDate, end: NaiveDate) -> SubmitLeaveRequest {
    SubmitLeaveRequest {
        start_date: start,
        end_date: end,
        reason: "family".into(),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn late_check_in_records_deduction_and_lowers_balance(pool: PgPool) {
    let policy = LeavePolicy::default();
    let alice = create_user(&pool, "alice", Role::Personnel, dec!(15)).await;

    let outcome = AttendanceRecord::check_in(&pool, &policy, &alice, date(5, 6), time(8, 47))
        .await
        .unwrap();

    assert!(outcome.record.is_late);
    assert_eq!(outcome.record.lateness_seconds, Some(47 * 60));
    assert_eq!(outcome.record.leave_deducted, dec!(0.39));
    assert_eq!(outcome.profile.annual_leave_balance, dec!(14.61));
    assert_eq!(balance_of(&pool, &alice).await, dec!(14.61));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn late_check_in_without_enough_balance_keeps_balance(pool: PgPool) {
    let policy = LeavePolicy::default();
    let bob = create_user(&pool, "bob", Role::Personnel, dec!(0.38)).await;

    let outcome = AttendanceRecord::check_in(&pool, &policy, &bob, date(5, 6), time(8, 47))
        .await
        .unwrap();

    assert!(outcome.assessment.insufficient_balance);
    assert!(!outcome.record.is_late);
    assert_eq!(outcome.record.leave_deducted, Decimal::ZERO);
    assert_eq!(balance_of(&pool, &bob).await, dec!(0.38));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn second_check_in_changes_nothing(pool: PgPool) {
    let policy = LeavePolicy::default();
    let carol = create_user(&pool, "carol", Role::Personnel, dec!(15)).await;

    AttendanceRecord::check_in(&pool, &policy, &carol, date(5, 6), time(8, 47))
        .await
        .unwrap();
    let again = AttendanceRecord::check_in(&pool, &policy, &carol, date(5, 6), time(9, 30)).await;
    assert!(matches!(again, Err(AppError::AlreadyCheckedIn)));

    let first_check_in: Option<NaiveTime> = sqlx::query_scalar(
        "SELECT first_check_in FROM attendance_records WHERE employee_id = $1 AND date = $2",
    )
    .bind(&carol)
    .bind(date(5, 6))
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(first_check_in, Some(time(8, 47)));
    assert_eq!(balance_of(&pool, &carol).await, dec!(14.61));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn leave_beyond_balance_persists_nothing(pool: PgPool) {
    let dave = create_user(&pool, "dave", Role::Personnel, dec!(2)).await;

    let result = LeaveRequest::submit(&pool, &dave, leave(date(7, 1), date(7, 3))).await;

    assert!(matches!(
        result,
        Err(AppError::InsufficientBalance { .. })
    ));
    assert_eq!(leave_request_count(&pool, &dave).await, 0);
    assert_eq!(balance_of(&pool, &dave).await, dec!(2));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn rejection_refunds_exactly_the_reserved_days(pool: PgPool) {
    let erin = create_user(&pool, "erin", Role::Personnel, dec!(14.61)).await;

    let submitted = LeaveRequest::submit(&pool, &erin, leave(date(7, 1), date(7, 3)))
        .await
        .unwrap();
    assert_eq!(submitted.request.days, 3);
    assert_eq!(submitted.request.status, LeaveStatus::Pending);
    assert_eq!(balance_of(&pool, &erin).await, dec!(11.61));

    let decided = LeaveRequest::decide(&pool, &submitted.request.request_id, LeaveAction::Reject)
        .await
        .unwrap();

    assert_eq!(decided.request.status, LeaveStatus::Rejected);
    assert!(decided.request.responded_at.is_some());
    assert_eq!(decided.refunded_balance, Some(dec!(14.61)));
    assert_eq!(balance_of(&pool, &erin).await, dec!(14.61));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn decided_request_cannot_be_decided_again(pool: PgPool) {
    let frank = create_user(&pool, "frank", Role::Personnel, dec!(15)).await;

    let submitted = LeaveRequest::submit(&pool, &frank, leave(date(7, 1), date(7, 2)))
        .await
        .unwrap();
    let request_id = submitted.request.request_id;

    let approved = LeaveRequest::decide(&pool, &request_id, LeaveAction::Approve)
        .await
        .unwrap();
    assert_eq!(approved.refunded_balance, None);
    assert_eq!(balance_of(&pool, &frank).await, dec!(13));

    let again = LeaveRequest::decide(&pool, &request_id, LeaveAction::Reject).await;
    assert!(matches!(again, Err(AppError::AlreadyDecided)));

    let (requests, total) = LeaveRequest::list_for_employee(&pool, &frank, &Default::default())
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(requests[0].status, LeaveStatus::Approved);
    assert_eq!(requests[0].responded_at, approved.request.responded_at);
    assert_eq!(balance_of(&pool, &frank).await, dec!(13));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn rerunning_aggregation_keeps_one_identical_row(pool: PgPool) {
    let policy = LeavePolicy::default();
    let grace = create_user(&pool, "grace", Role::Personnel, dec!(15)).await;
    create_user(&pool, "manager", Role::Authorized, dec!(15)).await;

    for day in [6, 7] {
        AttendanceRecord::check_in(&pool, &policy, &grace, date(5, day), time(8, 0))
            .await
            .unwrap();
        AttendanceRecord::check_out(&pool, &grace, date(5, day), time(17, 0))
            .await
            .unwrap();
    }
    // 只有上班打卡的一天不计入
    AttendanceRecord::check_in(&pool, &policy, &grace, date(5, 8), time(8, 0))
        .await
        .unwrap();
    // 其他月份不计入
    AttendanceRecord::check_in(&pool, &policy, &grace, date(6, 3), time(8, 0))
        .await
        .unwrap();
    AttendanceRecord::check_out(&pool, &grace, date(6, 3), time(12, 0))
        .await
        .unwrap();

    let period = ReportPeriod::new(5, 2024).unwrap();
    assert_eq!(MonthlyReport::aggregate(&pool, period).await.unwrap(), 1);
    let first = MonthlyReport::list_for_employee(&pool, &grace).await.unwrap();

    assert_eq!(MonthlyReport::aggregate(&pool, period).await.unwrap(), 1);
    let second = MonthlyReport::list_for_employee(&pool, &grace).await.unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].total_working_seconds, 18 * 3600);
    assert_eq!(second[0].total_working_seconds, first[0].total_working_seconds);
    assert_eq!((second[0].month, second[0].year), (5, 2024));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM monthly_reports")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}
