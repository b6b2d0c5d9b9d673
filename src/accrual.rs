//! 迟到扣假规则
//!
//! 纯计算，不访问数据库。调用方根据 [`Assessment`] 在同一个事务中
//! 更新考勤记录和员工年假余额。

use chrono::{NaiveDate, NaiveTime, TimeDelta};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::error::AppError;

/// 每满30分钟扣0.25天，按分钟比例折算
const MINUTES_PER_BLOCK: i64 = 30;
const DAYS_PER_BLOCK: Decimal = dec!(0.25);

/// 一次打卡的迟到评估结果
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub is_late: bool,
    /// 迟到时长，精确到秒
    pub lateness: Option<TimeDelta>,
    /// 本次扣减的年假天数
    pub deduction: Decimal,
    /// 扣减后的余额，未扣减时等于原余额
    pub new_balance: Decimal,
    /// 余额不足，扣减被拒绝（打卡仍然成功，需要提示用户）
    pub insufficient_balance: bool,
}

impl Assessment {
    fn on_time(balance: Decimal) -> Self {
        Self {
            is_late: false,
            lateness: None,
            deduction: Decimal::ZERO,
            new_balance: balance,
            insufficient_balance: false,
        }
    }

    pub fn lateness_seconds(&self) -> Option<i64> {
        self.lateness.map(|d| d.num_seconds())
    }

    pub fn lateness_minutes(&self) -> Option<i64> {
        self.lateness.map(|d| d.num_minutes())
    }

    /// 扣减后余额是否低于阈值
    pub fn is_low_balance(&self, threshold: Decimal) -> bool {
        self.is_late && self.new_balance < threshold
    }
}

/// 迟到扣减天数：floor(秒/60) / 30 * 0.25，四舍六入五成双保留两位小数
pub fn lateness_deduction(lateness: TimeDelta) -> Decimal {
    let minutes = lateness.num_seconds().max(0) / 60;
    (Decimal::from(minutes) / Decimal::from(MINUTES_PER_BLOCK) * DAYS_PER_BLOCK)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

pub fn assess_checkin(
    scheduled_start: NaiveTime,
    actual_checkin: NaiveTime,
    current_balance: Decimal,
) -> Assessment {
    if actual_checkin <= scheduled_start {
        return Assessment::on_time(current_balance);
    }

    // 秒以下的部分不计
    let lateness = TimeDelta::seconds((actual_checkin - scheduled_start).num_seconds());
    let deduction = lateness_deduction(lateness);

    if current_balance < deduction {
        return Assessment {
            insufficient_balance: true,
            ..Assessment::on_time(current_balance)
        };
    }

    Assessment {
        is_late: true,
        lateness: Some(lateness),
        deduction,
        new_balance: current_balance - deduction,
        insufficient_balance: false,
    }
}

/// 请假天数，包含首尾两天
pub fn leave_days(start_date: NaiveDate, end_date: NaiveDate) -> Result<i32, AppError> {
    if end_date < start_date {
        return Err(AppError::InvalidRange);
    }
    let days = (end_date - start_date).num_days() + 1;
    i32::try_from(days).map_err(|_| AppError::Validation("Leave range is too long.".into()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSummary {
    pub total_granted: Decimal,
    pub used: Decimal,
    pub remaining: Decimal,
}

impl BalanceSummary {
    /// 已用天数 = 发放天数 - 剩余天数；手工调高余额时不会出现负数
    pub fn new(total_granted: Decimal, remaining: Decimal) -> Self {
        Self {
            total_granted,
            used: (total_granted - remaining).max(Decimal::ZERO),
            remaining,
        }
    }
}
