use std::env;
use std::time::Duration;

use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub policy: LeavePolicy,
}

/// 考勤与假期规则
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LeavePolicy {
    /// 公司上班时间，晚于此时间打卡视为迟到
    pub work_start: NaiveTime,
    /// 扣减后余额低于该值时通知授权用户
    pub low_balance_threshold: Decimal,
    /// 每年发放的年假天数，新员工档案的初始余额
    pub annual_leave_days: Decimal,
}

impl Default for LeavePolicy {
    fn default() -> Self {
        Self {
            work_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            low_balance_threshold: dec!(3),
            annual_leave_days: dec!(15),
        }
    }
}

impl LeavePolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_start: env::var("WORK_START_TIME")
                .ok()
                .and_then(|v| NaiveTime::parse_from_str(v.trim(), "%H:%M").ok())
                .unwrap_or(defaults.work_start),
            low_balance_threshold: env::var("LOW_BALANCE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.low_balance_threshold),
            annual_leave_days: env::var("ANNUAL_LEAVE_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.annual_leave_days),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .unwrap_or_else(|_| "12h".into())
            .trim_end_matches('h')
            .parse::<u64>()
            .unwrap_or(12);
        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(3000),
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".into()),
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration * 3600,
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW")?.parse().unwrap_or(60),
            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")?.parse().unwrap_or(100),
            policy: LeavePolicy::from_env(),
        })
    }

    /// 只需要数据库的场景（命令行工具）
    pub fn database_url_from_env() -> Result<String, env::VarError> {
        dotenv::dotenv().ok();
        env::var("DATABASE_URL")
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_starts_at_eight() {
        let policy = LeavePolicy::default();
        assert_eq!(policy.work_start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(policy.low_balance_threshold, dec!(3));
        assert_eq!(policy.annual_leave_days, dec!(15));
    }
}
