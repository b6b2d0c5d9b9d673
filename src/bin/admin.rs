//! 管理命令：创建账号、生成月度报表
//!
//! 月度报表由外部定时任务调用，例如每月1日执行 `attendance-admin monthly-report`。

use anyhow::Context;
use attendance_backend::{
    MIGRATOR,
    config::{Config, LeavePolicy},
    routes::{
        report::{MonthlyReport, ReportPeriod},
        user::{CreateUserRequest, Role, User},
    },
};
use chrono::Local;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "attendance-admin", about = "Attendance backend administration")]
struct Cli {
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 运行数据库迁移
    Migrate,
    /// 创建账号及员工档案
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long, value_parser = parse_role, default_value = "personnel")]
        role: Role,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        position: Option<String>,
    },
    /// 汇总月度工作时长，默认上一个自然月
    MonthlyReport {
        #[arg(long, requires = "year")]
        month: Option<u32>,
        #[arg(long, requires = "month")]
        year: Option<i32>,
    },
}

fn parse_role(value: &str) -> Result<Role, String> {
    Role::try_from(value.to_lowercase()).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let database_url = match cli.database_url {
        Some(url) => url,
        None => Config::database_url_from_env().context("DATABASE_URL is not set")?,
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .context("Failed to connect to Postgres")?;

    match cli.command {
        Command::Migrate => {
            MIGRATOR.run(&pool).await.context("Migration failed")?;
            tracing::info!("Migrations applied");
        }
        Command::CreateUser {
            username,
            password,
            role,
            full_name,
            department,
            position,
        } => {
            let policy = LeavePolicy::from_env();
            let (user, profile) = User::create_with_profile(
                &pool,
                CreateUserRequest {
                    username,
                    password,
                    role,
                    full_name,
                    department,
                    position,
                },
                policy.annual_leave_days,
            )
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create user: {}", e))?;
            println!(
                "Created {} {} ({}), leave balance {}",
                user.role.as_str(),
                user.username,
                user.user_id,
                profile.annual_leave_balance
            );
        }
        Command::MonthlyReport { month, year } => {
            let period = match (month, year) {
                (Some(month), Some(year)) => ReportPeriod::new(month, year)
                    .map_err(|e| anyhow::anyhow!(e.to_string()))?,
                _ => ReportPeriod::previous(Local::now().date_naive()),
            };
            let written = MonthlyReport::aggregate(&pool, period)
                .await
                .context("Monthly aggregation failed")?;
            println!(
                "Wrote {} report(s) for {}/{}",
                written, period.month, period.year
            );
        }
    }

    Ok(())
}
