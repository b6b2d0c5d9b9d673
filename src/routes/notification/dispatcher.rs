//! 系统通知分发
//!
//! 迟到、余额不足、新请假申请时通知所有授权人员；请假审批结果只通知申请人。
//! 分发在触发它的事务提交之后进行，每个收件人独立写入，单个失败只记录日志。

use async_trait::async_trait;
use futures_util::future::join_all;
use sqlx::PgPool;

use super::model::Notification;
use crate::routes::user::{Role, User};

/// 授权人员名录
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn authorized_user_ids(&self) -> Result<Vec<String>, sqlx::Error>;
}

/// 通知的持久化
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, recipient_id: &str, message: &str) -> Result<(), sqlx::Error>;
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn authorized_user_ids(&self) -> Result<Vec<String>, sqlx::Error> {
        User::ids_with_role(&self.pool, Role::Authorized).await
    }
}

#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(&self, recipient_id: &str, message: &str) -> Result<(), sqlx::Error> {
        Notification::create(&self.pool, recipient_id, message).await?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct NotificationDispatcher<D, S> {
    directory: D,
    store: S,
}

pub type PgDispatcher = NotificationDispatcher<PgUserDirectory, PgNotificationStore>;

impl PgDispatcher {
    pub fn from_pool(pool: &PgPool) -> Self {
        NotificationDispatcher::new(
            PgUserDirectory { pool: pool.clone() },
            PgNotificationStore { pool: pool.clone() },
        )
    }
}

impl<D: UserDirectory, S: NotificationStore> NotificationDispatcher<D, S> {
    pub fn new(directory: D, store: S) -> Self {
        Self { directory, store }
    }

    pub async fn broadcast_to_authorized(&self, message: &str) -> DispatchReport {
        let recipients = match self.directory.authorized_user_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Failed to load authorized users for broadcast: {}", e);
                return DispatchReport::default();
            }
        };

        let results = join_all(
            recipients
                .iter()
                .map(|recipient| self.store.create(recipient, message)),
        )
        .await;

        let mut report = DispatchReport::default();
        for (recipient, result) in recipients.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!("Failed to notify {}: {}", recipient, e);
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(
            "Broadcast delivered to {} authorized users ({} failed)",
            report.delivered,
            report.failed
        );
        report
    }

    pub async fn notify_user(&self, recipient_id: &str, message: &str) -> bool {
        match self.store.create(recipient_id, message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to notify {}: {}", recipient_id, e);
                false
            }
        }
    }
}
