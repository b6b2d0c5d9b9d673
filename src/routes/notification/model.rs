use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::common::{PAGE_SIZE, PageQuery};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub notification_id: String,
    pub recipient_id: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub notification_id: String,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

impl Notification {
    pub async fn create(
        pool: &PgPool,
        recipient_id: &str,
        message: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (notification_id, recipient_id, message, is_read, created_at)
            VALUES ($1, $2, $3, false, NOW())
            RETURNING notification_id, recipient_id, message, is_read, created_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(recipient_id)
        .bind(message)
        .fetch_one(pool)
        .await
    }

    pub async fn list_for_user(
        pool: &PgPool,
        user_id: &str,
        query: &PageQuery,
    ) -> Result<(Vec<Self>, u64), sqlx::Error> {
        let items = sqlx::query_as::<_, Notification>(
            r#"
            SELECT notification_id, recipient_id, message, is_read, created_at
            FROM notifications
            WHERE recipient_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(i64::from(PAGE_SIZE))
        .bind(query.offset())
        .fetch_all(pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE recipient_id = $1")
                .bind(user_id)
                .fetch_one(pool)
                .await?;

        Ok((items, total.max(0) as u64))
    }

    pub async fn unread_count(pool: &PgPool, user_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// 只能标记自己的通知
    pub async fn mark_read(
        pool: &PgPool,
        user_id: &str,
        notification_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET is_read = true
            WHERE notification_id = $1 AND recipient_id = $2
            RETURNING notification_id, recipient_id, message, is_read, created_at
            "#,
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }
}
