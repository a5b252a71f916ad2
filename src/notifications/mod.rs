/// In-app notifications polled by the dashboard
use crate::{
    db::models::{Notification, NotificationKind, NOTIFICATION_COLUMNS},
    error::{ChaseError, ChaseResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Default and maximum page sizes for polling
pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 200;

/// Poll query
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}

impl NotificationQuery {
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// Poll response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFeed {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}

/// Insert a notification on a caller-supplied connection or transaction
pub async fn insert_notification<'e, E>(
    executor: E,
    accountant_id: Uuid,
    kind: NotificationKind,
    title: String,
    body: String,
) -> ChaseResult<Notification>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(&format!(
        "INSERT INTO notification (id, accountant_id, kind, title, body, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {}",
        NOTIFICATION_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(accountant_id)
    .bind(kind.as_str())
    .bind(title)
    .bind(body)
    .bind(Utc::now())
    .fetch_one(executor)
    .await?;

    Notification::from_row(&row)
}

/// Notification manager
#[derive(Clone)]
pub struct NotificationManager {
    db: PgPool,
}

impl NotificationManager {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record a notification
    pub async fn create(
        &self,
        accountant_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> ChaseResult<Notification> {
        insert_notification(&self.db, accountant_id, kind, title.into(), body.into()).await
    }

    /// Whether a notification of this kind exists since `since`
    pub async fn exists_since(
        &self,
        accountant_id: Uuid,
        kind: NotificationKind,
        since: DateTime<Utc>,
    ) -> ChaseResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM notification
                WHERE accountant_id = $1 AND kind = $2 AND created_at >= $3
             )",
        )
        .bind(accountant_id)
        .bind(kind.as_str())
        .bind(since)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    /// Newest notifications first
    pub async fn list(&self, accountant_id: Uuid, query: &NotificationQuery) -> ChaseResult<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM notification
             WHERE accountant_id = $1 AND (NOT $2 OR read_at IS NULL)
             ORDER BY created_at DESC
             LIMIT $3",
            NOTIFICATION_COLUMNS
        ))
        .bind(accountant_id)
        .bind(query.unread_only)
        .bind(query.effective_limit())
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Notification::from_row).collect()
    }

    pub async fn unread_count(&self, accountant_id: Uuid) -> ChaseResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification WHERE accountant_id = $1 AND read_at IS NULL",
        )
        .bind(accountant_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Mark one notification read
    pub async fn mark_read(&self, accountant_id: Uuid, id: Uuid) -> ChaseResult<()> {
        let result = sqlx::query(
            "UPDATE notification SET read_at = COALESCE(read_at, $3)
             WHERE id = $1 AND accountant_id = $2",
        )
        .bind(id)
        .bind(accountant_id)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ChaseError::NotFound("Notification not found".to_string()));
        }

        Ok(())
    }

    /// Mark everything read, returning how many changed
    pub async fn mark_all_read(&self, accountant_id: Uuid) -> ChaseResult<u64> {
        let result = sqlx::query(
            "UPDATE notification SET read_at = $2 WHERE accountant_id = $1 AND read_at IS NULL",
        )
        .bind(accountant_id)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}
