use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;

use merit_core::domain::award::AwardId;
use merit_core::domain::employee::EmployeeId;
use merit_core::domain::instance::InstanceId;
use merit_core::errors::ApplicationError;
use merit_core::notify::{NotificationKind, NotificationRequest, Notifier};

use super::{decode_optional_time, decode_time, encode_time, RepositoryError};
use crate::DbPool;

/// A delivered notification as kept in the in-app inbox.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoredNotification {
    pub id: String,
    pub recipient_id: EmployeeId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: String,
    pub instance_id: Option<InstanceId>,
    pub award_id: Option<AwardId>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Notifier that writes into the `notification` inbox table.
#[derive(Clone)]
pub struct SqlNotifier {
    pool: DbPool,
}

impl SqlNotifier {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Newest first.
    pub async fn list_for_recipient(
        &self,
        recipient_id: &EmployeeId,
    ) -> Result<Vec<StoredNotification>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, recipient_id, kind, title, message, link, instance_id, award_id, read_at,
                    created_at
             FROM notification WHERE recipient_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(&recipient_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_notification).collect()
    }

    /// Returns false when the notification is unknown, not owned by the recipient, or already read.
    pub async fn mark_read(
        &self,
        id: &str,
        recipient_id: &EmployeeId,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE notification SET read_at = ?
             WHERE id = ? AND recipient_id = ? AND read_at IS NULL",
        )
        .bind(encode_time(at))
        .bind(id)
        .bind(&recipient_id.0)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }
}

fn row_to_notification(row: &sqlx::sqlite::SqliteRow) -> Result<StoredNotification, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let recipient_id: String =
        row.try_get("recipient_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind: String = row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String = row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message: String =
        row.try_get("message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let link: String = row.try_get("link").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let instance_id: Option<String> =
        row.try_get("instance_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let award_id: Option<String> =
        row.try_get("award_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let read_at: Option<String> =
        row.try_get("read_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(StoredNotification {
        id,
        recipient_id: EmployeeId(recipient_id),
        kind: NotificationKind::parse(&kind)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown notification kind `{kind}`")))?,
        title,
        message,
        link,
        instance_id: instance_id.map(InstanceId),
        award_id: award_id.map(AwardId),
        read_at: decode_optional_time(read_at)?,
        created_at: decode_time(&created_at)?,
    })
}

#[async_trait]
impl Notifier for SqlNotifier {
    async fn notify(&self, request: &NotificationRequest) -> Result<(), ApplicationError> {
        sqlx::query(
            "INSERT INTO notification (id, recipient_id, kind, title, message, link, instance_id,
                                       award_id, read_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?)",
        )
        .bind(format!("ntf-{}", uuid::Uuid::new_v4()))
        .bind(&request.recipient_id.0)
        .bind(request.kind.as_str())
        .bind(&request.title)
        .bind(&request.message)
        .bind(&request.link)
        .bind(&request.instance_id.0)
        .bind(&request.award_id.0)
        .bind(encode_time(request.requested_at))
        .execute(&self.pool)
        .await
        .map_err(|e| ApplicationError::Integration(format!("notification insert failed: {e}")))?;
        Ok(())
    }
}
