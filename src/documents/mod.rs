/// Documents received from clients
///
/// Each row tracks one inbound file through Drive upload and conversion.

pub mod pipeline;

use crate::{
    db::models::{ConversionStatus, Document, DOCUMENT_COLUMNS},
    error::{ChaseError, ChaseResult},
};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

/// Document to be recorded on arrival
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub accountant_id: Uuid,
    pub client_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub file_name: String,
    pub mime_type: String,
    pub original_url: String,
}

/// Document manager
#[derive(Clone)]
pub struct DocumentManager {
    db: PgPool,
}

impl DocumentManager {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, doc: NewDocument) -> ChaseResult<Document> {
        let row = sqlx::query(&format!(
            "INSERT INTO document (id, accountant_id, client_id, campaign_id, file_name, mime_type,
                original_url, conversion_status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
             RETURNING {}",
            DOCUMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(doc.accountant_id)
        .bind(doc.client_id)
        .bind(doc.campaign_id)
        .bind(&doc.file_name)
        .bind(&doc.mime_type)
        .bind(&doc.original_url)
        .bind(ConversionStatus::Pending.as_str())
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        Document::from_row(&row)
    }

    pub async fn get(&self, accountant_id: Uuid, id: Uuid) -> ChaseResult<Document> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM document WHERE id = $1 AND accountant_id = $2",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .bind(accountant_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ChaseError::NotFound("Document not found".to_string()))?;

        Document::from_row(&row)
    }

    /// Documents from one client, newest first
    pub async fn list_for_client(&self, accountant_id: Uuid, client_id: Uuid) -> ChaseResult<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM document WHERE accountant_id = $1 AND client_id = $2
             ORDER BY created_at DESC",
            DOCUMENT_COLUMNS
        ))
        .bind(accountant_id)
        .bind(client_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Document::from_row).collect()
    }

    /// Documents attached to one campaign, newest first
    pub async fn list_for_campaign(&self, accountant_id: Uuid, campaign_id: Uuid) -> ChaseResult<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM document WHERE accountant_id = $1 AND campaign_id = $2
             ORDER BY created_at DESC",
            DOCUMENT_COLUMNS
        ))
        .bind(accountant_id)
        .bind(campaign_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Document::from_row).collect()
    }

    pub async fn mark_uploaded(&self, id: Uuid, drive_file_id: &str) -> ChaseResult<()> {
        sqlx::query("UPDATE document SET drive_file_id = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(drive_file_id)
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        Ok(())
    }

    pub async fn mark_converted(&self, id: Uuid, csv_file_id: Option<&str>) -> ChaseResult<()> {
        self.set_conversion(id, ConversionStatus::Success, csv_file_id, None).await
    }

    pub async fn mark_conversion_failed(&self, id: Uuid, error: &str) -> ChaseResult<()> {
        self.set_conversion(id, ConversionStatus::Failed, None, Some(error)).await
    }

    pub async fn mark_skipped(&self, id: Uuid) -> ChaseResult<()> {
        self.set_conversion(id, ConversionStatus::Skipped, None, None).await
    }

    async fn set_conversion(
        &self,
        id: Uuid,
        status: ConversionStatus,
        csv_file_id: Option<&str>,
        error: Option<&str>,
    ) -> ChaseResult<()> {
        sqlx::query(
            "UPDATE document SET conversion_status = $2,
                drive_csv_file_id = COALESCE($3, drive_csv_file_id),
                conversion_error = $4, updated_at = $5
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(csv_file_id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
