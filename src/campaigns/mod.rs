/// Campaign management
///
/// A campaign asks a set of clients for one type of document for one period.
/// Status changes follow [`CampaignStatus::can_transition_to`]; per-client
/// progress only moves forward and each stage timestamp is written once.

pub mod reminders;

pub use reminders::{next_action, ReminderSettings, ReminderStage};

use crate::{
    db::models::{
        Campaign, CampaignClient, CampaignClientStatus, CampaignStatus, Client, DocumentType,
        CAMPAIGN_CLIENT_COLUMNS, CAMPAIGN_COLUMNS, CLIENT_COLUMNS,
    },
    error::{ChaseError, ChaseResult},
};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool, Row};
use uuid::Uuid;
use validator::Validate;

/// Create campaign request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignRequest {
    #[validate(length(min = 1, max = 200, message = "Campaign name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 50, message = "Period is required"))]
    pub period: String,
    pub document_type: DocumentType,
    pub client_ids: Vec<Uuid>,
    /// Omitted means the standard day-3 / day-6 / day-9 policy
    pub reminders: Option<ReminderSettings>,
}

/// Per-status counts shown on campaign cards
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignCounts {
    pub total: i64,
    pub pending: i64,
    pub received: i64,
    pub stuck: i64,
}

/// Campaign with its progress counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSummary {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub counts: CampaignCounts,
}

/// Campaign client joined with the client's contact details
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignClientView {
    #[serde(flatten)]
    pub progress: CampaignClient,
    pub client_name: String,
    pub client_phone: String,
}

/// Campaign manager
#[derive(Clone)]
pub struct CampaignManager {
    db: PgPool,
    default_send_time: NaiveTime,
}

impl CampaignManager {
    pub fn new(db: PgPool, default_send_time: NaiveTime) -> Self {
        Self {
            db,
            default_send_time,
        }
    }

    /// Check a create request without touching the database
    pub fn check_create(&self, req: &CreateCampaignRequest) -> ChaseResult<ReminderSettings> {
        req.validate()?;

        if req.client_ids.is_empty() {
            return Err(ChaseError::Validation(
                "Select at least one client for the campaign".to_string(),
            ));
        }

        let settings = req
            .reminders
            .clone()
            .unwrap_or_else(|| ReminderSettings::standard(self.default_send_time));
        settings.validate().map_err(ChaseError::Validation)?;

        Ok(settings)
    }

    /// Create a draft campaign with its client list
    pub async fn create(&self, accountant_id: Uuid, req: CreateCampaignRequest) -> ChaseResult<CampaignSummary> {
        let settings = self.check_create(&req)?;

        let mut client_ids = req.client_ids.clone();
        client_ids.sort();
        client_ids.dedup();

        let mut tx = self.db.begin().await?;

        let owned: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM client WHERE accountant_id = $1 AND id = ANY($2)",
        )
        .bind(accountant_id)
        .bind(&client_ids)
        .fetch_one(&mut *tx)
        .await?;

        if owned != client_ids.len() as i64 {
            return Err(ChaseError::Validation(
                "One or more selected clients do not exist".to_string(),
            ));
        }

        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO campaign (id, accountant_id, name, period, document_type, status,
                reminder_1_enabled, reminder_1_days, reminder_2_enabled, reminder_2_days,
                flag_after_enabled, reminder_3_days, reminder_send_time, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
             RETURNING {}",
            CAMPAIGN_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(accountant_id)
        .bind(req.name.trim())
        .bind(req.period.trim())
        .bind(req.document_type.as_str())
        .bind(CampaignStatus::Draft.as_str())
        .bind(settings.reminder_1_enabled)
        .bind(settings.reminder_1_days)
        .bind(settings.reminder_2_enabled)
        .bind(settings.reminder_2_days)
        .bind(settings.flag_after_enabled)
        .bind(settings.reminder_3_days)
        .bind(settings.reminder_send_time)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let campaign = Campaign::from_row(&row)?;

        for client_id in &client_ids {
            sqlx::query(
                "INSERT INTO campaign_client (id, campaign_id, client_id, status, created_at)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(campaign.id)
            .bind(client_id)
            .bind(CampaignClientStatus::Pending.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            campaign_id = %campaign.id,
            clients = client_ids.len(),
            "Created campaign {}",
            campaign.name
        );

        Ok(CampaignSummary {
            campaign,
            counts: CampaignCounts {
                total: client_ids.len() as i64,
                pending: client_ids.len() as i64,
                ..Default::default()
            },
        })
    }

    /// Get a campaign owned by the accountant
    pub async fn get(&self, accountant_id: Uuid, id: Uuid) -> ChaseResult<Campaign> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM campaign WHERE id = $1 AND accountant_id = $2",
            CAMPAIGN_COLUMNS
        ))
        .bind(id)
        .bind(accountant_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ChaseError::NotFound("Campaign not found".to_string()))?;

        Campaign::from_row(&row)
    }

    /// Get a campaign with its counts
    pub async fn get_summary(&self, accountant_id: Uuid, id: Uuid) -> ChaseResult<CampaignSummary> {
        let campaign = self.get(accountant_id, id).await?;
        let counts = self.counts(campaign.id).await?;
        Ok(CampaignSummary { campaign, counts })
    }

    async fn counts(&self, campaign_id: Uuid) -> ChaseResult<CampaignCounts> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM campaign_client WHERE campaign_id = $1 GROUP BY status",
        )
        .bind(campaign_id)
        .fetch_all(&self.db)
        .await?;

        let mut counts = CampaignCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            match status.parse::<CampaignClientStatus>()? {
                CampaignClientStatus::Pending => counts.pending = n,
                CampaignClientStatus::Received => counts.received = n,
                CampaignClientStatus::Stuck => counts.stuck = n,
            }
            counts.total += n;
        }

        Ok(counts)
    }

    /// List campaigns, newest first
    pub async fn list(
        &self,
        accountant_id: Uuid,
        status: Option<CampaignStatus>,
    ) -> ChaseResult<Vec<CampaignSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM campaign
             WHERE accountant_id = $1 AND ($2::TEXT IS NULL OR status = $2)
             ORDER BY created_at DESC",
            CAMPAIGN_COLUMNS
        ))
        .bind(accountant_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let campaign = Campaign::from_row(row)?;
            let counts = self.counts(campaign.id).await?;
            summaries.push(CampaignSummary { campaign, counts });
        }

        Ok(summaries)
    }

    /// Change reminder settings (draft or paused campaigns only)
    pub async fn update_reminders(
        &self,
        accountant_id: Uuid,
        id: Uuid,
        settings: ReminderSettings,
    ) -> ChaseResult<Campaign> {
        settings.validate().map_err(ChaseError::Validation)?;

        let campaign = self.get(accountant_id, id).await?;
        if !matches!(campaign.status, CampaignStatus::Draft | CampaignStatus::Paused) {
            return Err(ChaseError::Validation(
                "Pause the campaign before changing its reminders".to_string(),
            ));
        }

        let row = sqlx::query(&format!(
            "UPDATE campaign SET
                reminder_1_enabled = $3, reminder_1_days = $4,
                reminder_2_enabled = $5, reminder_2_days = $6,
                flag_after_enabled = $7, reminder_3_days = $8,
                reminder_send_time = $9, updated_at = $10
             WHERE id = $1 AND accountant_id = $2
             RETURNING {}",
            CAMPAIGN_COLUMNS
        ))
        .bind(id)
        .bind(accountant_id)
        .bind(settings.reminder_1_enabled)
        .bind(settings.reminder_1_days)
        .bind(settings.reminder_2_enabled)
        .bind(settings.reminder_2_days)
        .bind(settings.flag_after_enabled)
        .bind(settings.reminder_3_days)
        .bind(settings.reminder_send_time)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        Campaign::from_row(&row)
    }

    /// Delete a draft campaign
    pub async fn delete(&self, accountant_id: Uuid, id: Uuid) -> ChaseResult<()> {
        let campaign = self.get(accountant_id, id).await?;
        if campaign.status != CampaignStatus::Draft {
            return Err(ChaseError::Validation(
                "Only draft campaigns can be deleted".to_string(),
            ));
        }

        sqlx::query("DELETE FROM campaign WHERE id = $1 AND accountant_id = $2")
            .bind(id)
            .bind(accountant_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Move a campaign to a new status
    ///
    /// The first move to active stamps `started_at`; completion stamps
    /// `completed_at`. The UPDATE re-checks the previous status so concurrent
    /// transitions cannot both win.
    pub async fn transition(
        &self,
        accountant_id: Uuid,
        id: Uuid,
        next: CampaignStatus,
    ) -> ChaseResult<Campaign> {
        let campaign = self.get(accountant_id, id).await?;

        if !campaign.status.can_transition_to(next) {
            return Err(ChaseError::Validation(format!(
                "Cannot move campaign from {} to {}",
                campaign.status, next
            )));
        }

        let now = Utc::now();
        let row = sqlx::query(&format!(
            "UPDATE campaign SET
                status = $3,
                started_at = CASE WHEN $3 = 'active' THEN COALESCE(started_at, $5) ELSE started_at END,
                completed_at = CASE WHEN $3 = 'completed' THEN $5 ELSE completed_at END,
                updated_at = $5
             WHERE id = $1 AND accountant_id = $2 AND status = $4
             RETURNING {}",
            CAMPAIGN_COLUMNS
        ))
        .bind(id)
        .bind(accountant_id)
        .bind(next.as_str())
        .bind(campaign.status.as_str())
        .bind(now)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ChaseError::Conflict("Campaign status changed concurrently".to_string()))?;

        tracing::info!(campaign_id = %id, from = %campaign.status, to = %next, "Campaign status changed");

        Campaign::from_row(&row)
    }

    /// Campaign clients joined with contact details
    pub async fn list_clients(&self, accountant_id: Uuid, campaign_id: Uuid) -> ChaseResult<Vec<CampaignClientView>> {
        // Ownership check
        self.get(accountant_id, campaign_id).await?;

        let rows = sqlx::query(
            "SELECT cc.id, cc.campaign_id, cc.client_id, cc.status, cc.request_sent_at,
                    cc.reminder_1_sent_at, cc.reminder_2_sent_at, cc.flagged_at, cc.received_at,
                    cc.created_at, c.name AS client_name, c.phone AS client_phone
             FROM campaign_client cc
             JOIN client c ON c.id = cc.client_id
             WHERE cc.campaign_id = $1
             ORDER BY c.name",
        )
        .bind(campaign_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CampaignClientView {
                    progress: CampaignClient::from_row(row)?,
                    client_name: row.try_get("client_name")?,
                    client_phone: row.try_get("client_phone")?,
                })
            })
            .collect()
    }

    /// Pending campaign clients with their active client records
    pub async fn pending_with_clients(&self, campaign_id: Uuid) -> ChaseResult<Vec<(CampaignClient, Client)>> {
        let cc_rows = sqlx::query(&format!(
            "SELECT {} FROM campaign_client WHERE campaign_id = $1 AND status = 'pending'",
            CAMPAIGN_CLIENT_COLUMNS
        ))
        .bind(campaign_id)
        .fetch_all(&self.db)
        .await?;

        let mut pairs = Vec::with_capacity(cc_rows.len());
        for row in &cc_rows {
            let cc = CampaignClient::from_row(row)?;
            let client_row = sqlx::query(&format!(
                "SELECT {} FROM client WHERE id = $1 AND status = 'active'",
                CLIENT_COLUMNS
            ))
            .bind(cc.client_id)
            .fetch_optional(&self.db)
            .await?;

            // Inactive clients are not chased
            if let Some(client_row) = client_row {
                pairs.push((cc, Client::from_row(&client_row)?));
            }
        }

        Ok(pairs)
    }

    /// All active campaigns across accountants (for the reminder sweep)
    pub async fn active_campaigns(&self) -> ChaseResult<Vec<Campaign>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM campaign WHERE status = 'active' AND started_at IS NOT NULL",
            CAMPAIGN_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Campaign::from_row).collect()
    }

    /// Claim a stage for a pending campaign client
    ///
    /// Returns the claim timestamp when this caller won the write, `None` if
    /// the stage was already recorded or the client is no longer pending.
    /// Claiming [`ReminderStage::Flag`] also marks the client stuck.
    pub async fn claim_stage(&self, campaign_client_id: Uuid, stage: ReminderStage) -> ChaseResult<Option<DateTime<Utc>>> {
        claim_stage_on(&self.db, campaign_client_id, stage).await
    }

    /// Undo a claim whose message failed to send, so the next sweep retries it
    pub async fn release_stage(
        &self,
        campaign_client_id: Uuid,
        stage: ReminderStage,
        claimed_at: DateTime<Utc>,
    ) -> ChaseResult<()> {
        let col = stage.column();
        sqlx::query(&format!(
            "UPDATE campaign_client SET {col} = NULL WHERE id = $1 AND {col} = $2"
        ))
        .bind(campaign_client_id)
        .bind(claimed_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Mark a client's documents received in every open campaign they belong to
    ///
    /// Returns the ids of campaigns whose progress changed.
    pub async fn mark_client_received(&self, accountant_id: Uuid, client_id: Uuid) -> ChaseResult<Vec<Uuid>> {
        let rows = sqlx::query(
            "UPDATE campaign_client cc SET status = 'received', received_at = $3
             FROM campaign c
             WHERE cc.campaign_id = c.id
               AND c.accountant_id = $1
               AND cc.client_id = $2
               AND c.status IN ('active', 'paused')
               AND cc.status IN ('pending', 'stuck')
               AND cc.received_at IS NULL
             RETURNING cc.campaign_id",
        )
        .bind(accountant_id)
        .bind(client_id)
        .bind(Utc::now())
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<Uuid, _>("campaign_id").map_err(ChaseError::from))
            .collect()
    }

    /// Mark one campaign client received by hand
    pub async fn mark_received(&self, accountant_id: Uuid, campaign_id: Uuid, client_id: Uuid) -> ChaseResult<CampaignClient> {
        self.get(accountant_id, campaign_id).await?;

        let row = sqlx::query(&format!(
            "UPDATE campaign_client SET status = 'received', received_at = $3
             WHERE campaign_id = $1 AND client_id = $2
               AND status IN ('pending', 'stuck') AND received_at IS NULL
             RETURNING {}",
            CAMPAIGN_CLIENT_COLUMNS
        ))
        .bind(campaign_id)
        .bind(client_id)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| {
            ChaseError::Conflict("Client is not awaiting documents in this campaign".to_string())
        })?;

        CampaignClient::from_row(&row)
    }

    /// Complete an active campaign once every client has sent documents
    pub async fn complete_if_done(&self, campaign_id: Uuid) -> ChaseResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE campaign SET status = 'completed', completed_at = $2, updated_at = $2
             WHERE id = $1 AND status = 'active'
               AND NOT EXISTS (
                   SELECT 1 FROM campaign_client
                   WHERE campaign_id = $1 AND status <> 'received'
               )",
        )
        .bind(campaign_id)
        .bind(now)
        .execute(&self.db)
        .await?;

        let completed = result.rows_affected() == 1;
        if completed {
            tracing::info!(campaign_id = %campaign_id, "Campaign completed: all documents received");
        }
        Ok(completed)
    }

    /// The open campaign an inbound document most likely answers
    ///
    /// Prefers the most recently started campaign where the client is still outstanding.
    pub async fn open_campaign_for_client(&self, accountant_id: Uuid, client_id: Uuid) -> ChaseResult<Option<Campaign>> {
        let columns = CAMPAIGN_COLUMNS
            .split(", ")
            .map(|c| format!("c.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");

        let row = sqlx::query(&format!(
            "SELECT {} FROM campaign c
             JOIN campaign_client cc ON cc.campaign_id = c.id
             WHERE c.accountant_id = $1 AND cc.client_id = $2
               AND c.status IN ('active', 'paused')
             ORDER BY (cc.status <> 'received') DESC, c.started_at DESC NULLS LAST
             LIMIT 1",
            columns
        ))
        .bind(accountant_id)
        .bind(client_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(Campaign::from_row).transpose()
    }
}

/// [`CampaignManager::claim_stage`] on a caller-supplied connection or transaction
pub async fn claim_stage_on<'e, E>(
    executor: E,
    campaign_client_id: Uuid,
    stage: ReminderStage,
) -> ChaseResult<Option<DateTime<Utc>>>
where
    E: PgExecutor<'e>,
{
    let col = stage.column();
    let now = Utc::now();
    let status_clause = if stage == ReminderStage::Flag {
        ", status = 'stuck'"
    } else {
        ""
    };

    let result = sqlx::query(&format!(
        "UPDATE campaign_client SET {col} = $2{status_clause}
         WHERE id = $1 AND {col} IS NULL AND status = 'pending'"
    ))
    .bind(campaign_client_id)
    .bind(now)
    .execute(executor)
    .await?;

    Ok((result.rows_affected() == 1).then_some(now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> CampaignManager {
        let config = crate::config::ServerConfig::for_tests();
        let pool = crate::db::create_lazy_pool(&config.database).unwrap();
        CampaignManager::new(pool, NaiveTime::from_hms_opt(10, 0, 0).unwrap())
    }

    fn request(client_ids: Vec<Uuid>) -> CreateCampaignRequest {
        CreateCampaignRequest {
            name: "Q2 bank statements".into(),
            period: "2024-Q2".into(),
            document_type: DocumentType::BankStatements,
            client_ids,
            reminders: None,
        }
    }

    #[tokio::test]
    async fn test_campaign_with_zero_clients_is_rejected() {
        match manager().check_create(&request(vec![])) {
            Err(ChaseError::Validation(msg)) => assert!(msg.contains("at least one client")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_default_reminders_are_standard_policy() {
        let settings = manager().check_create(&request(vec![Uuid::new_v4()])).unwrap();
        assert_eq!(settings.reminder_1_days, 3);
        assert_eq!(settings.reminder_2_days, 6);
        assert_eq!(settings.reminder_3_days, 9);
        assert_eq!(settings.reminder_send_time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_invalid_reminder_order_rejected() {
        let mut req = request(vec![Uuid::new_v4()]);
        let mut settings = ReminderSettings::standard(NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        settings.reminder_2_days = 2;
        req.reminders = Some(settings);
        assert!(manager().check_create(&req).is_err());
    }

    #[test]
    fn test_create_request_json_shape() {
        let json = r#"{
            "name": "Year end",
            "period": "2023-24",
            "documentType": "receipts",
            "clientIds": ["6f1c1d1e-8d4c-4b53-9a53-5b8d2c1b7a10"]
        }"#;
        let req: CreateCampaignRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.document_type, DocumentType::Receipts);
        assert_eq!(req.client_ids.len(), 1);
        assert!(req.reminders.is_none());
    }
}
