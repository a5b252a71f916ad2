//! Reminder sweep
//!
//! Runs on an interval. For each pending client of each active campaign it
//! performs at most one due stage. Stage timestamps are claimed before the
//! send, so overlapping sweeps never send the same reminder twice.

use super::claim_and_send;
use crate::{
    campaigns::{claim_stage_on, next_action, ReminderStage},
    context::AppContext,
    db::models::{Accountant, Campaign, Client, NotificationKind},
    error::{ChaseError, ChaseResult},
    metrics,
    notifications::insert_notification,
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

/// What one sweep did
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    pub campaigns: usize,
    pub sent: usize,
    pub flagged: usize,
    pub failed: usize,
}

/// Mark a client stuck and tell the accountant
///
/// The claim and the `client_stuck` notification commit together.
async fn flag_stuck(
    ctx: &AppContext,
    accountant: &Accountant,
    campaign: &Campaign,
    campaign_client_id: Uuid,
    client: &Client,
) -> ChaseResult<bool> {
    let mut tx = ctx.db.begin().await?;

    if claim_stage_on(&mut *tx, campaign_client_id, ReminderStage::Flag)
        .await?
        .is_none()
    {
        return Ok(false);
    }

    insert_notification(
        &mut *tx,
        accountant.id,
        NotificationKind::ClientStuck,
        format!("{} is stuck", client.name),
        format!(
            "{} hasn't sent their {} for {} after {} days. You may want to call them.",
            client.name,
            campaign.document_type.label(),
            campaign.name,
            campaign.reminder_3_days
        ),
    )
    .await?;

    tx.commit().await?;

    if accountant.notify_email_on_stuck {
        if let Err(e) = ctx
            .mailer
            .send_client_stuck(&accountant.email, &client.name, &campaign.name, campaign.reminder_3_days)
            .await
        {
            tracing::warn!(accountant_id = %accountant.id, "Stuck email failed: {}", e);
        }
    }

    tracing::info!(campaign_id = %campaign.id, client_id = %client.id, "Client flagged as stuck");
    Ok(true)
}

async fn sweep_campaign(ctx: &AppContext, campaign: &Campaign, report: &mut SweepReport) -> ChaseResult<()> {
    let accountant = ctx.accounts.get_accountant(campaign.accountant_id).await?;
    let now = Utc::now();

    for (cc, client) in ctx.campaigns.pending_with_clients(campaign.id).await? {
        let Some(stage) = next_action(campaign, &cc, now) else {
            continue;
        };

        if stage == ReminderStage::Flag {
            if flag_stuck(ctx, &accountant, campaign, cc.id, &client).await? {
                metrics::record_reminder(stage.as_str());
                report.flagged += 1;
            }
            continue;
        }

        match claim_and_send(ctx, &accountant, campaign, cc.id, &client, stage).await {
            Ok(true) => {
                metrics::record_reminder(stage.as_str());
                report.sent += 1;
            }
            Ok(false) => {}
            Err(ChaseError::ChaseLimitReached) => {
                // Nothing else for this accountant can be sent this period
                tracing::info!(campaign_id = %campaign.id, "Sweep skipped rest of campaign: chase limit reached");
                break;
            }
            Err(e) => {
                tracing::warn!(
                    campaign_id = %campaign.id,
                    client_id = %client.id,
                    stage = stage.as_str(),
                    "Reminder send failed, will retry next sweep: {}",
                    e
                );
                report.failed += 1;
            }
        }
    }

    Ok(())
}

/// Run one pass over every active campaign
pub async fn run_reminder_sweep(ctx: &AppContext) -> ChaseResult<SweepReport> {
    let mut report = SweepReport::default();

    for campaign in ctx.campaigns.active_campaigns().await? {
        report.campaigns += 1;
        if let Err(e) = sweep_campaign(ctx, &campaign, &mut report).await {
            tracing::error!(campaign_id = %campaign.id, "Reminder sweep failed for campaign: {}", e);
        }
    }

    Ok(report)
}
