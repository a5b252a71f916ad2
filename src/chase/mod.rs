/// Chasing clients for documents
///
/// Launching a campaign sends the initial request to every pending client;
/// [`sweep`] follows up with reminders and flags clients who never answer.
/// [`inbound`] handles what clients send back.

pub mod inbound;
pub mod sweep;

use crate::{
    campaigns::ReminderStage,
    context::AppContext,
    db::models::{Accountant, Campaign, CampaignStatus, Client, Message, MessageKind, MessageSender},
    error::{ChaseError, ChaseResult},
    messaging::{self, templates, Outbound},
};
use serde::Serialize;
use uuid::Uuid;

/// WhatsApp number messages are sent from
pub fn sender_number(ctx: &AppContext, accountant: &Accountant) -> String {
    accountant
        .twilio_number
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| ctx.config.twilio.default_from.clone())
}

/// Send one chase (request or reminder) to a client
///
/// Refused with [`ChaseError::ChaseLimitReached`] once the plan's monthly allowance is used.
pub async fn send_chase(
    ctx: &AppContext,
    accountant: &Accountant,
    campaign: &Campaign,
    client: &Client,
    stage: ReminderStage,
) -> ChaseResult<Message> {
    let (kind, body) = match stage {
        ReminderStage::Request => (
            MessageKind::Request,
            templates::initial_request(accountant, client, campaign),
        ),
        ReminderStage::Reminder1 => (
            MessageKind::Reminder1,
            templates::reminder_one(accountant, client, campaign),
        ),
        ReminderStage::Reminder2 => (
            MessageKind::Reminder2,
            templates::reminder_two(accountant, client, campaign),
        ),
        ReminderStage::Flag => {
            return Err(ChaseError::Internal("Flagging does not send a message".to_string()))
        }
    };

    ctx.billing.ensure_chase_allowed(accountant).await?;

    let from = sender_number(ctx, accountant);
    messaging::send_and_record(
        ctx.whatsapp.as_ref(),
        &ctx.messages,
        Outbound {
            from: &from,
            client,
            campaign_id: Some(campaign.id),
            sender: MessageSender::Assistant,
            kind,
            body,
        },
    )
    .await
}

/// Claim a stage, send it, and release the claim if sending fails
///
/// Returns `Ok(false)` when another sweep already claimed the stage.
pub async fn claim_and_send(
    ctx: &AppContext,
    accountant: &Accountant,
    campaign: &Campaign,
    campaign_client_id: Uuid,
    client: &Client,
    stage: ReminderStage,
) -> ChaseResult<bool> {
    let Some(claimed_at) = ctx.campaigns.claim_stage(campaign_client_id, stage).await? else {
        return Ok(false);
    };

    match send_chase(ctx, accountant, campaign, client, stage).await {
        Ok(_) => Ok(true),
        Err(e) => {
            ctx.campaigns
                .release_stage(campaign_client_id, stage, claimed_at)
                .await?;
            Err(e)
        }
    }
}

/// Result of launching a campaign
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchReport {
    pub campaign: Campaign,
    pub sent: usize,
    pub failed: usize,
    /// True when the plan limit stopped the launch part-way
    pub limit_reached: bool,
}

/// Activate a draft campaign and send the initial requests
///
/// Clients whose request fails stay unsent; the reminder sweep retries them.
pub async fn launch_campaign(ctx: &AppContext, accountant_id: Uuid, campaign_id: Uuid) -> ChaseResult<LaunchReport> {
    let current = ctx.campaigns.get(accountant_id, campaign_id).await?;
    if current.status != CampaignStatus::Draft {
        return Err(ChaseError::Validation(
            "Only draft campaigns can be launched".to_string(),
        ));
    }

    let accountant = ctx.accounts.get_accountant(accountant_id).await?;
    let campaign = ctx
        .campaigns
        .transition(accountant_id, campaign_id, CampaignStatus::Active)
        .await?;

    let mut report = LaunchReport {
        campaign,
        sent: 0,
        failed: 0,
        limit_reached: false,
    };

    for (cc, client) in ctx.campaigns.pending_with_clients(campaign_id).await? {
        match claim_and_send(ctx, &accountant, &report.campaign, cc.id, &client, ReminderStage::Request).await {
            Ok(true) => report.sent += 1,
            Ok(false) => {}
            Err(ChaseError::ChaseLimitReached) => {
                tracing::warn!(campaign_id = %campaign_id, "Launch stopped: monthly chase limit reached");
                report.limit_reached = true;
                break;
            }
            Err(e) => {
                tracing::warn!(campaign_id = %campaign_id, client_id = %client.id, "Initial request failed: {}", e);
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        campaign_id = %campaign_id,
        sent = report.sent,
        failed = report.failed,
        "Campaign launched"
    );

    Ok(report)
}

/// Message typed by the accountant in the conversation view
pub async fn send_manual(ctx: &AppContext, accountant: &Accountant, client: &Client, body: &str) -> ChaseResult<Message> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ChaseError::Validation("Message cannot be empty".to_string()));
    }

    let campaign = ctx
        .campaigns
        .open_campaign_for_client(accountant.id, client.id)
        .await?;
    let from = sender_number(ctx, accountant);

    messaging::send_and_record(
        ctx.whatsapp.as_ref(),
        &ctx.messages,
        Outbound {
            from: &from,
            client,
            campaign_id: campaign.map(|c| c.id),
            sender: MessageSender::Accountant,
            kind: MessageKind::Manual,
            body: body.to_string(),
        },
    )
    .await
}
