//! Inbound WhatsApp messages
//!
//! Routing and recording happen before the webhook answers; media ingestion
//! and assistant replies run afterwards on a spawned task.

use crate::{
    assistant,
    context::AppContext,
    db::models::{
        Accountant, Client, Message, MessageDirection, MessageKind, MessageSender, NotificationKind,
    },
    documents::pipeline::{self, MediaItem},
    error::ChaseResult,
    messaging::{self, NewMessage, Outbound},
    validation::normalize_phone,
};

/// Inbound message as delivered by the webhook
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub from: String,
    pub to: String,
    pub body: String,
    pub message_sid: String,
    pub media: Vec<MediaItem>,
}

/// A recorded inbound message with its owners
#[derive(Debug, Clone)]
pub struct RoutedInbound {
    pub accountant: Accountant,
    pub client: Client,
    pub message: Message,
}

async fn route(ctx: &AppContext, inbound: &InboundMessage) -> ChaseResult<Option<(Accountant, Client)>> {
    let to = normalize_phone(&inbound.to)?;

    if let Some(accountant) = ctx.accounts.find_by_twilio_number(&to).await? {
        let client = ctx.clients.find_by_phone(accountant.id, &inbound.from).await?;
        return Ok(client.map(|c| (accountant, c)));
    }

    // Shared sender: resolve by the client's phone alone
    let shared = normalize_phone(&ctx.config.twilio.default_from).ok();
    if shared.as_deref() == Some(to.as_str()) {
        if let Some(client) = ctx.clients.find_unique_by_phone(&inbound.from).await? {
            let accountant = ctx.accounts.get_accountant(client.accountant_id).await?;
            return Ok(Some((accountant, client)));
        }
    }

    Ok(None)
}

/// Find the accountant and client and record the message
///
/// Unknown senders and redelivered message SIDs yield `None`; nothing new is stored.
pub async fn route_and_record(ctx: &AppContext, inbound: &InboundMessage) -> ChaseResult<Option<RoutedInbound>> {
    let Some((accountant, client)) = route(ctx, inbound).await? else {
        tracing::info!(sid = %inbound.message_sid, "Inbound message from unknown sender ignored");
        return Ok(None);
    };

    let campaign = ctx
        .campaigns
        .open_campaign_for_client(accountant.id, client.id)
        .await?;

    let recorded = ctx
        .messages
        .record_inbound(NewMessage {
            accountant_id: accountant.id,
            client_id: client.id,
            campaign_id: campaign.map(|c| c.id),
            direction: MessageDirection::Inbound,
            sender: MessageSender::Client,
            kind: MessageKind::Inbound,
            body: inbound.body.clone(),
            media_url: inbound.media.first().map(|m| m.url.clone()),
            twilio_sid: Some(inbound.message_sid.clone()),
        })
        .await?;

    let Some(message) = recorded else {
        tracing::info!(sid = %inbound.message_sid, "Duplicate webhook delivery ignored");
        return Ok(None);
    };

    tracing::info!(
        client_id = %client.id,
        sid = %inbound.message_sid,
        media = inbound.media.len(),
        "Inbound message recorded"
    );

    Ok(Some(RoutedInbound {
        accountant,
        client,
        message,
    }))
}

/// Act on a recorded message: file any media, otherwise reply or notify
pub async fn process(ctx: &AppContext, routed: &RoutedInbound, inbound: &InboundMessage) -> ChaseResult<()> {
    let RoutedInbound {
        accountant,
        client,
        message,
    } = routed;

    if !inbound.media.is_empty() {
        pipeline::ingest_media(ctx, accountant, client, &inbound.media).await?;
        return Ok(());
    }

    if inbound.body.trim().is_empty() {
        return Ok(());
    }

    if !accountant.auto_reply_enabled {
        ctx.notifications
            .create(
                accountant.id,
                NotificationKind::InboundMessage,
                format!("New message from {}", client.name),
                inbound.body.trim().to_string(),
            )
            .await?;
        return Ok(());
    }

    let mut history = ctx
        .messages
        .recent(client.id, ctx.config.anthropic.history_limit + 1)
        .await?;
    history.retain(|m| m.id != message.id);

    let reply = assistant::reply_to(ctx.assistant.as_ref(), accountant, &history, &inbound.body).await;

    let from = super::sender_number(ctx, accountant);
    messaging::send_and_record(
        ctx.whatsapp.as_ref(),
        &ctx.messages,
        Outbound {
            from: &from,
            client,
            campaign_id: message.campaign_id,
            sender: MessageSender::Assistant,
            kind: MessageKind::Reply,
            body: reply,
        },
    )
    .await?;

    Ok(())
}
