/// WhatsApp messaging
///
/// Outbound messages are sent once through a [`WhatsAppSender`] and then
/// recorded; there is no retry or delivery-status reconciliation.

pub mod templates;
mod twilio;

pub use twilio::TwilioClient;

use crate::{
    db::models::{Client, Message, MessageDirection, MessageKind, MessageSender, MESSAGE_COLUMNS},
    error::ChaseResult,
    metrics,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Shared WhatsApp sender trait object
pub type DynWhatsAppSender = Arc<dyn WhatsAppSender>;

/// Outbound WhatsApp transport
#[async_trait]
pub trait WhatsAppSender: Send + Sync {
    /// Send a text message, returning the provider message id
    async fn send(&self, from: &str, to: &str, body: &str) -> ChaseResult<String>;

    /// Download media attached to an inbound message
    async fn fetch_media(&self, url: &str) -> ChaseResult<Vec<u8>>;
}

/// Message to be recorded
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub accountant_id: Uuid,
    pub client_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub direction: MessageDirection,
    pub sender: MessageSender,
    pub kind: MessageKind,
    pub body: String,
    pub media_url: Option<String>,
    pub twilio_sid: Option<String>,
}

/// Conversation history store
#[derive(Clone)]
pub struct MessageStore {
    db: PgPool,
}

impl MessageStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Insert a message row
    ///
    /// Outbound chases also write a `chase_usage` row in the same transaction.
    pub async fn record(&self, msg: NewMessage) -> ChaseResult<Message> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query(&format!(
            "INSERT INTO message (id, accountant_id, client_id, campaign_id, direction, sender,
                kind, body, media_url, twilio_sid, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(msg.accountant_id)
        .bind(msg.client_id)
        .bind(msg.campaign_id)
        .bind(msg.direction.as_str())
        .bind(msg.sender.as_str())
        .bind(msg.kind.as_str())
        .bind(&msg.body)
        .bind(&msg.media_url)
        .bind(&msg.twilio_sid)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let message = Message::from_row(&row)?;

        if message.direction == MessageDirection::Outbound && message.kind.is_chase() {
            sqlx::query(
                "INSERT INTO chase_usage (id, accountant_id, campaign_id, message_id, kind, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(Uuid::new_v4())
            .bind(message.accountant_id)
            .bind(message.campaign_id)
            .bind(message.id)
            .bind(message.kind.as_str())
            .bind(message.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(message)
    }

    /// Insert an inbound message unless its provider SID was already seen
    ///
    /// Returns `None` for a redelivered webhook.
    pub async fn record_inbound(&self, msg: NewMessage) -> ChaseResult<Option<Message>> {
        let row = sqlx::query(&format!(
            "INSERT INTO message (id, accountant_id, client_id, campaign_id, direction, sender,
                kind, body, media_url, twilio_sid, created_at)
             VALUES ($1, $2, $3, $4, 'inbound', $5, $6, $7, $8, $9, $10)
             ON CONFLICT (twilio_sid) WHERE direction = 'inbound' AND twilio_sid IS NOT NULL
             DO NOTHING
             RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(msg.accountant_id)
        .bind(msg.client_id)
        .bind(msg.campaign_id)
        .bind(msg.sender.as_str())
        .bind(msg.kind.as_str())
        .bind(&msg.body)
        .bind(&msg.media_url)
        .bind(&msg.twilio_sid)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(Message::from_row).transpose()
    }

    /// Full conversation with a client, oldest first
    pub async fn list_for_client(&self, accountant_id: Uuid, client_id: Uuid) -> ChaseResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM message WHERE accountant_id = $1 AND client_id = $2
             ORDER BY created_at ASC",
            MESSAGE_COLUMNS
        ))
        .bind(accountant_id)
        .bind(client_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Message::from_row).collect()
    }

    /// The most recent `limit` messages with a client, oldest first
    pub async fn recent(&self, client_id: Uuid, limit: i64) -> ChaseResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM message WHERE client_id = $1
             ORDER BY created_at DESC LIMIT $2",
            MESSAGE_COLUMNS
        ))
        .bind(client_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        let mut messages = rows.iter().map(Message::from_row).collect::<ChaseResult<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Chases sent by an accountant since `since`
    ///
    /// Counted from `chase_usage`, which deleting clients or campaigns leaves intact.
    pub async fn count_chases_since(
        &self,
        accountant_id: Uuid,
        since: chrono::DateTime<Utc>,
    ) -> ChaseResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chase_usage
             WHERE accountant_id = $1 AND created_at >= $2",
        )
        .bind(accountant_id)
        .bind(since)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }
}

/// Outbound send parameters
#[derive(Debug, Clone)]
pub struct Outbound<'a> {
    pub from: &'a str,
    pub client: &'a Client,
    pub campaign_id: Option<Uuid>,
    pub sender: MessageSender,
    pub kind: MessageKind,
    pub body: String,
}

/// Send once and record the message with the returned SID
///
/// A failed send records nothing and returns the vendor error.
pub async fn send_and_record(
    whatsapp: &dyn WhatsAppSender,
    store: &MessageStore,
    out: Outbound<'_>,
) -> ChaseResult<Message> {
    let to = crate::validation::whatsapp_address(&out.client.phone);
    let from = crate::validation::whatsapp_address(out.from);

    let sid = match whatsapp.send(&from, &to, &out.body).await {
        Ok(sid) => sid,
        Err(e) => {
            metrics::record_message_failed(out.kind.as_str());
            tracing::warn!(
                client_id = %out.client.id,
                kind = %out.kind,
                "WhatsApp send failed: {}",
                e
            );
            return Err(e);
        }
    };

    metrics::record_message_sent(out.kind.as_str());
    tracing::info!(client_id = %out.client.id, kind = %out.kind, sid = %sid, "WhatsApp message sent");

    store
        .record(NewMessage {
            accountant_id: out.client.accountant_id,
            client_id: out.client.id,
            campaign_id: out.campaign_id,
            direction: MessageDirection::Outbound,
            sender: out.sender,
            kind: out.kind,
            body: out.body,
            media_url: None,
            twilio_sid: Some(sid),
        })
        .await
}
