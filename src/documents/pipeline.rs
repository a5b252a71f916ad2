//! Inbound media pipeline
//!
//! download, record, file to Drive, convert, mark received, acknowledge, notify.
//! A failure on one file is recorded against that document and does not stop
//! the client's receipt from being registered.

use super::NewDocument;
use crate::{
    context::AppContext,
    conversion,
    db::models::{Accountant, Campaign, Client, DocumentType, MessageKind, MessageSender, NotificationKind},
    drive,
    error::ChaseResult,
    messaging::{self, templates, Outbound},
    metrics,
};
use chrono::{DateTime, Utc};

/// One media attachment from an inbound WhatsApp message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub url: String,
    pub content_type: String,
}

/// File extension for a MIME type
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type.to_ascii_lowercase().as_str() {
        "application/pdf" => "pdf",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/heic" => "heic",
        "image/webp" => "webp",
        "text/csv" => "csv",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "application/vnd.ms-excel" => "xls",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        _ => "bin",
    }
}

/// Stored name for a received file, e.g. `2024-04-03_priya-patel_1.pdf`
pub fn file_name_for(client: &Client, index: usize, mime_type: &str, received_at: DateTime<Utc>) -> String {
    let who = crate::validation::slugify(&client.name);
    let who = if who.is_empty() { "client".to_string() } else { who };
    format!(
        "{}_{}_{}.{}",
        received_at.format("%Y-%m-%d"),
        who,
        index + 1,
        extension_for(mime_type)
    )
}

/// Where originals go, if Drive is usable for this accountant
async fn drive_target(ctx: &AppContext, accountant: &Accountant, client: &Client) -> Option<(String, String)> {
    let token = match drive::access_token(ctx.drive.as_ref(), &ctx.accounts, accountant).await {
        Ok(Some(token)) => token,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(accountant_id = %accountant.id, "Drive token unavailable: {}", e);
            return None;
        }
    };

    match drive::client_folder(
        ctx.drive.as_ref(),
        &ctx.accounts,
        accountant,
        &token,
        &ctx.config.google_drive.root_folder_name,
        client,
    )
    .await
    {
        Ok(folder) => Some((token, folder)),
        Err(e) => {
            tracing::warn!(client_id = %client.id, "Drive folder unavailable: {}", e);
            None
        }
    }
}

/// Handle one file; returns false when conversion failed
async fn ingest_one(
    ctx: &AppContext,
    accountant: &Accountant,
    client: &Client,
    campaign: Option<&Campaign>,
    target: Option<&(String, String)>,
    file_name: String,
    item: &MediaItem,
) -> ChaseResult<bool> {
    let doc = ctx
        .documents
        .create(NewDocument {
            accountant_id: accountant.id,
            client_id: client.id,
            campaign_id: campaign.map(|c| c.id),
            file_name: file_name.clone(),
            mime_type: item.content_type.clone(),
            original_url: item.url.clone(),
        })
        .await?;

    let bytes = match ctx.whatsapp.fetch_media(&item.url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            ctx.documents.mark_conversion_failed(doc.id, &e.to_string()).await?;
            metrics::record_document("download_failed");
            return Ok(false);
        }
    };

    if let Some((token, folder)) = target {
        match ctx
            .drive
            .upload(token, folder, &file_name, &item.content_type, bytes.clone())
            .await
        {
            Ok(file_id) => ctx.documents.mark_uploaded(doc.id, &file_id).await?,
            Err(e) => tracing::warn!(document_id = %doc.id, "Drive upload failed: {}", e),
        }
    }

    let document_type = campaign.map(|c| c.document_type).unwrap_or(DocumentType::Other);
    if !conversion::is_convertible(document_type, &item.content_type) {
        ctx.documents.mark_skipped(doc.id).await?;
        metrics::record_document("skipped");
        return Ok(true);
    }

    let csv = match ctx.converter.convert_to_csv(&file_name, bytes).await {
        Ok(csv) => csv,
        Err(e) => {
            tracing::warn!(document_id = %doc.id, "Conversion failed: {}", e);
            ctx.documents.mark_conversion_failed(doc.id, &e.to_string()).await?;
            metrics::record_document("conversion_failed");
            return Ok(false);
        }
    };

    let mut csv_file_id = None;
    if let Some((token, folder)) = target {
        match ctx
            .drive
            .upload(token, folder, &conversion::csv_file_name(&file_name), "text/csv", csv)
            .await
        {
            Ok(id) => csv_file_id = Some(id),
            Err(e) => tracing::warn!(document_id = %doc.id, "CSV upload failed: {}", e),
        }
    }

    ctx.documents.mark_converted(doc.id, csv_file_id.as_deref()).await?;
    metrics::record_document("converted");
    Ok(true)
}

/// Process all media from one inbound message
///
/// Returns the number of files recorded.
pub async fn ingest_media(
    ctx: &AppContext,
    accountant: &Accountant,
    client: &Client,
    media: &[MediaItem],
) -> ChaseResult<usize> {
    if media.is_empty() {
        return Ok(0);
    }

    let campaign = ctx
        .campaigns
        .open_campaign_for_client(accountant.id, client.id)
        .await?;
    let target = drive_target(ctx, accountant, client).await;
    let received_at = Utc::now();

    let mut failures = 0;
    for (index, item) in media.iter().enumerate() {
        let name = file_name_for(client, index, &item.content_type, received_at);
        if !ingest_one(ctx, accountant, client, campaign.as_ref(), target.as_ref(), name, item).await? {
            failures += 1;
        }
    }

    if failures > 0 {
        ctx.notifications
            .create(
                accountant.id,
                NotificationKind::ConversionFailed,
                format!("Couldn't process a file from {}", client.name),
                format!(
                    "{} of {} file(s) could not be downloaded or converted. The originals are listed on the client's page.",
                    failures,
                    media.len()
                ),
            )
            .await?;
    }

    let changed = ctx.campaigns.mark_client_received(accountant.id, client.id).await?;
    for campaign_id in &changed {
        ctx.campaigns.complete_if_done(*campaign_id).await?;
    }

    let from = crate::chase::sender_number(ctx, accountant);
    if let Err(e) = messaging::send_and_record(
        ctx.whatsapp.as_ref(),
        &ctx.messages,
        Outbound {
            from: &from,
            client,
            campaign_id: campaign.as_ref().map(|c| c.id),
            sender: MessageSender::Assistant,
            kind: MessageKind::Acknowledgement,
            body: templates::acknowledgement(accountant, client, media.len()),
        },
    )
    .await
    {
        tracing::warn!(client_id = %client.id, "Acknowledgement not sent: {}", e);
    }

    let what = campaign
        .as_ref()
        .map(|c| format!(" for {}", c.name))
        .unwrap_or_default();
    ctx.notifications
        .create(
            accountant.id,
            NotificationKind::DocumentReceived,
            format!("{} sent {} file(s)", client.name, media.len()),
            format!("New documents received from {}{}.", client.name, what),
        )
        .await?;

    if accountant.notify_email_on_receipt {
        if let Err(e) = ctx
            .mailer
            .send_document_received(&accountant.email, &accountant.practice_name, &client.name, media.len())
            .await
        {
            tracing::warn!(accountant_id = %accountant.id, "Receipt email failed: {}", e);
        }
    }

    tracing::info!(
        client_id = %client.id,
        files = media.len(),
        failures,
        campaigns_updated = changed.len(),
        "Inbound documents processed"
    );

    Ok(media.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::fixtures;
    use chrono::TimeZone;

    #[test]
    fn test_extension_for_common_types() {
        assert_eq!(extension_for("application/pdf"), "pdf");
        assert_eq!(extension_for("IMAGE/JPEG"), "jpg");
        assert_eq!(extension_for("application/octet-stream"), "bin");
    }

    #[test]
    fn test_file_name_is_dated_and_numbered() {
        let a = fixtures::accountant();
        let client = fixtures::client(a.id);
        let at = Utc.with_ymd_and_hms(2024, 4, 3, 12, 0, 0).unwrap();

        assert_eq!(file_name_for(&client, 0, "application/pdf", at), "2024-04-03_priya-patel_1.pdf");
        assert_eq!(file_name_for(&client, 2, "image/png", at), "2024-04-03_priya-patel_3.png");
    }
}
