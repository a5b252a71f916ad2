/// Twilio WhatsApp inbound webhook
///
/// Twilio expects a quick answer, so only routing and recording happen inline.
/// Media filing and assistant replies run on a spawned task.
use crate::{
    chase::inbound::{self, InboundMessage},
    context::AppContext,
    documents::pipeline::MediaItem,
    error::{ChaseError, ChaseResult},
};
use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::post,
    Form, Router,
};
use serde::Deserialize;
use std::collections::HashMap;

/// Empty TwiML: acknowledge without an immediate reply
const EMPTY_TWIML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#;

/// Upper bound on attachments Twilio sends with one message
const MAX_MEDIA: usize = 10;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/webhooks/whatsapp", post(whatsapp_inbound))
}

#[derive(Debug, Deserialize)]
struct WebhookQuery {
    token: Option<String>,
}

fn field(form: &HashMap<String, String>, key: &str) -> String {
    form.get(key).cloned().unwrap_or_default()
}

/// Turn Twilio's form fields into an inbound message
pub fn parse_inbound(form: &HashMap<String, String>) -> ChaseResult<InboundMessage> {
    let from = field(form, "From");
    let to = field(form, "To");
    let message_sid = field(form, "MessageSid");
    if from.is_empty() || to.is_empty() || message_sid.is_empty() {
        return Err(ChaseError::Validation("From, To and MessageSid are required".to_string()));
    }

    let num_media: usize = form
        .get("NumMedia")
        .and_then(|n| n.trim().parse().ok())
        .unwrap_or(0);

    let media = (0..num_media.min(MAX_MEDIA))
        .filter_map(|i| {
            let url = form.get(&format!("MediaUrl{}", i))?;
            let content_type = form
                .get(&format!("MediaContentType{}", i))
                .cloned()
                .unwrap_or_else(|| "application/octet-stream".to_string());
            Some(MediaItem {
                url: url.clone(),
                content_type,
            })
        })
        .collect();

    Ok(InboundMessage {
        from: from.trim_start_matches("whatsapp:").to_string(),
        to: to.trim_start_matches("whatsapp:").to_string(),
        body: field(form, "Body"),
        message_sid,
        media,
    })
}

/// Constant-time comparison of the shared webhook token
fn token_matches(expected: &str, given: Option<&str>) -> bool {
    let Some(given) = given else {
        return false;
    };
    if expected.is_empty() || expected.len() != given.len() {
        return false;
    }
    expected
        .bytes()
        .zip(given.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

async fn whatsapp_inbound(
    State(ctx): State<AppContext>,
    Query(query): Query<WebhookQuery>,
    Form(form): Form<HashMap<String, String>>,
) -> ChaseResult<impl IntoResponse> {
    if !token_matches(&ctx.config.twilio.webhook_token, query.token.as_deref()) {
        tracing::warn!("Rejected WhatsApp webhook with bad token");
        return Err(ChaseError::Authorization("Invalid webhook token".to_string()));
    }

    let inbound = parse_inbound(&form)?;

    if let Some(routed) = inbound::route_and_record(&ctx, &inbound).await? {
        tokio::spawn(async move {
            if let Err(e) = inbound::process(&ctx, &routed, &inbound).await {
                tracing::error!(
                    client_id = %routed.client.id,
                    sid = %inbound.message_sid,
                    "Inbound processing failed: {}",
                    e
                );
            }
        });
    }

    Ok(([(header::CONTENT_TYPE, "text/xml")], EMPTY_TWIML))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_text_message() {
        let msg = parse_inbound(&form(&[
            ("From", "whatsapp:+447700900123"),
            ("To", "whatsapp:+15550000000"),
            ("Body", "When do you need them by?"),
            ("MessageSid", "SM123"),
            ("NumMedia", "0"),
        ]))
        .unwrap();

        assert_eq!(msg.from, "+447700900123");
        assert_eq!(msg.to, "+15550000000");
        assert_eq!(msg.body, "When do you need them by?");
        assert!(msg.media.is_empty());
    }

    #[test]
    fn test_parse_media_items() {
        let msg = parse_inbound(&form(&[
            ("From", "whatsapp:+447700900123"),
            ("To", "whatsapp:+15550000000"),
            ("MessageSid", "MM456"),
            ("NumMedia", "2"),
            ("MediaUrl0", "https://api.twilio.com/media/0"),
            ("MediaContentType0", "application/pdf"),
            ("MediaUrl1", "https://api.twilio.com/media/1"),
        ]))
        .unwrap();

        assert_eq!(msg.body, "");
        assert_eq!(msg.media.len(), 2);
        assert_eq!(msg.media[0].content_type, "application/pdf");
        assert_eq!(msg.media[1].content_type, "application/octet-stream");
    }

    #[test]
    fn test_parse_requires_addresses() {
        assert!(parse_inbound(&form(&[("Body", "hi"), ("MessageSid", "SM1")])).is_err());
    }

    #[test]
    fn test_token_matches() {
        assert!(token_matches("hook-secret", Some("hook-secret")));
        assert!(!token_matches("hook-secret", Some("hook-secreT")));
        assert!(!token_matches("hook-secret", None));
        assert!(!token_matches("", Some("")));
    }
}
