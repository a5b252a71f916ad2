//! Prompt construction for the client-facing assistant

use crate::db::models::{Accountant, AssistantTone, Message, MessageDirection};

/// Maximum number of earlier messages included in a prompt
pub const MAX_HISTORY: usize = 10;

const ALLOWED_TOPICS: &[&str] = &[
    "which documents the practice has asked for",
    "how to send documents (photos or PDFs in this WhatsApp chat)",
    "deadlines and when reminders will be sent",
    "confirming that documents have been received",
];

const DEFERRED_TOPICS: &[&str] = &[
    "tax, financial or legal advice",
    "fees, invoices from the practice or pricing",
    "account details, balances or anything about other clients",
];

fn tone_instruction(tone: AssistantTone) -> &'static str {
    match tone {
        AssistantTone::Friendly => "Be warm and friendly, and keep replies short enough for WhatsApp.",
        AssistantTone::Professional => "Be polite and professional, and keep replies short enough for WhatsApp.",
        AssistantTone::Concise => "Reply in one or two short sentences.",
    }
}

/// System prompt for one practice's assistant
pub fn system_prompt(accountant: &Accountant) -> String {
    let mut prompt = format!(
        "You are {}, the document assistant for {}, an accountancy practice. \
         You talk to the practice's clients over WhatsApp.\n\n",
        accountant.assistant_name, accountant.practice_name
    );

    prompt.push_str("You may help with:\n");
    for topic in ALLOWED_TOPICS {
        prompt.push_str(&format!("- {}\n", topic));
    }

    prompt.push_str(
        "\nYou must not answer questions about the following. Say that the accountant \
         will get back to them instead:\n",
    );
    for topic in DEFERRED_TOPICS {
        prompt.push_str(&format!("- {}\n", topic));
    }

    prompt.push('\n');
    prompt.push_str(tone_instruction(accountant.assistant_tone));
    prompt.push_str(&format!(" Sign off as {}.", accountant.assistant_name));

    prompt
}

/// Transcript of recent history followed by the new inbound message
///
/// `history` is oldest-first; only the last [`MAX_HISTORY`] entries are used.
pub fn conversation(history: &[Message], inbound: &str) -> String {
    let start = history.len().saturating_sub(MAX_HISTORY);
    let mut out = String::from("Recent conversation:\n");

    for msg in &history[start..] {
        let who = match msg.direction {
            MessageDirection::Inbound => "Client",
            MessageDirection::Outbound => "Assistant",
        };
        let body = if msg.body.trim().is_empty() && msg.media_url.is_some() {
            "[sent a file]"
        } else {
            msg.body.trim()
        };
        out.push_str(&format!("{}: {}\n", who, body));
    }

    out.push_str(&format!("\nNew message from the client:\n{}", inbound.trim()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{fixtures, MessageKind, MessageSender};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn accountant() -> Accountant {
        let mut a = fixtures::accountant();
        a.assistant_tone = AssistantTone::Concise;
        a
    }

    fn message(i: usize, direction: MessageDirection) -> Message {
        Message {
            id: Uuid::new_v4(),
            accountant_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            campaign_id: None,
            direction,
            sender: MessageSender::Client,
            kind: MessageKind::Inbound,
            body: format!("message {}", i),
            media_url: None,
            twilio_sid: None,
            created_at: Utc::now() + Duration::seconds(i as i64),
        }
    }

    #[test]
    fn test_system_prompt_names_practice_and_boundaries() {
        let prompt = system_prompt(&accountant());
        assert!(prompt.contains("You are Amy"));
        assert!(prompt.contains("Smith & Co"));
        assert!(prompt.contains("tax, financial or legal advice"));
        assert!(prompt.contains("one or two short sentences"));
    }

    #[test]
    fn test_conversation_keeps_last_ten_oldest_first() {
        let history: Vec<Message> = (0..15).map(|i| message(i, MessageDirection::Inbound)).collect();
        let text = conversation(&history, "did you get it?");

        assert!(!text.contains("message 4\n"));
        assert!(text.contains("message 5\n"));
        assert_eq!(text.matches("Client: message").count(), MAX_HISTORY);

        let first = text.find("message 5").unwrap();
        let last = text.find("message 14").unwrap();
        assert!(first < last);
        assert!(text.ends_with("did you get it?"));
    }

    #[test]
    fn test_conversation_labels_sides_and_files() {
        let mut file = message(1, MessageDirection::Inbound);
        file.body = String::new();
        file.media_url = Some("https://api.twilio.com/media/1".into());
        let history = vec![message(0, MessageDirection::Outbound), file];

        let text = conversation(&history, "hello");
        assert!(text.contains("Assistant: message 0"));
        assert!(text.contains("Client: [sent a file]"));
    }
}
