//! Outbound message wording
//!
//! Every chase is signed by the practice's assistant so clients see one
//! consistent sender.

use crate::db::models::{Accountant, AssistantTone, Campaign, Client};

fn greeting(tone: AssistantTone, first_name: &str) -> String {
    match tone {
        AssistantTone::Friendly => format!("Hi {} 👋", first_name),
        AssistantTone::Professional => format!("Dear {},", first_name),
        AssistantTone::Concise => format!("Hi {},", first_name),
    }
}

fn signature(accountant: &Accountant) -> String {
    format!("{}\n{}", accountant.assistant_name, accountant.practice_name)
}

/// First message of a campaign
pub fn initial_request(accountant: &Accountant, client: &Client, campaign: &Campaign) -> String {
    format!(
        "{}\n\nThis is {}, the assistant at {}. Could you please send your {} for {}? \
         You can reply to this chat with photos or PDFs.\n\nThank you,\n{}",
        greeting(accountant.assistant_tone, client.first_name()),
        accountant.assistant_name,
        accountant.practice_name,
        campaign.document_type.label(),
        campaign.period,
        signature(accountant)
    )
}

/// First reminder
pub fn reminder_one(accountant: &Accountant, client: &Client, campaign: &Campaign) -> String {
    format!(
        "{}\n\nJust a quick reminder that we're still waiting for your {} for {}. \
         Reply here with a photo or PDF whenever you're ready.\n\n{}",
        greeting(accountant.assistant_tone, client.first_name()),
        campaign.document_type.label(),
        campaign.period,
        signature(accountant)
    )
}

/// Second reminder
pub fn reminder_two(accountant: &Accountant, client: &Client, campaign: &Campaign) -> String {
    format!(
        "{}\n\nWe still need your {} for {} to keep things on track. \
         If anything is holding you up, just let me know here.\n\n{}",
        greeting(accountant.assistant_tone, client.first_name()),
        campaign.document_type.label(),
        campaign.period,
        signature(accountant)
    )
}

/// Confirmation after documents arrive
pub fn acknowledgement(accountant: &Accountant, client: &Client, files: usize) -> String {
    let what = if files == 1 {
        "your document".to_string()
    } else {
        format!("your {} documents", files)
    };

    format!(
        "{}\n\nThanks, we've received {}. {} will take it from here.\n\n{}",
        greeting(accountant.assistant_tone, client.first_name()),
        what,
        accountant.practice_name,
        accountant.assistant_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::fixtures::{accountant, campaign, client};

    #[test]
    fn test_initial_request_is_signed_and_specific() {
        let a = accountant();
        let text = initial_request(&a, &client(a.id), &campaign(a.id));
        assert!(text.starts_with("Hi Priya"));
        assert!(text.contains("bank statements for April to June"));
        assert!(text.trim_end().ends_with("Amy\nSmith & Co"));
    }

    #[test]
    fn test_professional_tone_greeting() {
        let mut a = accountant();
        a.assistant_tone = AssistantTone::Professional;
        let text = reminder_one(&a, &client(a.id), &campaign(a.id));
        assert!(text.starts_with("Dear Priya,"));
    }

    #[test]
    fn test_second_reminder_mentions_period() {
        let a = accountant();
        assert!(reminder_two(&a, &client(a.id), &campaign(a.id)).contains("for April to June"));
    }

    #[test]
    fn test_acknowledgement_pluralises() {
        let a = accountant();
        let c = client(a.id);
        assert!(acknowledgement(&a, &c, 1).contains("your document."));
        assert!(acknowledgement(&a, &c, 3).contains("your 3 documents"));
    }
}
