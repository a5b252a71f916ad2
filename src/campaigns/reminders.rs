/// Reminder policy
///
/// Decides, for one campaign client at one instant, which follow-up is due.
/// The sweep job applies at most one stage per client per run; each stage's
/// timestamp column is claimed with a conditional UPDATE so it is written once.
use crate::db::models::{Campaign, CampaignClient, CampaignClientStatus, CampaignStatus, MessageKind};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A step in the chase sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStage {
    /// Initial document request (retried by the sweep if launch failed to send it)
    Request,
    Reminder1,
    Reminder2,
    /// Mark the client stuck and tell the accountant
    Flag,
}

impl ReminderStage {
    /// Timestamp column recording this stage
    pub fn column(&self) -> &'static str {
        match self {
            ReminderStage::Request => "request_sent_at",
            ReminderStage::Reminder1 => "reminder_1_sent_at",
            ReminderStage::Reminder2 => "reminder_2_sent_at",
            ReminderStage::Flag => "flagged_at",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStage::Request => "request",
            ReminderStage::Reminder1 => "reminder_1",
            ReminderStage::Reminder2 => "reminder_2",
            ReminderStage::Flag => "flag",
        }
    }

    /// Outbound message kind, for stages that send a message
    pub fn message_kind(&self) -> Option<MessageKind> {
        match self {
            ReminderStage::Request => Some(MessageKind::Request),
            ReminderStage::Reminder1 => Some(MessageKind::Reminder1),
            ReminderStage::Reminder2 => Some(MessageKind::Reminder2),
            ReminderStage::Flag => None,
        }
    }
}

/// Reminder configuration carried by a campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSettings {
    pub reminder_1_enabled: bool,
    pub reminder_1_days: i32,
    pub reminder_2_enabled: bool,
    pub reminder_2_days: i32,
    /// "Flag after day 9"
    pub flag_after_enabled: bool,
    pub reminder_3_days: i32,
    pub reminder_send_time: NaiveTime,
}

/// Longest allowed chase window in days
pub const MAX_REMINDER_DAYS: i32 = 60;

impl ReminderSettings {
    /// Day-3 / day-6 / flag-after-day-9 policy at the given send time
    pub fn standard(send_time: NaiveTime) -> Self {
        Self {
            reminder_1_enabled: true,
            reminder_1_days: 3,
            reminder_2_enabled: true,
            reminder_2_days: 6,
            flag_after_enabled: true,
            reminder_3_days: 9,
            reminder_send_time: send_time,
        }
    }

    pub fn from_campaign(c: &Campaign) -> Self {
        Self {
            reminder_1_enabled: c.reminder_1_enabled,
            reminder_1_days: c.reminder_1_days,
            reminder_2_enabled: c.reminder_2_enabled,
            reminder_2_days: c.reminder_2_days,
            flag_after_enabled: c.flag_after_enabled,
            reminder_3_days: c.reminder_3_days,
            reminder_send_time: c.reminder_send_time,
        }
    }

    /// Days must be strictly increasing: reminder 1 < reminder 2 < flag
    pub fn validate(&self) -> Result<(), String> {
        if self.reminder_1_days < 1 {
            return Err("Reminder 1 must be at least one day after the request".to_string());
        }
        if self.reminder_2_days <= self.reminder_1_days {
            return Err("Reminder 2 must come after reminder 1".to_string());
        }
        if self.reminder_3_days <= self.reminder_2_days {
            return Err("Stuck threshold must come after reminder 2".to_string());
        }
        if self.reminder_3_days > MAX_REMINDER_DAYS {
            return Err(format!("Reminders cannot extend beyond {} days", MAX_REMINDER_DAYS));
        }
        Ok(())
    }
}

/// Whole calendar days (UTC) between campaign start and now
pub fn days_elapsed(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now.date_naive() - started_at.date_naive()).num_days()
}

/// Decide the next stage due for a campaign client, if any
pub fn next_action(
    campaign: &Campaign,
    cc: &CampaignClient,
    now: DateTime<Utc>,
) -> Option<ReminderStage> {
    if campaign.status != CampaignStatus::Active || cc.status != CampaignClientStatus::Pending {
        return None;
    }
    let started_at = campaign.started_at?;

    if cc.request_sent_at.is_none() {
        return Some(ReminderStage::Request);
    }

    let days = days_elapsed(started_at, now);
    let send_time = campaign.reminder_send_time;
    // Due once the threshold day's send time has passed; a missed day is caught up later
    let is_due = |threshold: i32| {
        let threshold = i64::from(threshold);
        days > threshold || (days == threshold && now.time() >= send_time)
    };

    let r1_outstanding = campaign.reminder_1_enabled && cc.reminder_1_sent_at.is_none();
    let r2_outstanding = campaign.reminder_2_enabled && cc.reminder_2_sent_at.is_none();

    if r1_outstanding && is_due(campaign.reminder_1_days) {
        return Some(ReminderStage::Reminder1);
    }

    if r2_outstanding && !r1_outstanding && is_due(campaign.reminder_2_days) {
        return Some(ReminderStage::Reminder2);
    }

    if campaign.flag_after_enabled
        && cc.flagged_at.is_none()
        && !r1_outstanding
        && !r2_outstanding
        && is_due(campaign.reminder_3_days)
    {
        return Some(ReminderStage::Flag);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::DocumentType;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, day, hour, 0, 0).unwrap()
    }

    fn campaign(started_at: DateTime<Utc>) -> Campaign {
        let settings = ReminderSettings::standard(NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        Campaign {
            id: Uuid::new_v4(),
            accountant_id: Uuid::new_v4(),
            name: "Q1 statements".into(),
            period: "2024-Q1".into(),
            document_type: DocumentType::BankStatements,
            status: CampaignStatus::Active,
            reminder_1_enabled: settings.reminder_1_enabled,
            reminder_1_days: settings.reminder_1_days,
            reminder_2_enabled: settings.reminder_2_enabled,
            reminder_2_days: settings.reminder_2_days,
            flag_after_enabled: settings.flag_after_enabled,
            reminder_3_days: settings.reminder_3_days,
            reminder_send_time: settings.reminder_send_time,
            started_at: Some(started_at),
            completed_at: None,
            created_at: started_at,
            updated_at: started_at,
        }
    }

    fn pending(campaign: &Campaign) -> CampaignClient {
        CampaignClient {
            id: Uuid::new_v4(),
            campaign_id: campaign.id,
            client_id: Uuid::new_v4(),
            status: CampaignClientStatus::Pending,
            request_sent_at: campaign.started_at,
            reminder_1_sent_at: None,
            reminder_2_sent_at: None,
            flagged_at: None,
            received_at: None,
            created_at: campaign.created_at,
        }
    }

    #[test]
    fn test_nothing_due_before_day_three() {
        let c = campaign(at(1, 15));
        let cc = pending(&c);
        assert_eq!(next_action(&c, &cc, at(2, 12)), None);
        assert_eq!(next_action(&c, &cc, at(3, 23)), None);
    }

    #[test]
    fn test_reminder_one_waits_for_send_time() {
        let c = campaign(at(1, 15));
        let cc = pending(&c);
        assert_eq!(next_action(&c, &cc, at(4, 9)), None);
        assert_eq!(next_action(&c, &cc, at(4, 10)), Some(ReminderStage::Reminder1));
    }

    #[test]
    fn test_missed_reminder_is_caught_up_next_day() {
        let c = campaign(at(1, 15));
        let cc = pending(&c);
        assert_eq!(next_action(&c, &cc, at(5, 1)), Some(ReminderStage::Reminder1));
    }

    #[test]
    fn test_full_sequence() {
        let c = campaign(at(1, 8));
        let mut cc = pending(&c);

        assert_eq!(next_action(&c, &cc, at(4, 11)), Some(ReminderStage::Reminder1));
        cc.reminder_1_sent_at = Some(at(4, 11));

        assert_eq!(next_action(&c, &cc, at(6, 11)), None);
        assert_eq!(next_action(&c, &cc, at(7, 11)), Some(ReminderStage::Reminder2));
        cc.reminder_2_sent_at = Some(at(7, 11));

        assert_eq!(next_action(&c, &cc, at(9, 11)), None);
        assert_eq!(next_action(&c, &cc, at(10, 11)), Some(ReminderStage::Flag));
        cc.flagged_at = Some(at(10, 11));
        cc.status = CampaignClientStatus::Stuck;

        assert_eq!(next_action(&c, &cc, at(20, 11)), None);
    }

    #[test]
    fn test_late_sweep_sends_one_stage_at_a_time() {
        let c = campaign(at(1, 8));
        let mut cc = pending(&c);
        let late = at(1, 8) + Duration::days(12);

        assert_eq!(next_action(&c, &cc, late), Some(ReminderStage::Reminder1));
        cc.reminder_1_sent_at = Some(late);
        assert_eq!(next_action(&c, &cc, late), Some(ReminderStage::Reminder2));
        cc.reminder_2_sent_at = Some(late);
        assert_eq!(next_action(&c, &cc, late), Some(ReminderStage::Flag));
    }

    #[test]
    fn test_disabled_reminders_are_skipped() {
        let mut c = campaign(at(1, 8));
        c.reminder_1_enabled = false;
        c.reminder_2_enabled = false;
        let cc = pending(&c);

        assert_eq!(next_action(&c, &cc, at(8, 11)), None);
        assert_eq!(next_action(&c, &cc, at(10, 11)), Some(ReminderStage::Flag));
    }

    #[test]
    fn test_flag_disabled_never_flags() {
        let mut c = campaign(at(1, 8));
        c.flag_after_enabled = false;
        let mut cc = pending(&c);
        cc.reminder_1_sent_at = Some(at(4, 10));
        cc.reminder_2_sent_at = Some(at(7, 10));

        assert_eq!(next_action(&c, &cc, at(30, 11)), None);
    }

    #[test]
    fn test_only_active_campaigns_and_pending_clients() {
        let mut c = campaign(at(1, 8));
        let mut cc = pending(&c);

        c.status = CampaignStatus::Paused;
        assert_eq!(next_action(&c, &cc, at(5, 11)), None);

        c.status = CampaignStatus::Active;
        cc.status = CampaignClientStatus::Received;
        assert_eq!(next_action(&c, &cc, at(5, 11)), None);
    }

    #[test]
    fn test_unsent_request_is_retried_first() {
        let c = campaign(at(1, 8));
        let mut cc = pending(&c);
        cc.request_sent_at = None;
        assert_eq!(next_action(&c, &cc, at(1, 9)), Some(ReminderStage::Request));
        assert_eq!(next_action(&c, &cc, at(9, 11)), Some(ReminderStage::Request));
    }

    #[test]
    fn test_settings_validation() {
        let time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        assert!(ReminderSettings::standard(time).validate().is_ok());

        let mut s = ReminderSettings::standard(time);
        s.reminder_2_days = 3;
        assert!(s.validate().is_err());

        let mut s = ReminderSettings::standard(time);
        s.reminder_1_days = 0;
        assert!(s.validate().is_err());

        let mut s = ReminderSettings::standard(time);
        s.reminder_3_days = 90;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_days_elapsed_uses_calendar_days() {
        assert_eq!(days_elapsed(at(1, 23), at(2, 1)), 1);
        assert_eq!(days_elapsed(at(1, 1), at(1, 23)), 0);
    }
}
