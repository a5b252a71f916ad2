/// Database records and their TEXT-backed enums
use crate::error::{ChaseError, ChaseResult};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, Row};
use uuid::Uuid;

/// Declares an enum stored as lowercase TEXT
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ChaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ChaseError::Validation(format!(
                        "Invalid {}: {}",
                        stringify!($name),
                        s
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// Voice the assistant uses with clients
    AssistantTone {
        Friendly => "friendly",
        Professional => "professional",
        Concise => "concise",
    }
);

text_enum!(
    /// Subscription tier, which caps monthly chases
    PlanTier {
        Trial => "trial",
        Starter => "starter",
        Growth => "growth",
        Practice => "practice",
    }
);

text_enum!(
    ClientStatus {
        Active => "active",
        Inactive => "inactive",
    }
);

text_enum!(
    /// Kind of document a campaign requests
    DocumentType {
        BankStatements => "bank_statements",
        Receipts => "receipts",
        Invoices => "invoices",
        Payslips => "payslips",
        Other => "other",
    }
);

text_enum!(
    CampaignStatus {
        Draft => "draft",
        Active => "active",
        Completed => "completed",
        Paused => "paused",
    }
);

text_enum!(
    /// Progress of one client within one campaign
    CampaignClientStatus {
        Pending => "pending",
        Received => "received",
        Stuck => "stuck",
    }
);

text_enum!(
    MessageDirection {
        Inbound => "inbound",
        Outbound => "outbound",
    }
);

text_enum!(
    MessageSender {
        Client => "client",
        Assistant => "assistant",
        Accountant => "accountant",
        System => "system",
    }
);

text_enum!(
    /// What an outbound message was sent for
    MessageKind {
        Request => "request",
        Reminder1 => "reminder_1",
        Reminder2 => "reminder_2",
        Acknowledgement => "acknowledgement",
        Reply => "reply",
        Manual => "manual",
        Inbound => "inbound",
    }
);

text_enum!(
    ConversionStatus {
        Pending => "pending",
        Success => "success",
        Failed => "failed",
        Skipped => "skipped",
    }
);

text_enum!(
    NotificationKind {
        DocumentReceived => "document_received",
        ClientStuck => "client_stuck",
        ConversionFailed => "conversion_failed",
        ChaseLimitReached => "chase_limit_reached",
        InboundMessage => "inbound_message",
    }
);

impl MessageKind {
    /// Whether this outbound kind counts against the plan's chase allowance
    pub fn is_chase(&self) -> bool {
        matches!(
            self,
            MessageKind::Request | MessageKind::Reminder1 | MessageKind::Reminder2
        )
    }
}

impl DocumentType {
    /// Wording used in messages to clients
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::BankStatements => "bank statements",
            DocumentType::Receipts => "receipts",
            DocumentType::Invoices => "invoices",
            DocumentType::Payslips => "payslips",
            DocumentType::Other => "documents",
        }
    }
}

impl CampaignStatus {
    /// Whether a campaign may move from `self` to `next`
    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, next),
            (Draft, Active) | (Active, Paused) | (Paused, Active) | (Active, Completed) | (Paused, Completed)
        )
    }
}

fn parse_col<T: std::str::FromStr<Err = ChaseError>>(row: &PgRow, col: &str) -> ChaseResult<T> {
    let raw: String = row.try_get(col)?;
    raw.parse()
}

/// Accountant (tenant) record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Accountant {
    pub id: Uuid,
    pub email: String,
    pub practice_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub google_drive_access_token: Option<String>,
    #[serde(skip_serializing)]
    pub google_drive_refresh_token: Option<String>,
    #[serde(skip_serializing)]
    pub google_drive_token_expires_at: Option<DateTime<Utc>>,
    pub google_drive_folder_id: Option<String>,
    pub twilio_number: Option<String>,
    pub assistant_name: String,
    pub assistant_tone: AssistantTone,
    pub auto_reply_enabled: bool,
    pub notify_email_on_receipt: bool,
    pub notify_email_on_stuck: bool,
    pub plan: PlanTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const ACCOUNTANT_COLUMNS: &str = "id, email, practice_name, password_hash, \
    google_drive_access_token, google_drive_refresh_token, google_drive_token_expires_at, \
    google_drive_folder_id, twilio_number, assistant_name, assistant_tone, auto_reply_enabled, \
    notify_email_on_receipt, notify_email_on_stuck, plan, created_at, updated_at";

impl Accountant {
    pub fn from_row(row: &PgRow) -> ChaseResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            practice_name: row.try_get("practice_name")?,
            password_hash: row.try_get("password_hash")?,
            google_drive_access_token: row.try_get("google_drive_access_token")?,
            google_drive_refresh_token: row.try_get("google_drive_refresh_token")?,
            google_drive_token_expires_at: row.try_get("google_drive_token_expires_at")?,
            google_drive_folder_id: row.try_get("google_drive_folder_id")?,
            twilio_number: row.try_get("twilio_number")?,
            assistant_name: row.try_get("assistant_name")?,
            assistant_tone: parse_col(row, "assistant_tone")?,
            auto_reply_enabled: row.try_get("auto_reply_enabled")?,
            notify_email_on_receipt: row.try_get("notify_email_on_receipt")?,
            notify_email_on_stuck: row.try_get("notify_email_on_stuck")?,
            plan: parse_col(row, "plan")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    pub fn drive_connected(&self) -> bool {
        self.google_drive_refresh_token.is_some()
    }
}

/// A contact belonging to one accountant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub accountant_id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub status: ClientStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const CLIENT_COLUMNS: &str =
    "id, accountant_id, name, phone, email, status, created_at, updated_at";

impl Client {
    pub fn from_row(row: &PgRow) -> ChaseResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            accountant_id: row.try_get("accountant_id")?,
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            email: row.try_get("email")?,
            status: parse_col(row, "status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// First name used when addressing the client in messages
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

/// A document-request batch for a period and document type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub accountant_id: Uuid,
    pub name: String,
    pub period: String,
    pub document_type: DocumentType,
    pub status: CampaignStatus,
    pub reminder_1_enabled: bool,
    pub reminder_1_days: i32,
    pub reminder_2_enabled: bool,
    pub reminder_2_days: i32,
    pub flag_after_enabled: bool,
    pub reminder_3_days: i32,
    pub reminder_send_time: NaiveTime,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const CAMPAIGN_COLUMNS: &str = "id, accountant_id, name, period, document_type, status, \
    reminder_1_enabled, reminder_1_days, reminder_2_enabled, reminder_2_days, \
    flag_after_enabled, reminder_3_days, reminder_send_time, started_at, completed_at, \
    created_at, updated_at";

impl Campaign {
    pub fn from_row(row: &PgRow) -> ChaseResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            accountant_id: row.try_get("accountant_id")?,
            name: row.try_get("name")?,
            period: row.try_get("period")?,
            document_type: parse_col(row, "document_type")?,
            status: parse_col(row, "status")?,
            reminder_1_enabled: row.try_get("reminder_1_enabled")?,
            reminder_1_days: row.try_get("reminder_1_days")?,
            reminder_2_enabled: row.try_get("reminder_2_enabled")?,
            reminder_2_days: row.try_get("reminder_2_days")?,
            flag_after_enabled: row.try_get("flag_after_enabled")?,
            reminder_3_days: row.try_get("reminder_3_days")?,
            reminder_send_time: row.try_get("reminder_send_time")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// One client's progress within one campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignClient {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub client_id: Uuid,
    pub status: CampaignClientStatus,
    pub request_sent_at: Option<DateTime<Utc>>,
    pub reminder_1_sent_at: Option<DateTime<Utc>>,
    pub reminder_2_sent_at: Option<DateTime<Utc>>,
    pub flagged_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub const CAMPAIGN_CLIENT_COLUMNS: &str = "id, campaign_id, client_id, status, request_sent_at, \
    reminder_1_sent_at, reminder_2_sent_at, flagged_at, received_at, created_at";

impl CampaignClient {
    pub fn from_row(row: &PgRow) -> ChaseResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            campaign_id: row.try_get("campaign_id")?,
            client_id: row.try_get("client_id")?,
            status: parse_col(row, "status")?,
            request_sent_at: row.try_get("request_sent_at")?,
            reminder_1_sent_at: row.try_get("reminder_1_sent_at")?,
            reminder_2_sent_at: row.try_get("reminder_2_sent_at")?,
            flagged_at: row.try_get("flagged_at")?,
            received_at: row.try_get("received_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// A single inbound or outbound WhatsApp message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub accountant_id: Uuid,
    pub client_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub direction: MessageDirection,
    pub sender: MessageSender,
    pub kind: MessageKind,
    pub body: String,
    pub media_url: Option<String>,
    pub twilio_sid: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub const MESSAGE_COLUMNS: &str = "id, accountant_id, client_id, campaign_id, direction, sender, \
    kind, body, media_url, twilio_sid, created_at";

impl Message {
    pub fn from_row(row: &PgRow) -> ChaseResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            accountant_id: row.try_get("accountant_id")?,
            client_id: row.try_get("client_id")?,
            campaign_id: row.try_get("campaign_id")?,
            direction: parse_col(row, "direction")?,
            sender: parse_col(row, "sender")?,
            kind: parse_col(row, "kind")?,
            body: row.try_get("body")?,
            media_url: row.try_get("media_url")?,
            twilio_sid: row.try_get("twilio_sid")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// A file received from a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub accountant_id: Uuid,
    pub client_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub file_name: String,
    pub mime_type: String,
    pub original_url: String,
    pub drive_file_id: Option<String>,
    pub drive_csv_file_id: Option<String>,
    pub conversion_status: ConversionStatus,
    pub conversion_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DOCUMENT_COLUMNS: &str = "id, accountant_id, client_id, campaign_id, file_name, \
    mime_type, original_url, drive_file_id, drive_csv_file_id, conversion_status, \
    conversion_error, created_at, updated_at";

impl Document {
    pub fn from_row(row: &PgRow) -> ChaseResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            accountant_id: row.try_get("accountant_id")?,
            client_id: row.try_get("client_id")?,
            campaign_id: row.try_get("campaign_id")?,
            file_name: row.try_get("file_name")?,
            mime_type: row.try_get("mime_type")?,
            original_url: row.try_get("original_url")?,
            drive_file_id: row.try_get("drive_file_id")?,
            drive_csv_file_id: row.try_get("drive_csv_file_id")?,
            conversion_status: parse_col(row, "conversion_status")?,
            conversion_error: row.try_get("conversion_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Dashboard notification for an accountant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub accountant_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub const NOTIFICATION_COLUMNS: &str = "id, accountant_id, kind, title, body, read_at, created_at";

impl Notification {
    pub fn from_row(row: &PgRow) -> ChaseResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            accountant_id: row.try_get("accountant_id")?,
            kind: parse_col(row, "kind")?,
            title: row.try_get("title")?,
            body: row.try_get("body")?,
            read_at: row.try_get("read_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Marketing blog post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub body: String,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const BLOG_POST_COLUMNS: &str = "id, slug, title, excerpt, body, published, published_at, \
    author_id, created_at, updated_at";

impl BlogPost {
    pub fn from_row(row: &PgRow) -> ChaseResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            slug: row.try_get("slug")?,
            title: row.try_get("title")?,
            excerpt: row.try_get("excerpt")?,
            body: row.try_get("body")?,
            published: row.try_get("published")?,
            published_at: row.try_get("published_at")?,
            author_id: row.try_get("author_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_text_round_trip() {
        assert_eq!("bank_statements".parse::<DocumentType>().unwrap(), DocumentType::BankStatements);
        assert_eq!(MessageKind::Reminder2.as_str(), "reminder_2");
        assert!("archived".parse::<CampaignStatus>().is_err());
    }

    #[test]
    fn test_enum_serde_matches_column_text() {
        let json = serde_json::to_string(&NotificationKind::ChaseLimitReached).unwrap();
        assert_eq!(json, "\"chase_limit_reached\"");
    }

    #[test]
    fn test_campaign_transitions() {
        use CampaignStatus::*;
        assert!(Draft.can_transition_to(Active));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(Paused.can_transition_to(Completed));
        assert!(!Draft.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Active.can_transition_to(Draft));
    }

    #[test]
    fn test_chase_kinds() {
        assert!(MessageKind::Request.is_chase());
        assert!(MessageKind::Reminder1.is_chase());
        assert!(!MessageKind::Reply.is_chase());
        assert!(!MessageKind::Acknowledgement.is_chase());
    }
}

/// Ready-made records for unit tests
#[cfg(test)]
pub mod fixtures {
    use super::*;

    pub fn accountant() -> Accountant {
        Accountant {
            id: Uuid::new_v4(),
            email: "jane@smithco.example".into(),
            practice_name: "Smith & Co".into(),
            password_hash: String::new(),
            google_drive_access_token: None,
            google_drive_refresh_token: None,
            google_drive_token_expires_at: None,
            google_drive_folder_id: None,
            twilio_number: None,
            assistant_name: "Amy".into(),
            assistant_tone: AssistantTone::Friendly,
            auto_reply_enabled: true,
            notify_email_on_receipt: false,
            notify_email_on_stuck: true,
            plan: PlanTier::Trial,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn client(accountant_id: Uuid) -> Client {
        Client {
            id: Uuid::new_v4(),
            accountant_id,
            name: "Priya Patel".into(),
            phone: "+447700900123".into(),
            email: None,
            status: ClientStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn campaign(accountant_id: Uuid) -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            accountant_id,
            name: "Q2".into(),
            period: "April to June".into(),
            document_type: DocumentType::BankStatements,
            status: CampaignStatus::Active,
            reminder_1_enabled: true,
            reminder_1_days: 3,
            reminder_2_enabled: true,
            reminder_2_days: 6,
            flag_after_enabled: true,
            reminder_3_days: 9,
            reminder_send_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            started_at: Some(Utc::now()),
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
