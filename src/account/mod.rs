/// Accountant account management
///
/// Handles registration, password login, session tokens and the per-practice
/// settings the assistant and notifications read.

mod manager;

pub use manager::{hash_password, verify_password, AccessClaims, AccountantManager};

use crate::db::models::{Accountant, AssistantTone, PlanTier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 200, message = "Practice name is required"))]
    pub practice_name: String,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSessionRequest {
    pub refresh_token: String,
}

/// Tokens issued for a new or refreshed session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedSession {
    #[serde(skip)]
    pub session_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Session response returned by register, login and refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub accountant: Accountant,
    #[serde(flatten)]
    pub session: IssuedSession,
}

/// Validated session from bearer token
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub accountant_id: Uuid,
    pub session_id: Uuid,
}

/// Settings update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    #[validate(length(min = 1, max = 200))]
    pub practice_name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub assistant_name: Option<String>,
    pub assistant_tone: Option<AssistantTone>,
    pub auto_reply_enabled: Option<bool>,
    pub notify_email_on_receipt: Option<bool>,
    pub notify_email_on_stuck: Option<bool>,
    pub twilio_number: Option<String>,
}

/// Settings view returned to the settings screen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub practice_name: String,
    pub assistant_name: String,
    pub assistant_tone: AssistantTone,
    pub auto_reply_enabled: bool,
    pub notify_email_on_receipt: bool,
    pub notify_email_on_stuck: bool,
    pub twilio_number: Option<String>,
    pub google_drive_connected: bool,
    pub plan: PlanTier,
}

impl From<&Accountant> for SettingsResponse {
    fn from(a: &Accountant) -> Self {
        Self {
            practice_name: a.practice_name.clone(),
            assistant_name: a.assistant_name.clone(),
            assistant_tone: a.assistant_tone,
            auto_reply_enabled: a.auto_reply_enabled,
            notify_email_on_receipt: a.notify_email_on_receipt,
            notify_email_on_stuck: a.notify_email_on_stuck,
            twilio_number: a.twilio_number.clone(),
            google_drive_connected: a.drive_connected(),
            plan: a.plan,
        }
    }
}

/// Change password request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_validation() {
        let ok = RegisterRequest {
            email: "jane@practice.co.uk".into(),
            password: "correct horse".into(),
            practice_name: "Smith & Co".into(),
        };
        assert!(ok.validate().is_ok());

        let bad_email = RegisterRequest {
            email: "not-an-email".into(),
            ..ok.clone()
        };
        assert!(bad_email.validate().is_err());

        let short_password = RegisterRequest {
            password: "short".into(),
            ..ok
        };
        assert!(short_password.validate().is_err());
    }

    #[test]
    fn test_settings_request_accepts_partial_json() {
        let req: UpdateSettingsRequest =
            serde_json::from_str(r#"{"assistantTone":"concise","autoReplyEnabled":false}"#).unwrap();
        assert_eq!(req.assistant_tone, Some(AssistantTone::Concise));
        assert_eq!(req.auto_reply_enabled, Some(false));
        assert!(req.practice_name.is_none());
    }
}
