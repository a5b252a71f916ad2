/// Google Drive filing
///
/// Originals and converted files are stored under the accountant's root
/// folder, one subfolder per client.

mod google;

pub use google::DriveClient;

use crate::{
    account::AccountantManager,
    db::models::{Accountant, Client},
    error::{ChaseError, ChaseResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Shared file store trait object
pub type DynFileStore = Arc<dyn FileStore>;

/// Access tokens are refreshed when they expire within this many seconds
const REFRESH_MARGIN_SECS: i64 = 60;

/// Lifetime of the OAuth `state` parameter
const OAUTH_STATE_TTL_SECS: i64 = 600;

/// OAuth tokens returned by Google
#[derive(Debug, Clone)]
pub struct DriveTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Cloud file storage with OAuth
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Consent screen URL carrying `state`
    fn authorization_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> ChaseResult<DriveTokens>;

    async fn refresh(&self, refresh_token: &str) -> ChaseResult<DriveTokens>;

    /// Find or create a folder by name, returning its id
    async fn ensure_folder(&self, access_token: &str, name: &str, parent: Option<&str>) -> ChaseResult<String>;

    /// Upload a file into a folder, returning the file id
    async fn upload(
        &self,
        access_token: &str,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> ChaseResult<String>;
}

#[derive(Debug, Serialize, Deserialize)]
struct OAuthState {
    sub: Uuid,
    purpose: String,
    exp: i64,
}

/// Signed `state` value identifying the accountant across the OAuth redirect
pub fn issue_oauth_state(secret: &str, accountant_id: Uuid) -> ChaseResult<String> {
    let claims = OAuthState {
        sub: accountant_id,
        purpose: "drive".to_string(),
        exp: (Utc::now() + Duration::seconds(OAUTH_STATE_TTL_SECS)).timestamp(),
    };

    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| ChaseError::Jwt(e.to_string()))
}

/// Recover the accountant id from a `state` value
pub fn verify_oauth_state(secret: &str, state: &str) -> ChaseResult<Uuid> {
    let data = decode::<OAuthState>(
        state,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| ChaseError::Authentication("Invalid or expired OAuth state".to_string()))?;

    if data.claims.purpose != "drive" {
        return Err(ChaseError::Authentication("Invalid OAuth state".to_string()));
    }

    Ok(data.claims.sub)
}

fn needs_refresh(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(at) => at - now <= Duration::seconds(REFRESH_MARGIN_SECS),
        None => true,
    }
}

/// A usable access token for the accountant, refreshing it if needed
///
/// Returns `None` when Drive is not connected.
pub async fn access_token(
    files: &dyn FileStore,
    accounts: &AccountantManager,
    accountant: &Accountant,
) -> ChaseResult<Option<String>> {
    let Some(current) = accountant.google_drive_access_token.as_deref() else {
        return Ok(None);
    };

    if !needs_refresh(accountant.google_drive_token_expires_at, Utc::now()) {
        return Ok(Some(current.to_string()));
    }

    let Some(refresh_token) = accountant.google_drive_refresh_token.as_deref() else {
        tracing::warn!(accountant_id = %accountant.id, "Drive token expired and no refresh token stored");
        return Ok(None);
    };

    let tokens = files.refresh(refresh_token).await?;
    accounts
        .set_drive_tokens(
            accountant.id,
            &tokens.access_token,
            tokens.refresh_token.as_deref(),
            tokens.expires_at,
        )
        .await?;

    tracing::debug!(accountant_id = %accountant.id, "Refreshed Drive access token");
    Ok(Some(tokens.access_token))
}

/// Folder for one client's files, creating the practice root if needed
pub async fn client_folder(
    files: &dyn FileStore,
    accounts: &AccountantManager,
    accountant: &Accountant,
    token: &str,
    root_name: &str,
    client: &Client,
) -> ChaseResult<String> {
    let root = match accountant.google_drive_folder_id.as_deref() {
        Some(id) => id.to_string(),
        None => {
            let id = files.ensure_folder(token, root_name, None).await?;
            accounts.set_drive_folder(accountant.id, &id).await?;
            id
        }
    };

    files
        .ensure_folder(token, &client_folder_name(client), Some(&root))
        .await
}

fn client_folder_name(client: &Client) -> String {
    format!("{} ({})", client.name, client.phone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::fixtures;

    const SECRET: &str = "test-secret-that-is-definitely-long-enough";

    #[test]
    fn test_oauth_state_round_trip() {
        let id = Uuid::new_v4();
        let state = issue_oauth_state(SECRET, id).unwrap();
        assert_eq!(verify_oauth_state(SECRET, &state).unwrap(), id);
    }

    #[test]
    fn test_oauth_state_rejects_other_secret() {
        let state = issue_oauth_state(SECRET, Uuid::new_v4()).unwrap();
        assert!(verify_oauth_state("another-secret-that-is-long-enough!!", &state).is_err());
        assert!(verify_oauth_state(SECRET, "garbage").is_err());
    }

    #[test]
    fn test_needs_refresh_margin() {
        let now = Utc::now();
        assert!(needs_refresh(None, now));
        assert!(needs_refresh(Some(now + Duration::seconds(30)), now));
        assert!(needs_refresh(Some(now - Duration::seconds(5)), now));
        assert!(!needs_refresh(Some(now + Duration::seconds(3600)), now));
    }

    #[test]
    fn test_client_folder_name() {
        let a = fixtures::accountant();
        assert_eq!(client_folder_name(&fixtures::client(a.id)), "Priya Patel (+447700900123)");
    }
}
