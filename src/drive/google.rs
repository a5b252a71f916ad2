/// Google Drive REST client
use super::{DriveTokens, FileStore};
use crate::{
    config::GoogleDriveConfig,
    error::{ChaseError, ChaseResult},
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::time::Duration;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileRef>,
}

/// Escape a value for a Drive `q` string literal
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn folder_query(name: &str, parent: Option<&str>) -> String {
    let mut q = format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        escape_query(name),
        FOLDER_MIME
    );
    if let Some(parent) = parent {
        q.push_str(&format!(" and '{}' in parents", escape_query(parent)));
    }
    q
}

async fn check(response: reqwest::Response, what: &str) -> ChaseResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChaseError::vendor(
        "Google Drive",
        format!("{} failed: HTTP {} {}", what, status, body.chars().take(200).collect::<String>()),
    ))
}

/// Drive client using the accountant's OAuth access token
pub struct DriveClient {
    http: reqwest::Client,
    config: GoogleDriveConfig,
}

impl DriveClient {
    pub fn new(config: GoogleDriveConfig) -> ChaseResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self { http, config })
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> ChaseResult<DriveTokens> {
        let response = self.http.post(TOKEN_URL).form(form).send().await?;
        let token: TokenResponse = check(response, "token request").await?.json().await?;

        Ok(DriveTokens {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + ChronoDuration::seconds(token.expires_in),
        })
    }

    /// `files.list` request for a folder by name, optionally under a parent
    fn folder_lookup(&self, access_token: &str, name: &str, parent: Option<&str>) -> ChaseResult<reqwest::Request> {
        let q = folder_query(name, parent);
        let request = self
            .http
            .get(FILES_URL)
            .query(&[("q", q.as_str()), ("fields", "files(id)"), ("pageSize", "1")])
            .bearer_auth(access_token)
            .build()?;
        Ok(request)
    }
}

#[async_trait]
impl FileStore for DriveClient {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            AUTH_URL,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(DRIVE_SCOPE),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str) -> ChaseResult<DriveTokens> {
        self.token_request(&[
            ("code", code),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
            ("redirect_uri", &self.config.redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> ChaseResult<DriveTokens> {
        self.token_request(&[
            ("refresh_token", refresh_token),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn ensure_folder(&self, access_token: &str, name: &str, parent: Option<&str>) -> ChaseResult<String> {
        let request = self.folder_lookup(access_token, name, parent)?;
        let response = self.http.execute(request).await?;
        let list: FileList = check(response, "folder lookup").await?.json().await?;

        if let Some(existing) = list.files.into_iter().next() {
            return Ok(existing.id);
        }

        let mut metadata = serde_json::json!({ "name": name, "mimeType": FOLDER_MIME });
        if let Some(parent) = parent {
            metadata["parents"] = serde_json::json!([parent]);
        }

        let response = self
            .http
            .post(FILES_URL)
            .bearer_auth(access_token)
            .json(&metadata)
            .send()
            .await?;
        let created: FileRef = check(response, "folder create").await?.json().await?;

        tracing::info!(folder_id = %created.id, "Created Drive folder {}", name);
        Ok(created.id)
    }

    async fn upload(
        &self,
        access_token: &str,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> ChaseResult<String> {
        let response = self
            .http
            .post(format!("{}?uploadType=media", UPLOAD_URL))
            .bearer_auth(access_token)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await?;
        let file: FileRef = check(response, "upload").await?.json().await?;

        // Media uploads land in the Drive root with no name; move and rename.
        let response = self
            .http
            .patch(format!("{}/{}", FILES_URL, file.id))
            .query(&[("addParents", folder_id), ("fields", "id")])
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        check(response, "metadata update").await?;

        Ok(file.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn test_authorization_url_requests_offline_file_scope() {
        let client = DriveClient::new(ServerConfig::for_tests().google_drive).unwrap();
        let url = client.authorization_url("abc.def");

        assert!(url.starts_with(AUTH_URL));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fdrive.file"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fapi%2Fdrive%2Fcallback"));
        assert!(url.ends_with("state=abc.def"));
    }

    #[test]
    fn test_folder_lookup_encodes_query_parameters() {
        let client = DriveClient::new(ServerConfig::for_tests().google_drive).unwrap();
        let request = client
            .folder_lookup("token", "Smith & Co", Some("root-id"))
            .unwrap();

        let pairs: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("q".to_string(), folder_query("Smith & Co", Some("root-id"))),
                ("fields".to_string(), "files(id)".to_string()),
                ("pageSize".to_string(), "1".to_string()),
            ]
        );
        assert!(!request.url().as_str().contains("& Co"));
    }

    #[test]
    fn test_folder_query_escapes_quotes() {
        let q = folder_query("O'Brien (+447700900123)", Some("root-id"));
        assert!(q.starts_with("name = 'O\\'Brien (+447700900123)'"));
        assert!(q.ends_with("and 'root-id' in parents"));
    }
}
