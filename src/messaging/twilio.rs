/// Twilio WhatsApp client
use super::WhatsAppSender;
use crate::{
    config::TwilioConfig,
    error::{ChaseError, ChaseResult},
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    message: Option<String>,
    code: Option<i64>,
}

/// Twilio REST client for the WhatsApp channel
#[derive(Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    config: TwilioConfig,
}

impl TwilioClient {
    pub fn new(config: TwilioConfig) -> ChaseResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { http, config })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl WhatsAppSender for TwilioClient {
    async fn send(&self, from: &str, to: &str, body: &str) -> ChaseResult<String> {
        if self.config.account_sid.is_empty() || self.config.auth_token.is_empty() {
            return Err(ChaseError::vendor("Twilio", "credentials not configured"));
        }

        let response = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("From", from), ("To", to), ("Body", body)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<TwilioErrorBody>()
                .await
                .ok()
                .map(|b| {
                    format!(
                        "{} (code {})",
                        b.message.unwrap_or_default(),
                        b.code.unwrap_or_default()
                    )
                })
                .unwrap_or_default();
            return Err(ChaseError::vendor("Twilio", format!("HTTP {} {}", status, detail)));
        }

        let created: CreatedMessage = response.json().await?;
        Ok(created.sid)
    }

    async fn fetch_media(&self, url: &str) -> ChaseResult<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChaseError::vendor(
                "Twilio",
                format!("media download failed: HTTP {}", response.status()),
            ));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn test_messages_url() {
        let client = TwilioClient::new(ServerConfig::for_tests().twilio).unwrap();
        assert_eq!(
            client.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC_test/Messages.json"
        );
    }

    #[tokio::test]
    async fn test_send_without_credentials_is_vendor_error() {
        let mut config = ServerConfig::for_tests().twilio;
        config.auth_token.clear();
        let client = TwilioClient::new(config).unwrap();

        match client.send("whatsapp:+1", "whatsapp:+2", "hi").await {
            Err(ChaseError::Vendor { service, .. }) => assert_eq!(service, "Twilio"),
            other => panic!("expected vendor error, got {:?}", other),
        }
    }
}
