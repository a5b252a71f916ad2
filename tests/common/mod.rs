//! In-process vendor fakes shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use docchase::{
    assistant::ReplyGenerator,
    config::ServerConfig,
    context::{AppContext, Vendors},
    conversion::DocumentConverter,
    drive::{DriveTokens, FileStore},
    error::{ChaseError, ChaseResult},
    messaging::WhatsAppSender,
};
use sqlx::PgPool;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

/// WhatsApp transport that counts sends and can be switched to fail
#[derive(Default)]
pub struct FakeWhatsApp {
    failing: AtomicBool,
    sent: AtomicUsize,
}

impl FakeWhatsApp {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WhatsAppSender for FakeWhatsApp {
    async fn send(&self, _from: &str, _to: &str, _body: &str) -> ChaseResult<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChaseError::vendor("Twilio", "HTTP 503"));
        }
        let n = self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(format!("SM_fake_{}", n))
    }

    async fn fetch_media(&self, _url: &str) -> ChaseResult<Vec<u8>> {
        Ok(b"%PDF-1.4".to_vec())
    }
}

pub struct FakeAssistant;

#[async_trait]
impl ReplyGenerator for FakeAssistant {
    async fn generate(&self, _system: &str, _conversation: &str) -> ChaseResult<Option<String>> {
        Ok(Some("Thanks!".to_string()))
    }
}

pub struct FakeDrive;

#[async_trait]
impl FileStore for FakeDrive {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://accounts.example.com/auth?state={}", state)
    }

    async fn exchange_code(&self, _code: &str) -> ChaseResult<DriveTokens> {
        Ok(DriveTokens {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> ChaseResult<DriveTokens> {
        self.exchange_code(refresh_token).await
    }

    async fn ensure_folder(&self, _token: &str, name: &str, _parent: Option<&str>) -> ChaseResult<String> {
        Ok(format!("folder-{}", name))
    }

    async fn upload(
        &self,
        _token: &str,
        _folder_id: &str,
        name: &str,
        _mime_type: &str,
        _bytes: Vec<u8>,
    ) -> ChaseResult<String> {
        Ok(format!("file-{}", name))
    }
}

pub struct FakeConverter;

#[async_trait]
impl DocumentConverter for FakeConverter {
    async fn convert_to_csv(&self, _file_name: &str, _bytes: Vec<u8>) -> ChaseResult<Vec<u8>> {
        Ok(b"date,amount\n".to_vec())
    }
}

/// Context over `pool` with fake vendors; the WhatsApp fake is returned for inspection
pub fn context_with(config: ServerConfig, pool: PgPool) -> (AppContext, Arc<FakeWhatsApp>) {
    let whatsapp = Arc::new(FakeWhatsApp::default());
    let vendors = Vendors {
        whatsapp: whatsapp.clone(),
        assistant: Arc::new(FakeAssistant),
        drive: Arc::new(FakeDrive),
        converter: Arc::new(FakeConverter),
    };
    let ctx = AppContext::with_vendors(config, pool, vendors).unwrap();
    (ctx, whatsapp)
}
