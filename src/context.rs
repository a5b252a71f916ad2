/// Application context and dependency injection
use crate::{
    account::AccountantManager,
    assistant::{ClaudeClient, DynReplyGenerator},
    billing::BillingManager,
    blog::BlogManager,
    campaigns::CampaignManager,
    clients::ClientManager,
    config::ServerConfig,
    conversion::{BankToFileClient, DynDocumentConverter},
    db,
    documents::DocumentManager,
    drive::{DriveClient, DynFileStore},
    error::ChaseResult,
    mailer::Mailer,
    messaging::{DynWhatsAppSender, MessageStore, TwilioClient},
    notifications::NotificationManager,
    rate_limit::RateLimiter,
};
use sqlx::PgPool;
use std::sync::Arc;

/// Third-party services behind trait objects
#[derive(Clone)]
pub struct Vendors {
    pub whatsapp: DynWhatsAppSender,
    pub assistant: DynReplyGenerator,
    pub drive: DynFileStore,
    pub converter: DynDocumentConverter,
}

impl Vendors {
    /// Production clients built from configuration
    pub fn from_config(config: &ServerConfig) -> ChaseResult<Self> {
        Ok(Self {
            whatsapp: Arc::new(TwilioClient::new(config.twilio.clone())?),
            assistant: Arc::new(ClaudeClient::new(config.anthropic.clone())?),
            drive: Arc::new(DriveClient::new(config.google_drive.clone())?),
            converter: Arc::new(BankToFileClient::new(config.banktofile.clone())?),
        })
    }
}

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: PgPool,
    pub accounts: Arc<AccountantManager>,
    pub clients: Arc<ClientManager>,
    pub campaigns: Arc<CampaignManager>,
    pub messages: Arc<MessageStore>,
    pub documents: Arc<DocumentManager>,
    pub notifications: Arc<NotificationManager>,
    pub billing: Arc<BillingManager>,
    pub blog: Arc<BlogManager>,
    // Vendors
    pub whatsapp: DynWhatsAppSender,
    pub assistant: DynReplyGenerator,
    pub drive: DynFileStore,
    pub converter: DynDocumentConverter,
    // Rate limiter
    pub rate_limiter: Arc<RateLimiter>,
    // Email mailer
    pub mailer: Arc<Mailer>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ChaseResult<Self> {
        config.validate()?;

        let db = db::create_pool(&config.database).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let vendors = Vendors::from_config(&config)?;

        if config.anthropic.api_key.is_empty() {
            tracing::warn!("ANTHROPIC_API_KEY not set; assistant replies will use the fallback message");
        }
        if config.banktofile.api_key.is_empty() {
            tracing::warn!("BANKTOFILE_API_KEY not set; bank statements will not be converted");
        }

        Self::with_vendors(config, db, vendors)
    }

    /// Assemble the context around an existing pool and vendor set
    pub fn with_vendors(config: ServerConfig, db: PgPool, vendors: Vendors) -> ChaseResult<Self> {
        let config = Arc::new(config);

        let messages = MessageStore::new(db.clone());
        let notifications = NotificationManager::new(db.clone());
        let billing = BillingManager::new(messages.clone(), notifications.clone());

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let mailer = Arc::new(Mailer::new(config.email.clone())?);

        Ok(Self {
            accounts: Arc::new(AccountantManager::new(db.clone(), config.clone())),
            clients: Arc::new(ClientManager::new(db.clone())),
            campaigns: Arc::new(CampaignManager::new(
                db.clone(),
                config.reminders.default_send_time,
            )),
            messages: Arc::new(messages),
            documents: Arc::new(DocumentManager::new(db.clone())),
            notifications: Arc::new(notifications),
            billing: Arc::new(billing),
            blog: Arc::new(BlogManager::new(db.clone())),
            whatsapp: vendors.whatsapp,
            assistant: vendors.assistant,
            drive: vendors.drive,
            converter: vendors.converter,
            rate_limiter,
            mailer,
            config,
            db,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> &str {
        &self.config.service.public_url
    }
}
