//! Chasing flow against a real Postgres database
//!
//! Each test gets a fresh migrated database from `#[sqlx::test]`
//! (requires `DATABASE_URL`). Vendors are the in-process fakes.
mod common;

use chrono::NaiveTime;
use docchase::{
    account::RegisterRequest,
    campaigns::{CreateCampaignRequest, ReminderSettings, ReminderStage},
    chase::{
        self,
        inbound::{self, InboundMessage},
        sweep::{run_reminder_sweep, SweepReport},
    },
    clients::CreateClientRequest,
    config::ServerConfig,
    context::AppContext,
    db::models::{
        Accountant, Campaign, CampaignClient, CampaignClientStatus, CampaignStatus, Client,
        DocumentType, NotificationKind,
    },
    documents::pipeline::{ingest_media, MediaItem},
    error::ChaseError,
    notifications::NotificationQuery,
};
use sqlx::PgPool;
use uuid::Uuid;

struct Fixture {
    ctx: AppContext,
    whatsapp: std::sync::Arc<common::FakeWhatsApp>,
    accountant: Accountant,
    client: Client,
    campaign: Campaign,
}

async fn fixture(pool: PgPool, reminders: Option<ReminderSettings>) -> Fixture {
    let (ctx, whatsapp) = common::context_with(ServerConfig::for_tests(), pool);

    let (accountant, _) = ctx
        .accounts
        .register(RegisterRequest {
            email: "sam@smithandco.example".into(),
            password: "correct horse battery".into(),
            practice_name: "Smith & Co".into(),
        })
        .await
        .unwrap();

    let client = ctx
        .clients
        .create(
            accountant.id,
            CreateClientRequest {
                name: "Priya Patel".into(),
                phone: "07700 900123".into(),
                email: None,
            },
        )
        .await
        .unwrap();

    let summary = ctx
        .campaigns
        .create(
            accountant.id,
            CreateCampaignRequest {
                name: "Q2 bank statements".into(),
                period: "2024-Q2".into(),
                document_type: DocumentType::BankStatements,
                client_ids: vec![client.id],
                reminders,
            },
        )
        .await
        .unwrap();

    Fixture {
        ctx,
        whatsapp,
        accountant,
        client,
        campaign: summary.campaign,
    }
}

/// Move the campaign start back so every reminder threshold has passed
async fn backdate_start(pool: &PgPool, campaign_id: Uuid, days: i32) {
    sqlx::query(
        "UPDATE campaign SET started_at = NOW() - make_interval(days => $2)
         WHERE id = $1",
    )
    .bind(campaign_id)
    .bind(days)
    .execute(pool)
    .await
    .unwrap();
}

async fn progress(f: &Fixture) -> CampaignClient {
    f.ctx
        .campaigns
        .list_clients(f.accountant.id, f.campaign.id)
        .await
        .unwrap()
        .remove(0)
        .progress
}

async fn notifications_of(f: &Fixture, kind: NotificationKind) -> usize {
    f.ctx
        .notifications
        .list(f.accountant.id, &NotificationQuery::default())
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.kind == kind)
        .count()
}

fn pdf() -> Vec<MediaItem> {
    vec![MediaItem {
        url: "https://api.twilio.com/media/ME1".into(),
        content_type: "application/pdf".into(),
    }]
}

#[sqlx::test]
async fn test_campaign_runs_from_launch_to_completion(pool: PgPool) {
    let f = fixture(pool.clone(), None).await;

    let report = chase::launch_campaign(&f.ctx, f.accountant.id, f.campaign.id)
        .await
        .unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.campaign.status, CampaignStatus::Active);

    backdate_start(&pool, f.campaign.id, 10).await;

    // One stage per client per sweep: reminder 1, reminder 2, then the flag
    let mut sweeps = Vec::new();
    for _ in 0..4 {
        let SweepReport { sent, flagged, .. } = run_reminder_sweep(&f.ctx).await.unwrap();
        sweeps.push((sent, flagged));
    }
    assert_eq!(sweeps, vec![(1, 0), (1, 0), (0, 1), (0, 0)]);

    let cc = progress(&f).await;
    assert_eq!(cc.status, CampaignClientStatus::Stuck);
    assert!(cc.reminder_1_sent_at.is_some());
    assert!(cc.reminder_2_sent_at.is_some());
    assert!(cc.flagged_at.is_some());
    assert_eq!(notifications_of(&f, NotificationKind::ClientStuck).await, 1);

    let accountant = f.ctx.accounts.get_accountant(f.accountant.id).await.unwrap();
    let files = ingest_media(&f.ctx, &accountant, &f.client, &pdf()).await.unwrap();
    assert_eq!(files, 1);

    assert_eq!(progress(&f).await.status, CampaignClientStatus::Received);
    let campaign = f.ctx.campaigns.get(f.accountant.id, f.campaign.id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert!(campaign.completed_at.is_some());

    // request, two reminders and the acknowledgement
    assert_eq!(f.whatsapp.sent(), 4);
}

#[sqlx::test]
async fn test_stage_is_claimed_once(pool: PgPool) {
    let f = fixture(pool, None).await;
    chase::launch_campaign(&f.ctx, f.accountant.id, f.campaign.id)
        .await
        .unwrap();
    let cc = progress(&f).await;

    let claimed = f.ctx.campaigns.claim_stage(cc.id, ReminderStage::Reminder1).await.unwrap();
    assert!(claimed.is_some());

    let again = f.ctx.campaigns.claim_stage(cc.id, ReminderStage::Reminder1).await.unwrap();
    assert!(again.is_none());

    let request_again = f.ctx.campaigns.claim_stage(cc.id, ReminderStage::Request).await.unwrap();
    assert!(request_again.is_none());
}

#[sqlx::test]
async fn test_failed_send_releases_claim_for_next_sweep(pool: PgPool) {
    let f = fixture(pool, None).await;

    f.whatsapp.set_failing(true);
    let report = chase::launch_campaign(&f.ctx, f.accountant.id, f.campaign.id)
        .await
        .unwrap();
    assert_eq!(report.sent, 0);
    assert_eq!(report.failed, 1);
    assert!(!report.limit_reached);
    assert!(progress(&f).await.request_sent_at.is_none());

    f.whatsapp.set_failing(false);
    let sweep = run_reminder_sweep(&f.ctx).await.unwrap();
    assert_eq!(sweep.sent, 1);
    assert!(progress(&f).await.request_sent_at.is_some());
}

#[sqlx::test]
async fn test_received_client_is_never_flagged(pool: PgPool) {
    let f = fixture(pool.clone(), None).await;
    chase::launch_campaign(&f.ctx, f.accountant.id, f.campaign.id)
        .await
        .unwrap();

    let cc = f
        .ctx
        .campaigns
        .mark_received(f.accountant.id, f.campaign.id, f.client.id)
        .await
        .unwrap();
    assert_eq!(cc.status, CampaignClientStatus::Received);

    assert!(f.ctx.campaigns.claim_stage(cc.id, ReminderStage::Flag).await.unwrap().is_none());

    backdate_start(&pool, f.campaign.id, 30).await;
    let sweep = run_reminder_sweep(&f.ctx).await.unwrap();
    assert_eq!(sweep.flagged, 0);
    assert_eq!(sweep.sent, 0);

    let cc = progress(&f).await;
    assert_eq!(cc.status, CampaignClientStatus::Received);
    assert!(cc.flagged_at.is_none());
}

#[sqlx::test]
async fn test_flag_rolls_back_when_notification_fails(pool: PgPool) {
    let mut reminders = ReminderSettings::standard(NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    reminders.reminder_1_enabled = false;
    reminders.reminder_2_enabled = false;
    let f = fixture(pool.clone(), Some(reminders)).await;

    chase::launch_campaign(&f.ctx, f.accountant.id, f.campaign.id)
        .await
        .unwrap();
    backdate_start(&pool, f.campaign.id, 10).await;

    sqlx::query(
        "CREATE FUNCTION refuse_notification() RETURNS trigger AS $$
         BEGIN RAISE EXCEPTION 'notification insert refused'; END
         $$ LANGUAGE plpgsql",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "CREATE TRIGGER refuse_notification BEFORE INSERT ON notification
         FOR EACH ROW EXECUTE FUNCTION refuse_notification()",
    )
    .execute(&pool)
    .await
    .unwrap();

    let sweep = run_reminder_sweep(&f.ctx).await.unwrap();
    assert_eq!(sweep.flagged, 0);
    let cc = progress(&f).await;
    assert_eq!(cc.status, CampaignClientStatus::Pending);
    assert!(cc.flagged_at.is_none());

    sqlx::query("DROP TRIGGER refuse_notification ON notification")
        .execute(&pool)
        .await
        .unwrap();

    let sweep = run_reminder_sweep(&f.ctx).await.unwrap();
    assert_eq!(sweep.flagged, 1);
    assert_eq!(progress(&f).await.status, CampaignClientStatus::Stuck);
    assert_eq!(notifications_of(&f, NotificationKind::ClientStuck).await, 1);
}

#[sqlx::test]
async fn test_usage_survives_client_deletion(pool: PgPool) {
    let f = fixture(pool, None).await;
    let report = chase::launch_campaign(&f.ctx, f.accountant.id, f.campaign.id)
        .await
        .unwrap();
    assert_eq!(report.sent, 1);

    let before = f.ctx.billing.usage(&f.accountant).await.unwrap().chases_used;
    assert_eq!(before, 1);

    f.ctx.clients.delete(f.accountant.id, f.client.id).await.unwrap();

    let after = f.ctx.billing.usage(&f.accountant).await.unwrap().chases_used;
    assert_eq!(after, before);
}

#[sqlx::test]
async fn test_launch_stops_at_plan_limit(pool: PgPool) {
    let f = fixture(pool.clone(), None).await;

    sqlx::query(
        "INSERT INTO chase_usage (id, accountant_id, kind, created_at)
         SELECT gen_random_uuid(), $1, 'request', NOW() FROM generate_series(1, 25)",
    )
    .bind(f.accountant.id)
    .execute(&pool)
    .await
    .unwrap();

    let report = chase::launch_campaign(&f.ctx, f.accountant.id, f.campaign.id)
        .await
        .unwrap();
    assert!(report.limit_reached);
    assert_eq!(report.sent, 0);
    assert_eq!(report.failed, 0);
    assert!(progress(&f).await.request_sent_at.is_none());
    assert_eq!(f.whatsapp.sent(), 0);
    assert_eq!(notifications_of(&f, NotificationKind::ChaseLimitReached).await, 1);

    let campaign = f.ctx.campaigns.get(f.accountant.id, f.campaign.id).await.unwrap();
    let refused = chase::send_chase(&f.ctx, &f.accountant, &campaign, &f.client, ReminderStage::Request).await;
    assert!(matches!(refused, Err(ChaseError::ChaseLimitReached)));
    assert_eq!(notifications_of(&f, NotificationKind::ChaseLimitReached).await, 1);
}

#[sqlx::test]
async fn test_redelivered_webhook_is_recorded_once(pool: PgPool) {
    let f = fixture(pool.clone(), None).await;
    chase::launch_campaign(&f.ctx, f.accountant.id, f.campaign.id)
        .await
        .unwrap();

    let message = InboundMessage {
        from: "+447700900123".into(),
        to: "+15550000000".into(),
        body: String::new(),
        message_sid: "SM_inbound_1".into(),
        media: pdf(),
    };

    let first = inbound::route_and_record(&f.ctx, &message).await.unwrap();
    assert!(first.is_some());
    let second = inbound::route_and_record(&f.ctx, &message).await.unwrap();
    assert!(second.is_none());

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM message WHERE twilio_sid = $1")
        .bind("SM_inbound_1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, 1);
}
