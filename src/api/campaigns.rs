/// Campaign endpoints: setup, launch, status changes and progress
use crate::{
    auth::AuthContext,
    campaigns::{CampaignClientView, CampaignSummary, CreateCampaignRequest, ReminderSettings},
    chase::{self, LaunchReport},
    context::AppContext,
    db::models::{Campaign, CampaignClient, CampaignStatus},
    error::{ChaseError, ChaseResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

/// Build campaign routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/campaigns", get(list_campaigns).post(create_campaign))
        .route(
            "/api/campaigns/:id",
            get(get_campaign).put(update_reminders).delete(delete_campaign),
        )
        .route("/api/campaigns/:id/launch", post(launch_campaign))
        .route("/api/campaigns/:id/status", post(change_status))
        .route("/api/campaigns/:id/clients", get(list_campaign_clients))
        .route(
            "/api/campaigns/:id/clients/:client_id/received",
            post(mark_received),
        )
}

#[derive(Debug, Deserialize)]
struct ListCampaignsQuery {
    status: Option<CampaignStatus>,
}

#[derive(Debug, Deserialize)]
struct ChangeStatusRequest {
    status: CampaignStatus,
}

async fn list_campaigns(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(query): Query<ListCampaignsQuery>,
) -> ChaseResult<Json<Vec<CampaignSummary>>> {
    Ok(Json(ctx.campaigns.list(auth.accountant_id, query.status).await?))
}

async fn create_campaign(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<CreateCampaignRequest>,
) -> ChaseResult<(StatusCode, Json<CampaignSummary>)> {
    let summary = ctx.campaigns.create(auth.accountant_id, req).await?;
    tracing::info!(
        campaign_id = %summary.campaign.id,
        clients = summary.counts.total,
        "Campaign created"
    );
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn get_campaign(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ChaseResult<Json<CampaignSummary>> {
    Ok(Json(ctx.campaigns.get_summary(auth.accountant_id, id).await?))
}

async fn update_reminders(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(settings): Json<ReminderSettings>,
) -> ChaseResult<Json<Campaign>> {
    Ok(Json(
        ctx.campaigns
            .update_reminders(auth.accountant_id, id, settings)
            .await?,
    ))
}

async fn delete_campaign(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ChaseResult<StatusCode> {
    ctx.campaigns.delete(auth.accountant_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn launch_campaign(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ChaseResult<Json<LaunchReport>> {
    Ok(Json(chase::launch_campaign(&ctx, auth.accountant_id, id).await?))
}

/// Pause, resume or complete; launching goes through `/launch`
async fn change_status(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeStatusRequest>,
) -> ChaseResult<Json<Campaign>> {
    let current = ctx.campaigns.get(auth.accountant_id, id).await?;
    if current.status == CampaignStatus::Draft {
        return Err(ChaseError::Validation(
            "Launch the campaign to start it".to_string(),
        ));
    }

    Ok(Json(
        ctx.campaigns
            .transition(auth.accountant_id, id, req.status)
            .await?,
    ))
}

async fn list_campaign_clients(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ChaseResult<Json<Vec<CampaignClientView>>> {
    Ok(Json(ctx.campaigns.list_clients(auth.accountant_id, id).await?))
}

async fn mark_received(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((id, client_id)): Path<(Uuid, Uuid)>,
) -> ChaseResult<Json<CampaignClient>> {
    let progress = ctx
        .campaigns
        .mark_received(auth.accountant_id, id, client_id)
        .await?;
    ctx.campaigns.complete_if_done(id).await?;

    Ok(Json(progress))
}
