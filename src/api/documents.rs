/// Received document lookups
use crate::{auth::AuthContext, context::AppContext, db::models::Document, error::ChaseResult};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/documents/:id", get(get_document))
        .route("/api/campaigns/:id/documents", get(list_campaign_documents))
}

async fn get_document(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ChaseResult<Json<Document>> {
    Ok(Json(ctx.documents.get(auth.accountant_id, id).await?))
}

async fn list_campaign_documents(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ChaseResult<Json<Vec<Document>>> {
    ctx.campaigns.get(auth.accountant_id, id).await?;
    Ok(Json(ctx.documents.list_for_campaign(auth.accountant_id, id).await?))
}
