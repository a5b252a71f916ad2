/// Notification polling
use crate::{
    auth::AuthContext,
    context::AppContext,
    error::ChaseResult,
    notifications::{NotificationFeed, NotificationQuery},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

/// Build notification routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/notifications", get(poll))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/:id/read", post(mark_read))
}

async fn poll(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(query): Query<NotificationQuery>,
) -> ChaseResult<Json<NotificationFeed>> {
    let notifications = ctx.notifications.list(auth.accountant_id, &query).await?;
    let unread_count = ctx.notifications.unread_count(auth.accountant_id).await?;

    Ok(Json(NotificationFeed {
        notifications,
        unread_count,
    }))
}

async fn mark_read(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ChaseResult<StatusCode> {
    ctx.notifications.mark_read(auth.accountant_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_all_read(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> ChaseResult<Json<serde_json::Value>> {
    let updated = ctx.notifications.mark_all_read(auth.accountant_id).await?;
    Ok(Json(json!({ "updated": updated })))
}
