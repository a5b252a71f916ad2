/// Practice settings and password change
use crate::{
    account::{ChangePasswordRequest, SettingsResponse, UpdateSettingsRequest},
    auth::AuthContext,
    context::AppContext,
    error::ChaseResult,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

/// Build settings routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/settings", get(get_settings).put(update_settings))
        .route("/api/settings/password", post(change_password))
}

async fn get_settings(State(ctx): State<AppContext>, auth: AuthContext) -> ChaseResult<Json<SettingsResponse>> {
    let accountant = ctx.accounts.get_accountant(auth.accountant_id).await?;
    Ok(Json(SettingsResponse::from(&accountant)))
}

async fn update_settings(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<UpdateSettingsRequest>,
) -> ChaseResult<Json<SettingsResponse>> {
    let accountant = ctx.accounts.update_settings(auth.accountant_id, req).await?;
    Ok(Json(SettingsResponse::from(&accountant)))
}

async fn change_password(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> ChaseResult<StatusCode> {
    req.validate()?;

    ctx.accounts
        .change_password(
            auth.accountant_id,
            auth.session.session_id,
            &req.current_password,
            &req.new_password,
        )
        .await?;

    tracing::info!(accountant_id = %auth.accountant_id, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}
