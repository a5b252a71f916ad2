/// Google Drive connection (OAuth authorization-code flow)
use crate::{
    auth::AuthContext,
    context::AppContext,
    drive::{issue_oauth_state, verify_oauth_state, DriveTokens},
    error::{ChaseError, ChaseResult},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Redirect,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Build Drive routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/drive/connect", get(connect))
        .route("/api/drive/callback", get(callback))
        .route("/api/drive", delete(disconnect))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectResponse {
    authorization_url: String,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Settings page the browser returns to after consent
fn settings_url(ctx: &AppContext, outcome: &str) -> String {
    let origin = ctx.config.service.frontend_origin.trim_end_matches('/');
    let base = if origin.is_empty() || origin == "*" {
        ctx.service_url()
    } else {
        origin
    };
    format!("{}/settings?drive={}", base, outcome)
}

async fn connect(State(ctx): State<AppContext>, auth: AuthContext) -> ChaseResult<Json<ConnectResponse>> {
    let state = issue_oauth_state(&ctx.config.authentication.jwt_secret, auth.accountant_id)?;
    Ok(Json(ConnectResponse {
        authorization_url: ctx.drive.authorization_url(&state),
    }))
}

async fn complete_connection(ctx: &AppContext, query: CallbackQuery) -> ChaseResult<Uuid> {
    if let Some(error) = query.error {
        return Err(ChaseError::Validation(format!("Google declined: {}", error)));
    }

    let (Some(code), Some(state)) = (query.code, query.state) else {
        return Err(ChaseError::Validation("Missing code or state".to_string()));
    };

    let accountant_id = verify_oauth_state(&ctx.config.authentication.jwt_secret, &state)?;
    let DriveTokens {
        access_token,
        refresh_token,
        expires_at,
    } = ctx.drive.exchange_code(&code).await?;

    ctx.accounts
        .set_drive_tokens(accountant_id, &access_token, refresh_token.as_deref(), expires_at)
        .await?;

    let root = ctx
        .drive
        .ensure_folder(&access_token, &ctx.config.google_drive.root_folder_name, None)
        .await?;
    ctx.accounts.set_drive_folder(accountant_id, &root).await?;

    Ok(accountant_id)
}

/// Browser redirect target; always sends the user back to settings
async fn callback(State(ctx): State<AppContext>, Query(query): Query<CallbackQuery>) -> Redirect {
    match complete_connection(&ctx, query).await {
        Ok(accountant_id) => {
            tracing::info!(accountant_id = %accountant_id, "Google Drive connected");
            Redirect::to(&settings_url(&ctx, "connected"))
        }
        Err(e) => {
            tracing::warn!("Google Drive connection failed: {}", e);
            Redirect::to(&settings_url(&ctx, "error"))
        }
    }
}

async fn disconnect(State(ctx): State<AppContext>, auth: AuthContext) -> ChaseResult<StatusCode> {
    ctx.accounts.clear_drive(auth.accountant_id).await?;
    tracing::info!(accountant_id = %auth.accountant_id, "Google Drive disconnected");
    Ok(StatusCode::NO_CONTENT)
}
