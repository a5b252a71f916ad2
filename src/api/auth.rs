/// Accountant sign-up, login and session endpoints
use crate::{
    account::{LoginRequest, RefreshSessionRequest, RegisterRequest, SessionResponse},
    auth::AuthContext,
    context::AppContext,
    db::models::Accountant,
    error::ChaseResult,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}

async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> ChaseResult<(StatusCode, Json<SessionResponse>)> {
    let (accountant, session) = ctx.accounts.register(req).await?;
    tracing::info!(accountant_id = %accountant.id, "Accountant registered");

    Ok((StatusCode::CREATED, Json(SessionResponse { accountant, session })))
}

async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> ChaseResult<Json<SessionResponse>> {
    let (accountant, session) = ctx.accounts.login(&req.email, &req.password).await?;
    Ok(Json(SessionResponse { accountant, session }))
}

async fn refresh(
    State(ctx): State<AppContext>,
    Json(req): Json<RefreshSessionRequest>,
) -> ChaseResult<Json<SessionResponse>> {
    let (accountant, session) = ctx.accounts.refresh_session(&req.refresh_token).await?;
    Ok(Json(SessionResponse { accountant, session }))
}

async fn logout(State(ctx): State<AppContext>, auth: AuthContext) -> ChaseResult<StatusCode> {
    ctx.accounts.delete_session(auth.session.session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(State(ctx): State<AppContext>, auth: AuthContext) -> ChaseResult<Json<Accountant>> {
    Ok(Json(ctx.accounts.get_accountant(auth.accountant_id).await?))
}
