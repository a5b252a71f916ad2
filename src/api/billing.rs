/// Plan usage for the billing screen
use crate::{auth::AuthContext, billing::Usage, context::AppContext, error::ChaseResult};
use axum::{extract::State, routing::get, Json, Router};

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/billing", get(usage))
}

async fn usage(State(ctx): State<AppContext>, auth: AuthContext) -> ChaseResult<Json<Usage>> {
    let accountant = ctx.accounts.get_accountant(auth.accountant_id).await?;
    Ok(Json(ctx.billing.usage(&accountant).await?))
}
