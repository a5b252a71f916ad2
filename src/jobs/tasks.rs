/// Background task implementations
use crate::{
    chase::sweep::{run_reminder_sweep, SweepReport},
    context::AppContext,
    error::ChaseResult,
};

/// One reminder pass over all active campaigns
pub async fn reminder_sweep(ctx: &AppContext) -> ChaseResult<SweepReport> {
    run_reminder_sweep(ctx).await
}

/// Cleanup expired sessions
pub async fn cleanup_expired_sessions(ctx: &AppContext) -> ChaseResult<u64> {
    let (sessions, refresh_tokens) = ctx.accounts.cleanup_expired_sessions().await?;
    Ok(sessions + refresh_tokens)
}

/// Health check - verify the database answers
pub async fn health_check(ctx: &AppContext) -> ChaseResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;
    Ok(())
}
