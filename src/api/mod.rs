/// API routes and handlers
pub mod auth;
pub mod billing;
pub mod blog;
pub mod campaigns;
pub mod clients;
pub mod documents;
pub mod drive;
pub mod health;
pub mod middleware;
pub mod notifications;
pub mod settings;
pub mod webhooks;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(auth::routes())
        .merge(clients::routes())
        .merge(campaigns::routes())
        .merge(documents::routes())
        .merge(settings::routes())
        .merge(drive::routes())
        .merge(notifications::routes())
        .merge(billing::routes())
        .merge(blog::routes())
        .merge(webhooks::routes())
}
