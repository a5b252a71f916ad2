/// Authentication extractors
use crate::{
    account::ValidatedSession,
    api::middleware::extract_bearer_token,
    context::AppContext,
    db::models::Accountant,
    error::ChaseError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// Authenticated accountant - extracts and validates the session from the request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub accountant_id: Uuid,
    pub session: ValidatedSession,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = ChaseError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| ChaseError::Authentication("Missing authorization header".to_string()))?;

        let session = state.accounts.validate_access_token(&token).await?;

        Ok(AuthContext {
            accountant_id: session.accountant_id,
            session,
        })
    }
}

/// Admin context - an authenticated accountant whose email is in `ADMIN_EMAILS`
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub accountant: Accountant,
    pub session: ValidatedSession,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = ChaseError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;
        let accountant = state.accounts.get_accountant(auth.accountant_id).await?;

        if !state.config.is_admin_email(&accountant.email) {
            tracing::warn!(accountant_id = %accountant.id, "AdminAuthContext: not an admin");
            return Err(ChaseError::Authorization("Admin access required".to_string()));
        }

        Ok(AdminAuthContext {
            accountant,
            session: auth.session,
        })
    }
}
