/// Rate limiting
///
/// One global bucket each for authenticated API calls, anonymous calls
/// (login, register, public blog) and the Twilio webhook.
use crate::{
    config::RateLimitConfig,
    context::AppContext,
    error::{ChaseError, ChaseResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

fn quota(rps: u32) -> Quota {
    let rate = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
    Quota::per_second(rate).allow_burst(rate)
}

/// Traffic class a request is limited under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficClass {
    Authenticated,
    Unauthenticated,
    Webhook,
}

impl TrafficClass {
    pub fn of(path: &str, has_bearer: bool) -> Self {
        if path.starts_with("/webhooks/") {
            TrafficClass::Webhook
        } else if has_bearer {
            TrafficClass::Authenticated
        } else {
            TrafficClass::Unauthenticated
        }
    }
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated: Arc<DirectLimiter>,
    unauthenticated: Arc<DirectLimiter>,
    webhook: Arc<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            authenticated: Arc::new(GovernorLimiter::direct(quota(config.authenticated_rps))),
            unauthenticated: Arc::new(GovernorLimiter::direct(quota(config.unauthenticated_rps))),
            webhook: Arc::new(GovernorLimiter::direct(quota(config.webhook_rps))),
        }
    }

    /// Take one token for the class, failing when its bucket is empty
    pub fn check(&self, class: TrafficClass) -> ChaseResult<()> {
        if !self.enabled {
            return Ok(());
        }

        let limiter = match class {
            TrafficClass::Authenticated => &self.authenticated,
            TrafficClass::Unauthenticated => &self.unauthenticated,
            TrafficClass::Webhook => &self.webhook,
        };

        limiter.check().map_err(|_| ChaseError::RateLimitExceeded {
            retry_after: Duration::from_secs(1),
        })
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, ChaseError> {
    let has_bearer = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer "));
    let class = TrafficClass::of(request.uri().path(), has_bearer);

    if let Err(e) = ctx.rate_limiter.check(class) {
        tracing::debug!(?class, path = %request.uri().path(), "Rate limit exceeded");
        return Err(e);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool) -> RateLimitConfig {
        RateLimitConfig {
            enabled,
            authenticated_rps: 5,
            unauthenticated_rps: 2,
            webhook_rps: 3,
        }
    }

    #[test]
    fn test_traffic_class() {
        assert_eq!(TrafficClass::of("/webhooks/whatsapp", false), TrafficClass::Webhook);
        assert_eq!(TrafficClass::of("/api/clients", true), TrafficClass::Authenticated);
        assert_eq!(TrafficClass::of("/api/auth/login", false), TrafficClass::Unauthenticated);
    }

    #[test]
    fn test_burst_limit() {
        let limiter = RateLimiter::new(&config(true));

        for _ in 0..2 {
            assert!(limiter.check(TrafficClass::Unauthenticated).is_ok());
        }
        assert!(matches!(
            limiter.check(TrafficClass::Unauthenticated),
            Err(ChaseError::RateLimitExceeded { .. })
        ));

        // Buckets are independent
        assert!(limiter.check(TrafficClass::Authenticated).is_ok());
        assert!(limiter.check(TrafficClass::Webhook).is_ok());
    }

    #[test]
    fn test_disabled_limiter_allows_everything() {
        let limiter = RateLimiter::new(&config(false));
        for _ in 0..100 {
            assert!(limiter.check(TrafficClass::Unauthenticated).is_ok());
        }
    }
}
