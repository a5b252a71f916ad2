/// Plan limits and chase usage
///
/// Initial requests and reminders count as chases. Usage resets at the start
/// of each calendar month (UTC).
use crate::{
    db::models::{Accountant, NotificationKind, PlanTier},
    error::{ChaseError, ChaseResult},
    messaging::MessageStore,
    notifications::NotificationManager,
};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

impl PlanTier {
    /// Monthly chase allowance; `None` is unlimited
    pub fn monthly_chase_limit(&self) -> Option<i64> {
        match self {
            PlanTier::Trial => Some(25),
            PlanTier::Starter => Some(250),
            PlanTier::Growth => Some(1000),
            PlanTier::Practice => None,
        }
    }
}

/// Start of the billing period containing `now`
pub fn period_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Usage summary for the billing screen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub plan: PlanTier,
    pub period_start: DateTime<Utc>,
    pub chases_used: i64,
    pub chase_limit: Option<i64>,
    pub remaining: Option<i64>,
}

impl Usage {
    pub fn new(plan: PlanTier, period_start: DateTime<Utc>, used: i64) -> Self {
        let limit = plan.monthly_chase_limit();
        Self {
            plan,
            period_start,
            chases_used: used,
            chase_limit: limit,
            remaining: limit.map(|l| (l - used).max(0)),
        }
    }

    pub fn exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// Billing manager
#[derive(Clone)]
pub struct BillingManager {
    messages: MessageStore,
    notifications: NotificationManager,
}

impl BillingManager {
    pub fn new(messages: MessageStore, notifications: NotificationManager) -> Self {
        Self {
            messages,
            notifications,
        }
    }

    /// Current period usage
    pub async fn usage(&self, accountant: &Accountant) -> ChaseResult<Usage> {
        let start = period_start(Utc::now());
        let used = self.messages.count_chases_since(accountant.id, start).await?;
        Ok(Usage::new(accountant.plan, start, used))
    }

    /// Refuse a chase once the allowance is used up
    ///
    /// The first refusal in a period raises a `chase_limit_reached` notification.
    pub async fn ensure_chase_allowed(&self, accountant: &Accountant) -> ChaseResult<()> {
        let usage = self.usage(accountant).await?;
        if !usage.exhausted() {
            return Ok(());
        }

        let already_told = self
            .notifications
            .exists_since(accountant.id, NotificationKind::ChaseLimitReached, usage.period_start)
            .await?;

        if !already_told {
            self.notifications
                .create(
                    accountant.id,
                    NotificationKind::ChaseLimitReached,
                    "Monthly chase limit reached",
                    format!(
                        "You've used all {} chases on the {} plan this month. \
                         Upgrade to keep reminders going.",
                        usage.chase_limit.unwrap_or_default(),
                        usage.plan
                    ),
                )
                .await?;
        }

        tracing::info!(accountant_id = %accountant.id, plan = %usage.plan, "Chase refused: monthly limit reached");

        Err(ChaseError::ChaseLimitReached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_limits() {
        assert_eq!(PlanTier::Trial.monthly_chase_limit(), Some(25));
        assert_eq!(PlanTier::Starter.monthly_chase_limit(), Some(250));
        assert_eq!(PlanTier::Growth.monthly_chase_limit(), Some(1000));
        assert_eq!(PlanTier::Practice.monthly_chase_limit(), None);
    }

    #[test]
    fn test_period_start_is_first_of_month_utc() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 0).unwrap();
        assert_eq!(period_start(now), Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_usage_remaining_and_exhaustion() {
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let usage = Usage::new(PlanTier::Trial, start, 24);
        assert_eq!(usage.remaining, Some(1));
        assert!(!usage.exhausted());

        let usage = Usage::new(PlanTier::Trial, start, 30);
        assert_eq!(usage.remaining, Some(0));
        assert!(usage.exhausted());

        let usage = Usage::new(PlanTier::Practice, start, 10_000);
        assert_eq!(usage.remaining, None);
        assert!(!usage.exhausted());
    }
}
