//! Subscriptions to paid plans (ticket monitoring, auto-dispute, ...).

use serde::{Deserialize, Serialize};

use crate::collection::Entity;
use crate::filter::FilterSpec;

/// Billing status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    #[serde(alias = "canceled")]
    Cancelled,
    Unpaid,
    Inactive,
}

impl SubscriptionStatus {
    /// Wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Cancelled => "cancelled",
            Self::Unpaid => "unpaid",
            Self::Inactive => "inactive",
        }
    }

    /// Whether the subscriber currently has access to the plan.
    pub fn grants_access(self) -> bool {
        matches!(self, Self::Trialing | Self::Active | Self::PastDue)
    }
}

/// A user's subscription to one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    /// Billing-cycle anchor: start of the current period (unix seconds).
    pub current_period_start: u64,
    /// End of the current period (unix seconds).
    pub current_period_end: u64,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub cancelled_at: Option<u64>,
    #[serde(default)]
    pub trial_end: Option<u64>,
}

impl Entity for Subscription {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Subscription {
    /// Whether the subscription will lapse without further action.
    pub fn is_winding_down(&self) -> bool {
        self.cancel_at_period_end && self.status.grants_access()
    }
}

/// Plan billing interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Month,
    Year,
}

/// A plan users can subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub price_cents: u64,
    pub currency: String,
    pub interval: BillingInterval,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Entity for Plan {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Body of a subscription create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscription {
    pub plan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,
}

/// Partial update of a subscription (plan change, payment method swap).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,
}

/// Body of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscription {
    /// Keep access until the period ends instead of cancelling now.
    pub at_period_end: bool,
}

/// Subscription list filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    pub status: Option<SubscriptionStatus>,
}

/// One assignment to a [`SubscriptionFilter`] field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionFilterField {
    Status(Option<SubscriptionStatus>),
}

impl FilterSpec<Subscription> for SubscriptionFilter {
    type Field = SubscriptionFilterField;

    fn set(&mut self, field: SubscriptionFilterField) {
        match field {
            SubscriptionFilterField::Status(status) => self.status = status,
        }
    }

    fn matches(&self, subscription: &Subscription) -> bool {
        self.status.is_none_or(|s| subscription.status == s)
    }
}

impl SubscriptionFilter {
    /// Query parameters for the collection fetch.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        self.status
            .map(|status| ("status", status.as_str().to_string()))
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;

    pub(crate) fn subscription(id: &str, status: SubscriptionStatus) -> Subscription {
        Subscription {
            id: id.to_string(),
            plan_id: "plan-basic".to_string(),
            status,
            current_period_start: 1_700_000_000,
            current_period_end: 1_702_592_000,
            cancel_at_period_end: false,
            cancelled_at: None,
            trial_end: None,
        }
    }
}
