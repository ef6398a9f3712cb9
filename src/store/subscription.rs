//! Subscription store: the plan catalog and the user's subscriptions.
//!
//! The collection's current slot holds the one subscription treated as
//! "current" for the session.

use crate::collection::Collection;
use crate::domain::{Plan, Subscription, SubscriptionFilter, SubscriptionFilterField};
use crate::lifecycle::{Lifecycle, LoadMode, OperationKind, RequestToken};
use crate::pagination::{PageMeta, PageRequest};

use super::Store;

/// Operation classes tracked by the subscription store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionOp {
    FetchPlans,
    FetchSubscriptions,
    FetchCurrent,
    Create,
    Update,
    Cancel,
    Reactivate,
}

impl OperationKind for SubscriptionOp {
    fn replaces_slot(self) -> bool {
        matches!(
            self,
            Self::FetchPlans | Self::FetchSubscriptions | Self::FetchCurrent
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::FetchPlans => "fetch_plans",
            Self::FetchSubscriptions => "fetch_subscriptions",
            Self::FetchCurrent => "fetch_current_subscription",
            Self::Create => "create_subscription",
            Self::Update => "update_subscription",
            Self::Cancel => "cancel_subscription",
            Self::Reactivate => "reactivate_subscription",
        }
    }
}

/// Everything that can happen to the subscription store.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Requested(RequestToken<SubscriptionOp>),
    Failed {
        token: RequestToken<SubscriptionOp>,
        message: String,
    },
    PlansLoaded {
        token: RequestToken<SubscriptionOp>,
        plans: Vec<Plan>,
    },
    SubscriptionsLoaded {
        token: RequestToken<SubscriptionOp>,
        request: PageRequest,
        items: Vec<Subscription>,
        meta: Option<PageMeta>,
    },
    /// `None` means the user has no current subscription.
    CurrentLoaded {
        token: RequestToken<SubscriptionOp>,
        subscription: Option<Subscription>,
    },
    Created {
        token: RequestToken<SubscriptionOp>,
        subscription: Subscription,
    },
    /// Result of an update, cancel, or reactivate.
    Changed {
        token: RequestToken<SubscriptionOp>,
        subscription: Subscription,
    },
    FilterSet(SubscriptionFilterField),
    FiltersCleared,
    ErrorCleared,
}

/// Local cache of plans and subscriptions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionStore {
    plans: Collection<Plan>,
    subscriptions: Collection<Subscription, SubscriptionFilter>,
    lifecycle: Lifecycle<SubscriptionOp>,
}

impl Store for SubscriptionStore {
    const NAME: &'static str = "subscriptions";

    type Op = SubscriptionOp;
    type Event = SubscriptionEvent;

    fn lifecycle(&self) -> &Lifecycle<SubscriptionOp> {
        &self.lifecycle
    }

    fn admits(&self, kind: SubscriptionOp, mode: LoadMode) -> bool {
        if mode != LoadMode::More {
            return true;
        }
        kind == SubscriptionOp::FetchSubscriptions
            && self.subscriptions.pagination().has_next_page()
            && !self.lifecycle.is_fetching()
    }

    fn settles(event: &SubscriptionEvent) -> Option<RequestToken<SubscriptionOp>> {
        use SubscriptionEvent::*;
        match event {
            Failed { token, .. }
            | PlansLoaded { token, .. }
            | SubscriptionsLoaded { token, .. }
            | CurrentLoaded { token, .. }
            | Created { token, .. }
            | Changed { token, .. } => Some(*token),
            _ => None,
        }
    }

    fn apply(mut self, event: &SubscriptionEvent) -> Self {
        match event {
            SubscriptionEvent::Requested(token) => self.lifecycle.begin(*token),
            SubscriptionEvent::Failed { token, message } => {
                self.lifecycle.fail(*token, message.clone());
            }
            SubscriptionEvent::PlansLoaded { token, plans } => {
                if self.lifecycle.succeed(*token) {
                    let request = PageRequest::first(u32::try_from(plans.len()).unwrap_or(u32::MAX));
                    self.plans.apply_page(request, plans.clone(), None);
                }
            }
            SubscriptionEvent::SubscriptionsLoaded {
                token,
                request,
                items,
                meta,
            } => {
                if self.lifecycle.succeed(*token) {
                    self.subscriptions.apply_page(*request, items.clone(), *meta);
                }
            }
            SubscriptionEvent::CurrentLoaded {
                token,
                subscription,
            } => {
                if self.lifecycle.succeed(*token) {
                    match subscription {
                        Some(s) => self.subscriptions.set_current(s.clone()),
                        None => self.subscriptions.clear_current(),
                    }
                }
            }
            SubscriptionEvent::Created {
                token,
                subscription,
            } => {
                if self.lifecycle.succeed(*token) {
                    self.subscriptions.prepend(subscription.clone());
                    self.subscriptions.set_current(subscription.clone());
                }
            }
            SubscriptionEvent::Changed {
                token,
                subscription,
            } => {
                if self.lifecycle.succeed(*token) {
                    self.subscriptions.replace(subscription.clone());
                }
            }
            SubscriptionEvent::FilterSet(field) => {
                self.subscriptions.set_filter(field.clone());
            }
            SubscriptionEvent::FiltersCleared => self.subscriptions.clear_filter(),
            SubscriptionEvent::ErrorCleared => self.lifecycle.clear_error(),
        }
        self
    }
}

impl SubscriptionStore {
    /// Plan catalog.
    pub fn plans(&self) -> &Collection<Plan> {
        &self.plans
    }

    /// Subscription collection.
    pub fn subscriptions(&self) -> &Collection<Subscription, SubscriptionFilter> {
        &self.subscriptions
    }

    /// The session's current subscription.
    pub fn current(&self) -> Option<&Subscription> {
        self.subscriptions.current()
    }

    /// The subscription currently granting access: the current slot when it
    /// does, otherwise the first cached subscription that does.
    pub fn active_subscription(&self) -> Option<&Subscription> {
        self.current()
            .filter(|s| s.status.grants_access())
            .or_else(|| {
                self.subscriptions
                    .items()
                    .iter()
                    .find(|s| s.status.grants_access())
            })
    }

    /// Plan of the current subscription, when both are cached.
    pub fn current_plan(&self) -> Option<&Plan> {
        self.current().and_then(|s| self.plans.get(&s.plan_id))
    }

    /// Plans open to new subscribers.
    pub fn available_plans(&self) -> Vec<&Plan> {
        self.plans.items().iter().filter(|p| p.active).collect()
    }

    /// Whether a fresh load or single fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.lifecycle.is_loading()
    }

    /// Whether a load-more is in flight.
    pub fn is_loading_more(&self) -> bool {
        self.lifecycle.is_loading_more()
    }

    /// Message of the last failed operation.
    pub fn error(&self) -> Option<&str> {
        self.lifecycle.error()
    }
}
