//! Payment store: payment history and saved payment methods.
//!
//! At most one cached payment method carries `is_default`. Every event that
//! could introduce a second default either normalizes in the same step or
//! is followed by a default assignment in the same dispatch batch.

use crate::collection::Collection;
use crate::domain::{Payment, PaymentFilter, PaymentFilterField, PaymentMethod};
use crate::lifecycle::{Lifecycle, LoadMode, OperationKind, RequestToken};
use crate::pagination::{PageMeta, PageRequest};

use super::Store;

/// Operation classes tracked by the payment store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentOp {
    FetchPayments,
    FetchPayment,
    PayTicket,
    FetchMethods,
    CreateMethod,
    UpdateMethod,
    DeleteMethod,
    SetDefault,
}

impl OperationKind for PaymentOp {
    fn replaces_slot(self) -> bool {
        matches!(
            self,
            Self::FetchPayments | Self::FetchPayment | Self::FetchMethods
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::FetchPayments => "fetch_payments",
            Self::FetchPayment => "fetch_payment",
            Self::PayTicket => "pay_ticket",
            Self::FetchMethods => "fetch_payment_methods",
            Self::CreateMethod => "create_payment_method",
            Self::UpdateMethod => "update_payment_method",
            Self::DeleteMethod => "delete_payment_method",
            Self::SetDefault => "set_default_payment_method",
        }
    }
}

/// Everything that can happen to the payment store.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    Requested(RequestToken<PaymentOp>),
    Failed {
        token: RequestToken<PaymentOp>,
        message: String,
    },
    PaymentsLoaded {
        token: RequestToken<PaymentOp>,
        request: PageRequest,
        items: Vec<Payment>,
        meta: Option<PageMeta>,
    },
    PaymentLoaded {
        token: RequestToken<PaymentOp>,
        payment: Payment,
    },
    TicketPaid {
        token: RequestToken<PaymentOp>,
        payment: Payment,
    },
    MethodsLoaded {
        token: RequestToken<PaymentOp>,
        request: PageRequest,
        items: Vec<PaymentMethod>,
        meta: Option<PageMeta>,
    },
    MethodCreated {
        token: RequestToken<PaymentOp>,
        method: PaymentMethod,
        /// The create payload asked for this method to become the default.
        set_default: bool,
    },
    MethodUpdated {
        token: RequestToken<PaymentOp>,
        method: PaymentMethod,
    },
    MethodDeleted {
        token: RequestToken<PaymentOp>,
        id: String,
    },
    DefaultSet {
        token: RequestToken<PaymentOp>,
        method_id: String,
    },
    /// Make `method_id` the only default, in one pass.
    DefaultAssigned {
        method_id: String,
    },
    FilterSet(PaymentFilterField),
    FiltersCleared,
    ErrorCleared,
}

/// Local cache of payments and payment methods.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentStore {
    payments: Collection<Payment, PaymentFilter>,
    methods: Collection<PaymentMethod>,
    default_method_id: Option<String>,
    lifecycle: Lifecycle<PaymentOp>,
}

impl Store for PaymentStore {
    const NAME: &'static str = "payments";

    type Op = PaymentOp;
    type Event = PaymentEvent;

    fn lifecycle(&self) -> &Lifecycle<PaymentOp> {
        &self.lifecycle
    }

    fn admits(&self, kind: PaymentOp, mode: LoadMode) -> bool {
        if mode != LoadMode::More {
            return true;
        }
        let has_next = match kind {
            PaymentOp::FetchPayments => self.payments.pagination().has_next_page(),
            PaymentOp::FetchMethods => self.methods.pagination().has_next_page(),
            _ => false,
        };
        has_next && !self.lifecycle.is_fetching()
    }

    fn settles(event: &PaymentEvent) -> Option<RequestToken<PaymentOp>> {
        use PaymentEvent::*;
        match event {
            Failed { token, .. }
            | PaymentsLoaded { token, .. }
            | PaymentLoaded { token, .. }
            | TicketPaid { token, .. }
            | MethodsLoaded { token, .. }
            | MethodCreated { token, .. }
            | MethodUpdated { token, .. }
            | MethodDeleted { token, .. }
            | DefaultSet { token, .. } => Some(*token),
            _ => None,
        }
    }

    fn apply(mut self, event: &PaymentEvent) -> Self {
        match event {
            PaymentEvent::Requested(token) => self.lifecycle.begin(*token),
            PaymentEvent::Failed { token, message } => {
                self.lifecycle.fail(*token, message.clone());
            }
            PaymentEvent::PaymentsLoaded {
                token,
                request,
                items,
                meta,
            } => {
                if self.lifecycle.succeed(*token) {
                    self.payments.apply_page(*request, items.clone(), *meta);
                }
            }
            PaymentEvent::PaymentLoaded { token, payment } => {
                if self.lifecycle.succeed(*token) {
                    self.payments.set_current(payment.clone());
                }
            }
            PaymentEvent::TicketPaid { token, payment } => {
                if self.lifecycle.succeed(*token) {
                    self.payments.prepend(payment.clone());
                }
            }
            PaymentEvent::MethodsLoaded {
                token,
                request,
                items,
                meta,
            } => {
                if self.lifecycle.succeed(*token) {
                    self.methods.apply_page(*request, items.clone(), *meta);
                    self.normalize_defaults();
                }
            }
            PaymentEvent::MethodCreated { token, method, .. } => {
                if self.lifecycle.succeed(*token) {
                    self.methods.prepend(method.clone());
                }
            }
            PaymentEvent::MethodUpdated { token, method } => {
                if self.lifecycle.succeed(*token) {
                    let mut method = method.clone();
                    method.is_default = self.default_method_id.as_deref() == Some(&method.id);
                    self.methods.replace(method);
                }
            }
            PaymentEvent::MethodDeleted { token, id } => {
                if self.lifecycle.succeed(*token) {
                    self.methods.remove(id);
                    if self.default_method_id.as_deref() == Some(id) {
                        self.default_method_id = None;
                    }
                }
            }
            PaymentEvent::DefaultSet { token, .. } => {
                self.lifecycle.succeed(*token);
            }
            PaymentEvent::DefaultAssigned { method_id } => {
                if self.methods.contains(method_id) {
                    self.methods
                        .for_each_mut(|m| m.is_default = m.id == *method_id);
                    self.default_method_id = Some(method_id.clone());
                }
            }
            PaymentEvent::FilterSet(field) => {
                self.payments.set_filter(field.clone());
            }
            PaymentEvent::FiltersCleared => self.payments.clear_filter(),
            PaymentEvent::ErrorCleared => self.lifecycle.clear_error(),
        }
        self
    }
}

impl PaymentStore {
    /// Payment history collection.
    pub fn payments(&self) -> &Collection<Payment, PaymentFilter> {
        &self.payments
    }

    /// Saved payment methods.
    pub fn methods(&self) -> &Collection<PaymentMethod> {
        &self.methods
    }

    /// The current default payment method, if one is set.
    pub fn default_method(&self) -> Option<&PaymentMethod> {
        self.default_method_id
            .as_deref()
            .and_then(|id| self.methods.get(id))
    }

    /// Cached payments for one ticket, newest first.
    pub fn payments_for_ticket(&self, ticket_id: &str) -> Vec<&Payment> {
        self.payments
            .items()
            .iter()
            .filter(|p| p.ticket_id == ticket_id)
            .collect()
    }

    /// Whether a fresh load or single fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.lifecycle.is_loading()
    }

    /// Whether a load-more is in flight.
    pub fn is_loading_more(&self) -> bool {
        self.lifecycle.is_loading_more()
    }

    /// True while a pay-ticket request is outstanding.
    pub fn is_paying(&self) -> bool {
        self.lifecycle.is_busy(PaymentOp::PayTicket)
    }

    /// Message of the last failed operation.
    pub fn error(&self) -> Option<&str> {
        self.lifecycle.error()
    }

    /// Keep only the first default flag in collection order and point the
    /// default slot at it.
    fn normalize_defaults(&mut self) {
        let mut first: Option<String> = None;
        let mut extra = 0usize;
        self.methods.for_each_mut(|m| {
            if !m.is_default {
                return;
            }
            if first.is_none() {
                first = Some(m.id.clone());
            } else if first.as_deref() != Some(m.id.as_str()) {
                m.is_default = false;
                extra += 1;
            }
        });
        if extra > 0 {
            tracing::warn!(
                kept = first.as_deref().unwrap_or_default(),
                cleared = extra,
                "server reported multiple default payment methods"
            );
        }
        self.default_method_id = first;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::test_fixtures::{card, payment};

    fn tok(kind: PaymentOp, seq: u64) -> RequestToken<PaymentOp> {
        let mode = match kind {
            PaymentOp::FetchPayments | PaymentOp::FetchPayment | PaymentOp::FetchMethods => {
                LoadMode::Fresh
            }
            _ => LoadMode::Mutation,
        };
        RequestToken::new(kind, seq, mode)
    }

    fn defaults(store: &PaymentStore) -> Vec<&str> {
        store
            .methods()
            .items()
            .iter()
            .filter(|m| m.is_default)
            .map(|m| m.id.as_str())
            .collect()
    }

    fn with_methods(items: Vec<PaymentMethod>) -> PaymentStore {
        let token = tok(PaymentOp::FetchMethods, 1);
        PaymentStore::default()
            .apply(&PaymentEvent::Requested(token))
            .apply(&PaymentEvent::MethodsLoaded {
                token,
                request: PageRequest::first(20),
                items,
                meta: None,
            })
    }

    #[test]
    fn multiple_server_defaults_are_normalized() {
        let store = with_methods(vec![card("pm-1", true), card("pm-2", true), card("pm-3", false)]);
        assert_eq!(defaults(&store), vec!["pm-1"]);
        assert_eq!(store.default_method().map(|m| m.id.as_str()), Some("pm-1"));
    }

    #[test]
    fn default_assignment_is_exclusive() {
        let store = with_methods(vec![card("pm-1", true), card("pm-2", false)]).apply(
            &PaymentEvent::DefaultAssigned {
                method_id: "pm-2".into(),
            },
        );
        assert_eq!(defaults(&store), vec!["pm-2"]);
        assert_eq!(store.default_method().map(|m| m.id.as_str()), Some("pm-2"));
    }

    #[test]
    fn default_assignment_to_unknown_method_is_noop() {
        let before = with_methods(vec![card("pm-1", true)]);
        let after = before.clone().apply(&PaymentEvent::DefaultAssigned {
            method_id: "pm-404".into(),
        });
        assert_eq!(after, before);
    }

    #[test]
    fn deleting_default_leaves_no_default() {
        let token = tok(PaymentOp::DeleteMethod, 2);
        let store = with_methods(vec![card("pm-1", true), card("pm-2", false)])
            .apply(&PaymentEvent::Requested(token))
            .apply(&PaymentEvent::MethodDeleted {
                token,
                id: "pm-1".into(),
            });
        assert!(store.default_method().is_none());
        assert!(defaults(&store).is_empty());
        assert_eq!(store.methods().len(), 1);
    }

    #[test]
    fn update_cannot_smuggle_in_a_second_default() {
        let token = tok(PaymentOp::UpdateMethod, 2);
        let store = with_methods(vec![card("pm-1", true), card("pm-2", false)])
            .apply(&PaymentEvent::Requested(token))
            .apply(&PaymentEvent::MethodUpdated {
                token,
                method: card("pm-2", true),
            });
        assert_eq!(defaults(&store), vec!["pm-1"]);
    }

    #[test]
    fn ticket_paid_prepends_to_history() {
        let token = tok(PaymentOp::PayTicket, 1);
        let store = PaymentStore::default()
            .apply(&PaymentEvent::Requested(token))
            .apply(&PaymentEvent::TicketPaid {
                token,
                payment: payment("P-1", "T-1", 7500),
            });
        assert_eq!(store.payments_for_ticket("T-1").len(), 1);
        assert!(!store.is_paying());
    }

    #[test]
    fn failed_pay_records_error() {
        let token = tok(PaymentOp::PayTicket, 1);
        let store = PaymentStore::default().apply(&PaymentEvent::Requested(token));
        assert!(store.is_paying());
        let store = store.apply(&PaymentEvent::Failed {
            token,
            message: "Ticket is under dispute".into(),
        });
        assert_eq!(store.error(), Some("Ticket is under dispute"));
        assert!(store.payments().is_empty());
    }
}
