//! Cross-entity consistency coordinator.
//!
//! Every cross-store write is one of the named [`Rule`]s below. A rule reacts
//! to an applied terminal event and produces follow-up events that the root
//! reducer applies in the same step, so readers never observe the trigger
//! without its effects. Rules never fetch: when the target entity is not
//! cached locally the rule is a no-op.

use crate::domain::{PaymentHistoryEntry, PaymentStatus};
use crate::store::{PaymentEvent, SyncEvent, SyncState, TicketEvent};

/// The complete set of consistency rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    /// A completed payment marks its ticket paid and extends its history.
    PaymentSettlesTicket,
    /// A created dispute marks its ticket disputed and links the dispute.
    DisputeFlagsTicket,
    /// A new default payment method clears every other default.
    DefaultMethodIsExclusive,
}

impl Rule {
    /// Every rule, in evaluation order.
    pub const ALL: [Rule; 3] = [
        Self::PaymentSettlesTicket,
        Self::DisputeFlagsTicket,
        Self::DefaultMethodIsExclusive,
    ];

    /// Short name used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PaymentSettlesTicket => "payment_settles_ticket",
            Self::DisputeFlagsTicket => "dispute_flags_ticket",
            Self::DefaultMethodIsExclusive => "default_method_is_exclusive",
        }
    }
}

/// One follow-up event produced by a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    /// Rule that produced the event.
    pub rule: Rule,
    /// Event to apply.
    pub event: SyncEvent,
}

/// Derive the follow-ups for `trigger`.
///
/// `state` is the root state with `trigger` already applied. Deterministic:
/// the same state and trigger always produce the same reactions.
pub fn react(state: &SyncState, trigger: &SyncEvent) -> Vec<Reaction> {
    match trigger {
        SyncEvent::Payment(PaymentEvent::TicketPaid { payment, .. }) => {
            if payment.status != PaymentStatus::Completed {
                tracing::debug!(
                    payment_id = %payment.id,
                    status = payment.status.as_str(),
                    "payment not completed, ticket left as is"
                );
                return Vec::new();
            }
            if !state.tickets().tickets().contains(&payment.ticket_id) {
                no_op(Rule::PaymentSettlesTicket, &payment.ticket_id);
                return Vec::new();
            }
            vec![Reaction {
                rule: Rule::PaymentSettlesTicket,
                event: TicketEvent::PaymentRecorded {
                    ticket_id: payment.ticket_id.clone(),
                    entry: PaymentHistoryEntry {
                        payment_id: payment.id.clone(),
                        amount_cents: payment.amount_cents,
                        paid_at: payment.created_at,
                    },
                }
                .into(),
            }]
        }
        SyncEvent::Ticket(TicketEvent::DisputeCreated { dispute, .. }) => {
            if !state.tickets().tickets().contains(&dispute.ticket_id) {
                no_op(Rule::DisputeFlagsTicket, &dispute.ticket_id);
                return Vec::new();
            }
            vec![Reaction {
                rule: Rule::DisputeFlagsTicket,
                event: TicketEvent::DisputeAttached {
                    ticket_id: dispute.ticket_id.clone(),
                    dispute_id: dispute.id.clone(),
                }
                .into(),
            }]
        }
        SyncEvent::Payment(PaymentEvent::DefaultSet { method_id, .. }) => {
            default_assigned(state, method_id)
        }
        SyncEvent::Payment(PaymentEvent::MethodCreated {
            method,
            set_default,
            ..
        }) if *set_default || method.is_default => {
            default_assigned(state, &method.id)
        }
        _ => Vec::new(),
    }
}

fn default_assigned(state: &SyncState, method_id: &str) -> Vec<Reaction> {
    if !state.payments().methods().contains(method_id) {
        no_op(Rule::DefaultMethodIsExclusive, method_id);
        return Vec::new();
    }
    vec![Reaction {
        rule: Rule::DefaultMethodIsExclusive,
        event: PaymentEvent::DefaultAssigned {
            method_id: method_id.to_string(),
        }
        .into(),
    }]
}

fn no_op(rule: Rule, entity_id: &str) {
    tracing::debug!(rule = rule.as_str(), entity_id, "consistency no-op: target not cached");
}
