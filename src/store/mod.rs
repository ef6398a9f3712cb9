//! Per-domain entity stores and the root state that holds them.
//!
//! Each store is a plain value with a pure reducer
//! ([`Store::apply`]). [`SyncState`] groups the four stores and routes a
//! [`SyncEvent`] to the one it names; [`SyncState::dispatch`] additionally
//! runs the consistency rules in [`crate::coordinator`] so a trigger and its
//! cross-store effects land as one step.

pub mod infraction_type;
pub mod payment;
pub mod subscription;
pub mod ticket;

use std::fmt::Debug;

use crate::coordinator;
use crate::lifecycle::{Lifecycle, LoadMode, OperationKind, RequestToken, Settlement};

pub use infraction_type::{InfractionTypeEvent, InfractionTypeOp, InfractionTypeStore};
pub use payment::{PaymentEvent, PaymentOp, PaymentStore};
pub use subscription::{SubscriptionEvent, SubscriptionOp, SubscriptionStore};
pub use ticket::{TicketEvent, TicketOp, TicketStore};

/// A per-domain entity store.
///
/// # Contract
///
/// - [`apply`](Store::apply) must be a pure, total function: it takes the
///   current state by value and returns the next one. Collection writes
///   for a terminal event happen only when the event's token settles as
///   applied.
/// - [`settles`](Store::settles) returns the token of every terminal event
///   and `None` for everything else.
pub trait Store: Default + Clone + Debug + PartialEq + Send + Sync + 'static {
    /// Short name used in log fields.
    const NAME: &'static str;

    /// Operation classes this store tracks.
    type Op: OperationKind;

    /// Typed events this store reduces.
    type Event: Clone + Debug + PartialEq + Send + Sync + 'static;

    /// The store's lifecycle tracker.
    fn lifecycle(&self) -> &Lifecycle<Self::Op>;

    /// Whether an operation of `kind` in `mode` may begin now.
    ///
    /// A load-more is refused when no next page exists or any read is
    /// already in flight in this store.
    fn admits(&self, kind: Self::Op, mode: LoadMode) -> bool;

    /// The token a terminal event settles, if it is one.
    fn settles(event: &Self::Event) -> Option<RequestToken<Self::Op>>;

    /// Apply one event to produce the next state.
    fn apply(self, event: &Self::Event) -> Self;

    /// How `event` would settle against the current state, without
    /// applying it. `None` for non-terminal events.
    fn settlement(&self, event: &Self::Event) -> Option<Settlement> {
        Self::settles(event).map(|token| self.lifecycle().peek(&token))
    }
}

/// An operation class that knows which store it belongs to and how to
/// phrase its non-payload lifecycle events.
pub trait TrackedOp: OperationKind {
    /// Owning store.
    type Store: Store<Op = Self>;

    /// The owning store within the root state.
    fn store(state: &SyncState) -> &Self::Store;

    /// `Requested` event for `token`.
    fn requested(token: RequestToken<Self>) -> SyncEvent;

    /// `Failed` event for `token`.
    fn failed(token: RequestToken<Self>, message: String) -> SyncEvent;
}

macro_rules! tracked_op {
    ($op:ty, $store:ty, $field:ident, $variant:ident, $event:ident) => {
        impl TrackedOp for $op {
            type Store = $store;

            fn store(state: &SyncState) -> &$store {
                &state.$field
            }

            fn requested(token: RequestToken<Self>) -> SyncEvent {
                SyncEvent::$variant($event::Requested(token))
            }

            fn failed(token: RequestToken<Self>, message: String) -> SyncEvent {
                SyncEvent::$variant($event::Failed { token, message })
            }
        }

        impl From<$event> for SyncEvent {
            fn from(event: $event) -> Self {
                SyncEvent::$variant(event)
            }
        }
    };
}

tracked_op!(TicketOp, TicketStore, tickets, Ticket, TicketEvent);
tracked_op!(PaymentOp, PaymentStore, payments, Payment, PaymentEvent);
tracked_op!(
    SubscriptionOp,
    SubscriptionStore,
    subscriptions,
    Subscription,
    SubscriptionEvent
);
tracked_op!(
    InfractionTypeOp,
    InfractionTypeStore,
    infraction_types,
    InfractionType,
    InfractionTypeEvent
);

/// An event addressed to exactly one store, or a whole-state reset.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Ticket(TicketEvent),
    Payment(PaymentEvent),
    Subscription(SubscriptionEvent),
    InfractionType(InfractionTypeEvent),
    /// Session teardown: every store returns to its empty default.
    Reset,
}

/// Root state: one instance of every store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    tickets: TicketStore,
    payments: PaymentStore,
    subscriptions: SubscriptionStore,
    infraction_types: InfractionTypeStore,
}

impl SyncState {
    /// Ticket and dispute store.
    pub fn tickets(&self) -> &TicketStore {
        &self.tickets
    }

    /// Payment and payment method store.
    pub fn payments(&self) -> &PaymentStore {
        &self.payments
    }

    /// Plan and subscription store.
    pub fn subscriptions(&self) -> &SubscriptionStore {
        &self.subscriptions
    }

    /// Infraction-type catalog store.
    pub fn infraction_types(&self) -> &InfractionTypeStore {
        &self.infraction_types
    }

    /// How `event` would settle, without applying it.
    pub fn settlement(&self, event: &SyncEvent) -> Option<Settlement> {
        match event {
            SyncEvent::Ticket(e) => self.tickets.settlement(e),
            SyncEvent::Payment(e) => self.payments.settlement(e),
            SyncEvent::Subscription(e) => self.subscriptions.settlement(e),
            SyncEvent::InfractionType(e) => self.infraction_types.settlement(e),
            SyncEvent::Reset => None,
        }
    }

    /// Route `event` to its store. No consistency rules run.
    pub fn apply(mut self, event: &SyncEvent) -> Self {
        match event {
            SyncEvent::Ticket(e) => self.tickets = self.tickets.apply(e),
            SyncEvent::Payment(e) => self.payments = self.payments.apply(e),
            SyncEvent::Subscription(e) => self.subscriptions = self.subscriptions.apply(e),
            SyncEvent::InfractionType(e) => {
                self.infraction_types = self.infraction_types.apply(e);
            }
            SyncEvent::Reset => return Self::default(),
        }
        self
    }

    /// Apply `event`, then every follow-up the coordinator derives from it.
    ///
    /// Follow-ups only run when the trigger settled as applied (or was not
    /// a terminal event at all). Returns the trigger's settlement.
    pub fn dispatch(self, event: &SyncEvent) -> (Self, Option<Settlement>) {
        let settlement = self.settlement(event);
        let mut state = self.apply(event);
        if settlement.is_none_or(|s| s == Settlement::Applied) {
            for reaction in coordinator::react(&state, event) {
                tracing::debug!(rule = reaction.rule.as_str(), "consistency rule applied");
                state = state.apply(&reaction.event);
            }
        }
        (state, settlement)
    }
}
