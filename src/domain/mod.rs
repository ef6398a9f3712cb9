//! Server-owned entity types, their payloads, and their filters.
//!
//! Each module defines one domain (entity, status enum, request bodies,
//! filter specification).

pub mod dispute;
pub mod infraction_type;
pub mod payment;
pub mod subscription;
pub mod ticket;

pub use dispute::{Dispute, DisputeFilter, DisputeFilterField, DisputeStatus, NewDispute};
pub use infraction_type::{
    InfractionCategory, InfractionType, InfractionTypeFilter, InfractionTypeFilterField,
    InfractionTypePatch, Locale, NewInfractionType,
};
pub use payment::{
    NewPaymentMethod, PayTicket, Payment, PaymentFilter, PaymentFilterField, PaymentMethod,
    PaymentMethodPatch, PaymentStatus,
};
pub use subscription::{
    BillingInterval, CancelSubscription, NewSubscription, Plan, Subscription, SubscriptionFilter,
    SubscriptionFilterField, SubscriptionPatch, SubscriptionStatus,
};
pub use ticket::{
    NewTicket, PaymentHistoryEntry, Ticket, TicketFilter, TicketFilterField, TicketPatch,
    TicketStatus,
};
