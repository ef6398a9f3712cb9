//! Ticket store: the ticket collection plus the disputes raised against it.

use std::collections::HashMap;

use crate::collection::Collection;
use crate::domain::{
    Dispute, DisputeFilter, DisputeFilterField, PaymentHistoryEntry, Ticket, TicketFilter,
    TicketFilterField, TicketStatus,
};
use crate::lifecycle::{Lifecycle, LoadMode, OperationKind, RequestToken};
use crate::pagination::{PageMeta, PageRequest};

use super::Store;

/// Operation classes tracked by the ticket store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketOp {
    FetchTickets,
    FetchTicket,
    CreateTicket,
    UpdateTicket,
    DeleteTicket,
    FetchDisputes,
    FetchDispute,
    CreateDispute,
}

impl OperationKind for TicketOp {
    fn replaces_slot(self) -> bool {
        matches!(
            self,
            Self::FetchTickets | Self::FetchTicket | Self::FetchDisputes | Self::FetchDispute
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::FetchTickets => "fetch_tickets",
            Self::FetchTicket => "fetch_ticket",
            Self::CreateTicket => "create_ticket",
            Self::UpdateTicket => "update_ticket",
            Self::DeleteTicket => "delete_ticket",
            Self::FetchDisputes => "fetch_disputes",
            Self::FetchDispute => "fetch_dispute",
            Self::CreateDispute => "create_dispute",
        }
    }
}

/// Everything that can happen to the ticket store.
///
/// Terminal variants carry the [`RequestToken`] issued at `Requested`; the
/// reducer drops their payload if the token was superseded.
#[derive(Debug, Clone, PartialEq)]
pub enum TicketEvent {
    Requested(RequestToken<TicketOp>),
    Failed {
        token: RequestToken<TicketOp>,
        message: String,
    },
    TicketsLoaded {
        token: RequestToken<TicketOp>,
        request: PageRequest,
        items: Vec<Ticket>,
        meta: Option<PageMeta>,
    },
    TicketLoaded {
        token: RequestToken<TicketOp>,
        ticket: Ticket,
    },
    TicketCreated {
        token: RequestToken<TicketOp>,
        ticket: Ticket,
    },
    TicketUpdated {
        token: RequestToken<TicketOp>,
        ticket: Ticket,
    },
    TicketDeleted {
        token: RequestToken<TicketOp>,
        id: String,
    },
    DisputesLoaded {
        token: RequestToken<TicketOp>,
        request: PageRequest,
        items: Vec<Dispute>,
        meta: Option<PageMeta>,
    },
    DisputeLoaded {
        token: RequestToken<TicketOp>,
        dispute: Dispute,
    },
    DisputeCreated {
        token: RequestToken<TicketOp>,
        dispute: Dispute,
    },
    /// A completed payment was confirmed for `ticket_id`.
    PaymentRecorded {
        ticket_id: String,
        entry: PaymentHistoryEntry,
    },
    /// A dispute was accepted for `ticket_id`.
    DisputeAttached {
        ticket_id: String,
        dispute_id: String,
    },
    FilterSet(TicketFilterField),
    FiltersCleared,
    DisputeFilterSet(DisputeFilterField),
    DisputeFiltersCleared,
    ErrorCleared,
}

/// Local cache of tickets and disputes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketStore {
    tickets: Collection<Ticket, TicketFilter>,
    disputes: Collection<Dispute, DisputeFilter>,
    lifecycle: Lifecycle<TicketOp>,
}

impl Store for TicketStore {
    const NAME: &'static str = "tickets";

    type Op = TicketOp;
    type Event = TicketEvent;

    fn lifecycle(&self) -> &Lifecycle<TicketOp> {
        &self.lifecycle
    }

    fn admits(&self, kind: TicketOp, mode: LoadMode) -> bool {
        if mode != LoadMode::More {
            return true;
        }
        let has_next = match kind {
            TicketOp::FetchTickets => self.tickets.pagination().has_next_page(),
            TicketOp::FetchDisputes => self.disputes.pagination().has_next_page(),
            _ => false,
        };
        has_next && !self.lifecycle.is_fetching()
    }

    fn settles(event: &TicketEvent) -> Option<RequestToken<TicketOp>> {
        use TicketEvent::*;
        match event {
            Failed { token, .. }
            | TicketsLoaded { token, .. }
            | TicketLoaded { token, .. }
            | TicketCreated { token, .. }
            | TicketUpdated { token, .. }
            | TicketDeleted { token, .. }
            | DisputesLoaded { token, .. }
            | DisputeLoaded { token, .. }
            | DisputeCreated { token, .. } => Some(*token),
            _ => None,
        }
    }

    fn apply(mut self, event: &TicketEvent) -> Self {
        match event {
            TicketEvent::Requested(token) => self.lifecycle.begin(*token),
            TicketEvent::Failed { token, message } => {
                self.lifecycle.fail(*token, message.clone());
            }
            TicketEvent::TicketsLoaded {
                token,
                request,
                items,
                meta,
            } => {
                if self.lifecycle.succeed(*token) {
                    self.tickets.apply_page(*request, items.clone(), *meta);
                }
            }
            TicketEvent::TicketLoaded { token, ticket } => {
                if self.lifecycle.succeed(*token) {
                    self.tickets.set_current(ticket.clone());
                }
            }
            TicketEvent::TicketCreated { token, ticket } => {
                if self.lifecycle.succeed(*token) {
                    self.tickets.prepend(ticket.clone());
                }
            }
            TicketEvent::TicketUpdated { token, ticket } => {
                if self.lifecycle.succeed(*token) {
                    self.tickets.replace(ticket.clone());
                }
            }
            TicketEvent::TicketDeleted { token, id } => {
                if self.lifecycle.succeed(*token) {
                    self.tickets.remove(id);
                }
            }
            TicketEvent::DisputesLoaded {
                token,
                request,
                items,
                meta,
            } => {
                if self.lifecycle.succeed(*token) {
                    let items = self.forward_only(items);
                    self.disputes.apply_page(*request, items, *meta);
                }
            }
            TicketEvent::DisputeLoaded { token, dispute } => {
                if self.lifecycle.succeed(*token) {
                    let mut merged = self
                        .disputes
                        .find(&dispute.id)
                        .cloned()
                        .unwrap_or_else(|| dispute.clone());
                    if !merged.merge_from(dispute.clone()) {
                        warn_regression(&merged, dispute);
                    }
                    self.disputes.set_current(merged);
                }
            }
            TicketEvent::DisputeCreated { token, dispute } => {
                if self.lifecycle.succeed(*token) {
                    self.disputes.prepend(dispute.clone());
                }
            }
            TicketEvent::PaymentRecorded { ticket_id, entry } => {
                self.tickets
                    .modify(ticket_id, |ticket| ticket.record_payment(entry.clone()));
                self.lifecycle.clear_error();
            }
            TicketEvent::DisputeAttached {
                ticket_id,
                dispute_id,
            } => {
                self.tickets
                    .modify(ticket_id, |ticket| ticket.attach_dispute(dispute_id));
            }
            TicketEvent::FilterSet(field) => {
                self.tickets.set_filter(field.clone());
            }
            TicketEvent::FiltersCleared => self.tickets.clear_filter(),
            TicketEvent::DisputeFilterSet(field) => {
                self.disputes.set_filter(field.clone());
            }
            TicketEvent::DisputeFiltersCleared => self.disputes.clear_filter(),
            TicketEvent::ErrorCleared => self.lifecycle.clear_error(),
        }
        self
    }
}

impl TicketStore {
    /// The ticket collection.
    pub fn tickets(&self) -> &Collection<Ticket, TicketFilter> {
        &self.tickets
    }

    /// The dispute collection.
    pub fn disputes(&self) -> &Collection<Dispute, DisputeFilter> {
        &self.disputes
    }

    /// The selected ticket.
    pub fn current(&self) -> Option<&Ticket> {
        self.tickets.current()
    }

    /// Tickets visible under the active filter.
    pub fn filtered(&self) -> Vec<&Ticket> {
        self.tickets.filtered()
    }

    /// True while a fresh ticket or dispute load is outstanding.
    pub fn is_loading(&self) -> bool {
        self.lifecycle.is_loading()
    }

    /// True while a pagination continuation is outstanding.
    pub fn is_loading_more(&self) -> bool {
        self.lifecycle.is_loading_more()
    }

    /// Last recorded failure message.
    pub fn error(&self) -> Option<&str> {
        self.lifecycle.error()
    }

    /// Number of cached tickets in each status. Statuses with no tickets
    /// are omitted.
    pub fn counts_by_status(&self) -> HashMap<TicketStatus, usize> {
        let mut counts = HashMap::new();
        for ticket in self.tickets.items() {
            *counts.entry(ticket.status).or_insert(0) += 1;
        }
        counts
    }

    /// Sum owed across cached tickets that are neither paid, disputed, nor
    /// cancelled.
    pub fn outstanding_balance(&self) -> u64 {
        self.tickets
            .items()
            .iter()
            .filter(|t| t.status.is_owed())
            .map(|t| t.amount_cents)
            .sum()
    }

    /// Tickets still owed and past due at `now` (unix seconds).
    pub fn overdue(&self, now: u64) -> Vec<&Ticket> {
        self.tickets
            .items()
            .iter()
            .filter(|t| t.is_overdue_at(now))
            .collect()
    }

    /// The non-rejected dispute cached for `ticket_id`, if any.
    pub fn active_dispute(&self, ticket_id: &str) -> Option<&Dispute> {
        self.disputes
            .items()
            .iter()
            .chain(self.disputes.current())
            .find(|d| d.ticket_id == ticket_id && d.status.is_active())
    }

    /// Keep dispute statuses from moving backwards when a page arrives.
    fn forward_only(&self, incoming: &[Dispute]) -> Vec<Dispute> {
        incoming
            .iter()
            .map(|dispute| match self.disputes.find(&dispute.id) {
                Some(existing) => {
                    let mut merged = existing.clone();
                    if !merged.merge_from(dispute.clone()) {
                        warn_regression(&merged, dispute);
                    }
                    merged
                }
                None => dispute.clone(),
            })
            .collect()
    }
}

fn warn_regression(kept: &Dispute, incoming: &Dispute) {
    tracing::warn!(
        dispute_id = %kept.id,
        kept = ?kept.status,
        received = ?incoming.status,
        "ignoring dispute status regression"
    );
}
