//! The command surface on [`SyncHandle`].
//!
//! Every network command follows the same shape: validate the arguments,
//! begin a tracked operation through the actor, await the collaborator,
//! then settle the operation with either its payload or the failure
//! message. Validation failures return before anything is dispatched.

use std::future::Future;

use tracing::Instrument;

use crate::actor::SyncHandle;
use crate::api::{ApiPage, ApiResult};
use crate::collection::{Collection, Entity};
use crate::domain::{
    CancelSubscription, Dispute, DisputeFilterField, InfractionType, InfractionTypeFilterField,
    InfractionTypePatch, NewDispute, NewInfractionType, NewPaymentMethod, NewSubscription,
    NewTicket, PayTicket, Payment, PaymentFilterField, PaymentMethod, PaymentMethodPatch,
    Plan, Subscription, SubscriptionFilterField, SubscriptionPatch, Ticket, TicketFilterField,
    TicketPatch, TicketStatus,
};
use crate::error::{CommandError, ValidationError};
use crate::filter::FilterSpec;
use crate::lifecycle::{LoadMode, OperationKind, RequestToken, Settlement};
use crate::pagination::{PageRequest, Pagination};
use crate::store::{
    InfractionTypeEvent, InfractionTypeOp, PaymentEvent, PaymentOp, Store, SubscriptionEvent,
    SubscriptionOp, SyncEvent, SyncState, TicketEvent, TicketOp, TrackedOp,
};

/// What a collection fetch did to its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The page was written to the collection.
    Applied {
        /// Number of entities the server returned.
        received: usize,
    },
    /// The load guard refused a load-more: no next page, or a load was
    /// already in flight. No request was sent.
    Skipped,
    /// The response arrived after a newer request of the same kind (or
    /// after a reset) and was discarded.
    Superseded,
}

enum Outcome<T> {
    Skipped,
    Done { value: T, settlement: Option<Settlement> },
}

impl<T> Outcome<T> {
    fn into_fetch(self, received: impl FnOnce(&T) -> usize) -> FetchOutcome {
        match self {
            Self::Skipped => FetchOutcome::Skipped,
            Self::Done {
                value,
                settlement: None | Some(Settlement::Applied),
            } => FetchOutcome::Applied {
                received: received(&value),
            },
            Self::Done { .. } => FetchOutcome::Superseded,
        }
    }

    fn into_value(self, op: &'static str) -> Result<T, CommandError> {
        match self {
            Self::Skipped => Err(CommandError::NotAdmitted(op)),
            Self::Done { value, .. } => Ok(value),
        }
    }
}

fn fetch_mode(request: PageRequest) -> LoadMode {
    if request.is_fresh() {
        LoadMode::Fresh
    } else {
        LoadMode::More
    }
}

/// Which page a collection fetch asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageAt {
    /// A caller-chosen page.
    Exact(PageRequest),
    /// The page after the last one applied, resolved when the load begins.
    Next,
}

impl PageAt {
    fn mode(self) -> LoadMode {
        match self {
            Self::Exact(request) => fetch_mode(request),
            Self::Next => LoadMode::More,
        }
    }

    fn resolve(self, pagination: &Pagination, default_page_size: u32) -> PageRequest {
        match self {
            Self::Exact(request) => request,
            Self::Next => {
                let page_size = match pagination.page_size {
                    0 => default_page_size,
                    size => size,
                };
                PageRequest::new(pagination.next_page(), page_size)
            }
        }
    }
}

fn require_id(value: &str, what: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyId(what));
    }
    Ok(())
}

impl SyncHandle {
    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    /// Run one tracked operation: begin, await `call`, settle.
    ///
    /// `done` turns the successful payload into the terminal event. On
    /// failure the store records the error message and the error is
    /// returned to the caller as well.
    async fn execute<K, T, Fut, D>(
        &self,
        kind: K,
        mode: LoadMode,
        call: Fut,
        done: D,
    ) -> Result<Outcome<T>, CommandError>
    where
        K: TrackedOp,
        Fut: Future<Output = ApiResult<T>>,
        D: FnOnce(RequestToken<K>, &T) -> SyncEvent,
    {
        self.execute_planned(kind, mode, |_| (), |()| call, done).await
    }

    /// [`execute`](Self::execute) for calls whose arguments depend on the
    /// state the operation begins against. `plan` reads them at the head
    /// of the queue; `call` builds the request from them.
    async fn execute_planned<K, P, T, C, Fut, D>(
        &self,
        kind: K,
        mode: LoadMode,
        plan: impl FnOnce(&SyncState) -> P + Send + 'static,
        call: C,
        done: D,
    ) -> Result<Outcome<T>, CommandError>
    where
        K: TrackedOp,
        P: Send + 'static,
        C: FnOnce(P) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
        D: FnOnce(RequestToken<K>, &T) -> SyncEvent,
    {
        let store = <K::Store as Store>::NAME;
        let span = tracing::info_span!("command", store, op = kind.as_str());
        async move {
            let Some((token, planned)) = self.begin_with(kind, mode, plan).await? else {
                tracing::debug!(?mode, "operation not admitted");
                return Ok(Outcome::Skipped);
            };
            tracing::debug!(seq = token.seq, ?mode, "operation begun");

            match call(planned).await {
                Ok(value) => {
                    let settlement = self.settle(done(token, &value)).await?;
                    match settlement {
                        None | Some(Settlement::Applied) => {
                            tracing::info!(seq = token.seq, "operation applied");
                        }
                        Some(other) => {
                            tracing::debug!(seq = token.seq, settlement = ?other, "stale response discarded");
                        }
                    }
                    Ok(Outcome::Done { value, settlement })
                }
                Err(error) => {
                    tracing::warn!(seq = token.seq, %error, "operation failed");
                    self.settle(K::failed(token, error.message())).await?;
                    Err(CommandError::Api(error))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Load one page into the collection chosen by `collection`.
    ///
    /// The page number (for [`PageAt::Next`]) and the filter sent with the
    /// request are read from the state the load begins against, never from
    /// an earlier snapshot.
    async fn fetch_page<K, T, F, C, Fut, D>(
        &self,
        kind: K,
        at: PageAt,
        collection: fn(&SyncState) -> &Collection<T, F>,
        call: C,
        done: D,
    ) -> Result<FetchOutcome, CommandError>
    where
        K: TrackedOp,
        T: Entity,
        F: FilterSpec<T>,
        C: FnOnce(PageRequest, F) -> Fut,
        Fut: Future<Output = ApiResult<ApiPage<T>>>,
        D: FnOnce(RequestToken<K>, PageRequest, &ApiPage<T>) -> SyncEvent,
    {
        let default_page_size = self.config().default_page_size;
        let outcome = self
            .execute_planned(
                kind,
                at.mode(),
                move |state| {
                    let collection = collection(state);
                    let request = at.resolve(collection.pagination(), default_page_size);
                    (request, collection.filter().clone())
                },
                |(request, filter)| async move {
                    call(request, filter).await.map(|page| (request, page))
                },
                |token, loaded: &(PageRequest, ApiPage<T>)| done(token, loaded.0, &loaded.1),
            )
            .await?;
        Ok(outcome.into_fetch(|(_, page)| page.items.len()))
    }

    fn page_request(&self, page: u32, page_size: u32) -> Result<PageRequest, ValidationError> {
        let request = PageRequest::new(page, page_size);
        request.validate(self.config().max_page_size)?;
        Ok(request)
    }

    // -----------------------------------------------------------------------
    // Tickets
    // -----------------------------------------------------------------------

    /// Fetch one page of tickets under the current filter. Page 1 replaces
    /// the collection; later pages append.
    ///
    /// # Errors
    ///
    /// * [`CommandError::Validation`] -- page is 0 or page size is out of range.
    /// * [`CommandError::Api`] -- the collaborator failed.
    /// * [`CommandError::EngineGone`] -- the actor has exited.
    pub async fn fetch_tickets(&self, page: u32, page_size: u32) -> Result<FetchOutcome, CommandError> {
        let request = self.page_request(page, page_size)?;
        self.ticket_page(PageAt::Exact(request)).await
    }

    /// Fetch the page after the last one loaded, if one exists and no load
    /// is in flight.
    ///
    /// # Errors
    ///
    /// As [`fetch_tickets`](Self::fetch_tickets), minus validation.
    pub async fn load_more_tickets(&self) -> Result<FetchOutcome, CommandError> {
        self.ticket_page(PageAt::Next).await
    }

    async fn ticket_page(&self, at: PageAt) -> Result<FetchOutcome, CommandError> {
        let apis = self.apis();
        self.fetch_page(
            TicketOp::FetchTickets,
            at,
            |state| state.tickets().tickets(),
            move |request, filter| async move { apis.tickets.list_tickets(request, &filter).await },
            |token, request, page| {
                TicketEvent::TicketsLoaded {
                    token,
                    request,
                    items: page.items.clone(),
                    meta: page.pagination,
                }
                .into()
            },
        )
        .await
    }

    /// Fetch one ticket into the current slot.
    pub async fn fetch_ticket(&self, id: &str) -> Result<Ticket, CommandError> {
        require_id(id, "ticket id")?;
        self.execute(
            TicketOp::FetchTicket,
            LoadMode::Fresh,
            self.apis().tickets.get_ticket(id),
            |token, ticket: &Ticket| {
                TicketEvent::TicketLoaded {
                    token,
                    ticket: ticket.clone(),
                }
                .into()
            },
        )
        .await?
        .into_value(TicketOp::FetchTicket.as_str())
    }

    /// Create a ticket; it is prepended to the collection.
    pub async fn create_ticket(&self, body: &NewTicket) -> Result<Ticket, CommandError> {
        body.validate()?;
        self.execute(
            TicketOp::CreateTicket,
            LoadMode::Mutation,
            self.apis().tickets.create_ticket(body),
            |token, ticket: &Ticket| {
                TicketEvent::TicketCreated {
                    token,
                    ticket: ticket.clone(),
                }
                .into()
            },
        )
        .await?
        .into_value(TicketOp::CreateTicket.as_str())
    }

    /// Update a ticket. Both cached copies are replaced with the server's
    /// version; on failure both stay as they were.
    pub async fn update_ticket(&self, id: &str, patch: &TicketPatch) -> Result<Ticket, CommandError> {
        require_id(id, "ticket id")?;
        self.execute(
            TicketOp::UpdateTicket,
            LoadMode::Mutation,
            self.apis().tickets.update_ticket(id, patch),
            |token, ticket: &Ticket| {
                TicketEvent::TicketUpdated {
                    token,
                    ticket: ticket.clone(),
                }
                .into()
            },
        )
        .await?
        .into_value(TicketOp::UpdateTicket.as_str())
    }

    /// Delete a ticket from the server and both cached copies.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::EmptyId`] -- blank id.
    /// * [`CommandError::Api`] -- the collaborator failed.
    pub async fn delete_ticket(&self, id: &str) -> Result<(), CommandError> {
        require_id(id, "ticket id")?;
        self.execute(
            TicketOp::DeleteTicket,
            LoadMode::Mutation,
            self.apis().tickets.delete_ticket(id),
            |token, _: &()| {
                TicketEvent::TicketDeleted {
                    token,
                    id: id.to_string(),
                }
                .into()
            },
        )
        .await?
        .into_value(TicketOp::DeleteTicket.as_str())
    }

    /// Set one ticket filter field. Setting the current value is a no-op.
    pub async fn set_ticket_filter(&self, field: TicketFilterField) -> Result<(), CommandError> {
        self.local(TicketEvent::FilterSet(field).into()).await
    }

    /// Reset every ticket filter field.
    pub async fn clear_ticket_filters(&self) -> Result<(), CommandError> {
        self.local(TicketEvent::FiltersCleared.into()).await
    }

    /// Forget the ticket store's last error.
    pub async fn clear_ticket_error(&self) -> Result<(), CommandError> {
        self.local(TicketEvent::ErrorCleared.into()).await
    }

    // -----------------------------------------------------------------------
    // Disputes
    // -----------------------------------------------------------------------

    /// Fetch one page of disputes under the current dispute filter.
    ///
    /// # Errors
    ///
    /// As [`fetch_tickets`](Self::fetch_tickets).
    pub async fn fetch_disputes(&self, page: u32, page_size: u32) -> Result<FetchOutcome, CommandError> {
        let request = self.page_request(page, page_size)?;
        self.dispute_page(PageAt::Exact(request)).await
    }

    /// Fetch the next page of disputes, if any.
    ///
    /// # Errors
    ///
    /// As [`fetch_tickets`](Self::fetch_tickets), minus validation.
    pub async fn load_more_disputes(&self) -> Result<FetchOutcome, CommandError> {
        self.dispute_page(PageAt::Next).await
    }

    async fn dispute_page(&self, at: PageAt) -> Result<FetchOutcome, CommandError> {
        let apis = self.apis();
        self.fetch_page(
            TicketOp::FetchDisputes,
            at,
            |state| state.tickets().disputes(),
            move |request, filter| async move { apis.tickets.list_disputes(request, &filter).await },
            |token, request, page| {
                TicketEvent::DisputesLoaded {
                    token,
                    request,
                    items: page.items.clone(),
                    meta: page.pagination,
                }
                .into()
            },
        )
        .await
    }

    /// Fetch one dispute into the current dispute slot. A status older than
    /// the cached one is not applied.
    pub async fn fetch_dispute(&self, id: &str) -> Result<Dispute, CommandError> {
        require_id(id, "dispute id")?;
        self.execute(
            TicketOp::FetchDispute,
            LoadMode::Fresh,
            self.apis().tickets.get_dispute(id),
            |token, dispute: &Dispute| {
                TicketEvent::DisputeLoaded {
                    token,
                    dispute: dispute.clone(),
                }
                .into()
            },
        )
        .await?
        .into_value(TicketOp::FetchDispute.as_str())
    }

    /// Open a dispute against a ticket. On success the cached ticket is
    /// marked disputed in the same step.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::EmptyReason`] -- blank reason.
    /// * [`ValidationError::DisputeAlreadyActive`] -- the cached ticket is
    ///   already disputed or has a non-rejected dispute.
    /// * [`CommandError::Api`] -- the collaborator failed.
    pub async fn create_dispute(&self, ticket_id: &str, body: &NewDispute) -> Result<Dispute, CommandError> {
        require_id(ticket_id, "ticket id")?;
        if body.reason.trim().is_empty() {
            return Err(ValidationError::EmptyReason.into());
        }
        {
            let state = self.snapshot();
            let disputed = state
                .tickets()
                .tickets()
                .get(ticket_id)
                .is_some_and(|t| t.status == TicketStatus::Disputed);
            if disputed || state.tickets().active_dispute(ticket_id).is_some() {
                return Err(ValidationError::DisputeAlreadyActive {
                    ticket_id: ticket_id.to_string(),
                }
                .into());
            }
        }
        self.execute(
            TicketOp::CreateDispute,
            LoadMode::Mutation,
            self.apis().tickets.create_dispute(ticket_id, body),
            |token, dispute: &Dispute| {
                TicketEvent::DisputeCreated {
                    token,
                    dispute: dispute.clone(),
                }
                .into()
            },
        )
        .await?
        .into_value(TicketOp::CreateDispute.as_str())
    }

    /// Set one dispute filter field.
    pub async fn set_dispute_filter(&self, field: DisputeFilterField) -> Result<(), CommandError> {
        self.local(TicketEvent::DisputeFilterSet(field).into()).await
    }

    /// Reset every dispute filter field.
    pub async fn clear_dispute_filters(&self) -> Result<(), CommandError> {
        self.local(TicketEvent::DisputeFiltersCleared.into()).await
    }

    // -----------------------------------------------------------------------
    // Payments
    // -----------------------------------------------------------------------

    /// Fetch one page of payment history under the current payment filter.
    ///
    /// # Errors
    ///
    /// As [`fetch_tickets`](Self::fetch_tickets).
    pub async fn fetch_payments(&self, page: u32, page_size: u32) -> Result<FetchOutcome, CommandError> {
        let request = self.page_request(page, page_size)?;
        self.payment_page(PageAt::Exact(request)).await
    }

    /// Fetch the next page of payment history, if any.
    ///
    /// # Errors
    ///
    /// As [`fetch_tickets`](Self::fetch_tickets), minus validation.
    pub async fn load_more_payments(&self) -> Result<FetchOutcome, CommandError> {
        self.payment_page(PageAt::Next).await
    }

    async fn payment_page(&self, at: PageAt) -> Result<FetchOutcome, CommandError> {
        let apis = self.apis();
        self.fetch_page(
            PaymentOp::FetchPayments,
            at,
            |state| state.payments().payments(),
            move |request, filter| async move { apis.payments.list_payments(request, &filter).await },
            |token, request, page| {
                PaymentEvent::PaymentsLoaded {
                    token,
                    request,
                    items: page.items.clone(),
                    meta: page.pagination,
                }
                .into()
            },
        )
        .await
    }

    /// Fetch one payment into the current slot.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::EmptyId`] -- blank id.
    /// * [`CommandError::Api`] -- the collaborator failed.
    pub async fn fetch_payment(&self, id: &str) -> Result<Payment, CommandError> {
        require_id(id, "payment id")?;
        self.execute(
            PaymentOp::FetchPayment,
            LoadMode::Fresh,
            self.apis().payments.get_payment(id),
            |token, payment: &Payment| {
                PaymentEvent::PaymentLoaded {
                    token,
                    payment: payment.clone(),
                }
                .into()
            },
        )
        .await?
        .into_value(PaymentOp::FetchPayment.as_str())
    }

    /// Pay a ticket.
    ///
    /// A completed payment is recorded in the payments collection and the
    /// cached ticket is marked paid in the same step, without a refetch. A
    /// rejection is recorded in the payment store's error and the ticket is
    /// left untouched.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::EmptyId`] -- blank ticket id.
    /// * [`ValidationError::NonPositiveAmount`] -- zero amount.
    /// * [`CommandError::Api`] -- the collaborator failed or rejected the payment.
    pub async fn pay_ticket(&self, ticket_id: &str, body: &PayTicket) -> Result<Payment, CommandError> {
        require_id(ticket_id, "ticket id")?;
        if body.amount_cents == 0 {
            return Err(ValidationError::NonPositiveAmount.into());
        }
        self.execute(
            PaymentOp::PayTicket,
            LoadMode::Mutation,
            self.apis().payments.pay_ticket(ticket_id, body),
            |token, payment: &Payment| {
                PaymentEvent::TicketPaid {
                    token,
                    payment: payment.clone(),
                }
                .into()
            },
        )
        .await?
        .into_value(PaymentOp::PayTicket.as_str())
    }

    /// Fetch the first page of saved payment methods.
    pub async fn fetch_payment_methods(&self, page: u32, page_size: u32) -> Result<FetchOutcome, CommandError> {
        let request = self.page_request(page, page_size)?;
        let outcome = self
            .execute(
                PaymentOp::FetchMethods,
                fetch_mode(request),
                self.apis().payments.list_payment_methods(request),
                |token, page: &ApiPage<PaymentMethod>| {
                    PaymentEvent::MethodsLoaded {
                        token,
                        request,
                        items: page.items.clone(),
                        meta: page.pagination,
                    }
                    .into()
                },
            )
            .await?;
        Ok(outcome.into_fetch(|page| page.items.len()))
    }

    /// Save a payment method. When `body` asks for the default, the new
    /// method becomes the only default in the same step, whatever flag the
    /// server echoes back.
    pub async fn create_payment_method(&self, body: &NewPaymentMethod) -> Result<PaymentMethod, CommandError> {
        body.validate()?;
        self.execute(
            PaymentOp::CreateMethod,
            LoadMode::Mutation,
            self.apis().payments.create_payment_method(body),
            |token, method: &PaymentMethod| {
                PaymentEvent::MethodCreated {
                    token,
                    method: method.clone(),
                    set_default: body.is_default,
                }
                .into()
            },
        )
        .await?
        .into_value(PaymentOp::CreateMethod.as_str())
    }

    /// Update a saved payment method. The default flag is kept as cached;
    /// use [`set_default_payment_method`](Self::set_default_payment_method)
    /// to move it.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::InvalidExpiry`] -- expiry month out of range.
    /// * [`CommandError::Api`] -- the collaborator failed.
    pub async fn update_payment_method(
        &self,
        id: &str,
        patch: &PaymentMethodPatch,
    ) -> Result<PaymentMethod, CommandError> {
        require_id(id, "payment method id")?;
        patch.validate()?;
        self.execute(
            PaymentOp::UpdateMethod,
            LoadMode::Mutation,
            self.apis().payments.update_payment_method(id, patch),
            |token, method: &PaymentMethod| {
                PaymentEvent::MethodUpdated {
                    token,
                    method: method.clone(),
                }
                .into()
            },
        )
        .await?
        .into_value(PaymentOp::UpdateMethod.as_str())
    }

    /// Delete a saved payment method.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::EmptyId`] -- blank id.
    /// * [`CommandError::Api`] -- the collaborator failed.
    pub async fn delete_payment_method(&self, id: &str) -> Result<(), CommandError> {
        require_id(id, "payment method id")?;
        self.execute(
            PaymentOp::DeleteMethod,
            LoadMode::Mutation,
            self.apis().payments.delete_payment_method(id),
            |token, _: &()| {
                PaymentEvent::MethodDeleted {
                    token,
                    id: id.to_string(),
                }
                .into()
            },
        )
        .await?
        .into_value(PaymentOp::DeleteMethod.as_str())
    }

    /// Make `id` the only default payment method.
    pub async fn set_default_payment_method(&self, id: &str) -> Result<(), CommandError> {
        require_id(id, "payment method id")?;
        self.execute(
            PaymentOp::SetDefault,
            LoadMode::Mutation,
            self.apis().payments.set_default_payment_method(id),
            |token, _: &()| {
                PaymentEvent::DefaultSet {
                    token,
                    method_id: id.to_string(),
                }
                .into()
            },
        )
        .await?
        .into_value(PaymentOp::SetDefault.as_str())
    }

    /// Set one payment history filter field.
    pub async fn set_payment_filter(&self, field: PaymentFilterField) -> Result<(), CommandError> {
        self.local(PaymentEvent::FilterSet(field).into()).await
    }

    /// Reset every payment history filter field.
    pub async fn clear_payment_filters(&self) -> Result<(), CommandError> {
        self.local(PaymentEvent::FiltersCleared.into()).await
    }

    /// Forget the payment store's last error.
    pub async fn clear_payment_error(&self) -> Result<(), CommandError> {
        self.local(PaymentEvent::ErrorCleared.into()).await
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Fetch the plan catalog. Always replaces the cached plans.
    pub async fn fetch_plans(&self) -> Result<FetchOutcome, CommandError> {
        let outcome = self
            .execute(
                SubscriptionOp::FetchPlans,
                LoadMode::Fresh,
                self.apis().subscriptions.list_plans(),
                |token, plans: &Vec<Plan>| {
                    SubscriptionEvent::PlansLoaded {
                        token,
                        plans: plans.clone(),
                    }
                    .into()
                },
            )
            .await?;
        Ok(outcome.into_fetch(Vec::len))
    }

    /// Fetch one page of subscriptions under the current filter.
    ///
    /// # Errors
    ///
    /// As [`fetch_tickets`](Self::fetch_tickets).
    pub async fn fetch_subscriptions(&self, page: u32, page_size: u32) -> Result<FetchOutcome, CommandError> {
        let request = self.page_request(page, page_size)?;
        self.subscription_page(PageAt::Exact(request)).await
    }

    /// Fetch the next page of subscriptions, if any.
    ///
    /// # Errors
    ///
    /// As [`fetch_tickets`](Self::fetch_tickets), minus validation.
    pub async fn load_more_subscriptions(&self) -> Result<FetchOutcome, CommandError> {
        self.subscription_page(PageAt::Next).await
    }

    async fn subscription_page(&self, at: PageAt) -> Result<FetchOutcome, CommandError> {
        let apis = self.apis();
        self.fetch_page(
            SubscriptionOp::FetchSubscriptions,
            at,
            |state| state.subscriptions().subscriptions(),
            move |request, filter| async move {
                apis.subscriptions.list_subscriptions(request, &filter).await
            },
            |token, request, page| {
                SubscriptionEvent::SubscriptionsLoaded {
                    token,
                    request,
                    items: page.items.clone(),
                    meta: page.pagination,
                }
                .into()
            },
        )
        .await
    }

    /// Fetch the user's current subscription into the current slot. `None`
    /// empties the slot.
    pub async fn fetch_current_subscription(&self) -> Result<Option<Subscription>, CommandError> {
        self.execute(
            SubscriptionOp::FetchCurrent,
            LoadMode::Fresh,
            self.apis().subscriptions.current_subscription(),
            |token, subscription: &Option<Subscription>| {
                SubscriptionEvent::CurrentLoaded {
                    token,
                    subscription: subscription.clone(),
                }
                .into()
            },
        )
        .await?
        .into_value(SubscriptionOp::FetchCurrent.as_str())
    }

    /// Subscribe to a plan.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::EmptyField`] -- blank plan id.
    /// * [`CommandError::Api`] -- the collaborator failed.
    pub async fn create_subscription(&self, body: &NewSubscription) -> Result<Subscription, CommandError> {
        if body.plan_id.trim().is_empty() {
            return Err(ValidationError::EmptyField("plan id").into());
        }
        self.execute(
            SubscriptionOp::Create,
            LoadMode::Mutation,
            self.apis().subscriptions.create_subscription(body),
            |token, subscription: &Subscription| {
                SubscriptionEvent::Created {
                    token,
                    subscription: subscription.clone(),
                }
                .into()
            },
        )
        .await?
        .into_value(SubscriptionOp::Create.as_str())
    }

    /// Change a subscription, typically its plan.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::EmptyField`] -- the patch names a blank plan id.
    /// * [`CommandError::Api`] -- the collaborator failed.
    pub async fn update_subscription(
        &self,
        id: &str,
        patch: &SubscriptionPatch,
    ) -> Result<Subscription, CommandError> {
        require_id(id, "subscription id")?;
        if patch.plan_id.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(ValidationError::EmptyField("plan id").into());
        }
        self.change_subscription(
            SubscriptionOp::Update,
            self.apis().subscriptions.update_subscription(id, patch),
        )
        .await
    }

    /// Cancel a subscription, either now or at the end of the billing
    /// period.
    pub async fn cancel_subscription(
        &self,
        id: &str,
        at_period_end: bool,
    ) -> Result<Subscription, CommandError> {
        require_id(id, "subscription id")?;
        let body = CancelSubscription { at_period_end };
        self.change_subscription(
            SubscriptionOp::Cancel,
            self.apis().subscriptions.cancel_subscription(id, &body),
        )
        .await
    }

    /// Undo a pending cancellation.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::EmptyId`] -- blank id.
    /// * [`CommandError::Api`] -- the collaborator failed.
    pub async fn reactivate_subscription(&self, id: &str) -> Result<Subscription, CommandError> {
        require_id(id, "subscription id")?;
        self.change_subscription(
            SubscriptionOp::Reactivate,
            self.apis().subscriptions.reactivate_subscription(id),
        )
        .await
    }

    async fn change_subscription(
        &self,
        kind: SubscriptionOp,
        call: impl Future<Output = ApiResult<Subscription>>,
    ) -> Result<Subscription, CommandError> {
        self.execute(kind, LoadMode::Mutation, call, |token, subscription: &Subscription| {
            SubscriptionEvent::Changed {
                token,
                subscription: subscription.clone(),
            }
            .into()
        })
        .await?
        .into_value(kind.as_str())
    }

    /// Set one subscription filter field.
    pub async fn set_subscription_filter(&self, field: SubscriptionFilterField) -> Result<(), CommandError> {
        self.local(SubscriptionEvent::FilterSet(field).into()).await
    }

    /// Reset every subscription filter field.
    pub async fn clear_subscription_filters(&self) -> Result<(), CommandError> {
        self.local(SubscriptionEvent::FiltersCleared.into()).await
    }

    /// Forget the subscription store's last error.
    pub async fn clear_subscription_error(&self) -> Result<(), CommandError> {
        self.local(SubscriptionEvent::ErrorCleared.into()).await
    }

    // -----------------------------------------------------------------------
    // Infraction-type catalog
    // -----------------------------------------------------------------------

    /// Fetch one page of the catalog under the current catalog filter.
    ///
    /// # Errors
    ///
    /// As [`fetch_tickets`](Self::fetch_tickets).
    pub async fn fetch_infraction_types(&self, page: u32, page_size: u32) -> Result<FetchOutcome, CommandError> {
        let request = self.page_request(page, page_size)?;
        self.infraction_type_page(PageAt::Exact(request)).await
    }

    /// Fetch the next page of the catalog, if any.
    ///
    /// # Errors
    ///
    /// As [`fetch_tickets`](Self::fetch_tickets), minus validation.
    pub async fn load_more_infraction_types(&self) -> Result<FetchOutcome, CommandError> {
        self.infraction_type_page(PageAt::Next).await
    }

    async fn infraction_type_page(&self, at: PageAt) -> Result<FetchOutcome, CommandError> {
        let apis = self.apis();
        self.fetch_page(
            InfractionTypeOp::FetchAll,
            at,
            |state| state.infraction_types().entries(),
            move |request, filter| async move {
                apis.infraction_types
                    .list_infraction_types(request, &filter)
                    .await
            },
            |token, request, page| {
                InfractionTypeEvent::Loaded {
                    token,
                    request,
                    items: page.items.clone(),
                    meta: page.pagination,
                }
                .into()
            },
        )
        .await
    }

    /// Fetch one catalog entry into the current slot.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::EmptyId`] -- blank id.
    /// * [`CommandError::Api`] -- the collaborator failed.
    pub async fn fetch_infraction_type(&self, id: &str) -> Result<InfractionType, CommandError> {
        require_id(id, "infraction type id")?;
        self.execute(
            InfractionTypeOp::FetchOne,
            LoadMode::Fresh,
            self.apis().infraction_types.get_infraction_type(id),
            |token, entry: &InfractionType| {
                InfractionTypeEvent::OneLoaded {
                    token,
                    entry: entry.clone(),
                }
                .into()
            },
        )
        .await?
        .into_value(InfractionTypeOp::FetchOne.as_str())
    }

    /// Add a catalog entry.
    ///
    /// # Errors
    ///
    /// * [`CommandError::Validation`] -- blank code or label, or a zero fine.
    /// * [`CommandError::Api`] -- the collaborator failed.
    pub async fn create_infraction_type(
        &self,
        body: &NewInfractionType,
    ) -> Result<InfractionType, CommandError> {
        body.validate()?;
        self.execute(
            InfractionTypeOp::Create,
            LoadMode::Mutation,
            self.apis().infraction_types.create_infraction_type(body),
            |token, entry: &InfractionType| {
                InfractionTypeEvent::Created {
                    token,
                    entry: entry.clone(),
                }
                .into()
            },
        )
        .await?
        .into_value(InfractionTypeOp::Create.as_str())
    }

    /// Update a catalog entry.
    ///
    /// # Errors
    ///
    /// * [`CommandError::Validation`] -- a blank label or a zero fine in the patch.
    /// * [`CommandError::Api`] -- the collaborator failed.
    pub async fn update_infraction_type(
        &self,
        id: &str,
        patch: &InfractionTypePatch,
    ) -> Result<InfractionType, CommandError> {
        require_id(id, "infraction type id")?;
        if patch
            .labels
            .as_ref()
            .is_some_and(|labels| labels.values().any(|l| l.trim().is_empty()))
        {
            return Err(ValidationError::EmptyField("label").into());
        }
        if patch.base_fine_cents == Some(0) {
            return Err(ValidationError::NonPositiveAmount.into());
        }
        self.execute(
            InfractionTypeOp::Update,
            LoadMode::Mutation,
            self.apis().infraction_types.update_infraction_type(id, patch),
            |token, entry: &InfractionType| {
                InfractionTypeEvent::Updated {
                    token,
                    entry: entry.clone(),
                }
                .into()
            },
        )
        .await?
        .into_value(InfractionTypeOp::Update.as_str())
    }

    /// Remove a catalog entry.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::EmptyId`] -- blank id.
    /// * [`CommandError::Api`] -- the collaborator failed.
    pub async fn delete_infraction_type(&self, id: &str) -> Result<(), CommandError> {
        require_id(id, "infraction type id")?;
        self.execute(
            InfractionTypeOp::Delete,
            LoadMode::Mutation,
            self.apis().infraction_types.delete_infraction_type(id),
            |token, _: &()| {
                InfractionTypeEvent::Deleted {
                    token,
                    id: id.to_string(),
                }
                .into()
            },
        )
        .await?
        .into_value(InfractionTypeOp::Delete.as_str())
    }

    /// Set one catalog filter field.
    pub async fn set_infraction_type_filter(
        &self,
        field: InfractionTypeFilterField,
    ) -> Result<(), CommandError> {
        self.local(InfractionTypeEvent::FilterSet(field).into()).await
    }

    /// Reset every catalog filter field.
    pub async fn clear_infraction_type_filters(&self) -> Result<(), CommandError> {
        self.local(InfractionTypeEvent::FiltersCleared.into()).await
    }

    /// Forget the catalog store's last error.
    pub async fn clear_infraction_type_error(&self) -> Result<(), CommandError> {
        self.local(InfractionTypeEvent::ErrorCleared.into()).await
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    /// Return every store to its empty state. Responses to operations begun
    /// before the reset are discarded when they arrive.
    pub async fn reset(&self) -> Result<(), CommandError> {
        tracing::info!("resetting sync state");
        self.local(SyncEvent::Reset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_mode_follows_page_number() {
        assert_eq!(fetch_mode(PageRequest::new(1, 20)), LoadMode::Fresh);
        assert_eq!(fetch_mode(PageRequest::new(2, 20)), LoadMode::More);
    }

    #[test]
    fn next_page_continues_from_last_applied() {
        let pagination = Pagination {
            page: 2,
            page_size: 10,
            ..Pagination::default()
        };
        assert_eq!(PageAt::Next.resolve(&pagination, 20), PageRequest::new(3, 10));
        assert_eq!(PageAt::Next.mode(), LoadMode::More);
    }

    #[test]
    fn next_page_before_any_load_uses_default_size() {
        assert_eq!(
            PageAt::Next.resolve(&Pagination::default(), 20),
            PageRequest::new(1, 20)
        );
    }

    #[test]
    fn exact_page_ignores_pagination() {
        let exact = PageAt::Exact(PageRequest::new(1, 5));
        let pagination = Pagination {
            page: 4,
            page_size: 10,
            ..Pagination::default()
        };
        assert_eq!(exact.resolve(&pagination, 20), PageRequest::new(1, 5));
        assert_eq!(exact.mode(), LoadMode::Fresh);
    }

    #[test]
    fn outcome_maps_settlement_to_fetch_result() {
        let done = |settlement| Outcome::Done {
            value: vec![1, 2, 3],
            settlement,
        };
        assert_eq!(
            done(Some(Settlement::Applied)).into_fetch(Vec::len),
            FetchOutcome::Applied { received: 3 }
        );
        assert_eq!(
            done(Some(Settlement::Superseded)).into_fetch(Vec::len),
            FetchOutcome::Superseded
        );
        assert_eq!(
            done(Some(Settlement::Unknown)).into_fetch(Vec::len),
            FetchOutcome::Superseded
        );
        assert_eq!(
            Outcome::<Vec<u8>>::Skipped.into_fetch(Vec::len),
            FetchOutcome::Skipped
        );
    }

    #[test]
    fn skipped_entity_command_reports_op() {
        let err = Outcome::<()>::Skipped
            .into_value("fetch_ticket")
            .expect_err("should fail");
        assert_eq!(err, CommandError::NotAdmitted("fetch_ticket"));
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert_eq!(
            require_id("  ", "ticket id"),
            Err(ValidationError::EmptyId("ticket id"))
        );
        assert!(require_id("T-1", "ticket id").is_ok());
    }
}
