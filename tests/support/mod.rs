//! Scripted in-memory network collaborator shared by the integration tests.
//!
//! Every API method pops the next scripted result for its name, counts the
//! call, and optionally waits on a gate so tests can force responses to
//! complete out of order.

#![allow(dead_code)]

use std::any::Any;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use ticket_sync::api::{
    ApiPage, ApiResult, InfractionTypeApi, PaymentApi, SubscriptionApi, TicketApi,
};
use ticket_sync::domain::{
    BillingInterval, CancelSubscription, Dispute, DisputeFilter, DisputeStatus,
    InfractionCategory, InfractionType, InfractionTypeFilter, InfractionTypePatch, Locale,
    NewDispute, NewInfractionType, NewPaymentMethod, NewSubscription, NewTicket, PayTicket,
    Payment, PaymentFilter, PaymentMethod, PaymentMethodPatch, PaymentStatus, Plan,
    Subscription, SubscriptionFilter, SubscriptionPatch, SubscriptionStatus, Ticket,
    TicketFilter, TicketPatch, TicketStatus,
};
use ticket_sync::pagination::{PageMeta, PageRequest};
use ticket_sync::{ApiError, SyncEngine, SyncHandle};

type Scripted = Box<dyn Any + Send>;

/// Fake for every API trait.
#[derive(Default)]
pub struct FakeApi {
    scripts: Mutex<HashMap<&'static str, VecDeque<Scripted>>>,
    gates: Mutex<HashMap<&'static str, VecDeque<Arc<Notify>>>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the result of the next call to `op`.
    pub fn script<T: Send + 'static>(&self, op: &'static str, result: ApiResult<T>) {
        self.scripts
            .lock()
            .expect("scripts lock")
            .entry(op)
            .or_default()
            .push_back(Box::new(result));
    }

    /// Hold the next call to `op` until the returned gate is notified.
    pub fn gate(&self, op: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .expect("gates lock")
            .entry(op)
            .or_default()
            .push_back(Arc::clone(&gate));
        gate
    }

    /// How many times `op` was called.
    pub fn calls(&self, op: &'static str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(op)
            .copied()
            .unwrap_or(0)
    }

    /// Total number of calls across every operation.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("calls lock").values().sum()
    }

    /// Yield until `op` has been called `n` times.
    pub async fn wait_for_calls(&self, op: &'static str, n: usize) {
        while self.calls(op) < n {
            tokio::task::yield_now().await;
        }
    }

    async fn respond<T: Send + 'static>(&self, op: &'static str) -> ApiResult<T> {
        *self.calls.lock().expect("calls lock").entry(op).or_default() += 1;
        let scripted = self
            .scripts
            .lock()
            .expect("scripts lock")
            .get_mut(op)
            .and_then(VecDeque::pop_front);
        let gate = self
            .gates
            .lock()
            .expect("gates lock")
            .get_mut(op)
            .and_then(VecDeque::pop_front);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match scripted {
            Some(result) => *result
                .downcast::<ApiResult<T>>()
                .expect("scripted result has the wrong type"),
            None => Err(ApiError::server(format!("no scripted response for {op}"))),
        }
    }
}

#[async_trait]
impl TicketApi for FakeApi {
    async fn list_tickets(&self, _: PageRequest, _: &TicketFilter) -> ApiResult<ApiPage<Ticket>> {
        self.respond("list_tickets").await
    }

    async fn get_ticket(&self, _: &str) -> ApiResult<Ticket> {
        self.respond("get_ticket").await
    }

    async fn create_ticket(&self, _: &NewTicket) -> ApiResult<Ticket> {
        self.respond("create_ticket").await
    }

    async fn update_ticket(&self, _: &str, _: &TicketPatch) -> ApiResult<Ticket> {
        self.respond("update_ticket").await
    }

    async fn delete_ticket(&self, _: &str) -> ApiResult<()> {
        self.respond("delete_ticket").await
    }

    async fn list_disputes(
        &self,
        _: PageRequest,
        _: &DisputeFilter,
    ) -> ApiResult<ApiPage<Dispute>> {
        self.respond("list_disputes").await
    }

    async fn get_dispute(&self, _: &str) -> ApiResult<Dispute> {
        self.respond("get_dispute").await
    }

    async fn create_dispute(&self, _: &str, _: &NewDispute) -> ApiResult<Dispute> {
        self.respond("create_dispute").await
    }
}

#[async_trait]
impl PaymentApi for FakeApi {
    async fn list_payments(
        &self,
        _: PageRequest,
        _: &PaymentFilter,
    ) -> ApiResult<ApiPage<Payment>> {
        self.respond("list_payments").await
    }

    async fn get_payment(&self, _: &str) -> ApiResult<Payment> {
        self.respond("get_payment").await
    }

    async fn pay_ticket(&self, _: &str, _: &PayTicket) -> ApiResult<Payment> {
        self.respond("pay_ticket").await
    }

    async fn list_payment_methods(&self, _: PageRequest) -> ApiResult<ApiPage<PaymentMethod>> {
        self.respond("list_payment_methods").await
    }

    async fn create_payment_method(&self, _: &NewPaymentMethod) -> ApiResult<PaymentMethod> {
        self.respond("create_payment_method").await
    }

    async fn update_payment_method(
        &self,
        _: &str,
        _: &PaymentMethodPatch,
    ) -> ApiResult<PaymentMethod> {
        self.respond("update_payment_method").await
    }

    async fn delete_payment_method(&self, _: &str) -> ApiResult<()> {
        self.respond("delete_payment_method").await
    }

    async fn set_default_payment_method(&self, _: &str) -> ApiResult<()> {
        self.respond("set_default_payment_method").await
    }
}

#[async_trait]
impl SubscriptionApi for FakeApi {
    async fn list_plans(&self) -> ApiResult<Vec<Plan>> {
        self.respond("list_plans").await
    }

    async fn list_subscriptions(
        &self,
        _: PageRequest,
        _: &SubscriptionFilter,
    ) -> ApiResult<ApiPage<Subscription>> {
        self.respond("list_subscriptions").await
    }

    async fn current_subscription(&self) -> ApiResult<Option<Subscription>> {
        self.respond("current_subscription").await
    }

    async fn create_subscription(&self, _: &NewSubscription) -> ApiResult<Subscription> {
        self.respond("create_subscription").await
    }

    async fn update_subscription(
        &self,
        _: &str,
        _: &SubscriptionPatch,
    ) -> ApiResult<Subscription> {
        self.respond("update_subscription").await
    }

    async fn cancel_subscription(
        &self,
        _: &str,
        _: &CancelSubscription,
    ) -> ApiResult<Subscription> {
        self.respond("cancel_subscription").await
    }

    async fn reactivate_subscription(&self, _: &str) -> ApiResult<Subscription> {
        self.respond("reactivate_subscription").await
    }
}

#[async_trait]
impl InfractionTypeApi for FakeApi {
    async fn list_infraction_types(
        &self,
        _: PageRequest,
        _: &InfractionTypeFilter,
    ) -> ApiResult<ApiPage<InfractionType>> {
        self.respond("list_infraction_types").await
    }

    async fn get_infraction_type(&self, _: &str) -> ApiResult<InfractionType> {
        self.respond("get_infraction_type").await
    }

    async fn create_infraction_type(&self, _: &NewInfractionType) -> ApiResult<InfractionType> {
        self.respond("create_infraction_type").await
    }

    async fn update_infraction_type(
        &self,
        _: &str,
        _: &InfractionTypePatch,
    ) -> ApiResult<InfractionType> {
        self.respond("update_infraction_type").await
    }

    async fn delete_infraction_type(&self, _: &str) -> ApiResult<()> {
        self.respond("delete_infraction_type").await
    }
}

/// Start an engine backed by `api`.
pub fn engine(api: &Arc<FakeApi>) -> SyncHandle {
    SyncEngine::builder()
        .transport(Arc::clone(api))
        .spawn()
        .expect("engine should start")
}

// ---------------------------------------------------------------------------
// Entity builders
// ---------------------------------------------------------------------------

pub fn ticket(id: &str, amount_cents: u64) -> Ticket {
    Ticket {
        id: id.to_string(),
        ticket_number: format!("N-{id}"),
        license_plate: "ABC 123".to_string(),
        infraction_code: "P-01".to_string(),
        municipality: Some("Montréal".to_string()),
        amount_cents,
        currency: "CAD".to_string(),
        status: TicketStatus::Outstanding,
        violation_date: 1_700_000_000,
        due_date: 1_702_592_000,
        dispute_id: None,
        payment_history: Vec::new(),
        notes: None,
    }
}

pub fn page<T>(items: Vec<T>, page: u32, total_pages: u32) -> ApiResult<ApiPage<T>> {
    Ok(ApiPage::new(items).with_meta(PageMeta {
        page,
        total_pages,
        has_next_page: page < total_pages,
        has_prev_page: page > 1,
        total: 0,
    }))
}

pub fn dispute(id: &str, ticket_id: &str) -> Dispute {
    Dispute {
        id: id.to_string(),
        ticket_id: ticket_id.to_string(),
        status: DisputeStatus::Submitted,
        reason: "Signage was missing".to_string(),
        evidence: Vec::new(),
        created_at: 1_700_100_000,
        updated_at: 1_700_100_000,
    }
}

pub fn payment(id: &str, ticket_id: &str, amount_cents: u64) -> Payment {
    Payment {
        id: id.to_string(),
        ticket_id: ticket_id.to_string(),
        amount_cents,
        currency: "CAD".to_string(),
        status: PaymentStatus::Completed,
        payment_method_id: Some("pm-1".to_string()),
        created_at: 1_700_200_000,
    }
}

pub fn card(id: &str, is_default: bool) -> PaymentMethod {
    PaymentMethod {
        id: id.to_string(),
        brand: "visa".to_string(),
        last4: "4242".to_string(),
        exp_month: 8,
        exp_year: 2030,
        is_default,
        holder_name: None,
    }
}

pub fn new_card(is_default: bool) -> NewPaymentMethod {
    NewPaymentMethod {
        processor_token: "tok_visa".to_string(),
        brand: "visa".to_string(),
        last4: "4242".to_string(),
        exp_month: 8,
        exp_year: 2030,
        is_default,
        holder_name: None,
    }
}

pub fn plan(id: &str, price_cents: u64) -> Plan {
    Plan {
        id: id.to_string(),
        name: format!("Plan {id}"),
        price_cents,
        currency: "CAD".to_string(),
        interval: BillingInterval::Month,
        features: Vec::new(),
        active: true,
    }
}

pub fn subscription(id: &str, plan_id: &str, status: SubscriptionStatus) -> Subscription {
    Subscription {
        id: id.to_string(),
        plan_id: plan_id.to_string(),
        status,
        current_period_start: 1_700_000_000,
        current_period_end: 1_702_592_000,
        cancel_at_period_end: false,
        cancelled_at: None,
        trial_end: None,
    }
}

pub fn infraction_type(id: &str, code: &str, en: &str, fr: &str) -> InfractionType {
    InfractionType {
        id: id.to_string(),
        code: code.to_string(),
        labels: BTreeMap::from([(Locale::En, en.to_string()), (Locale::Fr, fr.to_string())]),
        category: InfractionCategory::Stationary,
        base_fine_cents: 5200,
        currency: "CAD".to_string(),
        points: 0,
        active: true,
        municipality: Some("Laval".to_string()),
    }
}
