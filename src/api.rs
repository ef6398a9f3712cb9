//! Network collaborator contracts and wire-envelope decoding.
//!
//! Each domain has one async trait with one method per remote operation.
//! The engine only ever talks to these traits; [`crate::HttpTransport`]
//! is the reqwest-backed implementation and tests plug in fakes.
//!
//! Every response is wrapped in the same envelope:
//!
//! ```json
//! { "success": true, "data": { "tickets": [...], "pagination": {...} } }
//! { "success": false, "message": "Ticket is under dispute" }
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::domain::{
    CancelSubscription, Dispute, DisputeFilter, InfractionType, InfractionTypeFilter,
    InfractionTypePatch, NewDispute, NewInfractionType, NewPaymentMethod, NewSubscription,
    NewTicket, PayTicket, Payment, PaymentFilter, PaymentMethod, PaymentMethodPatch, Plan,
    Subscription, SubscriptionFilter, SubscriptionPatch, Ticket, TicketFilter, TicketPatch,
};
use crate::error::ApiError;
use crate::pagination::{PageMeta, PageRequest};

/// Result of one remote operation.
pub type ApiResult<T> = Result<T, ApiError>;

/// One page of a collection fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiPage<T> {
    /// Entities in server order.
    pub items: Vec<T>,
    /// Server pagination metadata, when it was sent.
    pub pagination: Option<PageMeta>,
}

impl<T> ApiPage<T> {
    /// A page without metadata.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            pagination: None,
        }
    }

    /// Attach server metadata.
    pub fn with_meta(mut self, meta: PageMeta) -> Self {
        self.pagination = Some(meta);
        self
    }
}

#[async_trait]
pub trait TicketApi: Send + Sync + 'static {
    /// `GET /tickets?page&limit&<filter>`
    async fn list_tickets(&self, page: PageRequest, filter: &TicketFilter)
    -> ApiResult<ApiPage<Ticket>>;

    /// `GET /tickets/{id}`
    async fn get_ticket(&self, id: &str) -> ApiResult<Ticket>;

    /// `POST /tickets`
    async fn create_ticket(&self, body: &NewTicket) -> ApiResult<Ticket>;

    /// `PATCH /tickets/{id}`
    async fn update_ticket(&self, id: &str, patch: &TicketPatch) -> ApiResult<Ticket>;

    /// `DELETE /tickets/{id}`
    async fn delete_ticket(&self, id: &str) -> ApiResult<()>;

    /// `GET /disputes?page&limit&<filter>`
    async fn list_disputes(
        &self,
        page: PageRequest,
        filter: &DisputeFilter,
    ) -> ApiResult<ApiPage<Dispute>>;

    /// `GET /disputes/{id}`
    async fn get_dispute(&self, id: &str) -> ApiResult<Dispute>;

    /// `POST /tickets/{id}/dispute`
    async fn create_dispute(&self, ticket_id: &str, body: &NewDispute) -> ApiResult<Dispute>;
}

#[async_trait]
pub trait PaymentApi: Send + Sync + 'static {
    /// `GET /payments?page&limit&<filter>`
    async fn list_payments(
        &self,
        page: PageRequest,
        filter: &PaymentFilter,
    ) -> ApiResult<ApiPage<Payment>>;

    /// `GET /payments/{id}`
    async fn get_payment(&self, id: &str) -> ApiResult<Payment>;

    /// `POST /tickets/{id}/pay`
    async fn pay_ticket(&self, ticket_id: &str, body: &PayTicket) -> ApiResult<Payment>;

    /// `GET /payment-methods?page&limit`
    async fn list_payment_methods(&self, page: PageRequest) -> ApiResult<ApiPage<PaymentMethod>>;

    /// `POST /payment-methods`
    async fn create_payment_method(&self, body: &NewPaymentMethod) -> ApiResult<PaymentMethod>;

    /// `PATCH /payment-methods/{id}`
    async fn update_payment_method(
        &self,
        id: &str,
        patch: &PaymentMethodPatch,
    ) -> ApiResult<PaymentMethod>;

    /// `DELETE /payment-methods/{id}`
    async fn delete_payment_method(&self, id: &str) -> ApiResult<()>;

    /// `POST /payment-methods/{id}/default`
    async fn set_default_payment_method(&self, id: &str) -> ApiResult<()>;
}

#[async_trait]
pub trait SubscriptionApi: Send + Sync + 'static {
    /// `GET /subscriptions/plans`
    async fn list_plans(&self) -> ApiResult<Vec<Plan>>;

    /// `GET /subscriptions?page&limit&<filter>`
    async fn list_subscriptions(
        &self,
        page: PageRequest,
        filter: &SubscriptionFilter,
    ) -> ApiResult<ApiPage<Subscription>>;

    /// `GET /subscriptions/current`. `None` when the user has no subscription.
    async fn current_subscription(&self) -> ApiResult<Option<Subscription>>;

    /// `POST /subscriptions`
    async fn create_subscription(&self, body: &NewSubscription) -> ApiResult<Subscription>;

    /// `PATCH /subscriptions/{id}`
    async fn update_subscription(
        &self,
        id: &str,
        patch: &SubscriptionPatch,
    ) -> ApiResult<Subscription>;

    /// `POST /subscriptions/{id}/cancel`
    async fn cancel_subscription(
        &self,
        id: &str,
        body: &CancelSubscription,
    ) -> ApiResult<Subscription>;

    /// `POST /subscriptions/{id}/reactivate`
    async fn reactivate_subscription(&self, id: &str) -> ApiResult<Subscription>;
}

#[async_trait]
pub trait InfractionTypeApi: Send + Sync + 'static {
    /// `GET /infraction-types?page&limit&<filter>`
    async fn list_infraction_types(
        &self,
        page: PageRequest,
        filter: &InfractionTypeFilter,
    ) -> ApiResult<ApiPage<InfractionType>>;

    /// `GET /infraction-types/{id}`
    async fn get_infraction_type(&self, id: &str) -> ApiResult<InfractionType>;

    /// `POST /infraction-types`
    async fn create_infraction_type(&self, body: &NewInfractionType) -> ApiResult<InfractionType>;

    /// `PATCH /infraction-types/{id}`
    async fn update_infraction_type(
        &self,
        id: &str,
        patch: &InfractionTypePatch,
    ) -> ApiResult<InfractionType>;

    /// `DELETE /infraction-types/{id}`
    async fn delete_infraction_type(&self, id: &str) -> ApiResult<()>;
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The `{success, data, message, pagination}` wrapper around every response.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub pagination: Option<PageMeta>,
}

impl Envelope {
    /// Parse a raw response body.
    ///
    /// # Errors
    ///
    /// [`ApiError::Decode`] when the body is not an envelope.
    pub fn parse(body: &[u8]) -> ApiResult<Self> {
        serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Turn `success: false` into [`ApiError::Server`].
    fn checked(self, status: Option<u16>) -> ApiResult<Self> {
        if self.success {
            return Ok(self);
        }
        Err(ApiError::Server {
            status,
            message: self
                .message
                .unwrap_or_else(|| "request was rejected".to_string()),
        })
    }

    /// Decode a single-entity payload.
    ///
    /// # Errors
    ///
    /// [`ApiError::Server`] for `success: false`, [`ApiError::Decode`] when
    /// `data` is missing or has the wrong shape.
    pub fn into_entity<T: DeserializeOwned>(self, status: Option<u16>) -> ApiResult<T> {
        let data = self
            .checked(status)?
            .data
            .ok_or_else(|| ApiError::Decode("response has no data".to_string()))?;
        serde_json::from_value(data).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Decode an optional single-entity payload: absent or `null` data is
    /// `None`.
    ///
    /// # Errors
    ///
    /// As [`into_entity`](Self::into_entity), minus the missing-data case.
    pub fn into_optional<T: DeserializeOwned>(self, status: Option<u16>) -> ApiResult<Option<T>> {
        match self.checked(status)?.data {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(data) => serde_json::from_value(data)
                .map(Some)
                .map_err(|e| ApiError::Decode(e.to_string())),
        }
    }

    /// Accept any successful envelope, ignoring its payload.
    ///
    /// # Errors
    ///
    /// [`ApiError::Server`] for `success: false`.
    pub fn into_unit(self, status: Option<u16>) -> ApiResult<()> {
        self.checked(status).map(|_| ())
    }

    /// Decode a collection page.
    ///
    /// The list is looked up under `key` (e.g. `"tickets"`) inside `data`,
    /// or `data` itself when it is a bare array. Pagination metadata is read
    /// from `data.pagination` first, then from the envelope.
    ///
    /// # Errors
    ///
    /// [`ApiError::Server`] for `success: false`, [`ApiError::Decode`] when
    /// the list can't be found or decoded.
    pub fn into_page<T: DeserializeOwned>(
        self,
        key: &str,
        status: Option<u16>,
    ) -> ApiResult<ApiPage<T>> {
        let envelope = self.checked(status)?;
        let (list, nested_meta) = match envelope.data {
            Some(serde_json::Value::Array(items)) => (serde_json::Value::Array(items), None),
            Some(serde_json::Value::Object(mut map)) => {
                let list = map
                    .remove(key)
                    .ok_or_else(|| ApiError::Decode(format!("response has no `{key}` list")))?;
                let meta = match map.remove("pagination") {
                    Some(raw) => Some(
                        serde_json::from_value::<PageMeta>(raw)
                            .map_err(|e| ApiError::Decode(e.to_string()))?,
                    ),
                    None => None,
                };
                (list, meta)
            }
            _ => return Err(ApiError::Decode(format!("response has no `{key}` list"))),
        };
        let items = serde_json::from_value(list).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(ApiPage {
            items,
            pagination: nested_meta.or(envelope.pagination),
        })
    }
}
