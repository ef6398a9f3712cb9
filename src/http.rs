//! reqwest-backed network collaborator.
//!
//! [`HttpTransport`] implements every API trait against the REST endpoints,
//! decodes the response envelope, and attaches `Authorization: Bearer` from
//! a shared, refreshable token. Transport failures become
//! [`ApiError::Network`]; non-2xx statuses and `success: false` become
//! [`ApiError::Server`].

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url, header};
use serde::Serialize;

use crate::api::{
    ApiPage, ApiResult, Envelope, InfractionTypeApi, PaymentApi, SubscriptionApi, TicketApi,
};
use crate::config::HttpConfig;
use crate::domain::{
    CancelSubscription, Dispute, DisputeFilter, InfractionType, InfractionTypeFilter,
    InfractionTypePatch, NewDispute, NewInfractionType, NewPaymentMethod, NewSubscription,
    NewTicket, PayTicket, Payment, PaymentFilter, PaymentMethod, PaymentMethodPatch, Plan,
    Subscription, SubscriptionFilter, SubscriptionPatch, Ticket, TicketFilter, TicketPatch,
};
use crate::error::{ApiError, EngineError};
use crate::pagination::PageRequest;
use crate::token::TokenStore;

/// HTTP implementation of every network collaborator trait.
///
/// Cheap to clone; clones share the connection pool and the token.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base: Url,
    /// Shared, refreshable token string. Empty means "no auth".
    token: Arc<RwLock<String>>,
}

impl HttpTransport {
    /// Build a transport with no token.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidBaseUrl`] if `config.base_url` is not an
    /// absolute http(s) URL, [`EngineError::Http`] if the client can't be
    /// built.
    pub fn new(config: &HttpConfig) -> Result<Self, EngineError> {
        let base = Url::parse(&config.base_url)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https") && !url.cannot_be_a_base())
            .ok_or_else(|| EngineError::InvalidBaseUrl(config.base_url.clone()))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base,
            token: Arc::new(RwLock::new(String::new())),
        })
    }

    /// Build a transport seeded with the token persisted in `store`.
    ///
    /// # Errors
    ///
    /// As [`new`](Self::new), plus [`EngineError::TokenStore`] if the
    /// token can't be read.
    pub fn with_token_store(
        config: &HttpConfig,
        store: &dyn TokenStore,
    ) -> Result<Self, EngineError> {
        let transport = Self::new(config)?;
        if let Some(token) = store.load()? {
            transport.set_token(token);
        }
        Ok(transport)
    }

    /// Replace the bearer token used by subsequent requests.
    pub fn set_token(&self, token: impl Into<String>) {
        let mut guard = self.token.write().unwrap_or_else(|p| p.into_inner());
        *guard = token.into();
    }

    /// Stop sending an `Authorization` header.
    pub fn clear_token(&self) {
        self.set_token(String::new());
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let request = self.client.request(method, self.endpoint(segments));
        let token = self.token.read().unwrap_or_else(|p| p.into_inner());
        if token.is_empty() {
            request
        } else {
            request.bearer_auth(token.as_str())
        }
    }

    fn list(
        &self,
        segments: &[&str],
        page: PageRequest,
        filter: Vec<(&'static str, String)>,
    ) -> RequestBuilder {
        let mut query = vec![
            ("page", page.page.to_string()),
            ("limit", page.page_size.to_string()),
        ];
        query.extend(filter);
        self.request(Method::GET, segments).query(&query)
    }

    fn with_body<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> RequestBuilder {
        self.request(method, segments).json(body)
    }

    /// Send `request` and parse the envelope. Returns the HTTP status for
    /// the decode step.
    async fn send(&self, request: RequestBuilder) -> ApiResult<(Envelope, Option<u16>)> {
        let response = request.send().await.map_err(|error| {
            tracing::warn!(%error, "request failed before a response arrived");
            ApiError::Network(error.to_string())
        })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| ApiError::Network(error.to_string()))?;

        let code = Some(status.as_u16());
        match Envelope::parse(&body) {
            Ok(envelope) if status.is_success() => Ok((envelope, code)),
            Ok(envelope) => Err(ApiError::Server {
                status: code,
                message: envelope.message.unwrap_or_else(|| status.to_string()),
            }),
            Err(_) if !status.is_success() => Err(ApiError::Server {
                status: code,
                message: status.to_string(),
            }),
            Err(error) => Err(error),
        }
    }

    async fn entity<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let (envelope, status) = self.send(request).await?;
        envelope.into_entity(status)
    }

    async fn page<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
        key: &str,
    ) -> ApiResult<ApiPage<T>> {
        let (envelope, status) = self.send(request).await?;
        envelope.into_page(key, status)
    }

    async fn unit(&self, request: RequestBuilder) -> ApiResult<()> {
        let (envelope, status) = self.send(request).await?;
        envelope.into_unit(status)
    }
}

#[async_trait]
impl TicketApi for HttpTransport {
    async fn list_tickets(
        &self,
        page: PageRequest,
        filter: &TicketFilter,
    ) -> ApiResult<ApiPage<Ticket>> {
        let request = self.list(&["tickets"], page, filter.query_pairs());
        self.page(request, "tickets").await
    }

    async fn get_ticket(&self, id: &str) -> ApiResult<Ticket> {
        self.entity(self.request(Method::GET, &["tickets", id])).await
    }

    async fn create_ticket(&self, body: &NewTicket) -> ApiResult<Ticket> {
        self.entity(self.with_body(Method::POST, &["tickets"], body))
            .await
    }

    async fn update_ticket(&self, id: &str, patch: &TicketPatch) -> ApiResult<Ticket> {
        self.entity(self.with_body(Method::PATCH, &["tickets", id], patch))
            .await
    }

    async fn delete_ticket(&self, id: &str) -> ApiResult<()> {
        self.unit(self.request(Method::DELETE, &["tickets", id]))
            .await
    }

    async fn list_disputes(
        &self,
        page: PageRequest,
        filter: &DisputeFilter,
    ) -> ApiResult<ApiPage<Dispute>> {
        let request = self.list(&["disputes"], page, filter.query_pairs());
        self.page(request, "disputes").await
    }

    async fn get_dispute(&self, id: &str) -> ApiResult<Dispute> {
        self.entity(self.request(Method::GET, &["disputes", id]))
            .await
    }

    async fn create_dispute(&self, ticket_id: &str, body: &NewDispute) -> ApiResult<Dispute> {
        self.entity(self.with_body(Method::POST, &["tickets", ticket_id, "dispute"], body))
            .await
    }
}

#[async_trait]
impl PaymentApi for HttpTransport {
    async fn list_payments(
        &self,
        page: PageRequest,
        filter: &PaymentFilter,
    ) -> ApiResult<ApiPage<Payment>> {
        let request = self.list(&["payments"], page, filter.query_pairs());
        self.page(request, "payments").await
    }

    async fn get_payment(&self, id: &str) -> ApiResult<Payment> {
        self.entity(self.request(Method::GET, &["payments", id]))
            .await
    }

    async fn pay_ticket(&self, ticket_id: &str, body: &PayTicket) -> ApiResult<Payment> {
        self.entity(self.with_body(Method::POST, &["tickets", ticket_id, "pay"], body))
            .await
    }

    async fn list_payment_methods(&self, page: PageRequest) -> ApiResult<ApiPage<PaymentMethod>> {
        let request = self.list(&["payment-methods"], page, Vec::new());
        self.page(request, "paymentMethods").await
    }

    async fn create_payment_method(&self, body: &NewPaymentMethod) -> ApiResult<PaymentMethod> {
        self.entity(self.with_body(Method::POST, &["payment-methods"], body))
            .await
    }

    async fn update_payment_method(
        &self,
        id: &str,
        patch: &PaymentMethodPatch,
    ) -> ApiResult<PaymentMethod> {
        self.entity(self.with_body(Method::PATCH, &["payment-methods", id], patch))
            .await
    }

    async fn delete_payment_method(&self, id: &str) -> ApiResult<()> {
        self.unit(self.request(Method::DELETE, &["payment-methods", id]))
            .await
    }

    async fn set_default_payment_method(&self, id: &str) -> ApiResult<()> {
        self.unit(self.request(Method::POST, &["payment-methods", id, "default"]))
            .await
    }
}

#[async_trait]
impl SubscriptionApi for HttpTransport {
    async fn list_plans(&self) -> ApiResult<Vec<Plan>> {
        let request = self.request(Method::GET, &["subscriptions", "plans"]);
        Ok(self.page(request, "plans").await?.items)
    }

    async fn list_subscriptions(
        &self,
        page: PageRequest,
        filter: &SubscriptionFilter,
    ) -> ApiResult<ApiPage<Subscription>> {
        let request = self.list(&["subscriptions"], page, filter.query_pairs());
        self.page(request, "subscriptions").await
    }

    async fn current_subscription(&self) -> ApiResult<Option<Subscription>> {
        let request = self.request(Method::GET, &["subscriptions", "current"]);
        let (envelope, status) = self.send(request).await?;
        envelope.into_optional(status)
    }

    async fn create_subscription(&self, body: &NewSubscription) -> ApiResult<Subscription> {
        self.entity(self.with_body(Method::POST, &["subscriptions"], body))
            .await
    }

    async fn update_subscription(
        &self,
        id: &str,
        patch: &SubscriptionPatch,
    ) -> ApiResult<Subscription> {
        self.entity(self.with_body(Method::PATCH, &["subscriptions", id], patch))
            .await
    }

    async fn cancel_subscription(
        &self,
        id: &str,
        body: &CancelSubscription,
    ) -> ApiResult<Subscription> {
        self.entity(self.with_body(Method::POST, &["subscriptions", id, "cancel"], body))
            .await
    }

    async fn reactivate_subscription(&self, id: &str) -> ApiResult<Subscription> {
        self.entity(self.request(Method::POST, &["subscriptions", id, "reactivate"]))
            .await
    }
}

#[async_trait]
impl InfractionTypeApi for HttpTransport {
    async fn list_infraction_types(
        &self,
        page: PageRequest,
        filter: &InfractionTypeFilter,
    ) -> ApiResult<ApiPage<InfractionType>> {
        let request = self.list(&["infraction-types"], page, filter.query_pairs());
        self.page(request, "infractionTypes").await
    }

    async fn get_infraction_type(&self, id: &str) -> ApiResult<InfractionType> {
        self.entity(self.request(Method::GET, &["infraction-types", id]))
            .await
    }

    async fn create_infraction_type(&self, body: &NewInfractionType) -> ApiResult<InfractionType> {
        self.entity(self.with_body(Method::POST, &["infraction-types"], body))
            .await
    }

    async fn update_infraction_type(
        &self,
        id: &str,
        patch: &InfractionTypePatch,
    ) -> ApiResult<InfractionType> {
        self.entity(self.with_body(Method::PATCH, &["infraction-types", id], patch))
            .await
    }

    async fn delete_infraction_type(&self, id: &str) -> ApiResult<()> {
        self.unit(self.request(Method::DELETE, &["infraction-types", id]))
            .await
    }
}
