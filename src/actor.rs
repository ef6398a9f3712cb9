//! Serialized dispatch queue that owns the root state.
//!
//! A single tokio task exclusively owns the [`SyncState`] and processes
//! [`ActorMessage`]s from an `mpsc` channel one at a time, so every
//! begin/settle transition is applied in arrival order and no two
//! reducer steps ever interleave. After each step the task publishes the
//! new state as an `Arc<SyncState>` on a `watch` channel.
//!
//! Public API: [`SyncHandle`] (cloneable async handle) and
//! [`SyncEngine::builder`] (registers the network collaborators and starts
//! the task).

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::api::{InfractionTypeApi, PaymentApi, SubscriptionApi, TicketApi};
use crate::config::SyncConfig;
use crate::error::{CommandError, EngineError};
use crate::lifecycle::{LoadMode, RequestToken, Settlement};
use crate::store::{Store, SyncEvent, SyncState, TrackedOp};

/// Decides, against the state at the head of the queue, whether an
/// operation may begin. Returns the `Requested` event to apply, or `None`
/// to refuse.
pub(crate) type BeginFn = Box<dyn FnOnce(&SyncState, u64) -> Option<SyncEvent> + Send>;

/// Messages sent from `SyncHandle` to the actor task.
pub(crate) enum ActorMessage {
    /// Start an operation. The actor assigns the next sequence number only
    /// if `start` admits it.
    Begin {
        start: BeginFn,
        reply: oneshot::Sender<Option<u64>>,
    },

    /// Apply a terminal event and its consistency follow-ups.
    Settle {
        event: SyncEvent,
        reply: oneshot::Sender<Option<Settlement>>,
    },

    /// Apply a local, non-network event (filters, error clearing, reset).
    Local {
        event: SyncEvent,
        reply: oneshot::Sender<()>,
    },

    /// Stop the actor loop.
    Shutdown,
}

/// The network collaborators, one per domain.
pub(crate) struct Apis {
    pub tickets: Arc<dyn TicketApi>,
    pub payments: Arc<dyn PaymentApi>,
    pub subscriptions: Arc<dyn SubscriptionApi>,
    pub infraction_types: Arc<dyn InfractionTypeApi>,
}

/// Runs the dispatch loop until `Shutdown` arrives or every sender is
/// dropped.
///
/// # Arguments
///
/// * `rx` - Receiving end of the mpsc channel carrying `ActorMessage`s.
/// * `published` - Watch sender that receives every new state.
async fn run_actor(mut rx: mpsc::Receiver<ActorMessage>, published: watch::Sender<Arc<SyncState>>) {
    let mut state: Arc<SyncState> = published.borrow().clone();
    let mut last_seq: u64 = 0;

    while let Some(msg) = rx.recv().await {
        match msg {
            ActorMessage::Begin { start, reply } => {
                let seq = last_seq + 1;
                let admitted = match start(state.as_ref(), seq) {
                    Some(event) => {
                        last_seq = seq;
                        state = step(&state, &event).0;
                        published.send_replace(state.clone());
                        Some(seq)
                    }
                    None => None,
                };
                // The caller may have been cancelled; nothing to undo.
                let _ = reply.send(admitted);
            }

            ActorMessage::Settle { event, reply } => {
                let (next, settlement) = step(&state, &event);
                state = next;
                published.send_replace(state.clone());
                let _ = reply.send(settlement);
            }

            ActorMessage::Local { event, reply } => {
                state = step(&state, &event).0;
                published.send_replace(state.clone());
                let _ = reply.send(());
            }

            ActorMessage::Shutdown => break,
        }
    }
    tracing::info!(last_seq, "sync actor shut down");
}

fn step(state: &Arc<SyncState>, event: &SyncEvent) -> (Arc<SyncState>, Option<Settlement>) {
    let (next, settlement) = SyncState::clone(state).dispatch(event);
    (Arc::new(next), settlement)
}

/// A [`BeginFn`] that admits `kind` by its store's rule and, when admitted,
/// sends `plan`'s result over `planned`.
fn planned_start<K, P>(
    kind: K,
    mode: LoadMode,
    plan: impl FnOnce(&SyncState) -> P + Send + 'static,
    planned: oneshot::Sender<P>,
) -> BeginFn
where
    K: TrackedOp,
    P: Send + 'static,
{
    Box::new(move |state, seq| {
        if !K::store(state).admits(kind, mode) {
            return None;
        }
        let _ = planned.send(plan(state));
        Some(K::requested(RequestToken::new(kind, seq, mode)))
    })
}

/// Async handle to the running sync engine.
///
/// Lightweight, cloneable, and `Send + Sync`. Every command is a method on
/// this type; see the `commands` module.
#[derive(Clone)]
pub struct SyncHandle {
    sender: mpsc::Sender<ActorMessage>,
    state: watch::Receiver<Arc<SyncState>>,
    apis: Arc<Apis>,
    config: SyncConfig,
}

impl fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncHandle")
            .field("config", &self.config)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

impl SyncHandle {
    /// The latest published state.
    ///
    /// Reflects every command that has already returned.
    pub fn snapshot(&self) -> Arc<SyncState> {
        self.state.borrow().clone()
    }

    /// A receiver that observes every state published from now on.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SyncState>> {
        self.state.clone()
    }

    /// Engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Check whether the actor backing this handle is still running.
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Ask the actor to stop. Commands issued afterwards fail with
    /// [`CommandError::EngineGone`]. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(ActorMessage::Shutdown).await;
    }

    pub(crate) fn apis(&self) -> &Apis {
        &self.apis
    }

    /// Begin an operation of `kind`, subject to its store's admission rule,
    /// and run `plan` against the same head-of-queue state the admission
    /// check saw. `plan` only runs when the operation is admitted.
    ///
    /// # Returns
    ///
    /// The issued token and `plan`'s result, or `None` if the store refused.
    ///
    /// # Errors
    ///
    /// [`CommandError::EngineGone`] if the actor has exited.
    pub(crate) async fn begin_with<K, P>(
        &self,
        kind: K,
        mode: LoadMode,
        plan: impl FnOnce(&SyncState) -> P + Send + 'static,
    ) -> Result<Option<(RequestToken<K>, P)>, CommandError>
    where
        K: TrackedOp,
        P: Send + 'static,
    {
        let (planned_tx, planned_rx) = oneshot::channel();
        let start = planned_start(kind, mode, plan, planned_tx);
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::Begin { start, reply: tx })
            .await
            .map_err(|_| CommandError::EngineGone)?;
        let Some(seq) = rx.await.map_err(|_| CommandError::EngineGone)? else {
            return Ok(None);
        };
        let planned = planned_rx.await.map_err(|_| CommandError::EngineGone)?;
        Ok(Some((RequestToken::new(kind, seq, mode), planned)))
    }

    /// Apply a terminal event. Returns how its token settled.
    ///
    /// # Errors
    ///
    /// [`CommandError::EngineGone`] if the actor has exited.
    pub(crate) async fn settle(&self, event: SyncEvent) -> Result<Option<Settlement>, CommandError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::Settle { event, reply: tx })
            .await
            .map_err(|_| CommandError::EngineGone)?;
        rx.await.map_err(|_| CommandError::EngineGone)
    }

    /// Apply a local event.
    ///
    /// # Errors
    ///
    /// [`CommandError::EngineGone`] if the actor has exited.
    pub(crate) async fn local(&self, event: SyncEvent) -> Result<(), CommandError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::Local { event, reply: tx })
            .await
            .map_err(|_| CommandError::EngineGone)?;
        rx.await.map_err(|_| CommandError::EngineGone)
    }
}

/// Entry point for starting the sync engine.
#[derive(Debug, Clone, Copy)]
pub struct SyncEngine;

impl SyncEngine {
    /// Start configuring an engine.
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::default()
    }
}

/// Builder for a running sync engine.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use ticket_sync::{HttpConfig, HttpTransport, SyncConfig, SyncEngine};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = Arc::new(HttpTransport::new(&HttpConfig::new("https://api.example.com/v1"))?);
/// let handle = SyncEngine::builder()
///     .transport(transport)
///     .config(SyncConfig::default().with_default_page_size(50))
///     .spawn()?;
/// handle.fetch_tickets(1, 50).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct SyncEngineBuilder {
    tickets: Option<Arc<dyn TicketApi>>,
    payments: Option<Arc<dyn PaymentApi>>,
    subscriptions: Option<Arc<dyn SubscriptionApi>>,
    infraction_types: Option<Arc<dyn InfractionTypeApi>>,
    config: SyncConfig,
}

impl fmt::Debug for SyncEngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngineBuilder")
            .field("tickets", &self.tickets.is_some())
            .field("payments", &self.payments.is_some())
            .field("subscriptions", &self.subscriptions.is_some())
            .field("infraction_types", &self.infraction_types.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl SyncEngineBuilder {
    /// Register the ticket and dispute collaborator.
    pub fn tickets<A: TicketApi>(mut self, api: Arc<A>) -> Self {
        let api: Arc<dyn TicketApi> = api;
        self.tickets = Some(api);
        self
    }

    /// Register the payment and payment-method collaborator.
    pub fn payments<A: PaymentApi>(mut self, api: Arc<A>) -> Self {
        let api: Arc<dyn PaymentApi> = api;
        self.payments = Some(api);
        self
    }

    /// Register the subscription collaborator.
    pub fn subscriptions<A: SubscriptionApi>(mut self, api: Arc<A>) -> Self {
        let api: Arc<dyn SubscriptionApi> = api;
        self.subscriptions = Some(api);
        self
    }

    /// Register the infraction-type catalog collaborator.
    pub fn infraction_types<A: InfractionTypeApi>(mut self, api: Arc<A>) -> Self {
        let api: Arc<dyn InfractionTypeApi> = api;
        self.infraction_types = Some(api);
        self
    }

    /// Register one value as every collaborator.
    pub fn transport<A>(self, api: Arc<A>) -> Self
    where
        A: TicketApi + PaymentApi + SubscriptionApi + InfractionTypeApi,
    {
        self.tickets(Arc::clone(&api))
            .payments(Arc::clone(&api))
            .subscriptions(Arc::clone(&api))
            .infraction_types(api)
    }

    /// Set the engine configuration. Defaults to [`SyncConfig::default`].
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the actor task on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// * [`EngineError::MissingApi`] -- a collaborator was not registered.
    /// * [`EngineError::NoRuntime`] -- called outside a tokio runtime.
    pub fn spawn(self) -> Result<SyncHandle, EngineError> {
        let apis = Apis {
            tickets: self.tickets.ok_or(EngineError::MissingApi("ticket"))?,
            payments: self.payments.ok_or(EngineError::MissingApi("payment"))?,
            subscriptions: self
                .subscriptions
                .ok_or(EngineError::MissingApi("subscription"))?,
            infraction_types: self
                .infraction_types
                .ok_or(EngineError::MissingApi("infraction type"))?,
        };
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (published, observed) = watch::channel(Arc::new(SyncState::default()));
        runtime.spawn(run_actor(rx, published));

        tracing::debug!(
            channel_capacity = self.config.channel_capacity,
            "sync actor started"
        );
        Ok(SyncHandle {
            sender: tx,
            state: observed,
            apis: Arc::new(apis),
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ticket::test_fixtures::ticket;
    use crate::pagination::{PageMeta, PageRequest};
    use crate::store::{TicketEvent, TicketOp};

    fn spawn_bare() -> (mpsc::Sender<ActorMessage>, watch::Receiver<Arc<SyncState>>) {
        let (tx, rx) = mpsc::channel(8);
        let (published, observed) = watch::channel(Arc::new(SyncState::default()));
        tokio::spawn(run_actor(rx, published));
        (tx, observed)
    }

    async fn begin(tx: &mpsc::Sender<ActorMessage>, start: BeginFn) -> Option<u64> {
        let (reply, rx) = oneshot::channel();
        tx.send(ActorMessage::Begin { start, reply })
            .await
            .expect("actor should be running");
        rx.await.expect("actor should reply")
    }

    fn fetch_tickets() -> BeginFn {
        Box::new(|_, seq| {
            Some(TicketOp::requested(RequestToken::new(
                TicketOp::FetchTickets,
                seq,
                LoadMode::Fresh,
            )))
        })
    }

    #[tokio::test]
    async fn sequence_numbers_are_monotonic_and_skip_refusals() {
        let (tx, _state) = spawn_bare();
        assert_eq!(begin(&tx, fetch_tickets()).await, Some(1));
        assert_eq!(begin(&tx, Box::new(|_, _| None)).await, None);
        assert_eq!(begin(&tx, fetch_tickets()).await, Some(2));
    }

    #[tokio::test]
    async fn begin_and_settle_are_published() {
        let (tx, state) = spawn_bare();
        let seq = begin(&tx, fetch_tickets()).await.expect("admitted");
        assert!(state.borrow().tickets().is_loading());

        let token = RequestToken::new(TicketOp::FetchTickets, seq, LoadMode::Fresh);
        let (reply, rx) = oneshot::channel();
        tx.send(ActorMessage::Settle {
            event: TicketEvent::TicketsLoaded {
                token,
                request: PageRequest::first(20),
                items: vec![ticket("T-1", 100)],
                meta: None,
            }
            .into(),
            reply,
        })
        .await
        .expect("send");
        assert_eq!(rx.await.expect("reply"), Some(Settlement::Applied));

        let snapshot = state.borrow().clone();
        assert!(!snapshot.tickets().is_loading());
        assert_eq!(snapshot.tickets().tickets().len(), 1);
    }

    #[tokio::test]
    async fn planned_begin_sees_settles_queued_ahead_of_it() {
        let (tx, state) = spawn_bare();
        let seq = begin(&tx, fetch_tickets()).await.expect("admitted");
        let token = RequestToken::new(TicketOp::FetchTickets, seq, LoadMode::Fresh);

        // Queue the settle without waiting for it, then begin a load-more.
        let (settled, settled_rx) = oneshot::channel();
        tx.send(ActorMessage::Settle {
            event: TicketEvent::TicketsLoaded {
                token,
                request: PageRequest::new(1, 1),
                items: vec![ticket("T-1", 100)],
                meta: Some(PageMeta {
                    page: 1,
                    total_pages: 3,
                    has_next_page: true,
                    has_prev_page: false,
                    total: 3,
                }),
            }
            .into(),
            reply: settled,
        })
        .await
        .expect("send");
        let (planned, planned_rx) = oneshot::channel();
        let start = planned_start(
            TicketOp::FetchTickets,
            LoadMode::More,
            |s: &SyncState| s.tickets().tickets().pagination().next_page(),
            planned,
        );
        assert_eq!(begin(&tx, start).await, Some(seq + 1));
        assert_eq!(planned_rx.await.expect("planned"), 2);
        assert_eq!(settled_rx.await.expect("reply"), Some(Settlement::Applied));
        assert!(state.borrow().tickets().is_loading_more());
    }

    #[tokio::test]
    async fn refused_begin_never_runs_its_plan() {
        let (tx, _state) = spawn_bare();
        let (planned, planned_rx) = oneshot::channel();
        let start = planned_start(
            TicketOp::FetchTickets,
            LoadMode::More,
            |_: &SyncState| (),
            planned,
        );
        assert_eq!(begin(&tx, start).await, None);
        assert!(planned_rx.await.is_err());
    }

    #[tokio::test]
    async fn shutdown_closes_the_channel() {
        let (tx, _state) = spawn_bare();
        tx.send(ActorMessage::Shutdown).await.expect("send");
        tokio::time::timeout(std::time::Duration::from_secs(1), tx.closed())
            .await
            .expect("actor should exit");
    }

    #[test]
    fn spawn_without_apis_fails() {
        let err = SyncEngine::builder().spawn().expect_err("should fail");
        assert!(matches!(err, EngineError::MissingApi("ticket")));
    }

    // Handles are shared across tasks.
    const _: () = {
        #[allow(dead_code)]
        fn assert_send_sync<T: Send + Sync>() {}

        #[allow(dead_code)]
        fn check() {
            assert_send_sync::<SyncHandle>();
        }
    };
}
