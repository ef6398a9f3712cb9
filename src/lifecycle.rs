//! Three-phase bookkeeping (requested -> succeeded | failed) for every
//! asynchronous operation a store issues.
//!
//! A store embeds one [`Lifecycle`] parameterised by its own operation-kind
//! enum. The tracker owns the busy flags, the last recorded error, and the
//! sequence bookkeeping that lets a store discard a stale response.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// A store-specific enumeration of operation classes.
pub trait OperationKind: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Whether a terminal transition of this kind overwrites a slot wholesale
    /// (a collection page or the current entity).
    ///
    /// For such kinds a response older than the last applied one is
    /// discarded instead of applied.
    fn replaces_slot(self) -> bool;

    /// Short name used in log fields.
    fn as_str(self) -> &'static str;
}

/// How an in-flight operation contributes to the busy flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadMode {
    /// A fresh collection load (page 1) or a single-entity fetch.
    Fresh,
    /// A pagination continuation (page > 1).
    More,
    /// A create, update, delete, or domain action.
    Mutation,
}

/// Identity of one issued operation.
///
/// `seq` is assigned by the dispatch actor from an engine-wide monotonic
/// counter, so tokens from different stores never share a sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken<K> {
    /// Operation class.
    pub kind: K,
    /// Monotonic issue order.
    pub seq: u64,
    /// Contribution to the busy flags.
    pub mode: LoadMode,
}

impl<K> RequestToken<K> {
    /// Build a token. Normally only the dispatch actor does this.
    pub fn new(kind: K, seq: u64, mode: LoadMode) -> Self {
        Self { kind, seq, mode }
    }
}

/// Last failure recorded by a store, tagged with the operation class that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationError<K> {
    /// Operation class that failed.
    pub kind: K,
    /// Plain message for display.
    pub message: String,
}

/// What the tracker decided about a terminal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The result should be written to the store.
    Applied,
    /// A newer request of the same slot-replacing kind already landed.
    Superseded,
    /// The token is not in flight (the store was reset after `begin`).
    Unknown,
}

/// Lifecycle tracker for one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle<K: OperationKind> {
    in_flight: Vec<RequestToken<K>>,
    last_applied: HashMap<K, u64>,
    error: Option<OperationError<K>>,
}

impl<K: OperationKind> Default for Lifecycle<K> {
    fn default() -> Self {
        Self {
            in_flight: Vec::new(),
            last_applied: HashMap::new(),
            error: None,
        }
    }
}

impl<K: OperationKind> Lifecycle<K> {
    /// Record that `token` was requested.
    ///
    /// Clears the recorded error if it came from the same operation class.
    /// Errors from other classes are left in place.
    pub fn begin(&mut self, token: RequestToken<K>) {
        if self.error.as_ref().is_some_and(|e| e.kind == token.kind) {
            self.error = None;
        }
        self.in_flight.push(token);
    }

    /// Remove `token` from the in-flight set and decide whether its result
    /// should be applied.
    pub fn settle(&mut self, token: RequestToken<K>) -> Settlement {
        let Some(pos) = self.in_flight.iter().position(|t| *t == token) else {
            return Settlement::Unknown;
        };
        self.in_flight.remove(pos);

        let last = self.last_applied.get(&token.kind).copied();
        if token.kind.replaces_slot() && last.is_some_and(|seq| seq > token.seq) {
            return Settlement::Superseded;
        }
        if last.is_none_or(|seq| seq < token.seq) {
            self.last_applied.insert(token.kind, token.seq);
        }
        Settlement::Applied
    }

    /// Settle a successful operation. Returns `true` when the caller should
    /// apply the payload.
    pub fn succeed(&mut self, token: RequestToken<K>) -> bool {
        self.settle(token) == Settlement::Applied
    }

    /// Settle a failed operation, recording `message` unless the response was
    /// stale. Returns `true` when the error was recorded.
    pub fn fail(&mut self, token: RequestToken<K>, message: impl Into<String>) -> bool {
        if self.settle(token) != Settlement::Applied {
            return false;
        }
        self.error = Some(OperationError {
            kind: token.kind,
            message: message.into(),
        });
        true
    }

    /// What [`settle`](Self::settle) would decide for `token`, without
    /// settling it.
    pub fn peek(&self, token: &RequestToken<K>) -> Settlement {
        if !self.in_flight.contains(token) {
            return Settlement::Unknown;
        }
        let newer_landed = self
            .last_applied
            .get(&token.kind)
            .is_some_and(|seq| *seq > token.seq);
        if token.kind.replaces_slot() && newer_landed {
            Settlement::Superseded
        } else {
            Settlement::Applied
        }
    }

    /// Whether a request with this token would be discarded if it settled now.
    pub fn is_superseded(&self, token: &RequestToken<K>) -> bool {
        self.peek(token) != Settlement::Applied
    }

    /// True while a fresh load or single fetch is outstanding.
    pub fn is_loading(&self) -> bool {
        self.in_flight.iter().any(|t| t.mode == LoadMode::Fresh)
    }

    /// True while a pagination continuation is outstanding and no fresh load
    /// is. Never true at the same time as [`is_loading`](Self::is_loading).
    pub fn is_loading_more(&self) -> bool {
        !self.is_loading() && self.in_flight.iter().any(|t| t.mode == LoadMode::More)
    }

    /// True while any read (fresh or continuation) is outstanding.
    pub fn is_fetching(&self) -> bool {
        self.in_flight.iter().any(|t| t.mode != LoadMode::Mutation)
    }

    /// True while an operation of `kind` is outstanding.
    pub fn is_busy(&self, kind: K) -> bool {
        self.in_flight.iter().any(|t| t.kind == kind)
    }

    /// Number of outstanding operations.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// The recorded error message, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    /// The recorded error with its operation class.
    pub fn last_error(&self) -> Option<&OperationError<K>> {
        self.error.as_ref()
    }

    /// Drop the recorded error.
    pub fn clear_error(&mut self) {
        self.error = None;
    }
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::Op;
    use super::*;

    fn token(kind: Op, seq: u64, mode: LoadMode) -> RequestToken<Op> {
        RequestToken::new(kind, seq, mode)
    }

    #[test]
    fn tokens_are_hashable_by_mode() {
        let tokens: std::collections::HashSet<_> = [
            token(Op::List, 1, LoadMode::Fresh),
            token(Op::List, 1, LoadMode::More),
            token(Op::List, 1, LoadMode::Fresh),
        ]
        .into_iter()
        .collect();
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn fresh_load_sets_and_clears_loading() {
        let mut lc = Lifecycle::default();
        let t = token(Op::List, 1, LoadMode::Fresh);
        lc.begin(t);
        assert!(lc.is_loading());
        assert!(!lc.is_loading_more());
        assert!(lc.succeed(t));
        assert!(!lc.is_loading());
        assert_eq!(lc.in_flight(), 0);
    }

    #[test]
    fn loading_more_is_exclusive_with_loading() {
        let mut lc = Lifecycle::default();
        lc.begin(token(Op::List, 1, LoadMode::More));
        assert!(lc.is_loading_more());
        lc.begin(token(Op::One, 2, LoadMode::Fresh));
        assert!(lc.is_loading());
        assert!(!lc.is_loading_more());
    }

    #[test]
    fn begin_clears_error_of_same_kind_only() {
        let mut lc = Lifecycle::default();
        let t1 = token(Op::Save, 1, LoadMode::Mutation);
        lc.begin(t1);
        assert!(lc.fail(t1, "declined"));
        assert_eq!(lc.error(), Some("declined"));

        // Unrelated operation leaves the error alone.
        lc.begin(token(Op::List, 2, LoadMode::Fresh));
        assert_eq!(lc.error(), Some("declined"));

        lc.begin(token(Op::Save, 3, LoadMode::Mutation));
        assert_eq!(lc.error(), None);
    }

    #[test]
    fn older_slot_response_is_superseded() {
        let mut lc = Lifecycle::default();
        let early = token(Op::One, 1, LoadMode::Fresh);
        let late = token(Op::One, 2, LoadMode::Fresh);
        lc.begin(early);
        lc.begin(late);

        assert!(lc.succeed(late));
        assert!(lc.is_superseded(&early));
        assert_eq!(lc.peek(&early), Settlement::Superseded);
        assert_eq!(lc.settle(early), Settlement::Superseded);
        assert_eq!(lc.in_flight(), 0);
    }

    #[test]
    fn stale_failure_is_not_recorded() {
        let mut lc = Lifecycle::default();
        let early = token(Op::List, 1, LoadMode::Fresh);
        let late = token(Op::List, 2, LoadMode::Fresh);
        lc.begin(early);
        lc.begin(late);
        assert!(lc.succeed(late));
        assert!(!lc.fail(early, "timeout"));
        assert_eq!(lc.error(), None);
    }

    #[test]
    fn in_order_responses_both_apply() {
        let mut lc = Lifecycle::default();
        let a = token(Op::One, 1, LoadMode::Fresh);
        let b = token(Op::One, 2, LoadMode::Fresh);
        lc.begin(a);
        lc.begin(b);
        assert!(lc.succeed(a));
        assert!(lc.succeed(b));
    }

    #[test]
    fn mutations_are_never_superseded() {
        let mut lc = Lifecycle::default();
        let a = token(Op::Save, 1, LoadMode::Mutation);
        let b = token(Op::Save, 2, LoadMode::Mutation);
        lc.begin(a);
        lc.begin(b);
        assert!(lc.succeed(b));
        assert!(lc.succeed(a));
    }

    #[test]
    fn unknown_token_is_discarded() {
        let mut lc: Lifecycle<Op> = Lifecycle::default();
        let t = token(Op::List, 7, LoadMode::Fresh);
        assert_eq!(lc.peek(&t), Settlement::Unknown);
        assert_eq!(lc.settle(t), Settlement::Unknown);
        assert!(!lc.fail(t, "late"));
        assert_eq!(lc.error(), None);
    }

    #[test]
    fn busy_flag_tracks_kind() {
        let mut lc = Lifecycle::default();
        let t = token(Op::Save, 4, LoadMode::Mutation);
        lc.begin(t);
        assert!(lc.is_busy(Op::Save));
        assert!(!lc.is_busy(Op::List));
        assert!(!lc.is_fetching());
        lc.succeed(t);
        assert!(!lc.is_busy(Op::Save));
    }
}
