//! Infraction-type catalog store.

use crate::collection::Collection;
use crate::domain::{InfractionType, InfractionTypeFilter, InfractionTypeFilterField};
use crate::lifecycle::{Lifecycle, LoadMode, OperationKind, RequestToken};
use crate::pagination::{PageMeta, PageRequest};

use super::Store;

/// Operation classes tracked by the catalog store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfractionTypeOp {
    FetchAll,
    FetchOne,
    Create,
    Update,
    Delete,
}

impl OperationKind for InfractionTypeOp {
    fn replaces_slot(self) -> bool {
        matches!(self, Self::FetchAll | Self::FetchOne)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::FetchAll => "fetch_infraction_types",
            Self::FetchOne => "fetch_infraction_type",
            Self::Create => "create_infraction_type",
            Self::Update => "update_infraction_type",
            Self::Delete => "delete_infraction_type",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InfractionTypeEvent {
    Requested(RequestToken<InfractionTypeOp>),
    Failed {
        token: RequestToken<InfractionTypeOp>,
        message: String,
    },
    Loaded {
        token: RequestToken<InfractionTypeOp>,
        request: PageRequest,
        items: Vec<InfractionType>,
        meta: Option<PageMeta>,
    },
    OneLoaded {
        token: RequestToken<InfractionTypeOp>,
        entry: InfractionType,
    },
    Created {
        token: RequestToken<InfractionTypeOp>,
        entry: InfractionType,
    },
    Updated {
        token: RequestToken<InfractionTypeOp>,
        entry: InfractionType,
    },
    Deleted {
        token: RequestToken<InfractionTypeOp>,
        id: String,
    },
    FilterSet(InfractionTypeFilterField),
    FiltersCleared,
    ErrorCleared,
}

/// Local cache of the infraction-type catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfractionTypeStore {
    entries: Collection<InfractionType, InfractionTypeFilter>,
    lifecycle: Lifecycle<InfractionTypeOp>,
}

impl Store for InfractionTypeStore {
    const NAME: &'static str = "infraction_types";

    type Op = InfractionTypeOp;
    type Event = InfractionTypeEvent;

    fn lifecycle(&self) -> &Lifecycle<InfractionTypeOp> {
        &self.lifecycle
    }

    fn admits(&self, kind: InfractionTypeOp, mode: LoadMode) -> bool {
        if mode != LoadMode::More {
            return true;
        }
        kind == InfractionTypeOp::FetchAll
            && self.entries.pagination().has_next_page()
            && !self.lifecycle.is_fetching()
    }

    fn settles(event: &InfractionTypeEvent) -> Option<RequestToken<InfractionTypeOp>> {
        use InfractionTypeEvent::*;
        match event {
            Failed { token, .. }
            | Loaded { token, .. }
            | OneLoaded { token, .. }
            | Created { token, .. }
            | Updated { token, .. }
            | Deleted { token, .. } => Some(*token),
            _ => None,
        }
    }

    fn apply(mut self, event: &InfractionTypeEvent) -> Self {
        match event {
            InfractionTypeEvent::Requested(token) => self.lifecycle.begin(*token),
            InfractionTypeEvent::Failed { token, message } => {
                self.lifecycle.fail(*token, message.clone());
            }
            InfractionTypeEvent::Loaded {
                token,
                request,
                items,
                meta,
            } => {
                if self.lifecycle.succeed(*token) {
                    self.entries.apply_page(*request, items.clone(), *meta);
                }
            }
            InfractionTypeEvent::OneLoaded { token, entry } => {
                if self.lifecycle.succeed(*token) {
                    self.entries.set_current(entry.clone());
                }
            }
            InfractionTypeEvent::Created { token, entry } => {
                if self.lifecycle.succeed(*token) {
                    self.entries.prepend(entry.clone());
                }
            }
            InfractionTypeEvent::Updated { token, entry } => {
                if self.lifecycle.succeed(*token) {
                    self.entries.replace(entry.clone());
                }
            }
            InfractionTypeEvent::Deleted { token, id } => {
                if self.lifecycle.succeed(*token) {
                    self.entries.remove(id);
                }
            }
            InfractionTypeEvent::FilterSet(field) => {
                self.entries.set_filter(field.clone());
            }
            InfractionTypeEvent::FiltersCleared => self.entries.clear_filter(),
            InfractionTypeEvent::ErrorCleared => self.lifecycle.clear_error(),
        }
        self
    }
}

impl InfractionTypeStore {
    /// The catalog collection.
    pub fn entries(&self) -> &Collection<InfractionType, InfractionTypeFilter> {
        &self.entries
    }

    /// The last entry fetched, created or updated.
    pub fn current(&self) -> Option<&InfractionType> {
        self.entries.current()
    }

    /// Entries visible under the active filter.
    pub fn filtered(&self) -> Vec<&InfractionType> {
        self.entries.filtered()
    }

    /// Entries still in force, regardless of the active filter.
    pub fn active_entries(&self) -> Vec<&InfractionType> {
        self.entries.items().iter().filter(|e| e.active).collect()
    }

    /// Look up an entry by its catalog code.
    pub fn by_code(&self, code: &str) -> Option<&InfractionType> {
        self.entries
            .items()
            .iter()
            .find(|e| e.code.eq_ignore_ascii_case(code))
    }

    /// Whether a fresh load or single fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.lifecycle.is_loading()
    }

    /// Whether a load-more is in flight.
    pub fn is_loading_more(&self) -> bool {
        self.lifecycle.is_loading_more()
    }

    /// Message of the last failed operation.
    pub fn error(&self) -> Option<&str> {
        self.lifecycle.error()
    }
}
