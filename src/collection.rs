//! Ordered entity cache with a "current" slot, pagination cursor, and filter.
//!
//! Every per-domain store is built from one or more [`Collection`]s. All
//! mutation helpers here are synchronous and are only ever called from a
//! store's reducer, so a reader can't observe a half-applied change.

use std::fmt::Debug;

use crate::filter::{FilterSpec, NoFilter, project};
use crate::pagination::{PageMeta, PageRequest, Pagination};

/// A server-owned entity with a stable identity.
pub trait Entity: Clone + Debug + PartialEq + Send + Sync + 'static {
    /// Server-assigned identifier.
    fn id(&self) -> &str;
}

/// Local cache of one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<T, F = NoFilter> {
    items: Vec<T>,
    current: Option<T>,
    pagination: Pagination,
    filter: F,
}

impl<T, F: Default> Default for Collection<T, F> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            current: None,
            pagination: Pagination::default(),
            filter: F::default(),
        }
    }
}

impl<T: Entity, F: FilterSpec<T>> Collection<T, F> {
    /// Raw collection, in display order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// The selected/detail entity.
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    /// Pagination cursor.
    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    /// Active filter specification.
    pub fn filter(&self) -> &F {
        &self.filter
    }

    /// Filtered view under the active filter.
    pub fn filtered(&self) -> Vec<&T> {
        project(&self.items, &self.filter)
    }

    /// Look up an entity in the collection by id.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Look up an entity in the collection, then in the current slot.
    pub fn find(&self, id: &str) -> Option<&T> {
        self.get(id)
            .or_else(|| self.current.as_ref().filter(|c| c.id() == id))
    }

    /// Whether `id` is cached in the collection or the current slot.
    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// Number of cached entities in the collection.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the collection holds nothing.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Apply a fetched page.
    ///
    /// Page 1 replaces the collection. Later pages append in server order;
    /// an entity already present (overlapping pages) is replaced in place
    /// instead of duplicated.
    pub fn apply_page(&mut self, request: PageRequest, items: Vec<T>, meta: Option<PageMeta>) {
        let returned = items.len();
        if request.is_fresh() {
            self.items = items;
        } else {
            for item in items {
                match self.items.iter_mut().find(|existing| existing.id() == item.id()) {
                    Some(existing) => *existing = item,
                    None => self.items.push(item),
                }
            }
        }
        self.pagination = Pagination::advance(request, returned, meta);
    }

    /// Replace the current slot. The collection is untouched.
    pub fn set_current(&mut self, item: T) {
        self.current = Some(item);
    }

    /// Empty the current slot.
    pub fn clear_current(&mut self) {
        self.current = None;
    }

    /// Prepend a newly created entity (newest first).
    pub fn prepend(&mut self, item: T) {
        self.items.retain(|existing| existing.id() != item.id());
        self.items.insert(0, item);
    }

    /// Replace the entity with the same id in the collection and in the
    /// current slot. Returns `true` if either copy was replaced.
    pub fn replace(&mut self, item: T) -> bool {
        let mut replaced = false;
        if let Some(current) = self.current.as_mut().filter(|c| c.id() == item.id()) {
            *current = item.clone();
            replaced = true;
        }
        if let Some(existing) = self.items.iter_mut().find(|e| e.id() == item.id()) {
            *existing = item;
            replaced = true;
        }
        replaced
    }

    /// Remove `id` from the collection and clear the current slot if it
    /// matched. Returns the removed entity.
    pub fn remove(&mut self, id: &str) -> Option<T> {
        let removed_current = self
            .current
            .take_if(|c| c.id() == id);
        let removed = self
            .items
            .iter()
            .position(|item| item.id() == id)
            .map(|pos| self.items.remove(pos));
        removed.or(removed_current)
    }

    /// Mutate both cached copies of `id` in place. Returns `true` if at
    /// least one copy was found.
    pub fn modify(&mut self, id: &str, mut f: impl FnMut(&mut T)) -> bool {
        let mut found = false;
        if let Some(current) = self.current.as_mut().filter(|c| c.id() == id) {
            f(current);
            found = true;
        }
        if let Some(item) = self.items.iter_mut().find(|item| item.id() == id) {
            f(item);
            found = true;
        }
        found
    }

    /// Mutate every cached entity, the current slot included.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        self.items.iter_mut().for_each(&mut f);
        if let Some(current) = self.current.as_mut() {
            f(current);
        }
    }

    /// Assign one filter field. Returns `true` if the spec changed.
    pub fn set_filter(&mut self, field: F::Field) -> bool {
        let before = self.filter.clone();
        self.filter.set(field);
        before != self.filter
    }

    /// Reset the filter to its empty default.
    pub fn clear_filter(&mut self) {
        self.filter = F::default();
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::Entity;

    /// Bare entity used by collection tests.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Item {
        pub id: String,
        pub label: String,
    }

    impl Item {
        pub(crate) fn new(id: &str, label: &str) -> Self {
            Self {
                id: id.into(),
                label: label.into(),
            }
        }
    }

    impl Entity for Item {
        fn id(&self) -> &str {
            &self.id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::Item;
    use super::*;

    fn ids(c: &Collection<Item>) -> Vec<&str> {
        c.items().iter().map(|i| i.id.as_str()).collect()
    }

    fn page(ids: &[&str]) -> Vec<Item> {
        ids.iter().map(|id| Item::new(id, "x")).collect()
    }

    #[test]
    fn pages_concatenate_in_order() {
        let mut c = Collection::<Item>::default();
        c.apply_page(PageRequest::new(1, 2), page(&["a", "b"]), None);
        c.apply_page(PageRequest::new(2, 2), page(&["c", "d"]), None);
        assert_eq!(ids(&c), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn fresh_page_replaces_everything() {
        let mut c = Collection::<Item>::default();
        c.apply_page(PageRequest::new(1, 2), page(&["a", "b"]), None);
        c.apply_page(PageRequest::new(1, 2), page(&["x"]), None);
        assert_eq!(ids(&c), vec!["x"]);
    }

    #[test]
    fn overlapping_page_merges_by_identity() {
        let mut c = Collection::<Item>::default();
        c.apply_page(PageRequest::new(1, 2), page(&["a", "b"]), None);
        c.apply_page(
            PageRequest::new(2, 2),
            vec![Item::new("b", "fresh"), Item::new("c", "x")],
            None,
        );
        assert_eq!(ids(&c), vec!["a", "b", "c"]);
        assert_eq!(c.get("b").map(|i| i.label.as_str()), Some("fresh"));
    }

    #[test]
    fn set_current_leaves_collection_alone() {
        let mut c = Collection::<Item>::default();
        c.apply_page(PageRequest::new(1, 5), page(&["a"]), None);
        c.set_current(Item::new("a", "detail"));
        assert_eq!(c.get("a").map(|i| i.label.as_str()), Some("x"));
        assert_eq!(c.current().map(|i| i.label.as_str()), Some("detail"));
    }

    #[test]
    fn prepend_puts_newest_first() {
        let mut c = Collection::<Item>::default();
        c.apply_page(PageRequest::new(1, 5), page(&["a", "b"]), None);
        c.prepend(Item::new("n", "new"));
        assert_eq!(ids(&c), vec!["n", "a", "b"]);
    }

    #[test]
    fn replace_updates_both_copies() {
        let mut c = Collection::<Item>::default();
        c.apply_page(PageRequest::new(1, 5), page(&["a"]), None);
        c.set_current(Item::new("a", "x"));
        assert!(c.replace(Item::new("a", "edited")));
        assert_eq!(c.get("a").map(|i| i.label.as_str()), Some("edited"));
        assert_eq!(c.current().map(|i| i.label.as_str()), Some("edited"));
    }

    #[test]
    fn remove_clears_matching_current() {
        let mut c = Collection::<Item>::default();
        c.apply_page(PageRequest::new(1, 5), page(&["a", "b"]), None);
        c.set_current(Item::new("a", "x"));
        assert!(c.remove("a").is_some());
        assert!(c.current().is_none());
        assert_eq!(ids(&c), vec!["b"]);
    }

    #[test]
    fn remove_keeps_unrelated_current() {
        let mut c = Collection::<Item>::default();
        c.apply_page(PageRequest::new(1, 5), page(&["a", "b"]), None);
        c.set_current(Item::new("b", "x"));
        c.remove("a");
        assert_eq!(c.current().map(|i| i.id.as_str()), Some("b"));
    }

    #[test]
    fn modify_reports_absent_target() {
        let mut c = Collection::<Item>::default();
        assert!(!c.modify("ghost", |i| i.label = "y".into()));
        assert!(!c.contains("ghost"));
    }
}
