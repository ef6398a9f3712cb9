//! Filter/search projector: derives a read-only filtered view of a collection.
//!
//! A view is a pure function of `(raw collection, filter spec)`. It is
//! recomputed on every read and never stored, so it can't drift from either
//! input and never mutates the collection it reads.

use std::convert::Infallible;
use std::fmt::Debug;

/// A per-domain filter specification.
///
/// # Contract
///
/// - [`matches`](FilterSpec::matches) must be deterministic and side-effect
///   free.
/// - [`set`](FilterSpec::set) with a value equal to the current one leaves
///   the spec unchanged.
pub trait FilterSpec<T>: Default + Clone + PartialEq + Debug + Send + Sync + 'static {
    /// A single `(key, value)` assignment, as a typed variant.
    type Field: Clone + Debug + Send + 'static;

    /// Assign one field.
    fn set(&mut self, field: Self::Field);

    /// Whether `item` passes every active criterion.
    fn matches(&self, item: &T) -> bool;

    /// True when no criterion is active.
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Filter for collections that are never filtered locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoFilter;

impl<T> FilterSpec<T> for NoFilter {
    type Field = Infallible;

    fn set(&mut self, field: Infallible) {
        match field {}
    }

    fn matches(&self, _item: &T) -> bool {
        true
    }
}

/// Project `items` through `spec`, preserving collection order.
pub fn project<'a, T, F: FilterSpec<T>>(items: &'a [T], spec: &F) -> Vec<&'a T> {
    items.iter().filter(|item| spec.matches(item)).collect()
}

/// Case-insensitive substring match of `query` against any of `fields`.
///
/// A blank query matches everything.
pub fn matches_text<'a>(query: &str, fields: impl IntoIterator<Item = &'a str>) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    fields
        .into_iter()
        .any(|field| field.to_lowercase().contains(&needle))
}

/// Normalise a free-text filter value: blank strings clear the criterion.
pub(crate) fn normalize_query(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Parity {
        even: Option<bool>,
    }

    impl FilterSpec<u32> for Parity {
        type Field = Option<bool>;

        fn set(&mut self, field: Option<bool>) {
            self.even = field;
        }

        fn matches(&self, item: &u32) -> bool {
            self.even.is_none_or(|even| (item % 2 == 0) == even)
        }
    }

    #[test]
    fn projection_preserves_order_and_source() {
        let items = vec![1, 2, 3, 4];
        let mut spec = Parity::default();
        spec.set(Some(true));
        assert_eq!(project(&items, &spec), vec![&2, &4]);
        assert_eq!(items, vec![1, 2, 3, 4]);
    }

    #[test]
    fn default_spec_is_empty_and_passes_all() {
        let items = vec![1, 2, 3];
        let spec = Parity::default();
        assert!(spec.is_empty());
        assert_eq!(project(&items, &spec).len(), 3);
    }

    #[test]
    fn text_match_is_case_insensitive_substring() {
        assert!(matches_text("park", ["No PARKING zone"]));
        assert!(matches_text("  Zone ", ["a", "no parking zone"]));
        assert!(!matches_text("speed", ["No parking zone"]));
        assert!(matches_text("", ["anything"]));
    }

    #[test]
    fn text_match_handles_accented_labels() {
        assert!(matches_text("STATIONNEMENT", ["Stationnement interdit"]));
        assert!(matches_text("ÉCOLE", ["zone d'école"]));
    }

    #[test]
    fn blank_query_normalises_to_none() {
        assert_eq!(normalize_query(Some("   ".into())), None);
        assert_eq!(normalize_query(Some(" abc ".into())), Some("abc".into()));
    }

    #[test]
    fn no_filter_matches_everything() {
        let items = vec!["a", "b"];
        assert_eq!(project(&items, &NoFilter).len(), 2);
    }
}
