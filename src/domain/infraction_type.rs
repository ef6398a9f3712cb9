//! Infraction-type catalog entries.
//!
//! Read-mostly from the client's side; only administrative flows create,
//! edit, or retire entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::collection::Entity;
use crate::error::ValidationError;
use crate::filter::{FilterSpec, matches_text, normalize_query};

/// Locales a catalog label can be provided in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Fr,
    Es,
}

/// Whether the vehicle was parked or in motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfractionCategory {
    Stationary,
    Moving,
}

impl InfractionCategory {
    /// Wire name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stationary => "stationary",
            Self::Moving => "moving",
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfractionType {
    pub id: String,
    pub code: String,
    /// Label per locale.
    pub labels: BTreeMap<Locale, String>,
    pub category: InfractionCategory,
    pub base_fine_cents: u64,
    pub currency: String,
    /// Demerit points.
    #[serde(default)]
    pub points: u8,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub municipality: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Entity for InfractionType {
    fn id(&self) -> &str {
        &self.id
    }
}

impl InfractionType {
    /// Label for exactly `locale`, if one was provided.
    pub fn label(&self, locale: Locale) -> Option<&str> {
        self.labels.get(&locale).map(String::as_str)
    }
}

/// Body of a catalog create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInfractionType {
    pub code: String,
    pub labels: BTreeMap<Locale, String>,
    pub category: InfractionCategory,
    pub base_fine_cents: u64,
    pub currency: String,
    pub points: u8,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,
}

impl NewInfractionType {
    /// Field checks run before dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyField`] for a blank code or a missing
    /// label, [`ValidationError::NonPositiveAmount`] for a zero fine.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.code.trim().is_empty() {
            return Err(ValidationError::EmptyField("code"));
        }
        if self.labels.values().all(|label| label.trim().is_empty()) {
            return Err(ValidationError::EmptyField("label"));
        }
        if self.base_fine_cents == 0 {
            return Err(ValidationError::NonPositiveAmount);
        }
        Ok(())
    }
}

/// Partial update of a catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfractionTypePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<Locale, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_fine_cents: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,
}

/// Catalog filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfractionTypeFilter {
    /// Free text over code, every localized label, and municipality name.
    pub search: Option<String>,
    pub category: Option<InfractionCategory>,
    pub active_only: bool,
}

/// One assignment to an [`InfractionTypeFilter`] field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfractionTypeFilterField {
    Search(Option<String>),
    Category(Option<InfractionCategory>),
    ActiveOnly(bool),
}

impl FilterSpec<InfractionType> for InfractionTypeFilter {
    type Field = InfractionTypeFilterField;

    fn set(&mut self, field: InfractionTypeFilterField) {
        match field {
            InfractionTypeFilterField::Search(search) => self.search = normalize_query(search),
            InfractionTypeFilterField::Category(category) => self.category = category,
            InfractionTypeFilterField::ActiveOnly(flag) => self.active_only = flag,
        }
    }

    fn matches(&self, entry: &InfractionType) -> bool {
        if self.active_only && !entry.active {
            return false;
        }
        if self.category.is_some_and(|c| entry.category != c) {
            return false;
        }
        let Some(query) = &self.search else {
            return true;
        };
        let fields = std::iter::once(entry.code.as_str())
            .chain(entry.labels.values().map(String::as_str))
            .chain(entry.municipality.as_deref());
        matches_text(query, fields)
    }
}

impl InfractionTypeFilter {
    /// Query parameters for the collection fetch.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        if let Some(category) = self.category {
            pairs.push(("category", category.as_str().to_string()));
        }
        if self.active_only {
            pairs.push(("active", "true".to_string()));
        }
        pairs
    }
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::entry;
    use super::*;

    fn search(q: &str) -> InfractionTypeFilter {
        let mut f = InfractionTypeFilter::default();
        f.set(InfractionTypeFilterField::Search(Some(q.into())));
        f
    }

    #[test]
    fn search_covers_code_labels_and_municipality() {
        let e = entry("it-1", "P-01", "No parking", "Stationnement interdit");
        assert!(search("p-0").matches(&e));
        assert!(search("PARKING").matches(&e));
        assert!(search("stationnement").matches(&e));
        assert!(search("laval").matches(&e));
        assert!(!search("speeding").matches(&e));
    }

    #[test]
    fn active_only_and_category() {
        let mut e = entry("it-1", "P-01", "No parking", "Stationnement interdit");
        let mut f = InfractionTypeFilter::default();
        f.set(InfractionTypeFilterField::ActiveOnly(true));
        assert!(f.matches(&e));
        e.active = false;
        assert!(!f.matches(&e));

        let mut f = InfractionTypeFilter::default();
        f.set(InfractionTypeFilterField::Category(Some(InfractionCategory::Moving)));
        assert!(!f.matches(&entry("it-2", "P-02", "a", "b")));
    }

    #[test]
    fn label_lookup_is_exact() {
        let e = entry("it-1", "P-01", "No parking", "Stationnement interdit");
        assert_eq!(e.label(Locale::Fr), Some("Stationnement interdit"));
        assert_eq!(e.label(Locale::Es), None);
    }

    #[test]
    fn labels_round_trip_as_locale_keyed_object() {
        let e = entry("it-1", "P-01", "No parking", "Stationnement interdit");
        let json = serde_json::to_value(&e).expect("serialize");
        assert_eq!(json["labels"]["fr"], "Stationnement interdit");
    }

    #[test]
    fn new_entry_validation() {
        let mut new = NewInfractionType {
            code: "M-10".into(),
            labels: BTreeMap::from([(Locale::En, "Speeding".into())]),
            category: InfractionCategory::Moving,
            base_fine_cents: 15_000,
            currency: "CAD".into(),
            points: 2,
            active: true,
            municipality: None,
        };
        assert!(new.validate().is_ok());
        new.labels.clear();
        assert_eq!(new.validate(), Err(ValidationError::EmptyField("label")));
    }
}
