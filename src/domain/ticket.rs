//! Ticket entity -- a traffic or parking infraction issued to a vehicle.
//!
//! A ticket's status follows the most recent accepted payment or dispute.
//! Its payment history only ever grows locally.

use serde::{Deserialize, Serialize};

use crate::collection::Entity;
use crate::error::ValidationError;
use crate::filter::{FilterSpec, matches_text, normalize_query};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle status of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Outstanding,
    Pending,
    Unpaid,
    Overdue,
    Paid,
    Disputed,
    #[serde(alias = "canceled")]
    Cancelled,
}

impl TicketStatus {
    /// All statuses, in display order.
    pub const ALL: [TicketStatus; 7] = [
        Self::Outstanding,
        Self::Pending,
        Self::Unpaid,
        Self::Overdue,
        Self::Paid,
        Self::Disputed,
        Self::Cancelled,
    ];

    /// Wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outstanding => "outstanding",
            Self::Pending => "pending",
            Self::Unpaid => "unpaid",
            Self::Overdue => "overdue",
            Self::Paid => "paid",
            Self::Disputed => "disputed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether money is still owed on a ticket in this status.
    pub fn is_owed(&self) -> bool {
        matches!(
            self,
            Self::Outstanding | Self::Pending | Self::Unpaid | Self::Overdue
        )
    }
}

/// One confirmed payment applied to a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHistoryEntry {
    /// Server-side payment identifier.
    pub payment_id: String,
    /// Confirmed amount in minor units.
    pub amount_cents: u64,
    /// Unix timestamp (seconds) the server confirmed the payment at.
    pub paid_at: u64,
}

/// A traffic or parking ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    /// Human-facing ticket number printed on the notice.
    pub ticket_number: String,
    pub license_plate: String,
    /// Catalog code of the infraction (see `InfractionType::code`).
    pub infraction_code: String,
    #[serde(default)]
    pub municipality: Option<String>,
    /// Fine in minor units.
    pub amount_cents: u64,
    pub currency: String,
    pub status: TicketStatus,
    /// Unix timestamp (seconds) of the violation.
    pub violation_date: u64,
    /// Unix timestamp (seconds) payment is due by.
    pub due_date: u64,
    #[serde(default)]
    pub dispute_id: Option<String>,
    #[serde(default)]
    pub payment_history: Vec<PaymentHistoryEntry>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Entity for Ticket {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Ticket {
    /// Record a confirmed payment: append to history and mark paid.
    pub fn record_payment(&mut self, entry: PaymentHistoryEntry) {
        self.payment_history.push(entry);
        self.status = TicketStatus::Paid;
    }

    /// Attach a dispute and mark the ticket disputed.
    pub fn attach_dispute(&mut self, dispute_id: &str) {
        self.dispute_id = Some(dispute_id.to_string());
        self.status = TicketStatus::Disputed;
    }

    /// Whether the ticket is still owed and past its due date at `now`.
    pub fn is_overdue_at(&self, now: u64) -> bool {
        self.status == TicketStatus::Overdue || (self.status.is_owed() && self.due_date < now)
    }

    /// Sum of all recorded payments.
    pub fn amount_paid(&self) -> u64 {
        self.payment_history.iter().map(|e| e.amount_cents).sum()
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Body of a ticket create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    pub ticket_number: String,
    pub license_plate: String,
    pub infraction_code: String,
    pub municipality: Option<String>,
    pub amount_cents: u64,
    pub currency: String,
    pub violation_date: u64,
    pub due_date: u64,
}

impl NewTicket {
    /// Field checks run before the create request is sent.
    ///
    /// # Errors
    ///
    /// Returns the first failing [`ValidationError`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ticket_number.trim().is_empty() {
            return Err(ValidationError::EmptyField("ticket number"));
        }
        if self.license_plate.trim().is_empty() {
            return Err(ValidationError::EmptyField("license plate"));
        }
        if self.amount_cents == 0 {
            return Err(ValidationError::NonPositiveAmount);
        }
        Ok(())
    }
}

/// Partial update of a ticket. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_plate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<u64>,
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Ticket list filter. Also sent to the server as query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    /// Free text over ticket number, plate, infraction code, municipality.
    pub search: Option<String>,
    pub license_plate: Option<String>,
}

/// One assignment to a [`TicketFilter`] field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketFilterField {
    Status(Option<TicketStatus>),
    Search(Option<String>),
    LicensePlate(Option<String>),
}

/// Plates compare without case or spacing: "ab 123" equals "AB123".
fn plate_key(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}

impl FilterSpec<Ticket> for TicketFilter {
    type Field = TicketFilterField;

    fn set(&mut self, field: TicketFilterField) {
        match field {
            TicketFilterField::Status(status) => self.status = status,
            TicketFilterField::Search(search) => self.search = normalize_query(search),
            TicketFilterField::LicensePlate(plate) => self.license_plate = normalize_query(plate),
        }
    }

    fn matches(&self, ticket: &Ticket) -> bool {
        if self.status.is_some_and(|status| ticket.status != status) {
            return false;
        }
        if let Some(plate) = &self.license_plate
            && plate_key(plate) != plate_key(&ticket.license_plate)
        {
            return false;
        }
        match &self.search {
            Some(query) => matches_text(
                query,
                [
                    ticket.ticket_number.as_str(),
                    ticket.license_plate.as_str(),
                    ticket.infraction_code.as_str(),
                    ticket.municipality.as_deref().unwrap_or(""),
                ],
            ),
            None => true,
        }
    }
}

impl TicketFilter {
    /// Query parameters for the collection fetch.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        if let Some(plate) = &self.license_plate {
            pairs.push(("licensePlate", plate.clone()));
        }
        pairs
    }
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::ticket;
    use super::*;

    #[test]
    fn record_payment_appends_and_marks_paid() {
        let mut t = ticket("T-1", 7500);
        t.record_payment(PaymentHistoryEntry {
            payment_id: "P-1".into(),
            amount_cents: 7500,
            paid_at: 1_700_100_000,
        });
        assert_eq!(t.status, TicketStatus::Paid);
        assert_eq!(t.payment_history.len(), 1);
        assert_eq!(t.amount_paid(), 7500);
    }

    #[test]
    fn attach_dispute_marks_disputed() {
        let mut t = ticket("T-1", 7500);
        t.attach_dispute("D-9");
        assert_eq!(t.status, TicketStatus::Disputed);
        assert_eq!(t.dispute_id.as_deref(), Some("D-9"));
    }

    #[test]
    fn overdue_only_when_owed() {
        let mut t = ticket("T-1", 100);
        assert!(t.is_overdue_at(t.due_date + 1));
        assert!(!t.is_overdue_at(t.due_date - 1));
        t.status = TicketStatus::Paid;
        assert!(!t.is_overdue_at(t.due_date + 1));
    }

    #[test]
    fn status_wire_names() {
        let json = serde_json::to_value(TicketStatus::Disputed).expect("serialize");
        assert_eq!(json, "disputed");
        let parsed: TicketStatus = serde_json::from_value("canceled".into()).expect("alias");
        assert_eq!(parsed, TicketStatus::Cancelled);
    }

    #[test]
    fn filter_by_plate_ignores_case_and_spacing() {
        let mut f = TicketFilter::default();
        f.set(TicketFilterField::LicensePlate(Some("abc-123".into())));
        assert!(f.matches(&ticket("T-1", 100)));
        f.set(TicketFilterField::LicensePlate(Some("XYZ 9".into())));
        assert!(!f.matches(&ticket("T-1", 100)));
    }

    #[test]
    fn search_matches_municipality() {
        let mut f = TicketFilter::default();
        f.set(TicketFilterField::Search(Some("montré".into())));
        assert!(f.matches(&ticket("T-1", 100)));
    }

    #[test]
    fn status_filter_and_query_pairs() {
        let mut f = TicketFilter::default();
        f.set(TicketFilterField::Status(Some(TicketStatus::Paid)));
        assert!(!f.matches(&ticket("T-1", 100)));
        assert_eq!(f.query_pairs(), vec![("status", "paid".to_string())]);
    }

    #[test]
    fn ticket_decodes_from_camel_case_wire_shape() {
        let json = serde_json::json!({
            "id": "T-100",
            "ticketNumber": "MTL-0001",
            "licensePlate": "ABC 123",
            "infractionCode": "P-01",
            "amountCents": 7500,
            "currency": "CAD",
            "status": "outstanding",
            "violationDate": 1700000000,
            "dueDate": 1702592000
        });
        let t: Ticket = serde_json::from_value(json).expect("decode");
        assert_eq!(t.status, TicketStatus::Outstanding);
        assert!(t.payment_history.is_empty());
        assert_eq!(t.dispute_id, None);
    }
}
