//! Payments made against tickets, and the saved payment methods used to
//! make them.
//!
//! At most one payment method is the default at any time.

use serde::{Deserialize, Serialize};

use crate::collection::Entity;
use crate::error::ValidationError;
use crate::filter::FilterSpec;

// ---------------------------------------------------------------------------
// Payment
// ---------------------------------------------------------------------------

/// Outcome status of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

/// A payment applied (or attempted) against one ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub ticket_id: String,
    pub amount_cents: u64,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(default)]
    pub payment_method_id: Option<String>,
    pub created_at: u64,
}

impl Entity for Payment {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Body of a pay-ticket request. The ticket id travels in the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayTicket {
    pub amount_cents: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,
}

/// Payment history filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub ticket_id: Option<String>,
}

/// One assignment to a [`PaymentFilter`] field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentFilterField {
    Status(Option<PaymentStatus>),
    TicketId(Option<String>),
}

impl FilterSpec<Payment> for PaymentFilter {
    type Field = PaymentFilterField;

    fn set(&mut self, field: PaymentFilterField) {
        match field {
            PaymentFilterField::Status(status) => self.status = status,
            PaymentFilterField::TicketId(id) => self.ticket_id = id,
        }
    }

    fn matches(&self, payment: &Payment) -> bool {
        self.status.is_none_or(|s| payment.status == s)
            && self
                .ticket_id
                .as_deref()
                .is_none_or(|id| payment.ticket_id == id)
    }
}

impl PaymentFilter {
    /// Query parameters for the collection fetch.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(id) = &self.ticket_id {
            pairs.push(("ticketId", id.clone()));
        }
        pairs
    }
}

// ---------------------------------------------------------------------------
// PaymentMethod
// ---------------------------------------------------------------------------

/// A saved card, stored by the processor and shown here masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: String,
    /// Card brand, e.g. "visa".
    pub brand: String,
    pub last4: String,
    pub exp_month: u8,
    pub exp_year: u16,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub holder_name: Option<String>,
}

impl Entity for PaymentMethod {
    fn id(&self) -> &str {
        &self.id
    }
}

impl PaymentMethod {
    /// Masked display summary, e.g. `"VISA •••• 4242 (08/27)"`.
    pub fn masked(&self) -> String {
        format!(
            "{} •••• {} ({:02}/{:02})",
            self.brand.to_uppercase(),
            self.last4,
            self.exp_month,
            self.exp_year % 100
        )
    }

    /// Whether the card has expired by the given month.
    pub fn is_expired(&self, year: u16, month: u8) -> bool {
        (self.exp_year, self.exp_month) < (year, month)
    }
}

/// Body of a payment-method create request.
///
/// The raw card never reaches this crate; `processor_token` is what the
/// card SDK returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPaymentMethod {
    pub processor_token: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: u8,
    pub exp_year: u16,
    #[serde(default)]
    pub is_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder_name: Option<String>,
}

impl NewPaymentMethod {
    /// Field checks run before dispatch.
    ///
    /// # Errors
    ///
    /// Returns the first failing [`ValidationError`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.processor_token.trim().is_empty() {
            return Err(ValidationError::EmptyField("processor token"));
        }
        if self.last4.len() != 4 || !self.last4.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidCardSummary);
        }
        validate_expiry_month(self.exp_month)
    }
}

/// Partial update of a payment method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp_month: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp_year: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder_name: Option<String>,
}

impl PaymentMethodPatch {
    /// Field checks run before dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidExpiry`] for a bad month.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.exp_month {
            Some(month) => validate_expiry_month(month),
            None => Ok(()),
        }
    }
}

fn validate_expiry_month(month: u8) -> Result<(), ValidationError> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(ValidationError::InvalidExpiry(month))
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;

    pub(crate) fn card(id: &str, is_default: bool) -> PaymentMethod {
        PaymentMethod {
            id: id.to_string(),
            brand: "visa".to_string(),
            last4: "4242".to_string(),
            exp_month: 8,
            exp_year: 2027,
            is_default,
            holder_name: None,
        }
    }

    pub(crate) fn payment(id: &str, ticket_id: &str, amount_cents: u64) -> Payment {
        Payment {
            id: id.to_string(),
            ticket_id: ticket_id.to_string(),
            amount_cents,
            currency: "CAD".to_string(),
            status: PaymentStatus::Completed,
            payment_method_id: None,
            created_at: 1_700_200_000,
        }
    }

    pub(crate) fn new_card(is_default: bool) -> NewPaymentMethod {
        NewPaymentMethod {
            processor_token: "tok_visa".to_string(),
            brand: "visa".to_string(),
            last4: "4242".to_string(),
            exp_month: 8,
            exp_year: 2027,
            is_default,
            holder_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::{card, new_card};
    use super::*;

    #[test]
    fn masked_summary() {
        assert_eq!(card("pm-1", false).masked(), "VISA •••• 4242 (08/27)");
    }

    #[test]
    fn expiry_comparison() {
        let c = card("pm-1", false);
        assert!(!c.is_expired(2027, 8));
        assert!(c.is_expired(2027, 9));
    }

    #[test]
    fn new_method_validation() {
        assert!(new_card(true).validate().is_ok());

        let mut bad = new_card(false);
        bad.exp_month = 13;
        assert_eq!(bad.validate(), Err(ValidationError::InvalidExpiry(13)));

        let mut bad = new_card(false);
        bad.last4 = "42a2".into();
        assert_eq!(bad.validate(), Err(ValidationError::InvalidCardSummary));

        let mut bad = new_card(false);
        bad.processor_token = " ".into();
        assert!(matches!(bad.validate(), Err(ValidationError::EmptyField(_))));
    }

    #[test]
    fn patch_skips_absent_fields_on_the_wire() {
        let patch = PaymentMethodPatch {
            holder_name: Some("A. Driver".into()),
            ..PaymentMethodPatch::default()
        };
        let json = serde_json::to_value(&patch).expect("serialize");
        assert_eq!(json, serde_json::json!({ "holderName": "A. Driver" }));
    }

    #[test]
    fn payment_filter_query_pairs() {
        let mut f = PaymentFilter::default();
        f.set(PaymentFilterField::TicketId(Some("T-1".into())));
        assert_eq!(f.query_pairs(), vec![("ticketId", "T-1".to_string())]);
    }
}
