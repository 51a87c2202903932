//! Backend compliance snapshot and the display cache derived from it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The server's answer to a status poll.
///
/// Regenerated on every successful poll; never trusted after a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSnapshot {
    /// Whether the backend wants the device locked.
    pub server_locked: bool,
    pub next_payment_date: Option<String>,
    pub amount_due: Option<String>,
    pub amount_paid: Option<String>,
    pub payment_instructions: Option<String>,
    pub contact_phone: Option<String>,
    pub company_logo_url: Option<String>,
    /// Free-form message shown alongside the billing fields.
    pub message: Option<String>,
}

impl ComplianceSnapshot {
    /// Days from `today` until the next payment date, if the date parses.
    ///
    /// Accepts ISO dates (`2026-10-21`) and day-first dates (`21/10/2026`).
    /// Negative when the payment is overdue.
    #[must_use]
    pub fn days_until_payment(&self, today: NaiveDate) -> Option<i64> {
        let raw = self.next_payment_date.as_deref()?.trim();
        let due = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
            .ok()?;
        Some((due - today).num_days())
    }
}

/// What a UI surface shows for billing, with defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayCache {
    pub next_payment_date: String,
    pub amount_due: String,
    pub amount_paid: String,
    pub payment_instructions: String,
    pub contact_phone: String,
    pub company_logo_url: Option<String>,
    pub message: Option<String>,
    pub reminder_title: Option<String>,
    pub reminder_message: Option<String>,
}

impl Default for DisplayCache {
    fn default() -> Self {
        Self {
            next_payment_date: "N/A".to_string(),
            amount_due: "$0.00".to_string(),
            amount_paid: "$0.00".to_string(),
            payment_instructions: "Contact the administrator for details.".to_string(),
            contact_phone: "N/A".to_string(),
            company_logo_url: None,
            message: None,
            reminder_title: None,
            reminder_message: None,
        }
    }
}
