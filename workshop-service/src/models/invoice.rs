//! Invoice snapshot and the aggregated billing view.

use super::{Membership, ServiceStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable financial snapshot of a completed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub request_id: Uuid,
    pub customer_id: String,
    pub membership: Membership,
    pub currency: String,
    pub materials_total: Decimal,
    pub labor_total: Decimal,
    pub discount: Decimal,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub grand_total: Decimal,
    /// Labor discount rate actually applied (zero for standard members).
    pub discount_rate: Decimal,
    pub tax_rate: Decimal,
    /// Ledger revision the snapshot was computed from.
    pub ledger_revision: u64,
    pub downloadable: bool,
    pub generated_utc: DateTime<Utc>,
}

/// Aggregated billing view of a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingSummary {
    pub request_id: Uuid,
    pub status: ServiceStatus,
    pub materials_total: Decimal,
    pub labor_total: Decimal,
    pub discount: Decimal,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub grand_total: Decimal,
    pub is_paid: bool,
    pub has_invoice: bool,
    /// Ledger changed after the invoice snapshot was taken.
    pub invoice_stale: bool,
    pub is_dispatched: bool,
}
