//! Cost ledger records: material usage and the labor/tracking history.

use super::ServiceStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// A numeric value as it was stored.
///
/// Historical rows may hold text instead of a number. Reading such a value
/// never fails: anything unparseable counts as zero and is logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredAmount {
    Exact(Decimal),
    Raw(String),
}

impl StoredAmount {
    pub fn resolve(&self, field: &'static str, entry_id: Uuid) -> Decimal {
        match self {
            StoredAmount::Exact(value) => *value,
            StoredAmount::Raw(raw) => match Decimal::from_str(raw.trim()) {
                Ok(value) => value,
                Err(_) => {
                    warn!(
                        entry_id = %entry_id,
                        field = field,
                        raw = %raw,
                        "Malformed stored amount, counting as zero"
                    );
                    Decimal::ZERO
                }
            },
        }
    }
}

impl From<Decimal> for StoredAmount {
    fn from(value: Decimal) -> Self {
        StoredAmount::Exact(value)
    }
}

/// Material drawn from inventory for a request.
///
/// New entries carry no price; the line cost is read from the catalog each
/// time totals are computed. Older rows may carry an explicit `total`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialUsageEntry {
    pub entry_id: Uuid,
    pub request_id: Uuid,
    pub item_ref: String,
    pub quantity: StoredAmount,
    #[serde(default)]
    pub total: Option<StoredAmount>,
    pub actor_id: String,
    pub recorded_utc: DateTime<Utc>,
}

/// What a tracking record describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackingDetail {
    StatusChange {
        previous_status: Option<ServiceStatus>,
        new_status: ServiceStatus,
    },
    Assignment {
        previous_advisor_id: Option<String>,
        advisor_id: String,
    },
    Labor {
        hours: Option<StoredAmount>,
        rate_per_hour: Option<StoredAmount>,
        cost: Option<StoredAmount>,
    },
    /// Historical record holding only combined figures, no breakdown.
    LegacyCombined {
        labor_cost: Option<StoredAmount>,
        materials_cost: Option<StoredAmount>,
    },
}

/// Append-only labor and audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub tracking_id: Uuid,
    pub request_id: Uuid,
    pub note: String,
    pub detail: TrackingDetail,
    pub status_at_entry: ServiceStatus,
    pub actor_id: String,
    pub recorded_utc: DateTime<Utc>,
}

impl TrackingRecord {
    /// Whether the record contributes to totals.
    pub fn is_costed(&self) -> bool {
        matches!(
            self.detail,
            TrackingDetail::Labor { .. } | TrackingDetail::LegacyCombined { .. }
        )
    }
}

/// Largest quantity accepted on one material line.
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);
/// Largest number of hours accepted on one labor line.
pub const MAX_HOURS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);
/// Largest hourly rate accepted on one labor line.
pub const MAX_RATE_PER_HOUR: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

fn validate_quantity(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        Err(ValidationError::new("must_be_positive"))
    } else if *value > MAX_QUANTITY {
        Err(ValidationError::new("quantity_too_large"))
    } else {
        Ok(())
    }
}

fn validate_hours(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        Err(ValidationError::new("must_be_positive"))
    } else if *value > MAX_HOURS {
        Err(ValidationError::new("hours_too_large"))
    } else {
        Ok(())
    }
}

fn validate_rate(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        Err(ValidationError::new("must_not_be_negative"))
    } else if *value > MAX_RATE_PER_HOUR {
        Err(ValidationError::new("rate_too_large"))
    } else {
        Ok(())
    }
}

/// Input for booking material against a request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewMaterialUsage {
    #[validate(length(min = 1, max = 128))]
    pub item_ref: String,
    #[validate(custom(function = "validate_quantity"))]
    pub quantity: Decimal,
}

/// Input for booking labor against a request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewLaborEntry {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    #[validate(custom(function = "validate_hours"))]
    pub hours: Decimal,
    #[validate(custom(function = "validate_rate"))]
    pub rate_per_hour: Decimal,
}

/// A historical combined-cost record being replayed into the ledger.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyCombinedRecord {
    pub note: String,
    pub labor_cost: Option<StoredAmount>,
    pub materials_cost: Option<StoredAmount>,
    pub status_at_entry: ServiceStatus,
    pub actor_id: String,
    pub recorded_utc: DateTime<Utc>,
}

/// Where an aggregate figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalsSource {
    /// Dedicated material or labor rows.
    Entries,
    /// Combined legacy tracking records, used only when no dedicated rows exist.
    Legacy,
    Empty,
}

/// Aggregate cost of a request's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub materials_total: Decimal,
    pub labor_total: Decimal,
    pub materials_source: TotalsSource,
    pub labor_source: TotalsSource,
    /// Number of costed records seen.
    pub revision: u64,
}

/// Full ledger contents for one request, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerView {
    pub request_id: Uuid,
    pub materials: Vec<MaterialUsageEntry>,
    pub tracking: Vec<TrackingRecord>,
}
