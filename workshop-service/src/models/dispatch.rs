//! Vehicle hand-off record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Hand-off details captured at the counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DispatchDetails {
    #[validate(length(min = 1, max = 128))]
    pub received_by: String,
    pub odometer_km: Option<u32>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Terminal event closing a request's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub dispatch_id: Uuid,
    pub request_id: Uuid,
    pub invoice_id: Uuid,
    pub payment_id: Uuid,
    pub details: DispatchDetails,
    pub dispatched_by: String,
    pub dispatched_utc: DateTime<Utc>,
}
