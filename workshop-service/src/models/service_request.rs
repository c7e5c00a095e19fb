//! Service request model and its status lifecycle.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// Lifecycle status. Variants are declared in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Received,
    Diagnosis,
    Repair,
    Completed,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Received => "received",
            ServiceStatus::Diagnosis => "diagnosis",
            ServiceStatus::Repair => "repair",
            ServiceStatus::Completed => "completed",
        }
    }

    /// Parse a stored status token. Case-insensitive; unknown tokens are `None`.
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "received" => Some(ServiceStatus::Received),
            "diagnosis" => Some(ServiceStatus::Diagnosis),
            "repair" => Some(ServiceStatus::Repair),
            "completed" => Some(ServiceStatus::Completed),
            _ => None,
        }
    }

    /// The only status this one may move to.
    pub fn next(&self) -> Option<Self> {
        match self {
            ServiceStatus::Received => Some(ServiceStatus::Diagnosis),
            ServiceStatus::Diagnosis => Some(ServiceStatus::Repair),
            ServiceStatus::Repair => Some(ServiceStatus::Completed),
            ServiceStatus::Completed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }

    /// Whether material and labor may be booked against a request in this status.
    pub fn accepts_ledger_entries(&self) -> bool {
        !matches!(self, ServiceStatus::Received)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vehicle service request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub request_id: Uuid,
    pub vehicle_id: Uuid,
    pub customer_id: String,
    pub assigned_advisor_id: Option<String>,
    pub status: ServiceStatus,
    pub service_type: String,
    pub description: String,
    pub requested_delivery_date: Option<NaiveDate>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl ServiceRequest {
    pub fn is_assigned_to(&self, principal_id: &str) -> bool {
        self.assigned_advisor_id.as_deref() == Some(principal_id)
    }
}

/// Input for creating a service request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewServiceRequest {
    pub vehicle_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub service_type: String,
    #[validate(length(max = 2000))]
    pub description: String,
    pub requested_delivery_date: Option<NaiveDate>,
}

/// One step of the status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub previous_status: Option<ServiceStatus>,
    pub new_status: ServiceStatus,
    pub actor_id: String,
    pub recorded_utc: DateTime<Utc>,
    pub note: String,
}

/// Current status and full history of a request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestStatusView {
    pub request_id: Uuid,
    pub status: ServiceStatus,
    pub assigned_advisor_id: Option<String>,
    pub history: Vec<StatusHistoryEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_advance_one_step_at_a_time() {
        assert_eq!(ServiceStatus::Received.next(), Some(ServiceStatus::Diagnosis));
        assert_eq!(ServiceStatus::Diagnosis.next(), Some(ServiceStatus::Repair));
        assert_eq!(ServiceStatus::Repair.next(), Some(ServiceStatus::Completed));
        assert!(ServiceStatus::Completed.is_terminal());
        assert!(ServiceStatus::Received < ServiceStatus::Completed);
    }

    #[test]
    fn status_tokens_are_case_insensitive() {
        assert_eq!(
            ServiceStatus::from_string("COMPLETED"),
            Some(ServiceStatus::Completed)
        );
        assert_eq!(
            ServiceStatus::from_string(" Diagnosis "),
            Some(ServiceStatus::Diagnosis)
        );
        assert_eq!(ServiceStatus::from_string("assigned"), None);
    }
}
