//! Status lifecycle: Received -> Diagnosis -> Repair -> Completed.
//!
//! Every transition and assignment is appended to the tracking history of
//! the request; history is never rewritten.

use crate::error::{Result, WorkshopError};
use crate::models::{
    Principal, RequestStatusView, Role, ServiceRequest, ServiceStatus, StatusHistoryEntry,
    TrackingDetail, TrackingRecord,
};
use crate::services::metrics::TRANSITIONS_TOTAL;
use crate::services::store::ServiceStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Reject anything but a single step forward.
pub fn check_transition(from: ServiceStatus, to: ServiceStatus) -> Result<()> {
    if from.next() == Some(to) {
        Ok(())
    } else {
        Err(WorkshopError::InvalidTransition { from, to })
    }
}

/// Work on a request is reserved to admins and its assigned advisor.
pub fn authorize_work(request: &ServiceRequest, actor: &Principal) -> Result<()> {
    let allowed = actor.is_admin()
        || (actor.role == Role::Advisor && request.is_assigned_to(&actor.principal_id));

    if allowed {
        Ok(())
    } else {
        Err(WorkshopError::Unauthorized(format!(
            "{} {} is not assigned to service request {}",
            actor.role, actor.principal_id, request.request_id
        )))
    }
}

#[derive(Clone)]
pub struct ServiceRequestStateMachine {
    store: Arc<dyn ServiceStore>,
}

impl ServiceRequestStateMachine {
    pub fn new(store: Arc<dyn ServiceStore>) -> Self {
        Self { store }
    }

    /// Persist a freshly created request with its first history entry.
    #[instrument(skip(self, request, actor), fields(request_id = %request.request_id, actor_id = %actor.principal_id))]
    pub async fn open(&self, request: &ServiceRequest, actor: &Principal) -> Result<()> {
        if request.status != ServiceStatus::Received {
            return Err(WorkshopError::InvalidState(format!(
                "New service requests start as received, got {}",
                request.status
            )));
        }

        self.store.insert_request(request).await?;
        self.append_history(
            request.request_id,
            None,
            ServiceStatus::Received,
            actor,
            "Service request received",
        )
        .await?;

        info!("Service request opened");
        Ok(())
    }

    /// Advance the request by one status.
    #[instrument(skip(self, request, actor, note), fields(request_id = %request.request_id, actor_id = %actor.principal_id, to = %to))]
    pub async fn transition(
        &self,
        request: &ServiceRequest,
        to: ServiceStatus,
        actor: &Principal,
        note: &str,
    ) -> Result<ServiceRequest> {
        authorize_work(request, actor)?;
        check_transition(request.status, to)?;

        if request.status == ServiceStatus::Received && request.assigned_advisor_id.is_none() {
            return Err(WorkshopError::InvalidState(format!(
                "Service request {} needs an assigned advisor before diagnosis",
                request.request_id
            )));
        }

        let mut updated = request.clone();
        updated.status = to;
        updated.updated_utc = Utc::now();

        self.store.update_request(&updated).await?;
        self.append_history(request.request_id, Some(request.status), to, actor, note)
            .await?;

        TRANSITIONS_TOTAL.with_label_values(&[to.as_str()]).inc();
        info!(from = %request.status, "Status transition recorded");

        Ok(updated)
    }

    /// Set or replace the assigned advisor. Status does not change.
    #[instrument(skip(self, request, advisor, actor), fields(request_id = %request.request_id, advisor_id = %advisor.principal_id))]
    pub async fn assign(
        &self,
        request: &ServiceRequest,
        advisor: &Principal,
        actor: &Principal,
    ) -> Result<ServiceRequest> {
        if !actor.is_admin() {
            return Err(WorkshopError::Unauthorized(format!(
                "Only admins assign advisors, {} is {}",
                actor.principal_id, actor.role
            )));
        }

        if advisor.role != Role::Advisor {
            return Err(WorkshopError::Validation(format!(
                "{} is not an advisor",
                advisor.principal_id
            )));
        }

        if request.status.is_terminal() {
            return Err(WorkshopError::InvalidState(format!(
                "Service request {} is already {}",
                request.request_id, request.status
            )));
        }

        let mut updated = request.clone();
        updated.assigned_advisor_id = Some(advisor.principal_id.clone());
        updated.updated_utc = Utc::now();

        self.store.update_request(&updated).await?;
        self.store
            .append_tracking(&TrackingRecord {
                tracking_id: Uuid::new_v4(),
                request_id: request.request_id,
                note: format!("Assigned to {}", advisor.principal_id),
                detail: TrackingDetail::Assignment {
                    previous_advisor_id: request.assigned_advisor_id.clone(),
                    advisor_id: advisor.principal_id.clone(),
                },
                status_at_entry: request.status,
                actor_id: actor.principal_id.clone(),
                recorded_utc: updated.updated_utc,
            })
            .await?;

        info!("Advisor assigned");
        Ok(updated)
    }

    /// Current status and its history, oldest first.
    pub async fn status_view(&self, request: &ServiceRequest) -> Result<RequestStatusView> {
        let mut history: Vec<StatusHistoryEntry> = self
            .store
            .list_tracking(request.request_id)
            .await?
            .into_iter()
            .filter_map(|record| match record.detail {
                TrackingDetail::StatusChange {
                    previous_status,
                    new_status,
                } => Some(StatusHistoryEntry {
                    previous_status,
                    new_status,
                    actor_id: record.actor_id,
                    recorded_utc: record.recorded_utc,
                    note: record.note,
                }),
                _ => None,
            })
            .collect();
        history.sort_by_key(|entry| entry.recorded_utc);

        Ok(RequestStatusView {
            request_id: request.request_id,
            status: request.status,
            assigned_advisor_id: request.assigned_advisor_id.clone(),
            history,
        })
    }

    async fn append_history(
        &self,
        request_id: Uuid,
        previous_status: Option<ServiceStatus>,
        new_status: ServiceStatus,
        actor: &Principal,
        note: &str,
    ) -> Result<()> {
        self.store
            .append_tracking(&TrackingRecord {
                tracking_id: Uuid::new_v4(),
                request_id,
                note: note.to_string(),
                detail: TrackingDetail::StatusChange {
                    previous_status,
                    new_status,
                },
                status_at_entry: new_status,
                actor_id: actor.principal_id.clone(),
                recorded_utc: Utc::now(),
            })
            .await
    }
}
