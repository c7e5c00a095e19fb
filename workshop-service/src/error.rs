//! Error taxonomy for the lifecycle and billing engine.

use crate::collaborators::CollaboratorError;
use crate::models::ServiceStatus;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T, E = WorkshopError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum WorkshopError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: ServiceStatus,
        to: ServiceStatus,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Service request {0} is already invoiced")]
    AlreadyInvoiced(Uuid),

    #[error("Service request {0} already has a completed payment")]
    DuplicatePayment(Uuid),

    #[error("Service request {0} is already dispatched")]
    AlreadyDispatched(Uuid),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(anyhow::Error),
}

impl WorkshopError {
    /// Stable label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkshopError::Validation(_) => "validation",
            WorkshopError::NotFound(_) => "not_found",
            WorkshopError::InvalidTransition { .. } => "invalid_transition",
            WorkshopError::InvalidState(_) => "invalid_state",
            WorkshopError::Unauthorized(_) => "unauthorized",
            WorkshopError::AlreadyInvoiced(_) => "already_invoiced",
            WorkshopError::DuplicatePayment(_) => "duplicate_payment",
            WorkshopError::AlreadyDispatched(_) => "already_dispatched",
            WorkshopError::UpstreamUnavailable(_) => "upstream_unavailable",
            WorkshopError::Storage(_) => "storage",
        }
    }

    pub(crate) fn request_not_found(request_id: Uuid) -> Self {
        WorkshopError::NotFound(format!("Service request {} not found", request_id))
    }
}

impl From<validator::ValidationErrors> for WorkshopError {
    fn from(err: validator::ValidationErrors) -> Self {
        WorkshopError::Validation(err.to_string())
    }
}

impl From<CollaboratorError> for WorkshopError {
    fn from(err: CollaboratorError) -> Self {
        WorkshopError::UpstreamUnavailable(err.to_string())
    }
}

impl From<WorkshopError> for AppError {
    fn from(err: WorkshopError) -> Self {
        let message = err.to_string();
        match err {
            WorkshopError::Validation(_) => AppError::BadRequest(anyhow::anyhow!(message)),
            WorkshopError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            WorkshopError::InvalidTransition { .. } | WorkshopError::InvalidState(_) => {
                AppError::BadRequest(anyhow::anyhow!(message))
            }
            WorkshopError::Unauthorized(_) => AppError::Forbidden(anyhow::anyhow!(message)),
            WorkshopError::AlreadyInvoiced(_)
            | WorkshopError::DuplicatePayment(_)
            | WorkshopError::AlreadyDispatched(_) => AppError::Conflict(anyhow::anyhow!(message)),
            WorkshopError::UpstreamUnavailable(_) => AppError::BadGateway(message),
            WorkshopError::Storage(cause) => AppError::InternalError(cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: WorkshopError) -> u16 {
        AppError::from(err).status_code().as_u16()
    }

    #[test]
    fn idempotency_violations_map_to_conflict() {
        let id = Uuid::new_v4();
        assert_eq!(status_of(WorkshopError::AlreadyInvoiced(id)), 409);
        assert_eq!(status_of(WorkshopError::DuplicatePayment(id)), 409);
        assert_eq!(status_of(WorkshopError::AlreadyDispatched(id)), 409);
    }

    #[test]
    fn lifecycle_errors_map_to_client_errors() {
        let err = WorkshopError::InvalidTransition {
            from: ServiceStatus::Completed,
            to: ServiceStatus::Diagnosis,
        };
        assert_eq!(err.to_string(), "Invalid transition from completed to diagnosis");
        assert_eq!(status_of(err), 400);
        assert_eq!(status_of(WorkshopError::Unauthorized("not assigned".into())), 403);
        assert_eq!(status_of(WorkshopError::NotFound("request".into())), 404);
        assert_eq!(status_of(WorkshopError::UpstreamUnavailable("catalog".into())), 502);
    }
}
