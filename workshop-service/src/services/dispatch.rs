//! Vehicle hand-off, the terminal event of a request.

use crate::error::{Result, WorkshopError};
use crate::models::{DispatchDetails, DispatchRecord, PaymentStatus, Principal, ServiceRequest, ServiceStatus};
use crate::services::metrics::DISPATCHES_TOTAL;
use crate::services::state_machine::authorize_work;
use crate::services::store::ServiceStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct DispatchFinalizer {
    store: Arc<dyn ServiceStore>,
}

impl DispatchFinalizer {
    pub fn new(store: Arc<dyn ServiceStore>) -> Self {
        Self { store }
    }

    /// Close the request. Needs a completed request with a downloadable
    /// invoice and a completed payment; happens at most once.
    #[instrument(skip(self, request, details, actor), fields(request_id = %request.request_id, actor_id = %actor.principal_id))]
    pub async fn dispatch(
        &self,
        request: &ServiceRequest,
        details: &DispatchDetails,
        actor: &Principal,
    ) -> Result<DispatchRecord> {
        details.validate()?;
        authorize_work(request, actor)?;

        if self.store.get_dispatch(request.request_id).await?.is_some() {
            return Err(WorkshopError::AlreadyDispatched(request.request_id));
        }

        if request.status != ServiceStatus::Completed {
            return Err(WorkshopError::InvalidState(format!(
                "Service request {} is {}, dispatch needs completed",
                request.request_id, request.status
            )));
        }

        let invoice = match self.store.get_invoice(request.request_id).await? {
            Some(invoice) if invoice.downloadable => invoice,
            _ => {
                return Err(WorkshopError::InvalidState(format!(
                    "Service request {} has no downloadable invoice",
                    request.request_id
                )))
            }
        };

        let payment = self
            .store
            .list_payments(request.request_id)
            .await?
            .into_iter()
            .find(|p| p.status == PaymentStatus::Completed)
            .ok_or_else(|| {
                WorkshopError::InvalidState(format!(
                    "Service request {} is not paid",
                    request.request_id
                ))
            })?;

        let record = DispatchRecord {
            dispatch_id: Uuid::new_v4(),
            request_id: request.request_id,
            invoice_id: invoice.invoice_id,
            payment_id: payment.payment_id,
            details: details.clone(),
            dispatched_by: actor.principal_id.clone(),
            dispatched_utc: Utc::now(),
        };

        if !self.store.insert_dispatch(&record).await? {
            return Err(WorkshopError::AlreadyDispatched(request.request_id));
        }

        DISPATCHES_TOTAL.with_label_values(&["dispatched"]).inc();
        info!(
            dispatch_id = %record.dispatch_id,
            invoice_id = %invoice.invoice_id,
            received_by = %record.details.received_by,
            "Vehicle dispatched"
        );

        Ok(record)
    }

    pub async fn record_for(&self, request_id: Uuid) -> Result<Option<DispatchRecord>> {
        self.store.get_dispatch(request_id).await
    }
}
