//! Payment recording against an invoiced request.

use crate::error::{Result, WorkshopError};
use crate::models::{
    Invoice, Payment, PaymentStatus, Principal, RecordPayment, Role, ServiceRequest,
};
use crate::services::metrics::PAYMENTS_TOTAL;
use crate::services::store::ServiceStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct PaymentRecorder {
    store: Arc<dyn ServiceStore>,
    reconcile: bool,
}

impl PaymentRecorder {
    /// With `reconcile` set, a payment must match the invoice grand total.
    pub fn new(store: Arc<dyn ServiceStore>, reconcile: bool) -> Self {
        Self { store, reconcile }
    }

    /// Record a completed payment. At most one per request.
    #[instrument(skip(self, request, input, actor), fields(request_id = %request.request_id, actor_id = %actor.principal_id, method = input.method.as_str()))]
    pub async fn record(
        &self,
        request: &ServiceRequest,
        input: &RecordPayment,
        actor: &Principal,
    ) -> Result<Payment> {
        validate_input(input)?;
        authorize_payer(request, actor)?;
        let invoice = self.require_invoice(request).await?;
        self.ensure_unpaid(request).await?;

        if self.reconcile && input.amount != invoice.grand_total {
            return Err(WorkshopError::Validation(format!(
                "Payment amount {} does not match invoice total {}",
                input.amount, invoice.grand_total
            )));
        }

        let payment = self.build(request, input, PaymentStatus::Completed, None);

        if !self.store.insert_payment(&payment).await? {
            return Err(WorkshopError::DuplicatePayment(request.request_id));
        }

        PAYMENTS_TOTAL
            .with_label_values(&[input.method.as_str(), PaymentStatus::Completed.as_str()])
            .inc();
        info!(
            payment_id = %payment.payment_id,
            amount = %payment.amount,
            transaction_id = %payment.transaction_id,
            "Payment recorded"
        );

        Ok(payment)
    }

    /// Keep a declined attempt on file. Does not block a later success.
    #[instrument(skip(self, request, input, actor, reason), fields(request_id = %request.request_id, actor_id = %actor.principal_id))]
    pub async fn record_failure(
        &self,
        request: &ServiceRequest,
        input: &RecordPayment,
        reason: &str,
        actor: &Principal,
    ) -> Result<Payment> {
        validate_input(input)?;
        authorize_payer(request, actor)?;
        self.require_invoice(request).await?;
        self.ensure_unpaid(request).await?;

        let payment = self.build(
            request,
            input,
            PaymentStatus::Failed,
            Some(reason.to_string()),
        );
        self.store.insert_payment(&payment).await?;

        PAYMENTS_TOTAL
            .with_label_values(&[input.method.as_str(), PaymentStatus::Failed.as_str()])
            .inc();
        warn!(
            payment_id = %payment.payment_id,
            reason = reason,
            "Payment attempt failed"
        );

        Ok(payment)
    }

    /// The completed payment of a request, if any.
    pub async fn completed_payment(&self, request_id: Uuid) -> Result<Option<Payment>> {
        Ok(self
            .store
            .list_payments(request_id)
            .await?
            .into_iter()
            .find(|p| p.status == PaymentStatus::Completed))
    }

    async fn require_invoice(&self, request: &ServiceRequest) -> Result<Invoice> {
        self.store
            .get_invoice(request.request_id)
            .await?
            .ok_or_else(|| {
                WorkshopError::InvalidState(format!(
                    "Service request {} has no invoice to pay",
                    request.request_id
                ))
            })
    }

    async fn ensure_unpaid(&self, request: &ServiceRequest) -> Result<()> {
        if self.completed_payment(request.request_id).await?.is_some() {
            return Err(WorkshopError::DuplicatePayment(request.request_id));
        }
        Ok(())
    }

    fn build(
        &self,
        request: &ServiceRequest,
        input: &RecordPayment,
        status: PaymentStatus,
        failure_reason: Option<String>,
    ) -> Payment {
        Payment {
            payment_id: Uuid::new_v4(),
            request_id: request.request_id,
            customer_id: request.customer_id.clone(),
            amount: input.amount,
            method: input.method,
            transaction_id: input.transaction_id.trim().to_string(),
            status,
            failure_reason,
            recorded_utc: Utc::now(),
        }
    }
}

fn validate_input(input: &RecordPayment) -> Result<()> {
    input.validate()?;
    if input.transaction_id.trim().is_empty() {
        return Err(WorkshopError::Validation(
            "transaction_id must not be blank".to_string(),
        ));
    }
    Ok(())
}

/// Admins and the customer owning the vehicle may pay.
fn authorize_payer(request: &ServiceRequest, actor: &Principal) -> Result<()> {
    let owner = actor.role == Role::Customer && actor.principal_id == request.customer_id;
    if actor.is_admin() || owner {
        Ok(())
    } else {
        Err(WorkshopError::Unauthorized(format!(
            "{} may not pay for service request {}",
            actor.principal_id, request.request_id
        )))
    }
}
