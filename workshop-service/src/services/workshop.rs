//! Command and query surface of the engine.
//!
//! Every mutation of a request runs under that request's lock, resolves the
//! acting principal through the identity collaborator, then delegates to
//! the component that owns the rule.

use crate::collaborators::{Collaborators, Notification, NotificationKind};
use crate::config::{NotificationConfig, WorkshopConfig};
use crate::error::{Result, WorkshopError};
use crate::models::{
    BillingSummary, Customer, DispatchDetails, DispatchRecord, Invoice, LedgerTotals, LedgerView,
    LegacyCombinedRecord, MaterialUsageEntry, NewLaborEntry, NewMaterialUsage, NewServiceRequest,
    Payment, Principal, RecordPayment, RequestStatusView, Role, ServiceRequest, ServiceStatus,
    TrackingRecord,
};
use crate::services::dispatch::DispatchFinalizer;
use crate::services::invoicing::{render_invoice, InvoiceGenerator};
use crate::services::ledger::{ledger_revision, CostLedger};
use crate::services::locks::{RequestGuard, RequestLocks};
use crate::services::metrics::{
    COMMANDS_TOTAL, COMMAND_DURATION, ERRORS_TOTAL, NOTIFICATION_FAILURES_TOTAL,
};
use crate::services::payments::PaymentRecorder;
use crate::services::pricing::{price, DiscountPolicy, TaxCalculator};
use crate::services::state_machine::{authorize_work, ServiceRequestStateMachine};
use crate::services::store::ServiceStore;
use chrono::Utc;
use service_core::retry::retry_call;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn, Instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct WorkshopService {
    store: Arc<dyn ServiceStore>,
    collaborators: Collaborators,
    locks: RequestLocks,
    state_machine: ServiceRequestStateMachine,
    ledger: CostLedger,
    invoices: InvoiceGenerator,
    payments: PaymentRecorder,
    dispatcher: DispatchFinalizer,
    notifications: NotificationConfig,
}

impl WorkshopService {
    pub fn new(
        config: &WorkshopConfig,
        store: Arc<dyn ServiceStore>,
        collaborators: Collaborators,
    ) -> Self {
        let ledger = CostLedger::new(store.clone(), collaborators.catalog.clone());
        let invoices = InvoiceGenerator::new(
            store.clone(),
            ledger.clone(),
            DiscountPolicy::new(config.billing.premium_labor_discount_rate),
            TaxCalculator::new(config.billing.tax_rate),
            config.billing.currency.clone(),
        );

        Self {
            state_machine: ServiceRequestStateMachine::new(store.clone()),
            payments: PaymentRecorder::new(store.clone(), config.billing.reconcile_payments),
            dispatcher: DispatchFinalizer::new(store.clone()),
            ledger,
            invoices,
            store,
            collaborators,
            locks: RequestLocks::new(),
            notifications: config.notifications.clone(),
        }
    }

    // ---- lifecycle ----

    #[instrument(skip(self, input), fields(vehicle_id = %input.vehicle_id))]
    pub async fn create_request(
        &self,
        input: NewServiceRequest,
        actor_id: &str,
    ) -> Result<ServiceRequest> {
        self.observed("create_request", async {
            input.validate()?;
            let actor = self.principal(actor_id).await?;

            let customer = self
                .collaborators
                .customers
                .customer_for_vehicle(input.vehicle_id)
                .await?
                .ok_or_else(|| {
                    WorkshopError::NotFound(format!("Vehicle {} not found", input.vehicle_id))
                })?;

            let own_vehicle =
                actor.role == Role::Customer && actor.principal_id == customer.customer_id;
            if !actor.is_admin() && !own_vehicle {
                return Err(WorkshopError::Unauthorized(format!(
                    "{} may not book service for vehicle {}",
                    actor.principal_id, input.vehicle_id
                )));
            }

            let now = Utc::now();
            let request = ServiceRequest {
                request_id: Uuid::new_v4(),
                vehicle_id: input.vehicle_id,
                customer_id: customer.customer_id.clone(),
                assigned_advisor_id: None,
                status: ServiceStatus::Received,
                service_type: input.service_type.trim().to_string(),
                description: input.description,
                requested_delivery_date: input.requested_delivery_date,
                created_utc: now,
                updated_utc: now,
            };

            self.state_machine.open(&request, &actor).await?;

            self.notify(
                NotificationKind::BookingReceived,
                &request,
                format!("Service booking received: {}", request.service_type),
                format!(
                    "Hello {}, we have received your {} booking. Reference: {}",
                    customer.name, request.service_type, request.request_id
                ),
            );

            info!(request_id = %request.request_id, "Service request created");
            Ok(request)
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn assign(
        &self,
        request_id: Uuid,
        advisor_id: &str,
        actor_id: &str,
    ) -> Result<ServiceRequest> {
        self.observed("assign", async {
            let actor = self.principal(actor_id).await?;
            let advisor = self
                .collaborators
                .identity
                .resolve(advisor_id)
                .await?
                .ok_or_else(|| WorkshopError::NotFound(format!("Advisor {} not found", advisor_id)))?;

            let (_guard, request) = self.lock_request(request_id).await?;
            self.state_machine.assign(&request, &advisor, &actor).await
        })
        .await
    }

    #[instrument(skip(self, note))]
    pub async fn transition(
        &self,
        request_id: Uuid,
        to: ServiceStatus,
        actor_id: &str,
        note: &str,
    ) -> Result<ServiceRequest> {
        self.observed("transition", async {
            let actor = self.principal(actor_id).await?;

            let (_guard, request) = self.lock_request(request_id).await?;
            self.state_machine
                .transition(&request, to, &actor, note)
                .await
        })
        .await
    }

    pub async fn status(&self, request_id: Uuid, actor_id: &str) -> Result<RequestStatusView> {
        self.observed("status", async {
            let (request, _) = self.load_for_view(request_id, actor_id).await?;
            self.state_machine.status_view(&request).await
        })
        .await
    }

    // ---- ledger ----

    #[instrument(skip(self, input))]
    pub async fn add_material(
        &self,
        request_id: Uuid,
        input: NewMaterialUsage,
        actor_id: &str,
    ) -> Result<MaterialUsageEntry> {
        self.observed("add_material", async {
            let actor = self.principal(actor_id).await?;

            let (_guard, request) = self.lock_request(request_id).await?;
            self.ensure_ledger_open(&request, &actor).await?;
            self.ledger.add_material(&request, &input, &actor).await
        })
        .await
    }

    #[instrument(skip(self, input))]
    pub async fn add_labor(
        &self,
        request_id: Uuid,
        input: NewLaborEntry,
        actor_id: &str,
    ) -> Result<TrackingRecord> {
        self.observed("add_labor", async {
            let actor = self.principal(actor_id).await?;

            let (_guard, request) = self.lock_request(request_id).await?;
            self.ensure_ledger_open(&request, &actor).await?;
            self.ledger.add_labor(&request, &input, &actor).await
        })
        .await
    }

    /// Replay a historical combined-cost record. Admin only.
    #[instrument(skip(self, record))]
    pub async fn import_legacy_record(
        &self,
        request_id: Uuid,
        record: LegacyCombinedRecord,
        actor_id: &str,
    ) -> Result<TrackingRecord> {
        self.observed("import_legacy_record", async {
            let actor = self.principal(actor_id).await?;
            if !actor.is_admin() {
                return Err(WorkshopError::Unauthorized(format!(
                    "Only admins import legacy records, {} is {}",
                    actor.principal_id, actor.role
                )));
            }

            let (_guard, _) = self.lock_request(request_id).await?;
            self.ledger.import_legacy(request_id, record).await
        })
        .await
    }

    pub async fn ledger(&self, request_id: Uuid, actor_id: &str) -> Result<LedgerView> {
        self.observed("ledger", async {
            self.load_for_view(request_id, actor_id).await?;
            self.ledger.view(request_id).await
        })
        .await
    }

    pub async fn compute_totals(&self, request_id: Uuid, actor_id: &str) -> Result<LedgerTotals> {
        self.observed("compute_totals", async {
            let actor = self.principal(actor_id).await?;
            let (_guard, request) = self.lock_request(request_id).await?;
            authorize_view(&request, &actor)?;
            self.ledger.compute_totals(request_id).await
        })
        .await
    }

    // ---- billing ----

    #[instrument(skip(self))]
    pub async fn generate_invoice(&self, request_id: Uuid, actor_id: &str) -> Result<Invoice> {
        self.observed("generate_invoice", async {
            let actor = self.principal(actor_id).await?;

            // Held across totals and insert: no ledger write can slip in between.
            let (_guard, request) = self.lock_request(request_id).await?;
            let customer = self.customer_of(&request).await?;
            let invoice = self.invoices.generate(&request, &customer, &actor).await?;

            self.notify(
                NotificationKind::InvoiceGenerated,
                &request,
                format!("Invoice for service request {}", request.request_id),
                format!(
                    "Hello {}, your invoice is ready. Amount due: {} {}",
                    customer.name, invoice.currency, invoice.grand_total
                ),
            );

            Ok(invoice)
        })
        .await
    }

    pub async fn invoice(&self, request_id: Uuid, actor_id: &str) -> Result<Invoice> {
        self.observed("invoice", async {
            self.load_for_view(request_id, actor_id).await?;
            self.store.get_invoice(request_id).await?.ok_or_else(|| {
                WorkshopError::NotFound(format!(
                    "Invoice for service request {} not found",
                    request_id
                ))
            })
        })
        .await
    }

    /// Printable invoice text. Same invoice, same bytes.
    pub async fn render_invoice(&self, request_id: Uuid, actor_id: &str) -> Result<String> {
        let invoice = self.invoice(request_id, actor_id).await?;
        if !invoice.downloadable {
            return Err(WorkshopError::InvalidState(format!(
                "Invoice {} is not downloadable",
                invoice.invoice_id
            )));
        }
        Ok(render_invoice(&invoice))
    }

    #[instrument(skip(self, input))]
    pub async fn record_payment(
        &self,
        request_id: Uuid,
        input: RecordPayment,
        actor_id: &str,
    ) -> Result<Payment> {
        self.observed("record_payment", async {
            let actor = self.principal(actor_id).await?;

            let (_guard, request) = self.lock_request(request_id).await?;
            let payment = self.payments.record(&request, &input, &actor).await?;

            self.notify(
                NotificationKind::PaymentReceived,
                &request,
                format!("Payment received for service request {}", request.request_id),
                format!(
                    "We have received your payment of {} (transaction {}).",
                    payment.amount, payment.transaction_id
                ),
            );

            Ok(payment)
        })
        .await
    }

    #[instrument(skip(self, input, reason))]
    pub async fn record_failed_payment(
        &self,
        request_id: Uuid,
        input: RecordPayment,
        reason: &str,
        actor_id: &str,
    ) -> Result<Payment> {
        self.observed("record_failed_payment", async {
            let actor = self.principal(actor_id).await?;

            let (_guard, request) = self.lock_request(request_id).await?;
            self.payments
                .record_failure(&request, &input, reason, &actor)
                .await
        })
        .await
    }

    #[instrument(skip(self, details))]
    pub async fn dispatch(
        &self,
        request_id: Uuid,
        details: DispatchDetails,
        actor_id: &str,
    ) -> Result<DispatchRecord> {
        self.observed("dispatch", async {
            let actor = self.principal(actor_id).await?;

            let (_guard, request) = self.lock_request(request_id).await?;
            let record = self.dispatcher.dispatch(&request, &details, &actor).await?;

            self.notify(
                NotificationKind::VehicleDispatched,
                &request,
                "Your vehicle is ready".to_string(),
                format!(
                    "Your vehicle was handed over to {}. Thank you for choosing us.",
                    record.details.received_by
                ),
            );

            Ok(record)
        })
        .await
    }

    /// Aggregated billing view. Figures come from the invoice snapshot once
    /// one exists, otherwise they are computed from the ledger.
    pub async fn billing_summary(&self, request_id: Uuid, actor_id: &str) -> Result<BillingSummary> {
        self.observed("billing_summary", async {
            let actor = self.principal(actor_id).await?;
            let (_guard, request) = self.lock_request(request_id).await?;
            authorize_view(&request, &actor)?;

            let invoice = self.store.get_invoice(request_id).await?;
            let is_paid = self.payments.completed_payment(request_id).await?.is_some();
            let is_dispatched = self.dispatcher.record_for(request_id).await?.is_some();

            let summary = match invoice {
                Some(invoice) => {
                    let view = self.ledger.view(request_id).await?;
                    let revision = ledger_revision(&view.materials, &view.tracking);
                    BillingSummary {
                        request_id,
                        status: request.status,
                        materials_total: invoice.materials_total,
                        labor_total: invoice.labor_total,
                        discount: invoice.discount,
                        subtotal: invoice.subtotal,
                        tax: invoice.tax,
                        grand_total: invoice.grand_total,
                        is_paid,
                        has_invoice: true,
                        invoice_stale: revision != invoice.ledger_revision,
                        is_dispatched,
                    }
                }
                None => {
                    let customer = self.customer_of(&request).await?;
                    let totals = self.ledger.compute_totals(request_id).await?;
                    let breakdown = price(
                        &totals,
                        &customer,
                        self.invoices.discount_policy(),
                        self.invoices.tax_calculator(),
                    );
                    BillingSummary {
                        request_id,
                        status: request.status,
                        materials_total: breakdown.materials_total,
                        labor_total: breakdown.labor_total,
                        discount: breakdown.discount,
                        subtotal: breakdown.subtotal,
                        tax: breakdown.tax,
                        grand_total: breakdown.grand_total,
                        is_paid,
                        has_invoice: false,
                        invoice_stale: false,
                        is_dispatched,
                    }
                }
            };

            Ok(summary)
        })
        .await
    }

    // ---- helpers ----

    async fn observed<T, F>(&self, command: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timer = COMMAND_DURATION
            .with_label_values(&[command])
            .start_timer();

        let result = fut.await;

        timer.observe_duration();

        match &result {
            Ok(_) => COMMANDS_TOTAL.with_label_values(&[command, "ok"]).inc(),
            Err(err) => {
                COMMANDS_TOTAL.with_label_values(&[command, "error"]).inc();
                ERRORS_TOTAL.with_label_values(&[err.kind()]).inc();
                debug!(command = command, error = %err, "Command rejected");
            }
        }

        result
    }

    async fn principal(&self, principal_id: &str) -> Result<Principal> {
        self.collaborators
            .identity
            .resolve(principal_id)
            .await?
            .ok_or_else(|| WorkshopError::Unauthorized(format!("Unknown principal {}", principal_id)))
    }

    async fn load(&self, request_id: Uuid) -> Result<ServiceRequest> {
        self.store
            .get_request(request_id)
            .await?
            .ok_or_else(|| WorkshopError::request_not_found(request_id))
    }

    /// Lock a request and read it under the lock. Unknown ids fail before
    /// a lock entry is created.
    async fn lock_request(&self, request_id: Uuid) -> Result<(RequestGuard, ServiceRequest)> {
        self.load(request_id).await?;
        let guard = self.locks.acquire(request_id).await;
        let request = self.load(request_id).await?;
        Ok((guard, request))
    }

    async fn load_for_view(
        &self,
        request_id: Uuid,
        actor_id: &str,
    ) -> Result<(ServiceRequest, Principal)> {
        let actor = self.principal(actor_id).await?;
        let request = self.load(request_id).await?;
        authorize_view(&request, &actor)?;
        Ok((request, actor))
    }

    async fn customer_of(&self, request: &ServiceRequest) -> Result<Customer> {
        self.collaborators
            .customers
            .customer_for_vehicle(request.vehicle_id)
            .await?
            .ok_or_else(|| {
                WorkshopError::NotFound(format!(
                    "Customer for vehicle {} not found",
                    request.vehicle_id
                ))
            })
    }

    async fn ensure_ledger_open(&self, request: &ServiceRequest, actor: &Principal) -> Result<()> {
        authorize_work(request, actor)?;

        if !request.status.accepts_ledger_entries() {
            return Err(WorkshopError::InvalidState(format!(
                "Service request {} is {}, ledger entries need diagnosis or later",
                request.request_id, request.status
            )));
        }

        if self.store.get_dispatch(request.request_id).await?.is_some() {
            return Err(WorkshopError::InvalidState(format!(
                "Service request {} is already dispatched",
                request.request_id
            )));
        }

        if let Some(invoice) = self.store.get_invoice(request.request_id).await? {
            warn!(
                request_id = %request.request_id,
                invoice_id = %invoice.invoice_id,
                "Ledger entry added after invoicing, invoice snapshot is now stale"
            );
        }

        Ok(())
    }

    /// Fire and forget. Failures are logged and counted, never returned.
    fn notify(
        &self,
        kind: NotificationKind,
        request: &ServiceRequest,
        subject: String,
        body: String,
    ) {
        if !self.notifications.enabled {
            debug!(kind = kind.as_str(), "Notifications disabled, skipping");
            return;
        }

        let notifier = self.collaborators.notifier.clone();
        let retry = self.notifications.retry_config();
        let notification = Notification {
            kind,
            request_id: request.request_id,
            customer_id: request.customer_id.clone(),
            subject,
            body,
        };

        tokio::spawn(
            async move {
                let result = retry_call(&retry, kind.as_str(), || {
                    let notifier = notifier.clone();
                    let notification = notification.clone();
                    async move { notifier.send(notification).await }
                })
                .await;

                match result {
                    Ok(()) => debug!(kind = kind.as_str(), "Notification delivered"),
                    Err(err) => {
                        NOTIFICATION_FAILURES_TOTAL
                            .with_label_values(&[kind.as_str()])
                            .inc();
                        warn!(
                            kind = kind.as_str(),
                            request_id = %notification.request_id,
                            error = %err,
                            "Notification not delivered"
                        );
                    }
                }
            }
            .in_current_span(),
        );
    }
}

/// Reads are open to admins, the assigned advisor and the owning customer.
fn authorize_view(request: &ServiceRequest, actor: &Principal) -> Result<()> {
    let owner = actor.role == Role::Customer && actor.principal_id == request.customer_id;
    if owner {
        Ok(())
    } else {
        authorize_work(request, actor)
    }
}
