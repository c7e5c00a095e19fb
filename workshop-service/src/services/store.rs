//! Record store for workshop-service.
//!
//! Five record sets keyed by request id (requests, material usage,
//! labor/tracking history, invoices, payments) plus dispatch records.
//! Entries are only ever appended; nothing is deleted.

use crate::error::{Result, WorkshopError};
use crate::models::{
    DispatchRecord, Invoice, MaterialUsageEntry, Payment, PaymentStatus, ServiceRequest,
    TrackingRecord,
};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Persistence boundary of the engine.
///
/// The insert-if-absent methods return `false` instead of overwriting, so
/// at-most-once rules hold at the storage level too.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn insert_request(&self, request: &ServiceRequest) -> Result<()>;
    async fn get_request(&self, request_id: Uuid) -> Result<Option<ServiceRequest>>;
    async fn update_request(&self, request: &ServiceRequest) -> Result<()>;

    async fn append_material(&self, entry: &MaterialUsageEntry) -> Result<()>;
    async fn list_materials(&self, request_id: Uuid) -> Result<Vec<MaterialUsageEntry>>;

    async fn append_tracking(&self, record: &TrackingRecord) -> Result<()>;
    async fn list_tracking(&self, request_id: Uuid) -> Result<Vec<TrackingRecord>>;

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<bool>;
    async fn get_invoice(&self, request_id: Uuid) -> Result<Option<Invoice>>;

    /// Refuses a completed payment when one already exists for the request.
    async fn insert_payment(&self, payment: &Payment) -> Result<bool>;
    async fn list_payments(&self, request_id: Uuid) -> Result<Vec<Payment>>;

    async fn insert_dispatch(&self, record: &DispatchRecord) -> Result<bool>;
    async fn get_dispatch(&self, request_id: Uuid) -> Result<Option<DispatchRecord>>;
}

/// Store kept in process memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    requests: Arc<DashMap<Uuid, ServiceRequest>>,
    materials: Arc<DashMap<Uuid, Vec<MaterialUsageEntry>>>,
    tracking: Arc<DashMap<Uuid, Vec<TrackingRecord>>>,
    invoices: Arc<DashMap<Uuid, Invoice>>,
    payments: Arc<DashMap<Uuid, Vec<Payment>>>,
    dispatches: Arc<DashMap<Uuid, DispatchRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceStore for InMemoryStore {
    #[instrument(skip(self, request), fields(request_id = %request.request_id))]
    async fn insert_request(&self, request: &ServiceRequest) -> Result<()> {
        match self.requests.entry(request.request_id) {
            Entry::Occupied(_) => Err(WorkshopError::Storage(anyhow::anyhow!(
                "Service request {} already stored",
                request.request_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(request.clone());
                debug!("Service request stored");
                Ok(())
            }
        }
    }

    async fn get_request(&self, request_id: Uuid) -> Result<Option<ServiceRequest>> {
        Ok(self.requests.get(&request_id).map(|r| r.clone()))
    }

    #[instrument(skip(self, request), fields(request_id = %request.request_id))]
    async fn update_request(&self, request: &ServiceRequest) -> Result<()> {
        match self.requests.get_mut(&request.request_id) {
            Some(mut stored) => {
                *stored = request.clone();
                Ok(())
            }
            None => Err(WorkshopError::request_not_found(request.request_id)),
        }
    }

    #[instrument(skip(self, entry), fields(request_id = %entry.request_id))]
    async fn append_material(&self, entry: &MaterialUsageEntry) -> Result<()> {
        self.materials
            .entry(entry.request_id)
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn list_materials(&self, request_id: Uuid) -> Result<Vec<MaterialUsageEntry>> {
        Ok(self
            .materials
            .get(&request_id)
            .map(|entries| entries.clone())
            .unwrap_or_default())
    }

    #[instrument(skip(self, record), fields(request_id = %record.request_id))]
    async fn append_tracking(&self, record: &TrackingRecord) -> Result<()> {
        self.tracking
            .entry(record.request_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn list_tracking(&self, request_id: Uuid) -> Result<Vec<TrackingRecord>> {
        Ok(self
            .tracking
            .get(&request_id)
            .map(|records| records.clone())
            .unwrap_or_default())
    }

    #[instrument(skip(self, invoice), fields(request_id = %invoice.request_id))]
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<bool> {
        match self.invoices.entry(invoice.request_id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(invoice.clone());
                Ok(true)
            }
        }
    }

    async fn get_invoice(&self, request_id: Uuid) -> Result<Option<Invoice>> {
        Ok(self.invoices.get(&request_id).map(|i| i.clone()))
    }

    #[instrument(skip(self, payment), fields(request_id = %payment.request_id))]
    async fn insert_payment(&self, payment: &Payment) -> Result<bool> {
        let mut payments = self.payments.entry(payment.request_id).or_default();

        if payment.status == PaymentStatus::Completed
            && payments.iter().any(|p| p.status == PaymentStatus::Completed)
        {
            return Ok(false);
        }

        payments.push(payment.clone());
        Ok(true)
    }

    async fn list_payments(&self, request_id: Uuid) -> Result<Vec<Payment>> {
        Ok(self
            .payments
            .get(&request_id)
            .map(|payments| payments.clone())
            .unwrap_or_default())
    }

    #[instrument(skip(self, record), fields(request_id = %record.request_id))]
    async fn insert_dispatch(&self, record: &DispatchRecord) -> Result<bool> {
        match self.dispatches.entry(record.request_id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    async fn get_dispatch(&self, request_id: Uuid) -> Result<Option<DispatchRecord>> {
        Ok(self.dispatches.get(&request_id).map(|d| d.clone()))
    }
}
