//! Domain models for workshop-service.

mod customer;
mod dispatch;
mod invoice;
mod ledger;
mod payment;
mod service_request;

pub use customer::{Customer, Membership, Principal, Role};
pub use dispatch::{DispatchDetails, DispatchRecord};
pub use invoice::{BillingSummary, Invoice};
pub use ledger::{
    LedgerTotals, LedgerView, LegacyCombinedRecord, MaterialUsageEntry, NewLaborEntry,
    NewMaterialUsage, StoredAmount, TotalsSource, TrackingDetail, TrackingRecord, MAX_HOURS,
    MAX_QUANTITY, MAX_RATE_PER_HOUR,
};
pub use payment::{Payment, PaymentMethod, PaymentStatus, RecordPayment};
pub use service_request::{
    NewServiceRequest, RequestStatusView, ServiceRequest, ServiceStatus, StatusHistoryEntry,
};
