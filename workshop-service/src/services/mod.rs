//! Services for workshop-service.

pub mod dispatch;
pub mod invoicing;
pub mod ledger;
pub mod locks;
pub mod metrics;
pub mod payments;
pub mod pricing;
pub mod state_machine;
pub mod store;
pub mod workshop;

pub use dispatch::DispatchFinalizer;
pub use invoicing::{render_invoice, InvoiceGenerator};
pub use ledger::{resolve_totals, CostLedger};
pub use locks::{RequestGuard, RequestLocks};
pub use metrics::{get_metrics, init_metrics};
pub use payments::PaymentRecorder;
pub use pricing::{round_money, DiscountPolicy, PriceBreakdown, TaxCalculator};
pub use state_machine::ServiceRequestStateMachine;
pub use store::{InMemoryStore, ServiceStore};
pub use workshop::WorkshopService;
