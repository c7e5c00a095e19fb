//! Boundaries to the systems the engine depends on but does not own.
//!
//! Identity, inventory pricing, customer records and notification delivery
//! all live elsewhere. The engine only sees these traits.

mod in_memory;

pub use in_memory::{
    RecordingNotifier, StaticCatalog, StaticCustomerDirectory, StaticIdentityProvider,
};

use crate::models::{Customer, Principal};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::retry::Retryable;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Failure of an external collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    #[error("{service} rejected the call: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },
}

impl Retryable for CollaboratorError {
    fn is_retryable(&self) -> bool {
        matches!(self, CollaboratorError::Unavailable { .. })
    }
}

/// Resolves who is calling and in which role.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` when the principal is unknown.
    async fn resolve(&self, principal_id: &str) -> Result<Option<Principal>, CollaboratorError>;
}

/// Live unit prices from the inventory catalog. Never cached by the engine.
#[async_trait]
pub trait InventoryCatalog: Send + Sync {
    /// `Ok(None)` when the item is not in the catalog.
    async fn unit_price(&self, item_ref: &str) -> Result<Option<Decimal>, CollaboratorError>;
}

/// Customer records, reached through the vehicle.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn customer_for_vehicle(
        &self,
        vehicle_id: Uuid,
    ) -> Result<Option<Customer>, CollaboratorError>;
}

/// Best-effort outbound messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingReceived,
    InvoiceGenerated,
    PaymentReceived,
    VehicleDispatched,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingReceived => "booking_received",
            NotificationKind::InvoiceGenerated => "invoice_generated",
            NotificationKind::PaymentReceived => "payment_received",
            NotificationKind::VehicleDispatched => "vehicle_dispatched",
        }
    }
}

/// Message addressed to a customer. The notifier resolves the address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub request_id: Uuid,
    pub customer_id: String,
    pub subject: String,
    pub body: String,
}

/// The full set of collaborators a [`crate::services::WorkshopService`] needs.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub catalog: Arc<dyn InventoryCatalog>,
    pub customers: Arc<dyn CustomerDirectory>,
    pub notifier: Arc<dyn Notifier>,
}
