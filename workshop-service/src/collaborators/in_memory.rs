//! In-process collaborator implementations for embedding and tests.

use super::{
    CollaboratorError, CustomerDirectory, IdentityProvider, InventoryCatalog, Notification,
    Notifier,
};
use crate::models::{Customer, Principal, Role};
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

fn unavailable(service: &'static str) -> CollaboratorError {
    CollaboratorError::Unavailable {
        service,
        message: "marked unavailable".to_string(),
    }
}

/// Identity provider backed by a fixed table of raw role tokens.
#[derive(Default)]
pub struct StaticIdentityProvider {
    principals: DashMap<String, String>,
    unavailable: AtomicBool,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a principal with the role token the upstream system uses.
    pub fn with_principal(self, principal_id: &str, role_token: &str) -> Self {
        self.principals
            .insert(principal_id.to_string(), role_token.to_string());
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, principal_id: &str) -> Result<Option<Principal>, CollaboratorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable("identity"));
        }

        let Some(token) = self.principals.get(principal_id) else {
            return Ok(None);
        };

        match Role::from_token(token.value()) {
            Some(role) => Ok(Some(Principal::new(principal_id, role))),
            None => {
                tracing::warn!(
                    principal_id = principal_id,
                    role_token = %token.value(),
                    "Unrecognised role token"
                );
                Ok(None)
            }
        }
    }
}

/// Catalog with mutable prices, so price drift can be exercised.
#[derive(Default)]
pub struct StaticCatalog {
    prices: DashMap<String, Decimal>,
    unavailable: AtomicBool,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(self, item_ref: &str, unit_price: Decimal) -> Self {
        self.set_price(item_ref, unit_price);
        self
    }

    pub fn set_price(&self, item_ref: &str, unit_price: Decimal) {
        self.prices.insert(item_ref.to_string(), unit_price);
    }

    pub fn remove_item(&self, item_ref: &str) {
        self.prices.remove(item_ref);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl InventoryCatalog for StaticCatalog {
    async fn unit_price(&self, item_ref: &str) -> Result<Option<Decimal>, CollaboratorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable("inventory catalog"));
        }
        Ok(self.prices.get(item_ref).map(|price| *price))
    }
}

/// Vehicle to customer lookup table.
#[derive(Default)]
pub struct StaticCustomerDirectory {
    owners: DashMap<Uuid, Customer>,
}

impl StaticCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vehicle(self, vehicle_id: Uuid, owner: Customer) -> Self {
        self.owners.insert(vehicle_id, owner);
        self
    }
}

#[async_trait]
impl CustomerDirectory for StaticCustomerDirectory {
    async fn customer_for_vehicle(
        &self,
        vehicle_id: Uuid,
    ) -> Result<Option<Customer>, CollaboratorError> {
        Ok(self.owners.get(&vehicle_id).map(|owner| owner.clone()))
    }
}

/// Keeps every delivered notification; can be switched to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
    attempts: AtomicU32,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails as unavailable.
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.failing.store(true, Ordering::SeqCst);
        notifier
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    /// Delivery attempts, including failed ones.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), CollaboratorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("notification"));
        }
        self.sent.lock().await.push(notification);
        Ok(())
    }
}
