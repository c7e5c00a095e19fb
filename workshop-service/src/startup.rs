//! Application startup.
//!
//! The engine has no network surface of its own. `Application` wires
//! configuration, metrics, the record store and the collaborators into a
//! [`WorkshopService`] for the embedding process to drive.

use crate::collaborators::Collaborators;
use crate::config::WorkshopConfig;
use crate::services::{get_metrics, init_metrics, InMemoryStore, ServiceStore, WorkshopService};
use service_core::error::AppError;
use service_core::observability::init_tracing;
use std::sync::Arc;

/// Application container.
pub struct Application {
    config: WorkshopConfig,
    service: WorkshopService,
}

impl Application {
    /// Build the application over an in-memory store.
    pub fn build(config: WorkshopConfig, collaborators: Collaborators) -> Result<Self, AppError> {
        Self::build_with_store(config, Arc::new(InMemoryStore::new()), collaborators)
    }

    /// Build the application over any record store.
    pub fn build_with_store(
        config: WorkshopConfig,
        store: Arc<dyn ServiceStore>,
        collaborators: Collaborators,
    ) -> Result<Self, AppError> {
        config.validate()?;
        init_metrics();

        let service = WorkshopService::new(&config, store, collaborators);

        tracing::info!(
            service = %config.common.service_name,
            currency = %config.billing.currency,
            tax_rate = %config.billing.tax_rate,
            reconcile_payments = config.billing.reconcile_payments,
            "Workshop service initialized"
        );

        Ok(Self { config, service })
    }

    pub fn service(&self) -> &WorkshopService {
        &self.service
    }

    pub fn config(&self) -> &WorkshopConfig {
        &self.config
    }

    /// Prometheus text exposition of the process metrics.
    pub fn metrics(&self) -> String {
        get_metrics()
    }
}

/// Install tracing from the common configuration section.
pub fn init_telemetry(config: &WorkshopConfig) -> Result<(), AppError> {
    init_tracing(
        &config.common.service_name,
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    )
}
