//! Configuration for workshop-service.

use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::config::{load_section, Config as CommonConfig};
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::path::Path;
use std::time::Duration;

/// Workshop service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkshopConfig {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Rates and reconciliation rules used when pricing a request.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,
    #[serde(default = "default_premium_labor_discount_rate")]
    pub premium_labor_discount_rate: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Reject payments whose amount differs from the invoice grand total.
    #[serde(default = "default_true")]
    pub reconcile_payments: bool,
}

/// Best-effort notification delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_tax_rate() -> Decimal {
    Decimal::new(18, 2)
}

fn default_premium_labor_discount_rate() -> Decimal {
    Decimal::new(20, 2)
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_backoff_ms() -> u64 {
    50
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            tax_rate: default_tax_rate(),
            premium_labor_discount_rate: default_premium_labor_discount_rate(),
            currency: default_currency(),
            reconcile_payments: true,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

impl NotificationConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            ..RetryConfig::quick()
        }
    }
}

impl WorkshopConfig {
    /// Load from `configuration.*` and `APP__` environment variables.
    pub fn load() -> Result<Self, AppError> {
        let config: Self = load_section(None)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        let config: Self = load_section(Some(path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let unit = Decimal::ZERO..=Decimal::ONE;

        if !unit.contains(&self.billing.tax_rate) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "billing.tax_rate must be between 0 and 1, got {}",
                self.billing.tax_rate
            )));
        }

        if !unit.contains(&self.billing.premium_labor_discount_rate) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "billing.premium_labor_discount_rate must be between 0 and 1, got {}",
                self.billing.premium_labor_discount_rate
            )));
        }

        if self.billing.currency.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "billing.currency must not be empty"
            )));
        }

        Ok(())
    }
}
