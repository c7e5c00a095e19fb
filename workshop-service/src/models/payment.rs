//! Payment model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// How the customer paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

/// A payment attempt against a service request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub request_id: Uuid,
    pub customer_id: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub recorded_utc: DateTime<Utc>,
}

fn validate_positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_positive"))
    }
}

/// Input for recording a payment.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordPayment {
    #[validate(custom(function = "validate_positive_amount"))]
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[validate(length(min = 1, max = 128))]
    pub transaction_id: String,
}
