//! Workshop Service - vehicle service request lifecycle and billing.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod startup;
