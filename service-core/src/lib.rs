//! service-core: Shared infrastructure for the workshop services.
pub mod config;
pub mod error;
pub mod observability;
pub mod retry;
pub mod utils;

pub use serde;
pub use tokio;
pub use tracing;
pub use validator;
