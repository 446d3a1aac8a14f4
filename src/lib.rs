//! Sequential multi-step approval chains for arbitrary host documents.

pub mod approvable;
pub mod config;
pub mod error;
pub mod host;
pub mod line;
pub mod memory;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod utils;

pub use approvable::{Approvable, mark_approved, mark_rejected};
pub use error::ApprovalError;
pub use service::{ApprovalService, ChainView};
